//! # Game Arena
//!
//! A harness for pitting language-model agents against each other in small multiplayer
//! text games and collecting their transcripts.
//!
//! It provides:
//! - The turn-taking orchestrator ([`GameManager`](crate::game_manager::GameManager)):
//!   game selection, player registry, the observe / act / step loop and result assembly
//! - A closed registry of built-in games ([`GameKind`](crate::game_registry::GameKind)):
//!   Colonel Blotto, three-player iterated prisoner's dilemma, Secret Mafia and Codenames
//! - Agents: fixed, closure-backed, human and model-backed ([`llm::ModelAgent`])
//! - Drivers: transcript recording, parallel batches and win-rate statistics
//!
//! Each session is single-threaded: one player observes, acts and the environment steps,
//! then the next player. Parallelism only exists across independent sessions, see
//! [`BatchRunner`](crate::batch::BatchRunner).
//!
//! # Documentation Overview
//!
//! - For the session lifecycle and the loop itself, see the [`game_manager`] module.
//! - For implementing a new game, see the [`Environment`](crate::game_interface::Environment)
//!   trait and [`GameManager::setup_custom`](crate::game_manager::GameManager::setup_custom).
//! - For configuring drivers, see [`Configuration`](crate::configuration::Configuration) and
//!   [`RetryPolicyBuilder`](crate::llm::RetryPolicyBuilder).
//!
//! # Usage Example
//!
//! ```no_run
//! use game_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut manager = GameManager::new();
//!     manager.setup("ThreePlayerIPD-v0", Some(42), None)?;
//!     for _ in 0..3 {
//!         manager.add_agent(FixedAgent::new("[0 cooperate] [1 cooperate] [2 cooperate]"), None)?;
//!     }
//!     manager.start(None)?;
//!
//!     let mut recorder = TranscriptRecorder::new("three_player_ipd");
//!     let result = manager.run(1000, &mut recorder)?;
//!     recorder.finish(Some(result)).write_to_dir("logs".as_ref(), "demo")?;
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod agent;
pub mod batch;
pub mod configuration;
pub mod error;
pub mod game_interface;
pub mod game_manager;
pub mod game_registry;
pub mod games;
pub mod llm;
pub mod logger;
pub mod observation;
pub mod recorder;
pub mod stats;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use game_arena::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentRole, FixedAgent, FnAgent, HumanAgent};
    pub use crate::batch::{BatchRunner, RunOutcome, RunReport, SessionPlan};
    pub use crate::configuration::Configuration;
    pub use crate::error::ArenaError;
    pub use crate::game_interface::{EnvConfig, Environment, Observation, ObservationEvent, ObservationKind};
    pub use crate::game_manager::{GameCallbacks, GameManager, GameResult, GameStatus};
    pub use crate::game_registry::{GameKind, PlayerCountRule};
    pub use crate::recorder::TranscriptRecorder;
    pub use crate::stats::WinRateTable;
}
