//! Module defining what a game environment must implement to be driven by the
//! [`GameManager`](crate::game_manager::GameManager).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a player inside one session.
pub type PlayerId = u32;

/// Final score of each player.
pub type Rewards = BTreeMap<PlayerId, f64>;

/// Free-form diagnostic payload returned by [`Environment::step`].
pub type StepInfo = serde_json::Map<String, serde_json::Value>;

/// Free-form diagnostic payload returned by [`Environment::close`].
pub type GameInfo = serde_json::Map<String, serde_json::Value>;

/// Keyword configuration handed to an environment constructor.
pub type EnvConfig = serde_json::Map<String, serde_json::Value>;

/// Who emitted an observation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// The game itself (announcements, prompts, board).
    Game,
    /// Another (or the same) player.
    Player(PlayerId),
}

/// Kind of an observation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    /// Initial game instructions.
    Prompt,
    /// Something a player said or did in the game.
    PlayerAction,
    /// Announcement from the game.
    GameMessage,
    /// Rendering of the board.
    GameBoard,
    /// Administrative notice (invalid move, elimination...).
    GameAdmin,
}

/// One entry of a structured observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEvent {
    /// Origin of the event.
    pub sender: Sender,
    /// Text of the event. Events without a message are dropped during normalization.
    pub message: Option<String>,
    /// Kind of the event.
    pub kind: ObservationKind,
}

impl ObservationEvent {
    /// An event emitted by the game.
    pub fn game(message: impl Into<String>, kind: ObservationKind) -> Self {
        Self {
            sender: Sender::Game,
            message: Some(message.into()),
            kind,
        }
    }

    /// A player action, shown to other players with the acting player's role label.
    pub fn player(player_id: PlayerId, message: impl Into<String>) -> Self {
        Self {
            sender: Sender::Player(player_id),
            message: Some(message.into()),
            kind: ObservationKind::PlayerAction,
        }
    }
}

/// What an environment shows to a player: either plain text or a list of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// Already rendered text.
    Text(String),
    /// Structured events, rendered by [`normalize_observation`](crate::observation::normalize_observation).
    Events(Vec<ObservationEvent>),
}

impl From<String> for Observation {
    fn from(value: String) -> Self {
        Observation::Text(value)
    }
}

impl From<&str> for Observation {
    fn from(value: &str) -> Self {
        Observation::Text(value.to_owned())
    }
}

impl From<Vec<ObservationEvent>> for Observation {
    fn from(value: Vec<ObservationEvent>) -> Self {
        Observation::Events(value)
    }
}

/// What a game should implement.
///
/// Calls happen in this order: `reset` once, then any number of
/// `get_observation`/`step` pairs, then `close` once. Any error returned here is treated
/// as a defect of the game and aborts the session.
pub trait Environment: Send {
    /// (Re)initialize the game for `num_players` players.
    ///
    /// Returns a description of the initial situation.
    fn reset(&mut self, num_players: usize, seed: Option<u64>) -> anyhow::Result<Observation>;

    /// Whose turn it is, and what that player currently sees.
    ///
    /// The observation may be a delta since the last call or the whole history, the
    /// orchestrator copes with both.
    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)>;

    /// Apply the current player's action. Returns true once the game is over.
    ///
    /// Invalid actions are not errors: the game should penalize them according to its own
    /// rules.
    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)>;

    /// Final scores, called once after the last step.
    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)>;

    /// Label used when rendering `player_id`'s actions to others (e.g. "Commander Alpha").
    fn role_label(&self, _player_id: PlayerId) -> Option<String> {
        None
    }
}
