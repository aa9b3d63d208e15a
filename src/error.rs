//! Errors raised by the [`GameManager`](crate::game_manager::GameManager).
//!
//! Three families are distinguished:
//! - configuration errors (unknown game, invalid environment config, player-count violation),
//! - registry errors (duplicate or unregistered player ids),
//! - environment runtime errors, wrapping whatever the game implementation returned.
//!
//! Agent failures never show up here: they are absorbed by the agent itself (see
//! [`ModelAgent`](crate::llm::ModelAgent)).

use thiserror::Error;

use crate::game_interface::PlayerId;
use crate::game_registry::PlayerCountRule;

/// Errors returned by the orchestration layer.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The requested game name is neither a canonical key nor a known alias.
    #[error("unsupported game '{name}', supported games are: {}", supported.join(", "))]
    UnknownGame {
        /// Name given by the caller.
        name: String,
        /// Sorted list of canonical keys.
        supported: Vec<&'static str>,
    },

    /// The environment rejected its construction parameters.
    #[error("invalid configuration for game '{game}': {reason}")]
    InvalidEnvConfig {
        /// Canonical game key.
        game: &'static str,
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The roster does not satisfy the game's player-count rule.
    #[error("game '{game}' requires {rule} players, {actual} registered")]
    PlayerCount {
        /// Canonical game key.
        game: String,
        /// Rule that was violated.
        rule: PlayerCountRule,
        /// Number of registered agents.
        actual: usize,
    },

    /// Tried to register an agent under an id that is already taken.
    #[error("player id {0} is already registered")]
    DuplicatePlayer(PlayerId),

    /// The environment asked a player that was never registered to act.
    #[error("no agent registered for player id {0}")]
    UnregisteredPlayer(PlayerId),

    /// An operation needing an environment was called before `setup`.
    #[error("no game configured, call setup() first")]
    NotConfigured,

    /// An operation was called in a state that does not allow it.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Current session state.
        state: String,
    },

    /// The environment itself failed (rule-engine defect). Never retried.
    #[error("environment error: {0:#}")]
    Environment(#[source] anyhow::Error),
}

impl ArenaError {
    /// True for errors caused by a bad game selection, config or roster size.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ArenaError::UnknownGame { .. }
                | ArenaError::InvalidEnvConfig { .. }
                | ArenaError::PlayerCount { .. }
        )
    }

    /// True for errors caused by an inconsistent player registry.
    pub fn is_registry(&self) -> bool {
        matches!(
            self,
            ArenaError::DuplicatePlayer(_) | ArenaError::UnregisteredPlayer(_)
        )
    }
}

/// Shorthand for results of the orchestration layer.
pub type Result<T> = std::result::Result<T, ArenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_game_lists_supported_keys() {
        let err = ArenaError::UnknownGame {
            name: "NoSuchGame-v9".to_string(),
            supported: vec!["codenames", "colonel_blotto"],
        };
        let msg = err.to_string();
        assert!(msg.contains("NoSuchGame-v9"));
        assert!(msg.contains("codenames, colonel_blotto"));
        assert!(err.is_configuration());
        assert!(!err.is_registry());
    }

    #[test]
    fn player_count_message() {
        let err = ArenaError::PlayerCount {
            game: "secret_mafia".to_string(),
            rule: PlayerCountRule::Range { min: 6, max: 15 },
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "game 'secret_mafia' requires between 6 and 15 players, 3 registered"
        );
    }

    #[test]
    fn environment_error_keeps_source() {
        let err = ArenaError::Environment(anyhow::anyhow!("board exploded"));
        assert!(err.to_string().contains("board exploded"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_configuration());
    }
}
