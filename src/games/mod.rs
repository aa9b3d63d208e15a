//! Built-in game environments.
//!
//! Every game emits per-player deltas: [`ObservationQueue`] buffers the events addressed
//! to each player until that player's next turn.

use std::mem;

use anyhow::{bail, Context};
use rand::{rngs::StdRng, SeedableRng};
use serde::de::DeserializeOwned;

use crate::game_interface::{EnvConfig, Observation, ObservationEvent, PlayerId};

pub mod codenames;
pub mod colonel_blotto;
pub mod secret_mafia;
pub mod three_player_ipd;

/// Events waiting to be shown to each player.
#[derive(Debug, Default, Clone)]
pub(crate) struct ObservationQueue {
    pending: Vec<Vec<ObservationEvent>>,
}

impl ObservationQueue {
    /// Queue with one inbox per player.
    pub fn new(num_players: usize) -> Self {
        Self {
            pending: vec![vec![]; num_players],
        }
    }

    /// Queue `event` for `player_id` only.
    pub fn send(&mut self, player_id: PlayerId, event: ObservationEvent) {
        if let Some(queue) = self.pending.get_mut(player_id as usize) {
            queue.push(event);
        }
    }

    /// Queue `event` for every player.
    pub fn broadcast(&mut self, event: ObservationEvent) {
        for queue in &mut self.pending {
            queue.push(event.clone());
        }
    }

    /// Everyone but `player_id` receives the event.
    pub fn broadcast_except(&mut self, player_id: PlayerId, event: ObservationEvent) {
        for (pid, queue) in self.pending.iter_mut().enumerate() {
            if pid != player_id as usize {
                queue.push(event.clone());
            }
        }
    }

    /// Drain what `player_id` has not seen yet.
    pub fn take(&mut self, player_id: PlayerId) -> Observation {
        let events = self
            .pending
            .get_mut(player_id as usize)
            .map(mem::take)
            .unwrap_or_default();
        Observation::Events(events)
    }
}

/// Deserialize a game's typed configuration from keyword arguments.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &EnvConfig) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::Object(config.clone()))
        .context("could not read environment configuration")
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

pub(crate) fn check_num_players(game: &str, expected: usize, actual: usize) -> anyhow::Result<()> {
    if expected != actual {
        bail!("{game} is played by exactly {expected} players, got {actual}");
    }
    Ok(())
}

/// Content of the last `[...]` group of `text`.
pub(crate) fn last_bracketed(text: &str) -> Option<&str> {
    let end = text.rfind(']')?;
    let start = text[..end].rfind('[')?;
    Some(&text[start + 1..end])
}

/// Contents of every `[...]` group of `text`, in order.
pub(crate) fn all_bracketed(text: &str) -> Vec<&str> {
    let mut groups = vec![];
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(']') else {
            break;
        };
        groups.push(&after[..end]);
        rest = &after[end + 1..];
    }
    groups
}

/// Parse a player id written as `3`, `Player 3` or `player3`.
pub(crate) fn parse_player_ref(text: &str) -> Option<PlayerId> {
    let text = text.trim();
    let digits = text
        .strip_prefix("Player")
        .or_else(|| text.strip_prefix("player"))
        .unwrap_or(text);
    digits.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_interface::ObservationKind;

    #[test]
    fn queue_delivers_deltas() {
        let mut queue = ObservationQueue::new(2);
        queue.broadcast(ObservationEvent::game("hello", ObservationKind::Prompt));
        queue.broadcast_except(0, ObservationEvent::player(0, "hi"));
        queue.send(0, ObservationEvent::game("secret", ObservationKind::GameMessage));

        let Observation::Events(first) = queue.take(0) else {
            panic!("expected events");
        };
        assert_eq!(first.len(), 2);
        let Observation::Events(second) = queue.take(1) else {
            panic!("expected events");
        };
        assert_eq!(second.len(), 2);
        assert_eq!(queue.take(0), Observation::Events(vec![]));
        // unknown players are ignored
        queue.send(9, ObservationEvent::player(0, "lost"));
        assert_eq!(queue.take(9), Observation::Events(vec![]));
    }

    #[test]
    fn bracket_helpers() {
        assert_eq!(last_bracketed("I play [A1 B2] then [A3 B4]"), Some("A3 B4"));
        assert_eq!(last_bracketed("no brackets"), None);
        assert_eq!(last_bracketed("] reversed ["), None);
        assert_eq!(
            all_bracketed("[1 cooperate] and [2 defect] [oops"),
            vec!["1 cooperate", "2 defect"]
        );
    }

    #[test]
    fn player_refs() {
        assert_eq!(parse_player_ref("3"), Some(3));
        assert_eq!(parse_player_ref(" Player 4 "), Some(4));
        assert_eq!(parse_player_ref("player5"), Some(5));
        assert_eq!(parse_player_ref("pass"), None);
    }
}
