//! Rendering of environment observations and per-player history accumulation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::game_interface::{Observation, ObservationKind, PlayerId, Sender};

/// Render an observation as the text given to an agent.
///
/// Plain text is returned unchanged. Events are rendered one message per line; events
/// without a message are skipped, and a player's in-game action is preceded by a
/// `[<role>]` line, using `role_label` when it knows the player and `Player <id>`
/// otherwise.
pub fn normalize_observation<F>(observation: &Observation, role_label: F) -> String
where
    F: Fn(PlayerId) -> Option<String>,
{
    match observation {
        Observation::Text(text) => text.clone(),
        Observation::Events(events) => {
            let mut parts = Vec::with_capacity(events.len());
            for event in events {
                let Some(message) = &event.message else {
                    continue;
                };
                if let (ObservationKind::PlayerAction, Sender::Player(pid)) =
                    (event.kind, event.sender)
                {
                    let role = role_label(pid).unwrap_or_else(|| format!("Player {pid}"));
                    parts.push(format!("[{role}]"));
                }
                parts.push(message.clone());
            }
            parts.join("\n")
        }
    }
}

/// How a new observation was folded into a player's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// First observation for this player.
    Initial,
    /// The new text already contained the history and replaced it.
    Replaced,
    /// The history already contained the new text.
    Kept,
    /// Neither contained the other; the new text was appended on a new line.
    Appended,
}

/// Running text shown to each player since the start of the session.
///
/// Environments may hand back either fresh deltas or the full history. The merge rule
/// makes sure the agent always receives a superset of what it saw before, without
/// duplicating history that is sent again. It is not lossless if an environment rewrites
/// past content.
#[derive(Debug, Default, Clone)]
pub struct ObservationAccumulator {
    buffers: HashMap<PlayerId, String>,
}

impl ObservationAccumulator {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `text` into `player_id`'s history and return the resulting history.
    pub fn merge(&mut self, player_id: PlayerId, text: String) -> (&str, Merge) {
        match self.buffers.entry(player_id) {
            Entry::Vacant(entry) => (entry.insert(text).as_str(), Merge::Initial),
            Entry::Occupied(entry) => {
                let previous = entry.into_mut();
                let merge = if text.contains(previous.as_str()) {
                    *previous = text;
                    Merge::Replaced
                } else if previous.contains(text.as_str()) {
                    Merge::Kept
                } else {
                    previous.push('\n');
                    previous.push_str(&text);
                    Merge::Appended
                };
                (previous.as_str(), merge)
            }
        }
    }

    /// Current history of `player_id`, if it observed anything yet.
    pub fn get(&self, player_id: PlayerId) -> Option<&str> {
        self.buffers.get(&player_id).map(String::as_str)
    }

    /// Forget every history.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of players with a history.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when nobody observed anything yet.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
