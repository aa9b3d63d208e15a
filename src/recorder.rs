//! Transcript recording.
//!
//! [`TranscriptRecorder`] plugs into the loop as a [`GameCallbacks`] and keeps one
//! [`StepRecord`] per turn. Once the session is finalized, [`TranscriptRecorder::finish`]
//! produces a [`GameLog`] that can be written to disk with [`GameLog::write_to_dir`].

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;

use crate::game_interface::{PlayerId, StepInfo};
use crate::game_manager::{GameCallbacks, GameResult};
use crate::logger::timestamp;

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_default()
}

/// One turn of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position of the turn, from 1.
    pub step_num: usize,
    /// Player who acted.
    pub player_id: PlayerId,
    /// RFC 3339 time of the step.
    pub timestamp: String,
    /// Accumulated observation given to the player.
    pub observation: String,
    /// Action the player chose.
    pub action: String,
    /// True on the last turn.
    pub done: bool,
    /// Step diagnostics of the environment.
    pub info: StepInfo,
}

/// Full transcript of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    /// Canonical game key.
    pub game_name: String,
    /// RFC 3339 time the recording started.
    pub timestamp: String,
    /// Every recorded turn.
    pub steps: Vec<StepRecord>,
    /// Result of the session, once finalized.
    pub final_results: Option<GameResult>,
}

#[derive(Debug, Default)]
struct PendingTurn {
    player_id: PlayerId,
    observation: String,
    action: String,
}

/// Callback collecting a [`GameLog`].
#[derive(Debug)]
pub struct TranscriptRecorder {
    log: GameLog,
    pending: Option<PendingTurn>,
}

impl TranscriptRecorder {
    /// Recorder for a game named `game_name`.
    pub fn new(game_name: impl Into<String>) -> Self {
        Self {
            log: GameLog {
                game_name: game_name.into(),
                timestamp: now_rfc3339(),
                steps: vec![],
                final_results: None,
            },
            pending: None,
        }
    }

    /// Turns recorded so far.
    pub fn steps(&self) -> &[StepRecord] {
        &self.log.steps
    }

    /// Attach the final result and hand back the transcript.
    pub fn finish(mut self, result: Option<GameResult>) -> GameLog {
        self.log.final_results = result;
        self.log
    }
}

impl GameCallbacks for TranscriptRecorder {
    fn on_observation(&mut self, player_id: PlayerId, text: &str) {
        self.pending = Some(PendingTurn {
            player_id,
            observation: text.to_string(),
            action: String::new(),
        });
    }

    fn on_action(&mut self, player_id: PlayerId, action: &str) {
        let pending = self.pending.get_or_insert_with(|| PendingTurn {
            player_id,
            ..Default::default()
        });
        pending.action = action.to_string();
    }

    fn on_step_complete(&mut self, done: bool, info: &StepInfo) {
        let turn = self.pending.take().unwrap_or_default();
        self.log.steps.push(StepRecord {
            step_num: self.log.steps.len() + 1,
            player_id: turn.player_id,
            timestamp: now_rfc3339(),
            observation: turn.observation,
            action: turn.action,
            done,
            info: info.clone(),
        });
    }
}

impl GameLog {
    /// Write `<dir>/<timestamp>_<label>/<game>.json` and a `summary.csv` next to it.
    ///
    /// Returns the created directory.
    pub fn write_to_dir(&self, dir: &Path, label: &str) -> anyhow::Result<PathBuf> {
        let run_dir = dir.join(format!("{}_{label}", timestamp()));
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("could not create {}", run_dir.display()))?;

        let json_path = run_dir.join(format!("{}.json", self.game_name));
        let json = serde_json::to_string_pretty(self).context("could not serialize game log")?;
        fs::write(&json_path, json)
            .with_context(|| format!("could not write {}", json_path.display()))?;

        let csv_path = run_dir.join("summary.csv");
        fs::write(&csv_path, self.summary_csv())
            .with_context(|| format!("could not write {}", csv_path.display()))?;

        info!("transcript written to {}", run_dir.display());
        Ok(run_dir)
    }

    /// `steps,status,reward_<id>...,winner` header and one row.
    pub fn summary_csv(&self) -> String {
        let mut header = String::from("steps,status");
        let mut row = String::new();
        match &self.final_results {
            Some(result) => {
                let status = serde_json::to_value(result.status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let _ = write!(row, "{},{status}", result.steps);
                for (pid, reward) in &result.rewards {
                    let _ = write!(header, ",reward_{pid}");
                    let _ = write!(row, ",{reward}");
                }
                header.push_str(",winner");
                match result.winner() {
                    Some(pid) => {
                        let _ = write!(row, ",{pid}");
                    }
                    None => row.push_str(",draw"),
                }
            }
            None => {
                header.push_str(",winner");
                let _ = write!(row, "{},unfinished,", self.steps.len());
            }
        }
        format!("{header}\n{row}\n")
    }
}
