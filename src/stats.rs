//! Win-rate statistics over many sessions.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::batch::{RunOutcome, RunReport};
use crate::game_interface::PlayerId;
use crate::game_manager::GameResult;

/// Tally of one player across sessions.
#[derive(PartialEq, Eq, PartialOrd, Ord, Default, Debug, Clone, Copy)]
pub struct PlayerRecord {
    /// Number of wins.
    pub num_win: u32,
    /// Number of draws.
    pub num_draw: u32,
    /// Number of losses.
    pub num_lose: u32,
}

impl PlayerRecord {
    /// Number of games played.
    pub fn games(&self) -> u32 {
        self.num_win + self.num_draw + self.num_lose
    }

    /// Share of games won, 0 when nothing was played.
    pub fn win_rate(&self) -> f64 {
        match self.games() {
            0 => 0.0,
            n => self.num_win as f64 / n as f64,
        }
    }
}

impl Display for PlayerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "W:{} D:{} L:{} ({:.1}%)",
            self.num_win,
            self.num_draw,
            self.num_lose,
            self.win_rate() * 100.0
        )
    }
}

/// Wins, draws and losses per player id.
///
/// The unique highest reward wins and every other player loses. When several players share
/// the highest reward they draw and the rest lose; when everyone has the same reward the
/// game is a draw for all.
#[derive(Debug, Default, Clone)]
pub struct WinRateTable {
    records: BTreeMap<PlayerId, PlayerRecord>,
    finished: u32,
    failed: u32,
}

impl WinRateTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished session.
    pub fn add_result(&mut self, result: &GameResult) {
        self.finished += 1;
        let best = result
            .rewards
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let leaders = result.rewards.values().filter(|r| **r == best).count();

        for (pid, reward) in &result.rewards {
            let record = self.records.entry(*pid).or_default();
            if *reward != best {
                record.num_lose += 1;
            } else if leaders == 1 {
                record.num_win += 1;
            } else {
                record.num_draw += 1;
            }
        }
    }

    /// Count one failed session.
    pub fn add_failure(&mut self) {
        self.failed += 1;
    }

    /// Count a batch report, finished or failed.
    pub fn add_report(&mut self, report: &RunReport) {
        match &report.outcome {
            RunOutcome::Finished(result) => self.add_result(result),
            RunOutcome::Failed(_) => self.add_failure(),
        }
    }

    /// Record of `player_id`, if it played.
    pub fn record(&self, player_id: PlayerId) -> Option<&PlayerRecord> {
        self.records.get(&player_id)
    }

    /// Every record, by player id.
    pub fn records(&self) -> impl Iterator<Item = (PlayerId, &PlayerRecord)> {
        self.records.iter().map(|(pid, r)| (*pid, r))
    }

    /// Number of sessions that produced a result.
    pub fn finished(&self) -> u32 {
        self.finished
    }

    /// Number of sessions that failed.
    pub fn failed(&self) -> u32 {
        self.failed
    }
}

impl<'a> FromIterator<&'a RunReport> for WinRateTable {
    fn from_iter<I: IntoIterator<Item = &'a RunReport>>(iter: I) -> Self {
        let mut table = Self::new();
        for report in iter {
            table.add_report(report);
        }
        table
    }
}

impl Display for WinRateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} finished, {} failed", self.finished, self.failed)?;
        for (pid, record) in &self.records {
            writeln!(f, "player {pid}: {record}")?;
        }
        Ok(())
    }
}
