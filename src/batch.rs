//! Running many independent sessions.
//!
//! [`BatchRunner`] keeps up to `parallelism` sessions running on worker threads and starts a
//! new one each time one finishes. A failing or panicking session is recorded as
//! [`RunOutcome::Failed`] and never stops the batch.

use std::any::Any;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::agent::Agent;
use crate::configuration::Configuration;
use crate::game_interface::EnvConfig;
use crate::game_manager::{GameManager, GameResult};
use crate::recorder::TranscriptRecorder;

/// Outcome of one session of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The session produced a result.
    Finished(GameResult),
    /// The session returned an error or panicked, with its message.
    Failed(String),
}

/// Outcome of run `index` of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Position of the session in the batch, from 0.
    pub index: usize,
    /// How the run ended.
    pub outcome: RunOutcome,
}

/// Everything needed to play one session, except the agents.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// Game key or alias given to [`GameManager::setup`].
    pub game: String,
    /// Parameters handed to the environment.
    pub env_config: EnvConfig,
    /// Base seed; run `i` of a batch uses `seed + i`.
    pub seed: Option<u64>,
    /// Step ceiling of each session.
    pub max_steps: usize,
    /// Where transcripts are written, if anywhere.
    pub output_dir: Option<PathBuf>,
}

impl SessionPlan {
    /// Plan for `game` using the step ceiling and output directory of `config`.
    pub fn new(game: impl Into<String>, config: &Configuration) -> Self {
        Self {
            game: game.into(),
            env_config: EnvConfig::new(),
            seed: None,
            max_steps: config.max_steps(),
            output_dir: config.output_dir().map(PathBuf::from),
        }
    }

    /// Play run number `index` with `agents`, registered in order from id 0.
    pub fn play(&self, index: usize, agents: Vec<Box<dyn Agent>>) -> anyhow::Result<GameResult> {
        let mut manager = GameManager::new();
        let seed = self.seed.map(|s| s.wrapping_add(index as u64));
        let key = manager.setup(&self.game, seed, Some(&self.env_config))?;
        for agent in agents {
            manager.add_agent(agent, None)?;
        }
        manager.start(None)?;

        let mut recorder = TranscriptRecorder::new(key);
        let result = manager.run(self.max_steps, &mut recorder)?;
        if let Some(dir) = &self.output_dir {
            recorder
                .finish(Some(result.clone()))
                .write_to_dir(dir, &format!("run{index}"))
                .with_context(|| format!("could not save transcript of run {index}"))?;
        }
        Ok(result)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Bounded-parallelism driver of independent sessions.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    config: Configuration,
}

impl BatchRunner {
    /// Runner using the parallelism and verbosity of `config`.
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    /// Play `runs` sessions; `session(i)` plays run `i` from start to finish.
    ///
    /// Reports are returned sorted by index. A worker that dies without reporting is
    /// recorded as failed.
    #[instrument(skip_all, fields(runs = runs))]
    pub fn run<F>(&self, runs: usize, session: F) -> Vec<RunReport>
    where
        F: Fn(usize) -> anyhow::Result<GameResult> + Send + Sync + 'static,
    {
        let session = Arc::new(session);
        let (tx_report, rx_report) = mpsc::channel();
        let mut tx_report = Some(tx_report);
        let parallelism = self.config.parallelism().max(1);

        let mut launched = 0;
        let mut launch_next = |tx_report: &mut Option<Sender<RunReport>>| {
            if let Some(tx) = tx_report.as_ref() {
                launch(launched, &session, tx.clone());
                launched += 1;
            }
            if launched == runs {
                // only workers hold senders from now on
                *tx_report = None;
            }
        };
        for _ in 0..runs.min(parallelism) {
            launch_next(&mut tx_report);
        }

        let mut reports = Vec::with_capacity(runs);
        let mut reported = vec![false; runs];
        while reports.len() < runs {
            let Ok(report) = rx_report.recv() else {
                break;
            };
            reported[report.index] = true;
            self.log_report(&report);
            reports.push(report);
            launch_next(&mut tx_report);
        }

        for index in (0..runs).filter(|&i| !reported[i]) {
            let report = RunReport {
                index,
                outcome: RunOutcome::Failed("worker died without reporting".to_string()),
            };
            self.log_report(&report);
            reports.push(report);
        }
        reports.sort_by_key(|r: &RunReport| r.index);
        info!("batch of {runs} runs done");
        reports
    }

    fn log_report(&self, report: &RunReport) {
        if let RunOutcome::Failed(msg) = &report.outcome {
            warn!("run {} failed: {msg}", report.index);
        }
        if self.config.verbose() {
            print_report(report);
        }
    }
}

fn launch<F>(index: usize, session: &Arc<F>, tx_report: Sender<RunReport>)
where
    F: Fn(usize) -> anyhow::Result<GameResult> + Send + Sync + 'static,
{
    let session = session.clone();
    thread::spawn(move || {
        // the error is rendered inside the guard, its Display may panic too
        let outcome = catch_unwind(AssertUnwindSafe(|| match (*session)(index) {
            Ok(result) => RunOutcome::Finished(result),
            Err(e) => RunOutcome::Failed(format!("{e:#}")),
        }))
        .unwrap_or_else(|payload| RunOutcome::Failed(format!("panicked: {}", panic_message(payload))));
        // the receiver only goes away once every report arrived
        let _ = tx_report.send(RunReport { index, outcome });
    });
}

fn print_report(report: &RunReport) {
    // a closed stdout must not take the batch down
    let mut out = std::io::stdout().lock();
    let _ = match &report.outcome {
        RunOutcome::Finished(result) => {
            let rewards = result
                .rewards
                .iter()
                .map(|(pid, r)| format!("{pid}: {r}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                out,
                "run {} {:?} after {} steps, rewards {{{rewards}}}",
                report.index, result.status, result.steps
            )
        }
        RunOutcome::Failed(msg) => writeln!(out, "run {} failed: {msg}", report.index),
    };
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;

    use super::*;
    use crate::game_interface::GameInfo;
    use crate::game_manager::GameStatus;

    fn result(steps: usize) -> GameResult {
        GameResult {
            status: GameStatus::Completed,
            steps,
            rewards: Default::default(),
            game_info: GameInfo::new(),
            human_players: vec![],
            llm_players: vec![],
        }
    }

    #[test]
    fn failures_and_panics_do_not_stop_the_batch() {
        let runner = BatchRunner::new(Configuration::new().with_verbose(false).with_parallelism(2));
        let reports = runner.run(5, |i| match i {
            1 => bail!("network down"),
            3 => panic!("rule engine bug"),
            _ => Ok(result(i)),
        });
        assert_eq!(reports.len(), 5);
        assert_eq!(reports.iter().map(|r| r.index).collect::<Vec<_>>(), [0, 1, 2, 3, 4]);
        assert_eq!(reports[2].outcome, RunOutcome::Finished(result(2)));
        assert_eq!(reports[1].outcome, RunOutcome::Failed("network down".to_string()));
        match &reports[3].outcome {
            RunOutcome::Failed(msg) => assert!(msg.contains("rule engine bug")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parallelism_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let runner = BatchRunner::new(Configuration::new().with_verbose(false).with_parallelism(3));
        let reports = runner.run(10, move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(result(0))
        });
        assert_eq!(reports.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[derive(Debug)]
    struct UnprintableError;

    impl std::fmt::Display for UnprintableError {
        fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            panic!("cannot render error")
        }
    }

    impl std::error::Error for UnprintableError {}

    #[test]
    fn error_rendering_panic_is_reported() {
        let (tx_done, rx_done) = mpsc::channel();
        thread::spawn(move || {
            let runner = BatchRunner::new(Configuration::new().with_verbose(true).with_parallelism(1));
            let reports = runner.run(2, |i| match i {
                0 => Err(anyhow::Error::new(UnprintableError)),
                _ => Ok(result(i)),
            });
            let _ = tx_done.send(reports);
        });
        let reports = rx_done
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("batch did not return");
        assert_eq!(reports.len(), 2);
        match &reports[0].outcome {
            RunOutcome::Failed(msg) => assert!(msg.contains("cannot render error"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reports[1].outcome, RunOutcome::Finished(result(1)));
    }

    #[test]
    fn empty_batch() {
        let runner = BatchRunner::new(Configuration::new().with_verbose(false));
        assert!(runner.run(0, |_| Ok(result(0))).is_empty());
    }
}
