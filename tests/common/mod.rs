//! Scripted games and agents shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::bail;
use game_arena::agent::Agent;
use game_arena::game_interface::{Environment, GameInfo, Observation, PlayerId, Rewards, StepInfo};

/// How a [`ScriptedEnv`] reports what happened so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reporting {
    /// Only the lines since the player's last turn.
    Delta,
    /// Every line the player ever received.
    FullHistory,
}

/// Calls seen by a [`ScriptedEnv`], readable after the env was handed to a manager.
#[derive(Debug, Default)]
pub struct Probe {
    pub resets: usize,
    pub observations: usize,
    pub actions: Vec<String>,
    pub closes: usize,
}

/// Plays a fixed list of turns. Every step broadcasts `"<pid> played <action>"`.
pub struct ScriptedEnv {
    turns: Vec<PlayerId>,
    reporting: Reporting,
    players: usize,
    current: usize,
    /// Lines per player, with the index of the first one not delivered yet.
    inbox: Vec<(Vec<String>, usize)>,
    probe: Arc<Mutex<Probe>>,
}

impl ScriptedEnv {
    pub fn new(turns: &[PlayerId], reporting: Reporting) -> (Self, Arc<Mutex<Probe>>) {
        let probe = Arc::new(Mutex::new(Probe::default()));
        let env = Self {
            turns: turns.to_vec(),
            reporting,
            players: 0,
            current: 0,
            inbox: vec![],
            probe: probe.clone(),
        };
        (env, probe)
    }

    fn broadcast(&mut self, line: String) {
        for (lines, _) in &mut self.inbox {
            lines.push(line.clone());
        }
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self, num_players: usize, _seed: Option<u64>) -> anyhow::Result<Observation> {
        self.probe.lock().unwrap().resets += 1;
        self.players = num_players;
        self.current = 0;
        self.inbox = (0..num_players)
            .map(|pid| (vec![format!("welcome player {pid}")], 0))
            .collect();
        Ok("scripted game".into())
    }

    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
        self.probe.lock().unwrap().observations += 1;
        let Some(&pid) = self.turns.get(self.current) else {
            bail!("script exhausted");
        };
        let Some((lines, delivered)) = self.inbox.get_mut(pid as usize) else {
            // player outside of the roster, reported as is
            return Ok((pid, Observation::Text(format!("turn {}", self.current))));
        };
        let start = match self.reporting {
            Reporting::Delta => *delivered,
            Reporting::FullHistory => 0,
        };
        let text = lines[start..].join("\n");
        *delivered = lines.len();
        Ok((pid, Observation::Text(text)))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)> {
        self.probe.lock().unwrap().actions.push(action.to_string());
        let pid = self.turns[self.current];
        self.broadcast(format!("{pid} played {action}"));
        self.current += 1;
        Ok((self.current >= self.turns.len(), StepInfo::new()))
    }

    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
        self.probe.lock().unwrap().closes += 1;
        let rewards = (0..self.players as PlayerId)
            .map(|pid| (pid, if pid == 0 { 1.0 } else { 0.0 }))
            .collect();
        Ok((rewards, GameInfo::new()))
    }
}

/// Agent answering `move<n>` and remembering every observation it received.
#[derive(Clone, Default)]
pub struct EchoAgent {
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Agent for EchoAgent {
    fn act(&mut self, observation: &str) -> String {
        let mut seen = self.seen.lock().unwrap();
        seen.push(observation.to_string());
        format!("move{}", seen.len())
    }
}
