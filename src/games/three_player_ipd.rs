//! Three-player iterated prisoner's dilemma.
//!
//! Each round starts with free-text communication turns, followed by a decision turn in
//! which every player chooses to cooperate or defect against each opponent separately,
//! e.g. `[1 cooperate] [2 defect]`.

use anyhow::{bail, ensure};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{all_bracketed, check_num_players, parse_config, parse_player_ref, ObservationQueue};
use crate::game_interface::{
    EnvConfig, Environment, GameInfo, Observation, ObservationEvent, ObservationKind, PlayerId,
    Rewards, StepInfo,
};

const NUM_PLAYERS: usize = 3;

/// Parameters of a three-player IPD game.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreePlayerIpdConfig {
    /// Number of decision rounds.
    pub num_rounds: u32,
    /// Free-text turns per player before each decision.
    pub communication_turns: u32,
    /// Payoff when both cooperate.
    pub cooperate_reward: f64,
    /// Payoff for defecting against a cooperator.
    pub defect_reward: f64,
    /// Payoff for cooperating against a defector.
    pub sucker_reward: f64,
    /// Payoff when both defect.
    pub mutual_defect_reward: f64,
}

impl Default for ThreePlayerIpdConfig {
    fn default() -> Self {
        Self {
            num_rounds: 5,
            communication_turns: 3,
            cooperate_reward: 3.0,
            defect_reward: 5.0,
            sucker_reward: 0.0,
            mutual_defect_reward: 1.0,
        }
    }
}

/// A choice against one opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Play nice.
    Cooperate,
    /// Betray.
    Defect,
}

impl Decision {
    fn as_str(self) -> &'static str {
        match self {
            Decision::Cooperate => "cooperate",
            Decision::Defect => "defect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Communication { turn: u32 },
    Decision,
    Finished,
}

/// Three-player IPD environment.
#[derive(Debug)]
pub struct ThreePlayerIpdEnv {
    config: ThreePlayerIpdConfig,
    queue: ObservationQueue,
    phase: Phase,
    current_player: PlayerId,
    round: u32,
    decisions: [[Decision; NUM_PLAYERS]; NUM_PLAYERS],
    scores: [f64; NUM_PLAYERS],
}

/// Read a player's decisions against every opponent. Opponents without an explicit
/// decision are cooperated with.
pub fn parse_decisions(player: PlayerId, action: &str) -> [Decision; NUM_PLAYERS] {
    let mut decisions = [Decision::Cooperate; NUM_PLAYERS];
    for group in all_bracketed(action) {
        let group = group.trim().to_ascii_lowercase();
        let Some((target, choice)) = group.rsplit_once(char::is_whitespace) else {
            continue;
        };
        let Some(target) = parse_player_ref(target) else {
            continue;
        };
        if target == player || target as usize >= NUM_PLAYERS {
            continue;
        }
        decisions[target as usize] = match choice {
            "cooperate" => Decision::Cooperate,
            "defect" => Decision::Defect,
            _ => continue,
        };
    }
    decisions
}

impl ThreePlayerIpdEnv {
    /// Build from keyword configuration (see [`ThreePlayerIpdConfig`]).
    pub fn from_config(config: &EnvConfig) -> anyhow::Result<Self> {
        Self::new(parse_config(config)?)
    }

    /// Build from a typed configuration.
    pub fn new(config: ThreePlayerIpdConfig) -> anyhow::Result<Self> {
        ensure!(config.num_rounds > 0, "num_rounds must be positive");
        Ok(Self {
            config,
            queue: ObservationQueue::default(),
            phase: Phase::Finished,
            current_player: 0,
            round: 1,
            decisions: [[Decision::Cooperate; NUM_PLAYERS]; NUM_PLAYERS],
            scores: [0.0; NUM_PLAYERS],
        })
    }

    fn payoff(&self, mine: Decision, theirs: Decision) -> f64 {
        match (mine, theirs) {
            (Decision::Cooperate, Decision::Cooperate) => self.config.cooperate_reward,
            (Decision::Defect, Decision::Cooperate) => self.config.defect_reward,
            (Decision::Cooperate, Decision::Defect) => self.config.sucker_reward,
            (Decision::Defect, Decision::Defect) => self.config.mutual_defect_reward,
        }
    }

    fn opponents(player: PlayerId) -> impl Iterator<Item = PlayerId> {
        (0..NUM_PLAYERS as PlayerId).filter(move |&p| p != player)
    }

    fn begin_round(&mut self) {
        self.current_player = 0;
        if self.config.communication_turns > 0 {
            self.phase = Phase::Communication { turn: 0 };
            self.queue.broadcast(ObservationEvent::game(
                format!(
                    "Round {}/{}: communication phase, {} turn(s) each. Talk to the other players.",
                    self.round, self.config.num_rounds, self.config.communication_turns
                ),
                ObservationKind::GameMessage,
            ));
        } else {
            self.begin_decisions();
        }
    }

    fn begin_decisions(&mut self) {
        self.phase = Phase::Decision;
        self.current_player = 0;
        for player in 0..NUM_PLAYERS as PlayerId {
            let example = Self::opponents(player)
                .map(|o| format!("[{o} cooperate]"))
                .collect::<Vec<_>>()
                .join(" ");
            self.queue.send(
                player,
                ObservationEvent::game(
                    format!(
                        "Round {}/{}: decision phase. Submit one decision per opponent, e.g. {example} (use 'defect' to defect).",
                        self.round, self.config.num_rounds
                    ),
                    ObservationKind::GameMessage,
                ),
            );
        }
    }

    fn resolve_round(&mut self) -> StepInfo {
        let mut lines = vec![format!("Round {} results:", self.round)];
        let mut gains = [0.0; NUM_PLAYERS];
        for a in 0..NUM_PLAYERS {
            for b in a + 1..NUM_PLAYERS {
                let (da, db) = (self.decisions[a][b], self.decisions[b][a]);
                let (pa, pb) = (self.payoff(da, db), self.payoff(db, da));
                gains[a] += pa;
                gains[b] += pb;
                lines.push(format!(
                    "Player {a} vs Player {b}: {} / {} -> {pa} / {pb}",
                    da.as_str(),
                    db.as_str()
                ));
            }
        }
        for (score, gain) in self.scores.iter_mut().zip(gains) {
            *score += gain;
        }
        lines.push(format!(
            "Scores: Player 0 = {}, Player 1 = {}, Player 2 = {}",
            self.scores[0], self.scores[1], self.scores[2]
        ));
        let msg = lines.join("\n");
        debug!("{msg}");
        self.queue
            .broadcast(ObservationEvent::game(msg, ObservationKind::GameMessage));

        let mut info = StepInfo::new();
        info.insert("round".to_string(), json!(self.round));
        info.insert("round_gains".to_string(), json!(gains));

        if self.round >= self.config.num_rounds {
            self.phase = Phase::Finished;
        } else {
            self.round += 1;
            self.decisions = [[Decision::Cooperate; NUM_PLAYERS]; NUM_PLAYERS];
            self.begin_round();
        }
        info
    }
}

impl Environment for ThreePlayerIpdEnv {
    fn reset(&mut self, num_players: usize, _seed: Option<u64>) -> anyhow::Result<Observation> {
        check_num_players("ThreePlayerIPD", NUM_PLAYERS, num_players)?;
        self.queue = ObservationQueue::new(NUM_PLAYERS);
        self.round = 1;
        self.scores = [0.0; NUM_PLAYERS];
        self.decisions = [[Decision::Cooperate; NUM_PLAYERS]; NUM_PLAYERS];

        let c = &self.config;
        for player in 0..NUM_PLAYERS as PlayerId {
            let prompt = format!(
                "[GAME] You are Player {player} in a three-player Iterated Prisoner's Dilemma lasting {} rounds.\n\
                 Against each opponent you either cooperate or defect. Payoffs: both cooperate -> {} each; \
                 you defect while they cooperate -> you get {}, they get {}; both defect -> {} each.\n\
                 Each round begins with {} communication turn(s) in which you can talk freely, then a decision phase.\n\
                 The player with the highest total score wins.",
                c.num_rounds,
                c.cooperate_reward,
                c.defect_reward,
                c.sucker_reward,
                c.mutual_defect_reward,
                c.communication_turns,
            );
            self.queue
                .send(player, ObservationEvent::game(prompt, ObservationKind::Prompt));
        }
        self.begin_round();

        Ok(Observation::Text(format!(
            "ThreePlayerIPD: {} rounds, {} communication turns",
            self.config.num_rounds, self.config.communication_turns
        )))
    }

    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
        let player = self.current_player;
        Ok((player, self.queue.take(player)))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)> {
        let player = self.current_player;
        match self.phase {
            Phase::Finished => bail!("step called on a finished ThreePlayerIPD game"),
            Phase::Communication { turn } => {
                self.queue
                    .broadcast_except(player, ObservationEvent::player(player, action));
                let mut info = StepInfo::new();
                info.insert("phase".to_string(), json!("communication"));
                if (player as usize) + 1 < NUM_PLAYERS {
                    self.current_player += 1;
                } else if turn + 1 < self.config.communication_turns {
                    self.current_player = 0;
                    self.phase = Phase::Communication { turn: turn + 1 };
                } else {
                    self.begin_decisions();
                }
                Ok((false, info))
            }
            Phase::Decision => {
                let decisions = parse_decisions(player, action);
                self.decisions[player as usize] = decisions;
                let mut info = StepInfo::new();
                info.insert("phase".to_string(), json!("decision"));
                info.insert(
                    "decisions".to_string(),
                    Self::opponents(player)
                        .map(|o| (o.to_string(), json!(decisions[o as usize].as_str())))
                        .collect::<serde_json::Map<_, _>>()
                        .into(),
                );
                if (player as usize) + 1 < NUM_PLAYERS {
                    self.current_player += 1;
                    return Ok((false, info));
                }
                info.extend(self.resolve_round());
                Ok((self.phase == Phase::Finished, info))
            }
        }
    }

    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
        let mut info = GameInfo::new();
        info.insert("scores".to_string(), json!(self.scores));
        info.insert("finished".to_string(), json!(self.phase == Phase::Finished));

        let best = self.scores.iter().copied().fold(f64::MIN, f64::max);
        let all_equal = self.scores.iter().all(|s| (s - best).abs() < f64::EPSILON);
        let rewards = (0..NUM_PLAYERS)
            .map(|p| {
                let reward = if all_equal || self.phase != Phase::Finished {
                    0.0
                } else if (self.scores[p] - best).abs() < f64::EPSILON {
                    1.0
                } else {
                    -1.0
                };
                (p as PlayerId, reward)
            })
            .collect::<Rewards>();
        Ok((rewards, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::normalize_observation;

    fn env(rounds: u32, turns: u32) -> ThreePlayerIpdEnv {
        let mut env = ThreePlayerIpdEnv::new(ThreePlayerIpdConfig {
            num_rounds: rounds,
            communication_turns: turns,
            ..Default::default()
        })
        .unwrap();
        env.reset(3, None).unwrap();
        env
    }

    #[test]
    fn decisions_default_to_cooperate() {
        use Decision::*;
        assert_eq!(
            parse_decisions(0, "[1 defect] [2 cooperate]"),
            [Cooperate, Defect, Cooperate]
        );
        assert_eq!(parse_decisions(1, "[0 DEFECT]"), [Defect, Cooperate, Cooperate]);
        assert_eq!(
            parse_decisions(2, "[Player 0 defect] [2 defect] [7 defect] [1 maybe]"),
            [Defect, Cooperate, Cooperate]
        );
        assert_eq!(parse_decisions(0, "no idea"), [Cooperate; 3]);
    }

    #[test]
    fn communication_is_relayed_to_others() -> anyhow::Result<()> {
        let mut env = env(1, 1);
        let (pid, _) = env.get_observation()?;
        assert_eq!(pid, 0);
        env.step("let's all cooperate")?;
        let (pid, obs) = env.get_observation()?;
        assert_eq!(pid, 1);
        let text = normalize_observation(&obs, |_| None);
        assert!(text.contains("[Player 0]\nlet's all cooperate"));
        Ok(())
    }

    #[test]
    fn full_round_scores() -> anyhow::Result<()> {
        let mut env = env(1, 1);
        for msg in ["hi", "hello", "hey"] {
            assert!(!env.step(msg)?.0);
        }
        assert!(!env.step("[1 defect] [2 defect]")?.0);
        assert!(!env.step("[0 cooperate] [2 cooperate]")?.0);
        let (done, info) = env.step("[0 cooperate] [1 cooperate]")?;
        assert!(done);
        // player 0 defects against two cooperators: 5 + 5
        assert_eq!(info["round_gains"], json!([10.0, 3.0, 3.0]));

        let (rewards, info) = env.close()?;
        assert_eq!(rewards[&0], 1.0);
        assert_eq!(rewards[&1], -1.0);
        assert_eq!(rewards[&2], -1.0);
        assert_eq!(info["scores"], json!([10.0, 3.0, 3.0]));
        assert!(env.step("anything").is_err());
        Ok(())
    }

    #[test]
    fn zero_communication_turns_go_straight_to_decisions() -> anyhow::Result<()> {
        let mut env = env(2, 0);
        for _ in 0..3 {
            assert!(!env.step("[pass]")?.0);
        }
        for _ in 0..2 {
            assert!(!env.step("[pass]")?.0);
        }
        assert!(env.step("[pass]")?.0);
        let (rewards, _) = env.close()?;
        assert!(rewards.values().all(|r| *r == 0.0));
        Ok(())
    }
}
