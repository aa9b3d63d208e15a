//! Colonel Blotto: two commanders split their soldiers over battlefields, round after
//! round. A field goes to whoever sent strictly more units; a round goes to whoever won
//! more fields.

use std::cmp::Ordering;

use anyhow::{bail, ensure};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_num_players, last_bracketed, parse_config, ObservationQueue};
use crate::game_interface::{
    EnvConfig, Environment, GameInfo, Observation, ObservationEvent, ObservationKind, PlayerId,
    Rewards, StepInfo,
};

const COMMANDERS: [&str; 2] = ["Alpha", "Beta"];

/// Parameters of a Colonel Blotto game.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColonelBlottoConfig {
    /// Number of battlefields, named `A`, `B`, ...
    pub num_fields: usize,
    /// Units each commander must allocate every round.
    pub num_soldiers: u32,
    /// Maximum number of rounds.
    pub num_rounds: u32,
}

impl Default for ColonelBlottoConfig {
    fn default() -> Self {
        Self {
            num_fields: 3,
            num_soldiers: 20,
            num_rounds: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Winner { player: PlayerId, reason: String },
    Draw { reason: String },
}

/// Two-player Colonel Blotto environment. Allocations are collected in turn order and
/// only revealed once both commanders have played.
#[derive(Debug)]
pub struct ColonelBlottoEnv {
    config: ColonelBlottoConfig,
    fields: Vec<char>,
    queue: ObservationQueue,
    current_player: PlayerId,
    round: u32,
    allocations: [Option<Vec<u32>>; 2],
    round_wins: [u32; 2],
    rounds_played: u32,
    outcome: Option<Outcome>,
}

impl ColonelBlottoEnv {
    /// Build from keyword configuration (see [`ColonelBlottoConfig`]).
    pub fn from_config(config: &EnvConfig) -> anyhow::Result<Self> {
        Self::new(parse_config(config)?)
    }

    /// Build from a typed configuration.
    pub fn new(config: ColonelBlottoConfig) -> anyhow::Result<Self> {
        ensure!(
            (1..=26).contains(&config.num_fields),
            "num_fields must be between 1 and 26, got {}",
            config.num_fields
        );
        ensure!(config.num_soldiers > 0, "num_soldiers must be positive");
        ensure!(config.num_rounds > 0, "num_rounds must be positive");
        let fields = ('A'..='Z').take(config.num_fields).collect();
        Ok(Self {
            config,
            fields,
            queue: ObservationQueue::default(),
            current_player: 0,
            round: 1,
            allocations: [None, None],
            round_wins: [0, 0],
            rounds_played: 0,
            outcome: None,
        })
    }

    fn example_allocation(&self) -> String {
        // put everything on the first field, the rest gets 0
        let mut parts = vec![format!("{}{}", self.fields[0], self.config.num_soldiers)];
        parts.extend(self.fields[1..].iter().map(|f| format!("{f}0")));
        format!("[{}]", parts.join(" "))
    }

    fn format_allocation(&self, allocation: &[u32]) -> String {
        let parts = self
            .fields
            .iter()
            .zip(allocation)
            .map(|(f, n)| format!("{f}{n}"))
            .collect::<Vec<_>>();
        format!("[{}]", parts.join(" "))
    }

    fn announce_round(&mut self) {
        let msg = format!(
            "Round {}/{}: allocate exactly {} units across fields {}. Rounds won so far: Alpha {} - Beta {}.",
            self.round,
            self.config.num_rounds,
            self.config.num_soldiers,
            self.fields.iter().map(char::to_string).collect::<Vec<_>>().join(", "),
            self.round_wins[0],
            self.round_wins[1],
        );
        self.queue
            .broadcast(ObservationEvent::game(msg, ObservationKind::GameMessage));
    }

    fn resolve_round(&mut self, alpha: Vec<u32>, beta: Vec<u32>) -> StepInfo {
        self.rounds_played += 1;
        let (mut alpha_fields, mut beta_fields) = (0, 0);
        for (a, b) in alpha.iter().zip(&beta) {
            match a.cmp(b) {
                Ordering::Greater => alpha_fields += 1,
                Ordering::Less => beta_fields += 1,
                Ordering::Equal => {}
            }
        }
        let round_winner = match alpha_fields.cmp(&beta_fields) {
            Ordering::Greater => Some(0),
            Ordering::Less => Some(1),
            Ordering::Equal => None,
        };
        if let Some(w) = round_winner {
            self.round_wins[w] += 1;
        }

        let verdict = match round_winner {
            Some(w) => format!("Commander {} wins the round", COMMANDERS[w]),
            None => "the round is a tie".to_string(),
        };
        let msg = format!(
            "Round {} results: Alpha {} vs Beta {}. Fields won: Alpha {alpha_fields} - Beta {beta_fields}, {verdict}.",
            self.round,
            self.format_allocation(&alpha),
            self.format_allocation(&beta),
        );
        debug!("{msg}");
        self.queue
            .broadcast(ObservationEvent::game(msg, ObservationKind::GameMessage));

        let majority = self.config.num_rounds / 2;
        if let Some(player) = (0..2).find(|&p| self.round_wins[p] > majority) {
            self.outcome = Some(Outcome::Winner {
                player: player as PlayerId,
                reason: format!("Commander {} won a majority of rounds", COMMANDERS[player]),
            });
        } else if self.round >= self.config.num_rounds {
            self.outcome = Some(match self.round_wins[0].cmp(&self.round_wins[1]) {
                Ordering::Greater => Outcome::Winner {
                    player: 0,
                    reason: "Commander Alpha won more rounds".to_string(),
                },
                Ordering::Less => Outcome::Winner {
                    player: 1,
                    reason: "Commander Beta won more rounds".to_string(),
                },
                Ordering::Equal => Outcome::Draw {
                    reason: "both commanders won the same number of rounds".to_string(),
                },
            });
        } else {
            self.round += 1;
            self.announce_round();
        }

        let mut info = StepInfo::new();
        info.insert("round_winner".to_string(), json!(round_winner));
        info.insert("fields_won".to_string(), json!([alpha_fields, beta_fields]));
        info
    }
}

/// Parse an allocation such as `[A4 B2 C14]`; `A:4`, lowercase names and commas are
/// accepted too. The last bracketed group of `action` is used.
pub fn parse_allocation(action: &str, fields: &[char], soldiers: u32) -> Result<Vec<u32>, String> {
    let example = "expected an allocation like '[A4 B2 C14]'";
    let inner = last_bracketed(action).ok_or(example)?;
    let mut allocation: Vec<Option<u32>> = vec![None; fields.len()];
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() || c == ',' {
            continue;
        }
        let field = c.to_ascii_uppercase();
        let index = fields
            .iter()
            .position(|f| *f == field)
            .ok_or_else(|| format!("unknown field '{c}'"))?;
        while chars.next_if(|c| c.is_whitespace() || *c == ':').is_some() {}
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        if digits.is_empty() {
            return Err(format!("missing number of units for field {field}"));
        }
        let units = digits
            .parse::<u32>()
            .map_err(|_| format!("too many units for field {field}"))?;
        if allocation[index].replace(units).is_some() {
            return Err(format!("field {field} allocated twice"));
        }
    }

    let mut result = Vec::with_capacity(fields.len());
    for (field, units) in fields.iter().zip(allocation) {
        result.push(units.ok_or_else(|| format!("missing field {field}"))?);
    }
    let total = result.iter().map(|&n| u64::from(n)).sum::<u64>();
    if total != u64::from(soldiers) {
        return Err(format!("allocated {total} units, expected exactly {soldiers}"));
    }
    Ok(result)
}

impl Environment for ColonelBlottoEnv {
    fn reset(&mut self, num_players: usize, _seed: Option<u64>) -> anyhow::Result<Observation> {
        check_num_players("ColonelBlotto", 2, num_players)?;
        self.queue = ObservationQueue::new(2);
        self.current_player = 0;
        self.round = 1;
        self.allocations = [None, None];
        self.round_wins = [0, 0];
        self.rounds_played = 0;
        self.outcome = None;

        let field_list = self.fields.iter().map(char::to_string).collect::<Vec<_>>();
        for (pid, name) in COMMANDERS.iter().enumerate() {
            let prompt = format!(
                "[GAME] You are Commander {name} in a game of ColonelBlotto. Each round, you have to allocate exactly {} units across fields: {}\nFormat: '{}'\nWin the majority of fields to win the round!",
                self.config.num_soldiers,
                field_list.join(", "),
                self.example_allocation(),
            );
            self.queue
                .send(pid as PlayerId, ObservationEvent::game(prompt, ObservationKind::Prompt));
        }
        self.announce_round();

        Ok(Observation::Text(format!(
            "ColonelBlotto: {} fields, {} soldiers, {} rounds",
            self.config.num_fields, self.config.num_soldiers, self.config.num_rounds
        )))
    }

    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
        let player = self.current_player;
        Ok((player, self.queue.take(player)))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)> {
        if self.outcome.is_some() {
            bail!("step called on a finished ColonelBlotto game");
        }
        let player = self.current_player;
        let mut info = StepInfo::new();
        info.insert("round".to_string(), json!(self.round));

        match parse_allocation(action, &self.fields, self.config.num_soldiers) {
            Err(reason) => {
                let name = COMMANDERS[player as usize];
                self.queue.broadcast(ObservationEvent::game(
                    format!("Commander {name} made an invalid move: {reason}"),
                    ObservationKind::GameAdmin,
                ));
                self.outcome = Some(Outcome::Winner {
                    player: 1 - player,
                    reason: format!("Commander {name} made an invalid move: {reason}"),
                });
                info.insert("invalid_move".to_string(), json!(true));
                info.insert("reason".to_string(), json!(reason));
                Ok((true, info))
            }
            Ok(allocation) => {
                self.allocations[player as usize] = Some(allocation);
                if player == 0 {
                    self.current_player = 1;
                    return Ok((false, info));
                }
                self.current_player = 0;
                if let [Some(alpha), Some(beta)] = std::mem::take(&mut self.allocations) {
                    info.extend(self.resolve_round(alpha, beta));
                }
                Ok((self.outcome.is_some(), info))
            }
        }
    }

    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
        let mut info = GameInfo::new();
        info.insert("round_wins".to_string(), json!(self.round_wins));
        info.insert("rounds_played".to_string(), json!(self.rounds_played));
        let rewards = match &self.outcome {
            Some(Outcome::Winner { player, reason }) => {
                info.insert("winner".to_string(), json!(player));
                info.insert("reason".to_string(), json!(reason));
                Rewards::from([(*player, 1.0), (1 - *player, -1.0)])
            }
            Some(Outcome::Draw { reason }) => {
                info.insert("winner".to_string(), serde_json::Value::Null);
                info.insert("reason".to_string(), json!(reason));
                Rewards::from([(0, 0.0), (1, 0.0)])
            }
            None => {
                info.insert("winner".to_string(), serde_json::Value::Null);
                info.insert("reason".to_string(), json!("game did not finish"));
                Rewards::from([(0, 0.0), (1, 0.0)])
            }
        };
        Ok((rewards, info))
    }

    fn role_label(&self, player_id: PlayerId) -> Option<String> {
        COMMANDERS
            .get(player_id as usize)
            .map(|name| format!("Commander {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::normalize_observation;

    fn env(rounds: u32) -> ColonelBlottoEnv {
        let mut env = ColonelBlottoEnv::new(ColonelBlottoConfig {
            num_rounds: rounds,
            ..Default::default()
        })
        .unwrap();
        env.reset(2, Some(1)).unwrap();
        env
    }

    #[test]
    fn parse_valid_allocations() {
        let fields = ['A', 'B', 'C'];
        assert_eq!(parse_allocation("[A4 B2 C14]", &fields, 20), Ok(vec![4, 2, 14]));
        assert_eq!(
            parse_allocation("thinking... final: [c:10, a:5, b:5]", &fields, 20),
            Ok(vec![5, 5, 10])
        );
        assert_eq!(
            parse_allocation("[A1 B1 C1] no wait [A20 B0 C0]", &fields, 20),
            Ok(vec![20, 0, 0])
        );
    }

    #[test]
    fn parse_invalid_allocations() {
        let fields = ['A', 'B', 'C'];
        assert!(parse_allocation("A4 B2 C14", &fields, 20).is_err());
        assert!(parse_allocation("[A4 B2 C13]", &fields, 20)
            .unwrap_err()
            .contains("allocated 19"));
        assert!(parse_allocation("[A4 B2]", &fields, 20)
            .unwrap_err()
            .contains("missing field C"));
        assert!(parse_allocation("[A4 A2 C14]", &fields, 20)
            .unwrap_err()
            .contains("twice"));
        assert!(parse_allocation("[A4 B2 D14]", &fields, 20)
            .unwrap_err()
            .contains("unknown field"));
        assert!(parse_allocation("[A B2 C18]", &fields, 20).is_err());
        assert!(parse_allocation("[A99999999999 B0 C0]", &fields, 20).is_err());
    }

    #[test]
    fn rejects_bad_config() {
        assert!(ColonelBlottoEnv::new(ColonelBlottoConfig {
            num_fields: 0,
            ..Default::default()
        })
        .is_err());
        assert!(ColonelBlottoEnv::new(ColonelBlottoConfig {
            num_rounds: 0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn rejects_wrong_roster() {
        let mut env = ColonelBlottoEnv::new(ColonelBlottoConfig::default()).unwrap();
        assert!(env.reset(3, None).is_err());
    }

    #[test]
    fn prompt_and_turn_order() -> anyhow::Result<()> {
        let mut env = env(3);
        let (pid, obs) = env.get_observation()?;
        assert_eq!(pid, 0);
        let text = normalize_observation(&obs, |p| env.role_label(p));
        assert!(text.contains("You are Commander Alpha"));
        assert!(text.contains("Round 1/3"));

        assert!(!env.step("[A10 B5 C5]")?.0);
        let (pid, obs) = env.get_observation()?;
        assert_eq!(pid, 1);
        let text = normalize_observation(&obs, |p| env.role_label(p));
        assert!(text.contains("You are Commander Beta"));
        // alpha's allocation is hidden until the round is resolved
        assert!(!text.contains("A10"));
        Ok(())
    }

    #[test]
    fn majority_ends_the_game_early() -> anyhow::Result<()> {
        let mut env = env(3);
        assert!(!env.step("[A10 B5 C5]")?.0);
        let (done, info) = env.step("[A0 B0 C20]")?;
        assert!(!done);
        assert_eq!(info["round_winner"], json!(0));
        assert!(!env.step("[A10 B5 C5]")?.0);
        assert!(env.step("[A0 B0 C20]")?.0);

        let (rewards, info) = env.close()?;
        assert_eq!(rewards[&0], 1.0);
        assert_eq!(rewards[&1], -1.0);
        assert_eq!(info["round_wins"], json!([2, 0]));
        assert!(env.step("[A10 B5 C5]").is_err());
        Ok(())
    }

    #[test]
    fn ties_after_all_rounds_are_draws() -> anyhow::Result<()> {
        let mut env = env(2);
        env.step("[A10 B5 C5]")?;
        env.step("[A10 B5 C5]")?;
        env.step("[A10 B5 C5]")?;
        assert!(env.step("[A10 B5 C5]")?.0);
        let (rewards, info) = env.close()?;
        assert_eq!(rewards, Rewards::from([(0, 0.0), (1, 0.0)]));
        assert_eq!(info["winner"], serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn invalid_move_loses() -> anyhow::Result<()> {
        let mut env = env(9);
        env.step("[A10 B5 C5]")?;
        let (done, info) = env.step("I refuse to play")?;
        assert!(done);
        assert_eq!(info["invalid_move"], json!(true));
        let (rewards, _) = env.close()?;
        assert_eq!(rewards[&0], 1.0);
        assert_eq!(rewards[&1], -1.0);
        Ok(())
    }

    #[test]
    fn unfinished_game_scores_zero() -> anyhow::Result<()> {
        let mut env = env(9);
        env.step("[A10 B5 C5]")?;
        let (rewards, info) = env.close()?;
        assert_eq!(rewards[&0], 0.0);
        assert_eq!(info["reason"], json!("game did not finish"));
        Ok(())
    }
}
