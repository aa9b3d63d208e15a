//! Secret Mafia: a hidden-role game for 6 to 15 players.
//!
//! A game alternates nights, where the mafia picks a victim, the doctor protects someone
//! and the detective investigates someone, with days made of discussion rounds followed
//! by a public vote. Targets are written as `[3]` or `[Player 3]`.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;

use anyhow::{bail, ensure, Context};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{last_bracketed, parse_config, parse_player_ref, seeded_rng, ObservationQueue};
use crate::game_interface::{
    EnvConfig, Environment, GameInfo, Observation, ObservationEvent, ObservationKind, PlayerId,
    Rewards, StepInfo,
};

const MIN_PLAYERS: usize = 6;
const MAX_PLAYERS: usize = 15;

/// Parameters of a Secret Mafia game.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretMafiaConfig {
    /// Share of players who are mafia (at least one, always a minority).
    pub mafia_ratio: f64,
    /// Discussion turns per player each day, before the vote.
    pub discussion_rounds: u32,
}

impl Default for SecretMafiaConfig {
    fn default() -> Self {
        Self {
            mafia_ratio: 0.25,
            discussion_rounds: 3,
        }
    }
}

/// Secret role of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Kills at night, wins on parity.
    Mafia,
    /// Protects one player each night.
    Doctor,
    /// Learns whether one player is mafia each night.
    Detective,
    /// No power.
    Villager,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Mafia => "Mafia",
            Role::Doctor => "Doctor",
            Role::Detective => "Detective",
            Role::Villager => "Villager",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Team {
    Village,
    Mafia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Night,
    Discussion { round: u32 },
    Vote,
    Finished,
}

/// Secret Mafia environment.
#[derive(Debug)]
pub struct SecretMafiaEnv {
    config: SecretMafiaConfig,
    queue: ObservationQueue,
    roles: Vec<Role>,
    alive: Vec<bool>,
    phase: Phase,
    day: u32,
    turn_order: VecDeque<PlayerId>,
    mafia_votes: Vec<PlayerId>,
    protected: Option<PlayerId>,
    day_votes: Vec<(PlayerId, PlayerId)>,
    winner: Option<Team>,
}

fn parse_target(action: &str) -> Option<PlayerId> {
    last_bracketed(action).and_then(parse_player_ref)
}

impl SecretMafiaEnv {
    /// Build from keyword configuration (see [`SecretMafiaConfig`]).
    pub fn from_config(config: &EnvConfig) -> anyhow::Result<Self> {
        Self::new(parse_config(config)?)
    }

    /// Build from a typed configuration.
    pub fn new(config: SecretMafiaConfig) -> anyhow::Result<Self> {
        ensure!(
            config.mafia_ratio > 0.0 && config.mafia_ratio < 0.5,
            "mafia_ratio must be in (0, 0.5), got {}",
            config.mafia_ratio
        );
        Ok(Self {
            config,
            queue: ObservationQueue::default(),
            roles: vec![],
            alive: vec![],
            phase: Phase::Finished,
            day: 1,
            turn_order: VecDeque::new(),
            mafia_votes: vec![],
            protected: None,
            day_votes: vec![],
            winner: None,
        })
    }

    /// Role of every player, by id. Empty before `reset`.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn is_alive(&self, player: PlayerId) -> bool {
        self.alive.get(player as usize).copied().unwrap_or(false)
    }

    fn alive_players(&self) -> Vec<PlayerId> {
        (0..self.alive.len() as PlayerId)
            .filter(|&p| self.alive[p as usize])
            .collect()
    }

    fn alive_with_role(&self, role: Role) -> Vec<PlayerId> {
        self.alive_players()
            .into_iter()
            .filter(|&p| self.roles[p as usize] == role)
            .collect()
    }

    fn alive_list(&self) -> String {
        self.alive_players()
            .iter()
            .map(|p| format!("Player {p}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn announce(&mut self, msg: String) {
        debug!("{msg}");
        self.queue
            .broadcast(ObservationEvent::game(msg, ObservationKind::GameMessage));
    }

    fn tell(&mut self, player: PlayerId, msg: String) {
        self.queue
            .send(player, ObservationEvent::game(msg, ObservationKind::GameMessage));
    }

    fn begin_night(&mut self) {
        self.phase = Phase::Night;
        self.mafia_votes.clear();
        self.protected = None;
        self.announce(format!(
            "Night {} falls. Alive players: {}.",
            self.day,
            self.alive_list()
        ));

        let mafia = self.alive_with_role(Role::Mafia);
        let doctor = self.alive_with_role(Role::Doctor);
        let detective = self.alive_with_role(Role::Detective);
        for &p in &mafia {
            self.tell(p, "Mafia, vote for a player to eliminate, e.g. '[3]'.".to_string());
        }
        for &p in &doctor {
            self.tell(p, "Doctor, choose a player to protect tonight, e.g. '[3]'.".to_string());
        }
        for &p in &detective {
            self.tell(p, "Detective, choose a player to investigate, e.g. '[3]'.".to_string());
        }
        self.turn_order = mafia.into_iter().chain(doctor).chain(detective).collect();
    }

    fn begin_discussion(&mut self, round: u32) {
        if round >= self.config.discussion_rounds {
            self.begin_vote();
            return;
        }
        self.phase = Phase::Discussion { round };
        self.turn_order = self.alive_players().into();
        self.announce(format!(
            "Day {} discussion, round {}/{}. Speak in turn.",
            self.day,
            round + 1,
            self.config.discussion_rounds
        ));
    }

    fn begin_vote(&mut self) {
        self.phase = Phase::Vote;
        self.day_votes.clear();
        self.turn_order = self.alive_players().into();
        self.announce(format!(
            "Day {} vote: choose a player to eliminate, e.g. '[3]'. Alive players: {}.",
            self.day,
            self.alive_list()
        ));
    }

    fn eliminate(&mut self, player: PlayerId, how: &str) {
        self.alive[player as usize] = false;
        let role = self.roles[player as usize];
        self.announce(format!("Player {player} {how}. Their role was {role}."));
    }

    fn resolve_night(&mut self) -> StepInfo {
        let mut counts: HashMap<PlayerId, usize> = HashMap::new();
        let mut target = None;
        let mut best = 0;
        for &vote in &self.mafia_votes {
            let count = counts.entry(vote).or_default();
            *count += 1;
            if *count > best {
                best = *count;
                target = Some(vote);
            }
        }

        let mut info = StepInfo::new();
        match target {
            Some(victim) if self.protected != Some(victim) => {
                self.eliminate(victim, "was killed during the night");
                info.insert("killed".to_string(), json!(victim));
            }
            Some(_) => {
                self.announce("The doctor saved tonight's victim. Nobody died.".to_string());
                info.insert("killed".to_string(), serde_json::Value::Null);
            }
            None => {
                self.announce("Nobody died during the night.".to_string());
                info.insert("killed".to_string(), serde_json::Value::Null);
            }
        }
        info
    }

    fn resolve_vote(&mut self) -> StepInfo {
        let mut counts: HashMap<PlayerId, usize> = HashMap::new();
        for &(_, target) in &self.day_votes {
            *counts.entry(target).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);
        let leaders = counts
            .iter()
            .filter(|(_, &c)| c == best)
            .map(|(&p, _)| p)
            .collect::<Vec<_>>();

        let mut info = StepInfo::new();
        if let &[eliminated] = leaders.as_slice() {
            self.eliminate(eliminated, "was voted out");
            info.insert("voted_out".to_string(), json!(eliminated));
        } else {
            self.announce("The vote is tied. Nobody is eliminated.".to_string());
            info.insert("voted_out".to_string(), serde_json::Value::Null);
        }
        info
    }

    fn check_winner(&mut self) -> bool {
        let mafia = self.alive_with_role(Role::Mafia).len();
        let others = self.alive_players().len() - mafia;
        self.winner = if mafia == 0 {
            Some(Team::Village)
        } else if mafia >= others {
            Some(Team::Mafia)
        } else {
            None
        };
        if let Some(team) = self.winner {
            self.phase = Phase::Finished;
            self.turn_order.clear();
            let msg = match team {
                Team::Village => "All mafia members are eliminated. The village wins!",
                Team::Mafia => "The mafia outnumbers the village. The mafia wins!",
            };
            self.announce(msg.to_string());
        }
        self.winner.is_some()
    }

    fn act(&mut self, actor: PlayerId, action: &str, info: &mut StepInfo) {
        match self.phase {
            Phase::Night => {
                let target = parse_target(action).filter(|&t| self.is_alive(t));
                match (self.roles[actor as usize], target) {
                    (Role::Mafia, Some(t)) if self.roles[t as usize] != Role::Mafia => {
                        self.mafia_votes.push(t);
                        for partner in self.alive_with_role(Role::Mafia) {
                            if partner != actor {
                                self.queue.send(
                                    partner,
                                    ObservationEvent::player(actor, format!("I vote to kill Player {t}.")),
                                );
                            }
                        }
                    }
                    (Role::Doctor, Some(t)) => self.protected = Some(t),
                    (Role::Detective, Some(t)) if t != actor => {
                        let verdict = if self.roles[t as usize] == Role::Mafia {
                            "IS"
                        } else {
                            "is NOT"
                        };
                        self.tell(actor, format!("Player {t} {verdict} a member of the mafia."));
                    }
                    _ => {
                        self.queue.send(
                            actor,
                            ObservationEvent::game(
                                "Invalid target, your night action is ignored.",
                                ObservationKind::GameAdmin,
                            ),
                        );
                        info.insert("invalid_move".to_string(), json!(true));
                    }
                }
            }
            Phase::Discussion { .. } => {
                self.queue
                    .broadcast_except(actor, ObservationEvent::player(actor, action));
            }
            Phase::Vote => {
                match parse_target(action).filter(|&t| t != actor && self.is_alive(t)) {
                    Some(t) => {
                        self.day_votes.push((actor, t));
                        self.announce(format!("Player {actor} voted for Player {t}."));
                    }
                    None => {
                        self.announce(format!("Player {actor} abstained."));
                        info.insert("invalid_move".to_string(), json!(true));
                    }
                }
            }
            Phase::Finished => {}
        }
    }

    fn end_phase(&mut self) -> StepInfo {
        match self.phase {
            Phase::Night => {
                let info = self.resolve_night();
                if !self.check_winner() {
                    self.begin_discussion(0);
                }
                info
            }
            Phase::Discussion { round } => {
                self.begin_discussion(round + 1);
                StepInfo::new()
            }
            Phase::Vote => {
                let info = self.resolve_vote();
                if !self.check_winner() {
                    self.day += 1;
                    self.begin_night();
                }
                info
            }
            Phase::Finished => StepInfo::new(),
        }
    }
}

impl Environment for SecretMafiaEnv {
    fn reset(&mut self, num_players: usize, seed: Option<u64>) -> anyhow::Result<Observation> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&num_players) {
            bail!("SecretMafia needs between {MIN_PLAYERS} and {MAX_PLAYERS} players, got {num_players}");
        }
        let num_mafia = ((num_players as f64 * self.config.mafia_ratio).round() as usize)
            .clamp(1, (num_players - 1) / 2);
        let mut roles = vec![Role::Mafia; num_mafia];
        roles.push(Role::Doctor);
        roles.push(Role::Detective);
        roles.resize(num_players, Role::Villager);
        roles.shuffle(&mut seeded_rng(seed));

        self.roles = roles;
        self.alive = vec![true; num_players];
        self.queue = ObservationQueue::new(num_players);
        self.day = 1;
        self.winner = None;

        let mafia = self
            .roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == Role::Mafia)
            .map(|(p, _)| format!("Player {p}"))
            .collect::<Vec<_>>();
        for player in 0..num_players as PlayerId {
            let role = self.roles[player as usize];
            let mut prompt = format!(
                "[GAME] You are Player {player} in a game of Secret Mafia with {num_players} players. Your role: {role}.\n\
                 The village wins once every mafia member is eliminated; the mafia wins when it is at least as numerous as the rest.\n\
                 Each night the mafia kills, the doctor protects and the detective investigates. Each day everyone discusses then votes.\n\
                 When asked for a target, answer with the player number in brackets, e.g. '[3]'."
            );
            if role == Role::Mafia {
                prompt.push_str(&format!("\nMafia members: {}.", mafia.join(", ")));
            }
            self.queue
                .send(player, ObservationEvent::game(prompt, ObservationKind::Prompt));
        }
        self.begin_night();

        Ok(Observation::Text(format!(
            "SecretMafia: {num_players} players, {num_mafia} mafia"
        )))
    }

    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
        let player = *self
            .turn_order
            .front()
            .context("no player is expected to act, the game is over")?;
        Ok((player, self.queue.take(player)))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)> {
        if self.phase == Phase::Finished {
            bail!("step called on a finished SecretMafia game");
        }
        let actor = self
            .turn_order
            .pop_front()
            .context("no player is expected to act")?;

        let mut info = StepInfo::new();
        info.insert("day".to_string(), json!(self.day));
        self.act(actor, action, &mut info);

        if self.turn_order.is_empty() {
            info.extend(self.end_phase());
        }
        Ok((self.phase == Phase::Finished, info))
    }

    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
        let mut info = GameInfo::new();
        info.insert(
            "roles".to_string(),
            json!(self.roles.iter().map(Role::to_string).collect::<Vec<_>>()),
        );
        info.insert("alive".to_string(), json!(self.alive_players()));
        info.insert("days".to_string(), json!(self.day));
        info.insert(
            "winner".to_string(),
            match self.winner {
                Some(Team::Village) => json!("village"),
                Some(Team::Mafia) => json!("mafia"),
                None => serde_json::Value::Null,
            },
        );

        let rewards = self
            .roles
            .iter()
            .enumerate()
            .map(|(p, role)| {
                let team = if *role == Role::Mafia {
                    Team::Mafia
                } else {
                    Team::Village
                };
                let reward = match self.winner {
                    None => 0.0,
                    Some(w) if w == team => 1.0,
                    Some(_) => -1.0,
                };
                (p as PlayerId, reward)
            })
            .collect();
        Ok((rewards, info))
    }
}
