//! Codenames for two teams of two.
//!
//! Player 0 and 1 are the red spymaster and operative, players 2 and 3 the blue ones.
//! Spymasters give clues as `[word N]`, operatives guess with `[word]` or stop with `[pass]`.

use std::fmt::Display;

use anyhow::{bail, ensure};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;

use super::{check_num_players, last_bracketed, parse_config, seeded_rng, ObservationQueue};
use crate::game_interface::{
    EnvConfig, Environment, GameInfo, Observation, ObservationEvent, ObservationKind, PlayerId,
    Rewards, StepInfo,
};

const WORDS: [&str; 64] = [
    "APPLE", "BANK", "BARK", "BAT", "BERRY", "BOARD", "BOOT", "BRIDGE", "BUG", "CANAL",
    "CAPITAL", "CARD", "CASTLE", "CELL", "CHAIR", "CHECK", "CLOCK", "CLOUD", "CODE", "CRANE",
    "CROWN", "DECK", "DIAMOND", "DRAGON", "DRILL", "EAGLE", "ENGINE", "FAN", "FIRE", "FORK",
    "GHOST", "GLASS", "GRASS", "HAND", "HORN", "ICE", "IRON", "JET", "KEY", "KNIGHT",
    "LEMON", "LIGHT", "LINE", "LOCK", "MAPLE", "MATCH", "MOON", "NET", "NIGHT", "NOTE",
    "ORGAN", "PALM", "PIANO", "PILOT", "PIPE", "PLANE", "RING", "ROBOT", "SHIP", "SPRING",
    "STAR", "TABLE", "TRAIN", "WAVE",
];
const BOARD_SIZE: usize = 25;

/// Parameters of a Codenames game.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodenamesConfig {
    /// Total number of clues and guesses before the game is declared a draw.
    pub max_turns: u32,
}

impl Default for CodenamesConfig {
    fn default() -> Self {
        Self { max_turns: 80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Team {
    Red,
    Blue,
}

impl Team {
    fn other(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    fn spymaster(self) -> PlayerId {
        match self {
            Team::Red => 0,
            Team::Blue => 2,
        }
    }

    fn operative(self) -> PlayerId {
        self.spymaster() + 1
    }

    fn color(self) -> TeamColor {
        match self {
            Team::Red => TeamColor::Red,
            Team::Blue => TeamColor::Blue,
        }
    }

    fn of(player: PlayerId) -> Team {
        if player < 2 {
            Team::Red
        } else {
            Team::Blue
        }
    }
}

impl Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Team::Red => "Red",
            Team::Blue => "Blue",
        })
    }
}

/// Hidden identity of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Card {
    /// Belongs to a team.
    Agent(TeamColor),
    /// Ends the turn.
    Neutral,
    /// Loses the game for whoever reveals it.
    Assassin,
}

/// Public color of a team, exposed so boards can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamColor {
    /// Starts, owns 9 words.
    Red,
    /// Owns 8 words.
    Blue,
}

impl Card {
    fn label(self) -> &'static str {
        match self {
            Card::Agent(TeamColor::Red) => "red",
            Card::Agent(TeamColor::Blue) => "blue",
            Card::Neutral => "neutral",
            Card::Assassin => "assassin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Clue,
    Guess { remaining: u32 },
    Finished,
}

/// Codenames environment.
#[derive(Debug)]
pub struct CodenamesEnv {
    config: CodenamesConfig,
    queue: ObservationQueue,
    words: Vec<&'static str>,
    cards: Vec<Card>,
    revealed: Vec<bool>,
    team: Team,
    phase: Phase,
    turns: u32,
    winner: Option<Team>,
    reason: String,
}

/// Split a clue such as `tree 2` into its word and count.
pub fn parse_clue(action: &str) -> Option<(String, u32)> {
    let clue = last_bracketed(action)?.trim();
    let (word, count) = clue.rsplit_once(char::is_whitespace)?;
    let word = word.trim();
    if word.is_empty() || word.contains(char::is_whitespace) {
        return None;
    }
    Some((word.to_uppercase(), count.parse().ok()?))
}

impl CodenamesEnv {
    /// Build from keyword configuration (see [`CodenamesConfig`]).
    pub fn from_config(config: &EnvConfig) -> anyhow::Result<Self> {
        Self::new(parse_config(config)?)
    }

    /// Build from a typed configuration.
    pub fn new(config: CodenamesConfig) -> anyhow::Result<Self> {
        ensure!(config.max_turns > 0, "max_turns must be positive");
        Ok(Self {
            config,
            queue: ObservationQueue::default(),
            words: vec![],
            cards: vec![],
            revealed: vec![],
            team: Team::Red,
            phase: Phase::Finished,
            turns: 0,
            winner: None,
            reason: String::new(),
        })
    }

    /// Words on the board with their hidden identity.
    pub fn board(&self) -> impl Iterator<Item = (&'static str, Card)> + '_ {
        self.words.iter().copied().zip(self.cards.iter().copied())
    }

    fn render_board(&self, reveal_all: bool) -> String {
        self.words
            .chunks(5)
            .zip(self.cards.chunks(5))
            .enumerate()
            .map(|(row, (words, cards))| {
                words
                    .iter()
                    .zip(cards)
                    .enumerate()
                    .map(|(col, (word, card))| {
                        if self.revealed[row * 5 + col] {
                            format!("({} {})", word, card.label())
                        } else if reveal_all {
                            format!("{} [{}]", word, card.label())
                        } else {
                            word.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn remaining(&self, team: Team) -> usize {
        self.cards
            .iter()
            .zip(&self.revealed)
            .filter(|(card, revealed)| **card == Card::Agent(team.color()) && !**revealed)
            .count()
    }

    fn announce(&mut self, msg: String) {
        self.queue
            .broadcast(ObservationEvent::game(msg, ObservationKind::GameMessage));
    }

    fn show_board(&mut self, player: PlayerId) {
        let spymaster = player == Team::of(player).spymaster();
        let board = self.render_board(spymaster);
        self.queue
            .send(player, ObservationEvent::game(board, ObservationKind::GameBoard));
    }

    fn current_player(&self) -> PlayerId {
        match self.phase {
            Phase::Guess { .. } => self.team.operative(),
            _ => self.team.spymaster(),
        }
    }

    fn finish(&mut self, winner: Option<Team>, reason: String) {
        self.announce(reason.clone());
        self.winner = winner;
        self.reason = reason;
        self.phase = Phase::Finished;
    }

    fn end_turn(&mut self) {
        self.team = self.team.other();
        self.phase = Phase::Clue;
        let spymaster = self.team.spymaster();
        self.announce(format!("{} team's turn.", self.team));
        self.show_board(spymaster);
    }

    fn give_clue(&mut self, actor: PlayerId, action: &str, info: &mut StepInfo) {
        let Some((word, count)) = parse_clue(action) else {
            info.insert("invalid_move".to_string(), json!(true));
            self.finish(
                Some(self.team.other()),
                format!("Player {actor} gave an invalid clue. {} team wins.", self.team.other()),
            );
            return;
        };
        if self.words.iter().any(|w| *w == word) {
            info.insert("invalid_move".to_string(), json!(true));
            self.finish(
                Some(self.team.other()),
                format!("Player {actor} used a board word as clue. {} team wins.", self.team.other()),
            );
            return;
        }
        self.queue.broadcast_except(actor, ObservationEvent::player(actor, action));
        self.announce(format!("{} spymaster's clue: {word} {count}.", self.team));
        self.phase = Phase::Guess {
            remaining: count.max(1) + 1,
        };
        let operative = self.team.operative();
        self.show_board(operative);
    }

    fn guess(&mut self, actor: PlayerId, action: &str, remaining: u32) {
        self.queue.broadcast_except(actor, ObservationEvent::player(actor, action));
        let guess = last_bracketed(action).map(|g| g.trim().to_uppercase());
        let index = guess.as_deref().and_then(|g| {
            self.words
                .iter()
                .zip(&self.revealed)
                .position(|(word, revealed)| *word == g && !revealed)
        });
        let Some(index) = index else {
            let msg = match guess.as_deref() {
                Some("PASS") => format!("{} team passes.", self.team),
                _ => format!("{} team made no valid guess, the turn passes.", self.team),
            };
            self.announce(msg);
            self.end_turn();
            return;
        };

        self.revealed[index] = true;
        let card = self.cards[index];
        let word = self.words[index];
        self.announce(format!("{} team guessed {word}: {}.", self.team, card.label()));

        let team = self.team;
        match card {
            Card::Assassin => {
                self.finish(Some(team.other()), format!("{team} team hit the assassin. {} team wins.", team.other()));
            }
            Card::Agent(color) if color == team.color() => {
                if self.remaining(team) == 0 {
                    self.finish(Some(team), format!("{team} team found all its words and wins."));
                } else if remaining <= 1 {
                    self.end_turn();
                } else {
                    self.phase = Phase::Guess {
                        remaining: remaining - 1,
                    };
                    self.show_board(actor);
                }
            }
            Card::Agent(_) => {
                if self.remaining(team.other()) == 0 {
                    self.finish(
                        Some(team.other()),
                        format!("{} team's words are all revealed. {} team wins.", team.other(), team.other()),
                    );
                } else {
                    self.end_turn();
                }
            }
            Card::Neutral => self.end_turn(),
        }
    }
}

impl Environment for CodenamesEnv {
    fn reset(&mut self, num_players: usize, seed: Option<u64>) -> anyhow::Result<Observation> {
        check_num_players("Codenames", 4, num_players)?;
        let mut rng = seeded_rng(seed);

        let mut words = WORDS.to_vec();
        words.shuffle(&mut rng);
        words.truncate(BOARD_SIZE);

        let mut cards = vec![Card::Agent(TeamColor::Red); 9];
        cards.extend([Card::Agent(TeamColor::Blue); 8]);
        cards.extend([Card::Neutral; 7]);
        cards.push(Card::Assassin);
        cards.shuffle(&mut rng);

        self.words = words;
        self.cards = cards;
        self.revealed = vec![false; BOARD_SIZE];
        self.queue = ObservationQueue::new(num_players);
        self.team = Team::Red;
        self.phase = Phase::Clue;
        self.turns = 0;
        self.winner = None;
        self.reason.clear();

        for player in 0..num_players as PlayerId {
            let team = Team::of(player);
            let prompt = if player == team.spymaster() {
                format!(
                    "[GAME] You are the {team} Spymaster in a game of Codenames.\n\
                     Give your operative a one-word clue and a number, e.g. '[tree 2]'. \
                     The clue must not be a word on the board. Avoid the assassin."
                )
            } else {
                format!(
                    "[GAME] You are the {team} Operative in a game of Codenames.\n\
                     Guess one word at a time from your spymaster's clue, e.g. '[apple]', or stop with '[pass]'."
                )
            };
            self.queue
                .send(player, ObservationEvent::game(prompt, ObservationKind::Prompt));
        }
        self.show_board(Team::Red.spymaster());

        Ok(Observation::Text("Codenames: Red team starts".to_string()))
    }

    fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
        if self.phase == Phase::Finished {
            bail!("no player is expected to act, the game is over");
        }
        let player = self.current_player();
        Ok((player, self.queue.take(player)))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<(bool, StepInfo)> {
        let actor = match self.phase {
            Phase::Finished => bail!("step called on a finished Codenames game"),
            _ => self.current_player(),
        };
        let mut info = StepInfo::new();
        info.insert("team".to_string(), json!(self.team.to_string()));
        match self.phase {
            Phase::Clue => self.give_clue(actor, action, &mut info),
            Phase::Guess { remaining } => self.guess(actor, action, remaining),
            Phase::Finished => {}
        }

        self.turns += 1;
        if self.phase != Phase::Finished && self.turns >= self.config.max_turns {
            self.finish(None, "Maximum number of turns reached. The game is a draw.".to_string());
        }
        Ok((self.phase == Phase::Finished, info))
    }

    fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
        let mut info = GameInfo::new();
        info.insert(
            "winner".to_string(),
            self.winner
                .map(|t| json!(t.to_string()))
                .unwrap_or(serde_json::Value::Null),
        );
        info.insert(
            "reason".to_string(),
            json!(if self.phase == Phase::Finished {
                self.reason.as_str()
            } else {
                "game did not finish"
            }),
        );
        info.insert("turns".to_string(), json!(self.turns));
        info.insert(
            "revealed".to_string(),
            json!(self
                .board()
                .zip(&self.revealed)
                .filter(|(_, r)| **r)
                .map(|((word, _), _)| word)
                .collect::<Vec<_>>()),
        );

        let rewards = (0..4)
            .map(|p| {
                let reward = match self.winner {
                    None => 0.0,
                    Some(team) if team == Team::of(p) => 1.0,
                    Some(_) => -1.0,
                };
                (p, reward)
            })
            .collect();
        Ok((rewards, info))
    }

    fn role_label(&self, player_id: PlayerId) -> Option<String> {
        if player_id > 3 {
            return None;
        }
        let team = Team::of(player_id);
        let role = if player_id == team.spymaster() {
            "Spymaster"
        } else {
            "Operative"
        };
        Some(format!("{team} {role}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::normalize_observation;

    fn env(max_turns: u32) -> CodenamesEnv {
        let mut env = CodenamesEnv::new(CodenamesConfig { max_turns }).unwrap();
        env.reset(4, Some(3)).unwrap();
        env
    }

    fn words_of(env: &CodenamesEnv, wanted: Card) -> Vec<&'static str> {
        env.board()
            .filter(|(_, card)| *card == wanted)
            .map(|(word, _)| word)
            .collect()
    }

    #[test]
    fn board_layout() {
        let env = env(80);
        assert_eq!(env.board().count(), 25);
        assert_eq!(words_of(&env, Card::Agent(TeamColor::Red)).len(), 9);
        assert_eq!(words_of(&env, Card::Agent(TeamColor::Blue)).len(), 8);
        assert_eq!(words_of(&env, Card::Neutral).len(), 7);
        assert_eq!(words_of(&env, Card::Assassin).len(), 1);
    }

    #[test]
    fn clue_parsing() {
        assert_eq!(parse_clue("my clue is [tree 2]"), Some(("TREE".to_string(), 2)));
        assert_eq!(parse_clue("[two words 2]"), None);
        assert_eq!(parse_clue("[tree]"), None);
        assert_eq!(parse_clue("tree 2"), None);
    }

    #[test]
    fn spymaster_sees_identities() -> anyhow::Result<()> {
        let mut env = env(80);
        let (pid, obs) = env.get_observation()?;
        assert_eq!(pid, 0);
        let text = normalize_observation(&obs, |p| env.role_label(p));
        assert!(text.contains("Red Spymaster"));
        assert!(text.contains("[assassin]"));
        Ok(())
    }

    #[test]
    fn red_team_sweeps_the_board() -> anyhow::Result<()> {
        let mut env = env(80);
        let red = words_of(&env, Card::Agent(TeamColor::Red));

        let (done, _) = env.step("[zebra 9]")?;
        assert!(!done);
        assert_eq!(env.get_observation()?.0, 1);
        for (i, word) in red.iter().enumerate() {
            let (done, _) = env.step(&format!("[{word}]"))?;
            assert_eq!(done, i == red.len() - 1);
        }
        let (rewards, info) = env.close()?;
        assert_eq!(info["winner"], json!("Red"));
        assert_eq!(rewards[&0], 1.0);
        assert_eq!(rewards[&1], 1.0);
        assert_eq!(rewards[&2], -1.0);
        assert_eq!(rewards[&3], -1.0);
        Ok(())
    }

    #[test]
    fn assassin_loses() -> anyhow::Result<()> {
        let mut env = env(80);
        let assassin = words_of(&env, Card::Assassin)[0];
        env.step("[zebra 1]")?;
        let (done, _) = env.step(&format!("[{assassin}]"))?;
        assert!(done);
        let (rewards, _) = env.close()?;
        assert_eq!(rewards[&2], 1.0);
        assert_eq!(rewards[&0], -1.0);
        Ok(())
    }

    #[test]
    fn pass_hands_over_and_invalid_clue_loses() -> anyhow::Result<()> {
        let mut env = env(80);
        env.step("[zebra 1]")?;
        env.step("[pass]")?;
        assert_eq!(env.get_observation()?.0, 2);
        let board_word = env.words[0];
        let (done, info) = env.step(&format!("[{board_word} 1]"))?;
        assert!(done);
        assert_eq!(info["invalid_move"], json!(true));
        let (rewards, _) = env.close()?;
        assert_eq!(rewards[&0], 1.0);
        Ok(())
    }

    #[test]
    fn turn_limit_is_a_draw() -> anyhow::Result<()> {
        let mut env = env(2);
        env.step("[zebra 1]")?;
        let (done, _) = env.step("[pass]")?;
        assert!(done);
        let (rewards, info) = env.close()?;
        assert!(rewards.values().all(|r| *r == 0.0));
        assert_eq!(info["winner"], serde_json::Value::Null);
        Ok(())
    }
}
