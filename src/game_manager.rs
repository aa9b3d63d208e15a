//! Turn-taking orchestration of one game session.
//!
//! A [`GameManager`] owns the environment and the agents of a single session and drives the
//! observe / act / step loop:
//!
//! ```no_run
//! use game_arena::{agent::FixedAgent, game_manager::GameManager};
//!
//! let mut manager = GameManager::new();
//! manager.setup("ColonelBlotto-v0", Some(7), None)?;
//! manager.add_agent(FixedAgent::new("[A7 B7 C6]"), None)?;
//! manager.add_agent(FixedAgent::new("[A10 B5 C5]"), None)?;
//! manager.start(None)?;
//! let result = manager.run(1000, &mut ())?;
//! println!("{:?}", result.rewards);
//! # Ok::<(), game_arena::error::ArenaError>(())
//! ```
//!
//! Sessions move strictly forward through [`SessionState`]. Any environment or registry
//! error during the loop moves the session to [`SessionState::Failed`], after which every
//! operation is rejected.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::agent::{Agent, AgentRole, HumanAgent};
use crate::error::{ArenaError, Result};
use crate::game_interface::{EnvConfig, Environment, GameInfo, PlayerId, Rewards, StepInfo};
use crate::game_registry::{GameKind, PlayerCountRule};
use crate::observation::{normalize_observation, ObservationAccumulator};

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// The environment reported the game as done.
    Completed,
    /// The step ceiling was hit first.
    MaxStepsReached,
}

/// Final outcome of a session, the only artifact handed back to drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    /// How the loop ended.
    pub status: GameStatus,
    /// Number of turns played.
    pub steps: usize,
    /// Final reward of every player.
    pub rewards: Rewards,
    /// Diagnostics reported by the environment when closing.
    pub game_info: GameInfo,
    /// Ids of human players.
    pub human_players: Vec<PlayerId>,
    /// Ids of automated players.
    pub llm_players: Vec<PlayerId>,
}

impl GameResult {
    /// Players holding the unique highest reward, if any.
    pub fn winner(&self) -> Option<PlayerId> {
        let best = self.rewards.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut leaders = self.rewards.iter().filter(|(_, r)| **r == best);
        match (leaders.next(), leaders.next()) {
            (Some((pid, _)), None) => Some(*pid),
            _ => None,
        }
    }
}

/// Returned by [`GameManager::start`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Always `"started"`.
    pub status: &'static str,
    /// Number of registered agents.
    pub num_players: usize,
    /// Rendered initial observation of the environment.
    pub initial_observation: String,
}

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Player who acted.
    pub player_id: PlayerId,
    /// Action sent to the environment.
    pub action: String,
    /// True when the environment reported the game as over.
    pub done: bool,
    /// Step diagnostics reported by the environment.
    pub info: StepInfo,
}

/// Registered ids, partitioned by agent role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentPlayers {
    /// Ids of human players, in registration order.
    pub human_players: Vec<PlayerId>,
    /// Ids of automated players, in registration order.
    pub llm_players: Vec<PlayerId>,
    /// Every registered id, sorted.
    pub total: Vec<PlayerId>,
}

/// Observers of the loop. Every hook runs synchronously on the loop thread.
pub trait GameCallbacks {
    /// `text` is the accumulated observation about to be given to `player_id`.
    fn on_observation(&mut self, _player_id: PlayerId, _text: &str) {}

    /// Called with the action `player_id` chose, before the environment steps.
    fn on_action(&mut self, _player_id: PlayerId, _action: &str) {}

    /// Called after every environment step.
    fn on_step_complete(&mut self, _done: bool, _info: &StepInfo) {}
}

impl GameCallbacks for () {}

impl<C: GameCallbacks + ?Sized> GameCallbacks for &mut C {
    fn on_observation(&mut self, player_id: PlayerId, text: &str) {
        (**self).on_observation(player_id, text)
    }

    fn on_action(&mut self, player_id: PlayerId, action: &str) {
        (**self).on_action(player_id, action)
    }

    fn on_step_complete(&mut self, done: bool, info: &StepInfo) {
        (**self).on_step_complete(done, info)
    }
}

impl<A: GameCallbacks, B: GameCallbacks> GameCallbacks for (A, B) {
    fn on_observation(&mut self, player_id: PlayerId, text: &str) {
        self.0.on_observation(player_id, text);
        self.1.on_observation(player_id, text);
    }

    fn on_action(&mut self, player_id: PlayerId, action: &str) {
        self.0.on_action(player_id, action);
        self.1.on_action(player_id, action);
    }

    fn on_step_complete(&mut self, done: bool, info: &StepInfo) {
        self.0.on_step_complete(done, info);
        self.1.on_step_complete(done, info);
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No game selected.
    Uninitialized,
    /// Game selected, roster incomplete.
    Configured,
    /// Roster satisfies the player-count rule.
    Ready,
    /// Environment reset, turns being played.
    Running,
    /// Loop over, waiting for [`GameManager::finalize`].
    LoopEnded(GameStatus),
    /// Result produced; the session is immutable.
    Finished,
    /// An environment or registry error aborted the session.
    Failed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Configured => "configured",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::LoopEnded(_) => "waiting for finalize",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct SelectedGame {
    key: String,
    rule: PlayerCountRule,
}

/// Orchestrator of one game session.
pub struct GameManager {
    game: Option<SelectedGame>,
    env: Option<Box<dyn Environment>>,
    agents: BTreeMap<PlayerId, Box<dyn Agent>>,
    human_players: Vec<PlayerId>,
    llm_players: Vec<PlayerId>,
    accumulator: ObservationAccumulator,
    steps: usize,
    state: SessionState,
    seed: Option<u64>,
}

impl Default for GameManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GameManager {
    /// Empty session, waiting for [`setup`](Self::setup).
    pub fn new() -> Self {
        Self {
            game: None,
            env: None,
            agents: BTreeMap::new(),
            human_players: vec![],
            llm_players: vec![],
            accumulator: ObservationAccumulator::new(),
            steps: 0,
            state: SessionState::Uninitialized,
            seed: None,
        }
    }

    /// Canonical keys of every built-in game, sorted.
    pub fn list_available_games() -> Vec<&'static str> {
        GameKind::supported_keys()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of completed turns.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Canonical key of the selected game.
    pub fn game_name(&self) -> Option<&str> {
        self.game.as_ref().map(|g| g.key.as_str())
    }

    /// Everything shown to `player_id` so far.
    pub fn accumulated_observation(&self, player_id: PlayerId) -> Option<&str> {
        self.accumulator.get(player_id)
    }

    fn invalid(&self, operation: &'static str) -> ArenaError {
        match self.state {
            SessionState::Uninitialized => ArenaError::NotConfigured,
            state => ArenaError::InvalidState {
                operation,
                state: state.to_string(),
            },
        }
    }

    fn check_configurable(&self, operation: &'static str) -> Result<()> {
        match self.state {
            SessionState::Uninitialized | SessionState::Configured | SessionState::Ready => Ok(()),
            _ => Err(self.invalid(operation)),
        }
    }

    /// Select a game by canonical key or alias and build its environment.
    ///
    /// Resets the roster. `seed` becomes the default seed of [`start`](Self::start).
    /// Returns the canonical key.
    #[instrument(skip_all, fields(game = game_name))]
    pub fn setup(
        &mut self,
        game_name: &str,
        seed: Option<u64>,
        env_config: Option<&EnvConfig>,
    ) -> Result<&'static str> {
        self.check_configurable("set up a game")?;
        let kind = GameKind::resolve(game_name)?;
        let env = kind.create_environment(env_config.unwrap_or(&EnvConfig::new()))?;
        self.install(kind.key().to_string(), kind.player_count(), env, seed);
        info!("game {game_name} resolved to {kind}");
        Ok(kind.key())
    }

    /// Use an environment that is not part of the built-in registry.
    pub fn setup_custom(
        &mut self,
        name: impl Into<String>,
        rule: PlayerCountRule,
        env: Box<dyn Environment>,
        seed: Option<u64>,
    ) -> Result<()> {
        self.check_configurable("set up a game")?;
        let name = name.into();
        info!("custom game {name} set up");
        self.install(name, rule, env, seed);
        Ok(())
    }

    fn install(&mut self, key: String, rule: PlayerCountRule, env: Box<dyn Environment>, seed: Option<u64>) {
        self.game = Some(SelectedGame { key, rule });
        self.env = Some(env);
        self.agents.clear();
        self.human_players.clear();
        self.llm_players.clear();
        self.accumulator.clear();
        self.steps = 0;
        self.seed = seed;
        self.state = SessionState::Configured;
    }

    /// Register an agent, under `player_id` or the next free id (max + 1, 0 when empty).
    pub fn add_agent<A: Agent + 'static>(&mut self, agent: A, player_id: Option<PlayerId>) -> Result<PlayerId> {
        if self.state == SessionState::Uninitialized {
            return Err(ArenaError::NotConfigured);
        }
        self.check_configurable("add an agent")?;

        let player_id = match player_id {
            Some(id) if self.agents.contains_key(&id) => return Err(ArenaError::DuplicatePlayer(id)),
            Some(id) => id,
            None => self.agents.keys().next_back().map_or(0, |max| max + 1),
        };

        match agent.role() {
            AgentRole::Human => {
                info!("player {player_id}: human");
                self.human_players.push(player_id);
            }
            AgentRole::Automated => {
                info!("player {player_id}: {}", agent.name());
                self.llm_players.push(player_id);
            }
        }
        self.agents.insert(player_id, Box::new(agent));
        self.state = if self.validate_player_count() {
            SessionState::Ready
        } else {
            SessionState::Configured
        };
        Ok(player_id)
    }

    /// Register a human playing on the terminal.
    pub fn add_human_player(&mut self, player_id: Option<PlayerId>) -> Result<PlayerId> {
        self.add_agent(HumanAgent::stdio(), player_id)
    }

    /// Player-count rule of the selected game.
    pub fn required_players(&self) -> Result<PlayerCountRule> {
        self.game
            .as_ref()
            .map(|g| g.rule)
            .ok_or(ArenaError::NotConfigured)
    }

    /// Registered players, split by role.
    pub fn current_players(&self) -> CurrentPlayers {
        CurrentPlayers {
            human_players: self.human_players.clone(),
            llm_players: self.llm_players.clone(),
            total: self.agents.keys().copied().collect(),
        }
    }

    /// True when the roster satisfies the game's rule. False without a game.
    pub fn validate_player_count(&self) -> bool {
        self.game
            .as_ref()
            .is_some_and(|g| g.rule.allows(self.agents.len()))
    }

    /// Validate the roster and reset the environment.
    ///
    /// `seed` overrides the one given to [`setup`](Self::setup).
    #[instrument(skip_all)]
    pub fn start(&mut self, seed: Option<u64>) -> Result<SessionInfo> {
        let game = match (&self.game, self.state) {
            (Some(game), SessionState::Configured | SessionState::Ready) => game,
            _ => return Err(self.invalid("start")),
        };
        let num_players = self.agents.len();
        if !game.rule.allows(num_players) {
            warn!("game {} requires {} players, {num_players} registered", game.key, game.rule);
            return Err(ArenaError::PlayerCount {
                game: game.key.clone(),
                rule: game.rule,
                actual: num_players,
            });
        }

        let env = self.env.as_mut().ok_or(ArenaError::NotConfigured)?;
        let seed = seed.or(self.seed);
        let initial = match env.reset(num_players, seed) {
            Ok(obs) => obs,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(ArenaError::Environment(e));
            }
        };
        let initial_observation = normalize_observation(&initial, |pid| env.role_label(pid));

        self.state = SessionState::Running;
        info!("game {} started with {num_players} players (seed {seed:?})", game.key);
        Ok(SessionInfo {
            status: "started",
            num_players,
            initial_observation,
        })
    }

    /// Play exactly one turn: observe, act, step.
    ///
    /// When the environment reports the game as done, the session waits for
    /// [`finalize`](Self::finalize).
    pub fn play_turn<C: GameCallbacks + ?Sized>(&mut self, callbacks: &mut C) -> Result<TurnResult> {
        if self.state != SessionState::Running {
            return Err(self.invalid("play a turn"));
        }
        let turn = self.turn(callbacks);
        match &turn {
            Ok(turn) if turn.done => self.state = SessionState::LoopEnded(GameStatus::Completed),
            Ok(_) => {}
            Err(e) => {
                warn!("session aborted: {e}");
                self.state = SessionState::Failed;
            }
        }
        turn
    }

    fn turn<C: GameCallbacks + ?Sized>(&mut self, callbacks: &mut C) -> Result<TurnResult> {
        let env = self.env.as_mut().ok_or(ArenaError::NotConfigured)?;
        let (player_id, raw) = env.get_observation().map_err(ArenaError::Environment)?;
        let agent = self
            .agents
            .get_mut(&player_id)
            .ok_or(ArenaError::UnregisteredPlayer(player_id))?;

        let text = normalize_observation(&raw, |pid| env.role_label(pid));
        let (observation, merge) = self.accumulator.merge(player_id, text);
        trace!(player_id, ?merge, "observation merged");
        callbacks.on_observation(player_id, observation);

        let action = agent.act(observation);
        debug!(player_id, %action, "agent acted");
        callbacks.on_action(player_id, &action);

        let (done, info) = env.step(&action).map_err(ArenaError::Environment)?;
        callbacks.on_step_complete(done, &info);
        self.steps += 1;

        Ok(TurnResult {
            player_id,
            action,
            done,
            info,
        })
    }

    /// Play until the environment is done or `max_steps` turns were played in total,
    /// then [`finalize`](Self::finalize).
    ///
    /// A game whose environment reports done on the `max_steps`-th turn ended on its own
    /// and is [`GameStatus::Completed`]. [`GameStatus::MaxStepsReached`] means the ceiling
    /// stopped a game that was still going.
    #[instrument(skip_all, fields(max_steps = max_steps))]
    pub fn run<C: GameCallbacks + ?Sized>(&mut self, max_steps: usize, callbacks: &mut C) -> Result<GameResult> {
        if self.state != SessionState::Running {
            return Err(self.invalid("run"));
        }
        while self.steps < max_steps {
            if self.play_turn(callbacks)?.done {
                break;
            }
        }
        if self.state == SessionState::Running {
            info!("step ceiling of {max_steps} reached");
            self.state = SessionState::LoopEnded(GameStatus::MaxStepsReached);
        }
        self.finalize()
    }

    /// Close the environment and build the result. Allowed once, after the loop ended.
    pub fn finalize(&mut self) -> Result<GameResult> {
        let SessionState::LoopEnded(status) = self.state else {
            return Err(self.invalid("finalize"));
        };
        let env = self.env.as_mut().ok_or(ArenaError::NotConfigured)?;
        let (rewards, game_info) = match env.close() {
            Ok(closed) => closed,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(ArenaError::Environment(e));
            }
        };
        self.state = SessionState::Finished;
        info!("game over after {} steps: {rewards:?}", self.steps);

        Ok(GameResult {
            status,
            steps: self.steps,
            rewards,
            game_info,
            human_players: self.human_players.clone(),
            llm_players: self.llm_players.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::agent::{FixedAgent, FnAgent};
    use crate::game_interface::{Observation, ObservationEvent, ObservationKind};

    /// Players take turns in order; each observation is the full history text.
    struct Countdown {
        players: usize,
        remaining: usize,
        turn: usize,
        closed: usize,
        fail_on_step: bool,
    }

    impl Countdown {
        fn new(turns: usize) -> Self {
            Self {
                players: 0,
                remaining: turns,
                turn: 0,
                closed: 0,
                fail_on_step: false,
            }
        }
    }

    impl Environment for Countdown {
        fn reset(&mut self, num_players: usize, _seed: Option<u64>) -> anyhow::Result<Observation> {
            self.players = num_players;
            Ok("go".into())
        }

        fn get_observation(&mut self) -> anyhow::Result<(PlayerId, Observation)> {
            let pid = (self.turn % self.players) as PlayerId;
            Ok((pid, Observation::Events(vec![ObservationEvent::game(
                format!("turn {}", self.turn),
                ObservationKind::GameMessage,
            )])))
        }

        fn step(&mut self, _action: &str) -> anyhow::Result<(bool, StepInfo)> {
            if self.fail_on_step {
                bail!("rule engine bug");
            }
            self.turn += 1;
            self.remaining = self.remaining.saturating_sub(1);
            Ok((self.remaining == 0, StepInfo::new()))
        }

        fn close(&mut self) -> anyhow::Result<(Rewards, GameInfo)> {
            self.closed += 1;
            Ok(((0..self.players as PlayerId).map(|p| (p, p as f64)).collect(), GameInfo::new()))
        }
    }

    fn manager(turns: usize) -> GameManager {
        let mut manager = GameManager::new();
        manager
            .setup_custom("countdown", PlayerCountRule::Exact(2), Box::new(Countdown::new(turns)), None)
            .unwrap();
        manager
    }

    #[derive(Default)]
    struct Log(Vec<String>);

    impl GameCallbacks for Log {
        fn on_observation(&mut self, player_id: PlayerId, _text: &str) {
            self.0.push(format!("obs {player_id}"));
        }

        fn on_action(&mut self, player_id: PlayerId, action: &str) {
            self.0.push(format!("act {player_id} {action}"));
        }

        fn on_step_complete(&mut self, done: bool, _info: &StepInfo) {
            self.0.push(format!("step {done}"));
        }
    }

    #[test]
    fn ids_are_assigned_densely() {
        let mut manager = manager(1);
        assert_eq!(manager.add_agent(FixedAgent::new("a"), Some(4)).unwrap(), 4);
        assert_eq!(manager.add_agent(FixedAgent::new("b"), None).unwrap(), 5);
        assert!(matches!(
            manager.add_agent(FixedAgent::new("c"), Some(4)),
            Err(ArenaError::DuplicatePlayer(4))
        ));
        assert_eq!(manager.current_players().total, vec![4, 5]);
        assert_eq!(manager.state(), SessionState::Ready);
    }

    #[test]
    fn nothing_works_before_setup() {
        let mut manager = GameManager::new();
        assert!(matches!(manager.add_agent(FixedAgent::new("a"), None), Err(ArenaError::NotConfigured)));
        assert!(matches!(manager.start(None), Err(ArenaError::NotConfigured)));
        assert!(matches!(manager.run(10, &mut ()), Err(ArenaError::NotConfigured)));
        assert!(manager.required_players().is_err());
        assert!(!manager.validate_player_count());
    }

    #[test]
    fn callbacks_run_in_order() {
        let mut manager = manager(2);
        manager.add_agent(FixedAgent::new("x"), None).unwrap();
        manager.add_agent(FixedAgent::new("y"), None).unwrap();
        manager.start(None).unwrap();
        let mut log = Log::default();
        let result = manager.run(10, &mut log).unwrap();
        assert_eq!(result.status, GameStatus::Completed);
        assert_eq!(
            log.0,
            ["obs 0", "act 0 x", "step false", "obs 1", "act 1 y", "step true"]
        );
    }

    #[test]
    fn agents_see_accumulated_history() {
        let mut manager = manager(3);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
        let record = seen.clone();
        manager
            .add_agent(
                FnAgent::new("echo", move |obs: &str| {
                    record.lock().unwrap().push(obs.to_string());
                    "ok"
                }),
                None,
            )
            .unwrap();
        manager.add_agent(FixedAgent::new("ok"), None).unwrap();
        manager.start(None).unwrap();
        manager.run(10, &mut ()).unwrap();
        assert_eq!(*seen.lock().unwrap(), ["turn 0", "turn 0\nturn 2"]);
        assert_eq!(manager.accumulated_observation(1), Some("turn 1"));
    }

    #[test]
    fn environment_failure_fails_the_session() {
        let mut env = Countdown::new(5);
        env.fail_on_step = true;
        let mut manager = GameManager::new();
        manager
            .setup_custom("broken", PlayerCountRule::Exact(1), Box::new(env), None)
            .unwrap();
        manager.add_agent(FixedAgent::new("a"), None).unwrap();
        manager.start(None).unwrap();
        let err = manager.run(10, &mut ()).unwrap_err();
        assert!(matches!(err, ArenaError::Environment(_)));
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(matches!(manager.finalize(), Err(ArenaError::InvalidState { .. })));
        assert!(manager.setup("colonel_blotto", None, None).is_err());
    }

    #[test]
    fn manual_turns_then_finalize_once() {
        let mut manager = manager(2);
        manager.add_agent(FixedAgent::new("a"), None).unwrap();
        manager.add_agent(FixedAgent::new("b"), None).unwrap();
        manager.start(None).unwrap();
        assert!(matches!(manager.finalize(), Err(ArenaError::InvalidState { .. })));

        assert!(!manager.play_turn(&mut ()).unwrap().done);
        let last = manager.play_turn(&mut ()).unwrap();
        assert_eq!(last.player_id, 1);
        assert!(last.done);
        assert!(manager.play_turn(&mut ()).is_err());

        let result = manager.finalize().unwrap();
        assert_eq!(result.steps, 2);
        assert_eq!(result.winner(), Some(1));
        assert!(matches!(manager.finalize(), Err(ArenaError::InvalidState { .. })));
        assert_eq!(manager.state(), SessionState::Finished);
    }

    #[test]
    fn result_schema() {
        let result = GameResult {
            status: GameStatus::MaxStepsReached,
            steps: 4,
            rewards: [(0, 1.0), (1, -1.0)].into_iter().collect(),
            game_info: GameInfo::new(),
            human_players: vec![],
            llm_players: vec![0, 1],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "max_steps_reached");
        assert_eq!(json["rewards"]["0"], 1.0);
        assert_eq!(json["llm_players"], serde_json::json!([0, 1]));
    }

    #[test]
    fn winner_needs_a_unique_maximum() {
        let mut result = GameResult {
            status: GameStatus::Completed,
            steps: 1,
            rewards: [(0, 1.0), (1, 1.0)].into_iter().collect(),
            game_info: GameInfo::new(),
            human_players: vec![],
            llm_players: vec![],
        };
        assert_eq!(result.winner(), None);
        result.rewards.insert(1, 0.0);
        assert_eq!(result.winner(), Some(0));
        result.rewards.clear();
        assert_eq!(result.winner(), None);
    }
}
