//! Agents: anything that turns an observation text into an action text.
//!
//! The orchestrator only ever sees the [`Agent`] trait. Model-backed agents live in
//! [`crate::llm`]; this module provides the simple ones.

use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

use tracing::warn;

/// Who is behind an agent, as reported in [`GameResult`](crate::game_manager::GameResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// A person answering at a terminal.
    Human,
    /// A program or a model.
    Automated,
}

/// Total function from observation to action.
///
/// Implementations must not fail: a degenerate answer (empty, malformed) is still an answer
/// and is forwarded to the environment unchanged.
pub trait Agent: Send {
    /// Produce the action for the accumulated observation text.
    fn act(&mut self, observation: &str) -> String;

    /// Kind of agent, used to partition the players of a result.
    fn role(&self) -> AgentRole {
        AgentRole::Automated
    }

    /// Short name for logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn act(&mut self, observation: &str) -> String {
        (**self).act(observation)
    }

    fn role(&self) -> AgentRole {
        (**self).role()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Agent backed by a closure. Any output implementing [`ToString`] is accepted.
pub struct FnAgent<F> {
    name: String,
    f: F,
}

impl<F, T> FnAgent<F>
where
    F: FnMut(&str) -> T + Send,
    T: ToString,
{
    /// Agent named `name` answering with `f(observation)`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F, T> Agent for FnAgent<F>
where
    F: FnMut(&str) -> T + Send,
    T: ToString,
{
    fn act(&mut self, observation: &str) -> String {
        (self.f)(observation).to_string()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Always answers the same text.
#[derive(Debug, Clone)]
pub struct FixedAgent {
    action: String,
}

impl FixedAgent {
    /// Agent answering `action` to every observation.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

impl Agent for FixedAgent {
    fn act(&mut self, _observation: &str) -> String {
        self.action.clone()
    }

    fn name(&self) -> String {
        format!("fixed({})", self.action)
    }
}

/// Interactive player: prints the observation and reads one line as the action.
pub struct HumanAgent<R, W> {
    input: R,
    output: W,
}

impl HumanAgent<BufReader<Stdin>, Stdout> {
    /// Human playing on the process terminal.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead + Send, W: Write + Send> HumanAgent<R, W> {
    /// Human reading moves from `input` and printing observations to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, observation: &str) -> io::Result<String> {
        writeln!(self.output, "{observation}")?;
        write!(self.output, "> ")?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<R: BufRead + Send, W: Write + Send> Agent for HumanAgent<R, W> {
    fn act(&mut self, observation: &str) -> String {
        // an unreadable terminal yields an empty move, the game decides what it means
        self.prompt(observation).unwrap_or_else(|e| {
            warn!("could not read human input: {e}");
            String::new()
        })
    }

    fn role(&self) -> AgentRole {
        AgentRole::Human
    }

    fn name(&self) -> String {
        "human".to_string()
    }
}
