use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::Level;

use game_arena::agent::{Agent, FixedAgent, HumanAgent};
use game_arena::batch::{BatchRunner, SessionPlan};
use game_arena::configuration::Configuration;
use game_arena::game_interface::EnvConfig;
use game_arena::game_manager::GameManager;
use game_arena::game_registry::GameKind;
use game_arena::llm::{ModelAgent, ModelConfig, TokenPool};
use game_arena::logger::{init_logger, init_stdout_logger};
use game_arena::stats::WinRateTable;

#[derive(Parser, Debug)]
#[command(
    name = "arena",
    about = "Run language-model agents against each other in multiplayer text games",
    long_about = "Plays one or more sessions of a game, registering agents in the order given.\n\
                  Defaults for the step ceiling, parallelism and output directory are read\n\
                  from ARENA_* environment variables."
)]
struct Args {
    /// Game key or alias, e.g. colonel_blotto or ColonelBlotto-v0
    #[arg(short, long, required_unless_present = "list_games")]
    game: Option<String>,

    /// Agent spec, once per player: fixed:<text>, model:<config.yaml> or human
    #[arg(short, long = "agent", required_unless_present = "list_games")]
    agents: Vec<AgentSpec>,

    /// Environment parameter as key=value, the value being parsed as JSON when possible
    #[arg(short, long = "env", value_parser = parse_key_value)]
    env: Vec<(String, serde_json::Value)>,

    /// Base seed, run i uses seed + i
    #[arg(short, long)]
    seed: Option<u64>,

    /// Step ceiling of each session
    #[arg(long)]
    max_steps: Option<usize>,

    /// Number of sessions to play
    #[arg(short = 'n', long, default_value_t = 1)]
    runs: usize,

    /// Number of sessions played at once
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Directory receiving transcripts
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// System prompt file overriding the one of model configs
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// YAML token pool shared by model agents
    #[arg(long)]
    token_pool: Option<PathBuf>,

    /// Maximum level of the logs printed to stdout
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// List the available games and exit
    #[arg(long)]
    list_games: bool,
}

#[derive(Debug, Clone)]
enum AgentSpec {
    Fixed(String),
    Model(PathBuf),
    Human,
}

impl FromStr for AgentSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "human" {
            Ok(AgentSpec::Human)
        } else if let Some(text) = s.strip_prefix("fixed:") {
            Ok(AgentSpec::Fixed(text.to_string()))
        } else if let Some(path) = s.strip_prefix("model:") {
            Ok(AgentSpec::Model(PathBuf::from(path)))
        } else {
            Err(format!("unknown agent spec '{s}', expected fixed:<text>, model:<yaml> or human"))
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Agent specs with their model configs loaded.
enum Roster {
    Fixed(String),
    Model(Box<ModelConfig>),
    Human,
}

struct AgentFactory {
    roster: Vec<Roster>,
    system_prompt: Option<String>,
    token_pool: Option<Arc<TokenPool>>,
}

impl AgentFactory {
    fn build(&self) -> anyhow::Result<Vec<Box<dyn Agent>>> {
        self.roster
            .iter()
            .map(|spec| -> anyhow::Result<Box<dyn Agent>> {
                Ok(match spec {
                    Roster::Fixed(text) => Box::new(FixedAgent::new(text.clone())),
                    Roster::Human => Box::new(HumanAgent::stdio()),
                    Roster::Model(config) => {
                        let mut agent = ModelAgent::from_config(config, self.token_pool.clone())?;
                        if let Some(prompt) = &self.system_prompt {
                            agent = agent.with_system_prompt(prompt.clone());
                        }
                        Box::new(agent)
                    }
                })
            })
            .collect()
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let Some(game) = args.game.as_deref().filter(|_| !args.list_games) else {
        for game in GameManager::list_available_games() {
            println!("{game}");
        }
        return Ok(());
    };

    let mut config = Configuration::from_env();
    if let Some(max_steps) = args.max_steps {
        config = config.with_max_steps(max_steps);
    }
    if let Some(parallel) = args.parallel {
        config = config.with_parallelism(parallel);
    }
    if let Some(dir) = &args.out_dir {
        config = config.with_output_dir(dir);
    }

    match config.output_dir() {
        Some(dir) if config.log() => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("could not create {}", dir.display()))?;
            init_logger(dir)?;
        }
        _ => init_stdout_logger(args.log_level)?,
    }

    let kind = GameKind::resolve(game)?;
    if !kind.player_count().allows(args.agents.len()) {
        bail!(
            "{kind} requires {} players, {} agents given",
            kind.player_count(),
            args.agents.len()
        );
    }
    if args.agents.iter().any(|a| matches!(a, AgentSpec::Human)) && config.parallelism() > 1 {
        config = config.with_parallelism(1);
    }

    let roster = args
        .agents
        .iter()
        .map(|spec| -> anyhow::Result<Roster> {
            Ok(match spec {
                AgentSpec::Fixed(text) => Roster::Fixed(text.clone()),
                AgentSpec::Human => Roster::Human,
                AgentSpec::Model(path) => Roster::Model(Box::new(ModelConfig::from_yaml_file(path)?)),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let system_prompt = args
        .prompt
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("could not read prompt {}", path.display()))
        })
        .transpose()?;
    let token_pool = args
        .token_pool
        .as_deref()
        .map(TokenPool::from_yaml_file)
        .transpose()?
        .map(Arc::new);
    let factory = AgentFactory {
        roster,
        system_prompt,
        token_pool: token_pool.clone(),
    };

    let mut plan = SessionPlan::new(kind.key(), &config);
    plan.seed = args.seed;
    plan.env_config = args.env.into_iter().collect::<EnvConfig>();

    let runner = BatchRunner::new(config);
    let reports = runner.run(args.runs, move |index| {
        let agents = factory.build()?;
        plan.play(index, agents)
    });

    let table = reports.iter().collect::<WinRateTable>();
    println!("{table}");
    if let Some(pool) = token_pool {
        println!("{}", pool.usage_report());
    }
    if table.finished() == 0 && table.failed() > 0 {
        bail!("every run failed");
    }
    Ok(())
}
