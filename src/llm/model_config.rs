//! File-based model and prompt pools.
//!
//! A model pool is a directory of YAML files, one per model:
//!
//! ```yaml
//! model: openai/gpt-4o-mini
//! api_key: sk-...
//! api_base: https://openrouter.ai/api/v1
//! temperature: 0.7
//! max_retries: 3
//! ```
//!
//! A prompt pool is a directory of `.txt` system prompts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use rand::{seq::IndexedRandom, Rng};
use serde::Deserialize;

use super::{postprocess::ActionFormat, retry::RetryPolicy, transport::Sampling, RetryPolicyBuilder};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// System prompt used when a config sets none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a competitive game player. Make sure you read the game instructions carefully, and always follow the required format.";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Content of one model YAML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Model name sent to the API.
    pub model: String,
    /// API key, unless a token pool provides one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// System prompt overriding [`DEFAULT_SYSTEM_PROMPT`].
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum number of generated tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Frequency penalty.
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    /// Presence penalty.
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// Total number of attempts per call.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Seconds between attempts.
    #[serde(default)]
    pub retry_delay: Option<u64>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// How the action is extracted from replies.
    #[serde(default)]
    pub action_format: ActionFormat,
}

impl ModelConfig {
    /// Read a config from a YAML file.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read model config {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("could not parse model config {}", path.display()))
    }

    /// Sampling parameters, with the usual defaults for unset values.
    pub fn sampling(&self) -> Sampling {
        let default = Sampling::default();
        Sampling {
            max_tokens: self.max_tokens.unwrap_or(default.max_tokens),
            temperature: self.temperature.unwrap_or(default.temperature),
            top_p: self.top_p.unwrap_or(default.top_p),
            frequency_penalty: self.frequency_penalty.unwrap_or(default.frequency_penalty),
            presence_penalty: self.presence_penalty.unwrap_or(default.presence_penalty),
        }
    }

    /// Retry policy of this model, environment variables filling the gaps.
    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        let mut builder = RetryPolicyBuilder::from_env();
        if let Some(attempts) = self.max_retries {
            builder = builder.with_max_attempts(attempts);
        }
        if let Some(secs) = self.retry_delay {
            builder = builder.with_retry_delay(Duration::from_secs(secs));
        }
        builder
            .build()
            .with_context(|| format!("invalid retry settings for model {}", self.model))
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn files_with_extension(dir: &Path, extensions: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .with_context(|| format!("could not list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Models loaded from a directory of YAML files, sorted by file name.
#[derive(Debug, Clone)]
pub struct ModelPool {
    models: Vec<(PathBuf, ModelConfig)>,
}

impl ModelPool {
    /// Load every `.yaml`/`.yml` file of `dir`, sorted by file name.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let models = files_with_extension(dir, &["yaml", "yml"])?
            .into_iter()
            .map(|path| ModelConfig::from_yaml_file(&path).map(|config| (path, config)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if models.is_empty() {
            bail!("no model config found in {}", dir.display());
        }
        Ok(Self { models })
    }

    /// Number of loaded configs.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True when no config was loaded.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Loaded configs, in file name order.
    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter().map(|(_, config)| config)
    }

    /// Model whose file stem or `model` field equals `name`.
    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models
            .iter()
            .find(|(path, config)| {
                config.model == name || path.file_stem().is_some_and(|stem| stem == name)
            })
            .map(|(_, config)| config)
    }

    /// Pick a config at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ModelConfig> {
        self.models.choose(rng).map(|(_, config)| config)
    }
}

/// System prompts loaded from a directory of `.txt` files.
#[derive(Debug, Clone)]
pub struct PromptPool {
    prompts: Vec<(String, String)>,
}

impl PromptPool {
    /// Load every `.txt` file of `dir`, keyed by file stem.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut prompts = vec![];
        for path in files_with_extension(dir, &["txt"])? {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("could not read prompt {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            prompts.push((name, text.trim().to_string()));
        }
        if prompts.is_empty() {
            bail!("no prompt found in {}", dir.display());
        }
        Ok(Self { prompts })
    }

    /// Number of loaded prompts.
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// True when no prompt was loaded.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompt named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.prompts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
    }

    /// Random `(name, prompt)` pair.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&str, &str)> {
        self.prompts
            .choose(rng)
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }
}
