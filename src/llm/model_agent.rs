use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tracing::{debug, warn};

use super::{
    model_config::{ModelConfig, DEFAULT_SYSTEM_PROMPT},
    openai::OpenAiTransport,
    postprocess::{extract_action, ActionFormat},
    retry::RetryPolicy,
    token_pool::TokenPool,
    transport::{ChatMessage, ChatRequest, ChatTransport, Sampling},
};
use crate::agent::Agent;

/// Where the API key of a request comes from.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Same key for every request.
    Key(String),
    /// Next round-robin token of the model, falling back to the given key when the pool
    /// has none.
    Pool {
        /// Shared pool.
        pool: Arc<TokenPool>,
        /// Key used when the pool has no token for the model.
        fallback: Option<String>,
    },
}

impl Credentials {
    fn resolve(&self, model: &str) -> anyhow::Result<String> {
        match self {
            Credentials::Key(key) => Ok(key.clone()),
            Credentials::Pool { pool, fallback } => pool
                .next_token(model)
                .or_else(|| fallback.clone())
                .with_context(|| format!("token pool {} has no token for {model}", pool.name())),
        }
    }
}

/// Text answered when every attempt failed.
pub fn fallback_message(error: &anyhow::Error) -> String {
    format!(
        "I apologize, but I'm having technical difficulties (Error: {error:#}). Please proceed with the game."
    )
}

/// [`Agent`] backed by a chat model.
///
/// `act` never fails: transport errors are retried according to the [`RetryPolicy`], then
/// replaced by [`fallback_message`].
pub struct ModelAgent<T> {
    transport: T,
    model: String,
    system_prompt: String,
    sampling: Sampling,
    credentials: Credentials,
    retry: RetryPolicy,
    action_format: ActionFormat,
    last_output: Option<String>,
}

impl<T: ChatTransport> ModelAgent<T> {
    /// Agent calling `model` through `transport`, with default sampling and retry policy.
    pub fn new(transport: T, model: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            transport,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            sampling: Sampling::default(),
            credentials,
            retry: RetryPolicy::default(),
            action_format: ActionFormat::default(),
            last_output: None,
        }
    }

    /// Replaces the system prompt sent before every observation.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Replaces the sampling parameters.
    #[must_use]
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how the action is extracted from the reply.
    #[must_use]
    pub fn with_action_format(mut self, format: ActionFormat) -> Self {
        self.action_format = format;
        self
    }

    /// Model name sent in requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Raw reply of the last successful call, before post-processing.
    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    fn request(&self, observation: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(observation),
            ],
            sampling: self.sampling.clone(),
        }
    }

    fn attempt(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let key = self.credentials.resolve(&self.model)?;
        self.transport.complete(request, &key)
    }

    /// Call the model with retries. Returns the last error once attempts are exhausted.
    pub fn call(&mut self, observation: &str) -> anyhow::Result<String> {
        let request = self.request(observation);
        let attempts = self.retry.max_attempts();
        let mut attempt = 1;
        loop {
            match self.attempt(&request) {
                Ok(reply) => {
                    debug!(model = %self.model, attempt, "model replied");
                    self.last_output = Some(reply.clone());
                    return Ok(reply);
                }
                Err(e) if attempt < attempts => {
                    warn!(model = %self.model, "attempt {attempt}/{attempts} failed: {e:#}");
                    thread::sleep(self.retry.retry_delay());
                    attempt += 1;
                }
                Err(e) => {
                    warn!(model = %self.model, "all {attempts} attempts failed: {e:#}");
                    return Err(e);
                }
            }
        }
    }
}

impl ModelAgent<OpenAiTransport> {
    /// Agent for a model YAML file. A token pool, when given, takes precedence over the
    /// file's `api_key`.
    pub fn from_config(config: &ModelConfig, token_pool: Option<Arc<TokenPool>>) -> anyhow::Result<Self> {
        let transport = OpenAiTransport::new(&config.api_base, config.timeout())?;
        let credentials = match token_pool {
            Some(pool) => Credentials::Pool {
                pool,
                fallback: config.api_key.clone(),
            },
            None => Credentials::Key(
                config
                    .api_key
                    .clone()
                    .with_context(|| format!("model {} has no api_key", config.model))?,
            ),
        };
        let mut agent = Self::new(transport, config.model.clone(), credentials)
            .with_sampling(config.sampling())
            .with_retry_policy(config.retry_policy()?)
            .with_action_format(config.action_format);
        if let Some(prompt) = &config.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        Ok(agent)
    }
}

impl<T: ChatTransport> Agent for ModelAgent<T> {
    fn act(&mut self, observation: &str) -> String {
        match self.call(observation) {
            Ok(reply) => extract_action(&reply, self.action_format),
            Err(e) => fallback_message(&e),
        }
    }

    fn name(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::bail;

    use super::*;
    use crate::llm::RetryPolicyBuilder;

    struct Scripted {
        calls: AtomicU32,
        fail_first: u32,
        keys: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                keys: Mutex::new(vec![]),
            }
        }
    }

    impl ChatTransport for Scripted {
        fn complete(&self, request: &ChatRequest, api_key: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.keys.lock().unwrap().push(api_key.to_string());
            if n <= self.fail_first {
                bail!("503 service unavailable");
            }
            Ok(format!("<think>long</think>reply to {}", request.messages[1].content))
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicyBuilder::new()
            .with_max_attempts(attempts)
            .with_retry_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    #[test]
    fn always_failing_transport_falls_back_after_all_attempts() {
        let transport = Arc::new(Scripted::new(u32::MAX));
        let mut agent = ModelAgent::new(transport.clone(), "m", Credentials::Key("k".into()))
            .with_retry_policy(policy(3));
        let action = agent.act("obs");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert!(action.starts_with("I apologize, but I'm having technical difficulties (Error: "));
        assert!(action.contains("503 service unavailable"));
        assert!(action.ends_with("Please proceed with the game."));
        assert!(agent.last_output().is_none());
    }

    #[test]
    fn transient_failure_is_retried() {
        let transport = Arc::new(Scripted::new(1));
        let mut agent = ModelAgent::new(transport.clone(), "m", Credentials::Key("k".into()))
            .with_retry_policy(policy(3));
        assert_eq!(agent.act("obs"), "reply to obs");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(agent.last_output(), Some("<think>long</think>reply to obs"));
    }

    #[test]
    fn pool_tokens_rotate() {
        let pool = Arc::new(TokenPool::new("p"));
        pool.add_tokens("m", vec!["t1".to_string(), "t2".to_string()]);
        let transport = Arc::new(Scripted::new(0));
        let mut agent = ModelAgent::new(
            transport.clone(),
            "m",
            Credentials::Pool {
                pool: pool.clone(),
                fallback: None,
            },
        );
        agent.act("a");
        agent.act("b");
        assert_eq!(*transport.keys.lock().unwrap(), ["t1", "t2"]);
    }

    #[test]
    fn empty_pool_without_fallback_is_an_error() {
        let credentials = Credentials::Pool {
            pool: Arc::new(TokenPool::new("empty")),
            fallback: None,
        };
        assert!(credentials.resolve("m").is_err());
        let credentials = Credentials::Pool {
            pool: Arc::new(TokenPool::new("empty")),
            fallback: Some("k".to_string()),
        };
        assert_eq!(credentials.resolve("m").unwrap(), "k");
    }
}
