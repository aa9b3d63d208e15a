//! OpenAI-compatible `/chat/completions` transport.

use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::trace;

use super::transport::{ChatRequest, ChatTransport};

const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking HTTP client for any OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    client: Client,
    endpoint: String,
}

/// Accepts both `https://host/v1` and `https://host/v1/chat/completions`.
fn completions_endpoint(api_base: &str) -> String {
    let base = api_base.trim_end_matches('/');
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{base}{COMPLETIONS_PATH}")
    }
}

impl OpenAiTransport {
    /// Client for the API rooted at `api_base`.
    pub fn new(api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("could not build HTTP client")?;
        Ok(Self {
            client,
            endpoint: completions_endpoint(api_base),
        })
    }

    /// Full URL of the chat completions endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatTransport for OpenAiTransport {
    fn complete(&self, request: &ChatRequest, api_key: &str) -> anyhow::Result<String> {
        trace!(model = %request.model, endpoint = %self.endpoint, "chat completion request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{} answered {status}: {body}", self.endpoint);
        }

        let completion: CompletionResponse =
            response.json().context("malformed completion response")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("completion response has no content")?;
        Ok(content.trim().to_string())
    }
}
