//! Wire-independent view of a chat completion call.

use serde::Serialize;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions given before the conversation.
    System,
    /// Message from the player side.
    User,
    /// Reply of the model.
    Assistant,
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Text of the message.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sampling {
    /// Maximum number of generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Frequency penalty, omitted when zero.
    #[serde(skip_serializing_if = "is_zero")]
    pub frequency_penalty: f32,
    /// Presence penalty, omitted when zero.
    #[serde(skip_serializing_if = "is_zero")]
    pub presence_penalty: f32,
}

fn is_zero(value: &f32) -> bool {
    *value == 0.0
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// One chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model name.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Sampling parameters, flattened into the request.
    #[serde(flatten)]
    pub sampling: Sampling,
}

/// Something able to answer a chat request.
///
/// Errors are reported as is; retries and fallbacks belong to
/// [`ModelAgent`](super::ModelAgent).
pub trait ChatTransport: Send {
    /// Send `request` authenticated with `api_key` and return the reply text.
    fn complete(&self, request: &ChatRequest, api_key: &str) -> anyhow::Result<String>;
}

impl<T: ChatTransport + Sync> ChatTransport for std::sync::Arc<T> {
    fn complete(&self, request: &ChatRequest, api_key: &str) -> anyhow::Result<String> {
        (**self).complete(request, api_key)
    }
}
