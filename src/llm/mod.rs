//! Model-backed agents.
//!
//! [`ModelAgent`] turns a chat model into an [`Agent`](crate::agent::Agent): it builds the
//! request, talks to the provider through a [`ChatTransport`], retries failures per its
//! [`RetryPolicy`] and cleans the reply. Network access is confined to this module.

mod model_agent;
mod model_config;
mod openai;
mod postprocess;
mod retry;
mod token_pool;
mod transport;

pub use model_agent::{fallback_message, Credentials, ModelAgent};
pub use model_config::{ModelConfig, ModelPool, PromptPool, DEFAULT_SYSTEM_PROMPT};
pub use openai::OpenAiTransport;
pub use postprocess::{extract_action, strip_thinking, ActionFormat};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use token_pool::TokenPool;
pub use transport::{ChatMessage, ChatRequest, ChatRole, ChatTransport, Sampling};
