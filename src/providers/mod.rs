use anyhow::Result;
use futures_util::future::BoxFuture;
use serde::Serialize;

mod openai;
mod retry;

pub use openai::OpenAI;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture = BoxFuture<'static, Result<ProviderResponse>>;
pub type ModelsFuture = BoxFuture<'static, Result<Vec<String>>>;

/// Chat backend. Builders consume `self` so a configured provider can be cloned
/// once per request without sharing conversation state.
pub trait Provider: Clone + Send + Sync {
    fn with_model(self, model: String) -> Self;
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn complete(self) -> ProviderFuture;
    fn list_models(&self) -> ModelsFuture;
}
