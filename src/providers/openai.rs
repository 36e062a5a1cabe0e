use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

use super::retry::{
    BUSY_BASE_DELAY, is_busy, planned_wait, retry_after, retry_allowed, wait_with_backoff,
};
use super::{Message, ModelsFuture, Provider, ProviderFuture, ProviderResponse, ProviderUsage};
use crate::settings::Settings;

/// Client for any server exposing the OpenAI chat-completions API (Ollama, llama.cpp,
/// LM Studio, vLLM, ...).
#[derive(Debug, Clone)]
pub struct OpenAI {
    base_url: String,
    key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    messages: Vec<Message>,
}

impl OpenAI {
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Self {
        let defaults = Settings::default();
        let timeout = defaults.timeout();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            model: defaults.model,
            temperature: defaults.temperature,
            timeout,
            messages: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.endpoint.clone(), settings.api_key.clone())
            .with_model(settings.model.clone())
            .with_temperature(settings.temperature)
            .with_timeout(settings.timeout())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .with_context(|| "failed to build HTTP client")
    }
}

impl Provider for OpenAI {
    fn with_model(mut self, model: String) -> Self {
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn complete(self) -> ProviderFuture {
        Box::pin(async move { call_chat_completions(self).await })
    }

    fn list_models(&self) -> ModelsFuture {
        let provider = self.clone();
        Box::pin(async move { fetch_models(provider).await })
    }
}

async fn call_chat_completions(provider: OpenAI) -> Result<ProviderResponse> {
    let client = provider.client()?;
    let url = format!("{}/chat/completions", provider.base_url);

    let messages = provider
        .messages
        .iter()
        .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
        .collect::<Vec<_>>();

    let body = json!({
        "model": provider.model,
        "temperature": provider.temperature,
        "messages": messages,
    });

    // The configured timeout bounds the whole exchange, busy retries included.
    let started = Instant::now();
    let mut attempt = 0usize;
    let mut delay = BUSY_BASE_DELAY;
    loop {
        attempt += 1;
        let remaining = provider.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(anyhow!(
                "{} stayed busy for {:.0}s; giving up after {} attempt(s)",
                provider.base_url,
                provider.timeout.as_secs_f32(),
                attempt - 1
            ));
        }
        let response = client
            .post(&url)
            .bearer_auth(&provider.key)
            .timeout(remaining)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_chat_response(&text, &provider.model);
        }
        let wait = planned_wait(delay, retry_after);
        if is_busy(status, &text)
            && retry_allowed(attempt, started.elapsed(), wait, provider.timeout)
        {
            delay = wait_with_backoff(&provider.base_url, attempt, wait, delay).await;
            continue;
        }
        return Err(anyhow!(
            "chat completion error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ));
    }
}

async fn fetch_models(provider: OpenAI) -> Result<Vec<String>> {
    let client = provider.client()?;
    let url = format!("{}/models", provider.base_url);
    let response = client
        .get(&url)
        .bearer_auth(&provider.key)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(
            "model list error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ));
    }
    parse_models(&text)
}

fn parse_models(text: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct ModelList {
        #[serde(default)]
        data: Vec<ModelEntry>,
    }

    #[derive(Deserialize)]
    struct ModelEntry {
        id: String,
    }

    let parsed: ModelList =
        serde_json::from_str(text).with_context(|| "failed to parse model list JSON")?;
    Ok(parsed.data.into_iter().map(|entry| entry.id).collect())
}

fn extract_chat_response(text: &str, fallback_model: &str) -> Result<ProviderResponse> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse chat completion JSON")?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from model"))?;

    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse {
        content,
        model,
        usage,
    })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = error.kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}
