use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::notify::Notifier;
use crate::providers::Provider;
use crate::translations::{self, TranslateOptions};

static REASONING_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("reasoning span pattern"));

/// One fragment to translate. Built per block and handed over by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub fragment: String,
    pub model: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslationRequest {
    pub fn new(fragment: impl Into<String>, model: impl Into<String>, options: &TranslateOptions) -> Self {
        Self {
            fragment: fragment.into(),
            model: model.into(),
            source_lang: options.source_lang.clone(),
            target_lang: options.lang.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    BlankInput,
    RequestFailed,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::BlankInput => "blank_input",
            FallbackReason::RequestFailed => "request_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Translated(String),
    /// The untouched input, returned whenever the model was not (successfully) asked.
    Original { text: String, reason: FallbackReason },
}

impl TranslationResult {
    pub fn text(&self) -> &str {
        match self {
            TranslationResult::Translated(text) => text,
            TranslationResult::Original { text, .. } => text,
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            TranslationResult::Translated(_) => None,
            TranslationResult::Original { reason, .. } => Some(*reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Translator<P: Provider> {
    provider: P,
}

impl<P: Provider> Translator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Never fails: transport and API errors are reported to `notifier` and the
    /// original fragment comes back instead.
    pub async fn translate<N: Notifier>(
        &self,
        request: TranslationRequest,
        notifier: &mut N,
    ) -> TranslationResult {
        if request.fragment.trim().is_empty() {
            return TranslationResult::Original {
                text: request.fragment,
                reason: FallbackReason::BlankInput,
            };
        }

        debug!(
            "sending {} chars to {} ({} -> {})",
            request.fragment.len(),
            request.model,
            request.source_lang,
            request.target_lang
        );
        match self.request(&request).await {
            Ok(text) => {
                debug!("received {} chars from {}", text.len(), request.model);
                TranslationResult::Translated(text)
            }
            Err(err) => {
                warn!("translation with model {} failed: {:#}", request.model, err);
                notifier.warning(format!(
                    "Error translating an HTML fragment with model {}: {}. Original fragment will be used.",
                    request.model,
                    error_kind(&err)
                ));
                TranslationResult::Original {
                    text: request.fragment,
                    reason: FallbackReason::RequestFailed,
                }
            }
        }
    }

    async fn request(&self, request: &TranslationRequest) -> Result<String> {
        let system_prompt =
            translations::render_system_prompt(&request.source_lang, &request.target_lang)?;
        let response = self
            .provider
            .clone()
            .with_model(request.model.clone())
            .append_system_input(system_prompt)
            .append_user_input(request.fragment.clone())
            .complete()
            .await?;
        Ok(strip_reasoning(&response.content))
    }
}

/// Removes `<think>…</think>` spans, then any unpaired marker left behind.
pub fn strip_reasoning(text: &str) -> String {
    let without_spans = REASONING_SPAN.replace_all(text, "");
    without_spans
        .trim()
        .replace("<think>", "")
        .replace("</think>", "")
        .trim()
        .to_string()
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    let Some(http) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<reqwest::Error>())
    else {
        return "ModelError";
    };
    if http.is_timeout() {
        "Timeout"
    } else if http.is_connect() {
        "ConnectionError"
    } else if http.is_decode() {
        "DecodeError"
    } else {
        "RequestError"
    }
}
