use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::providers::{ModelsFuture, Provider, ProviderFuture, ProviderResponse};

type Reply = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Provider double: answers each user message through `reply` and counts calls.
#[derive(Clone)]
pub(crate) struct StubProvider {
    reply: Arc<Reply>,
    calls: Arc<AtomicUsize>,
    inputs: Arc<std::sync::Mutex<Vec<String>>>,
    user_input: Option<String>,
}

impl StubProvider {
    pub(crate) fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            reply: Arc::new(reply),
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(std::sync::Mutex::new(Vec::new())),
            user_input: None,
        }
    }

    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(anyhow!("connection refused")))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inputs(&self) -> Vec<String> {
        self.inputs.lock().expect("inputs lock").clone()
    }
}

impl Provider for StubProvider {
    fn with_model(self, _model: String) -> Self {
        self
    }

    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.user_input = Some(input);
        self
    }

    fn complete(self) -> ProviderFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = self.user_input.unwrap_or_default();
        self.inputs.lock().expect("inputs lock").push(input.clone());
        let result = (self.reply)(&input).map(|content| ProviderResponse {
            content,
            model: Some("stub".to_string()),
            usage: None,
        });
        Box::pin(async move { result })
    }

    fn list_models(&self) -> ModelsFuture {
        Box::pin(async { Ok(vec!["stub".to_string()]) })
    }
}
