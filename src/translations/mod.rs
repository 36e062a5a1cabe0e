use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

/// Source/target pair for one translation job. `source_lang` may still be `auto`
/// when a caller translates outside the book pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateOptions {
    pub source_lang: String,
    pub lang: String,
}

impl TranslateOptions {
    pub fn new(source_lang: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            lang: lang.into(),
        }
    }
}

/// Instruction sent as the system message for every fragment of a job.
pub fn render_system_prompt(source_lang: &str, target_lang: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", source_lang.trim());
    context.insert("target_lang", target_lang.trim());

    let rendered = Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")?;
    Ok(rendered.trim().to_string())
}
