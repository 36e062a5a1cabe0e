use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

pub mod epub;
pub mod html;
pub mod languages;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod settings;
pub mod translations;
mod translator;

#[cfg(test)]
mod test_util;

pub use notify::{Notice, NoticeLog, Notifier, Severity};
pub use pipeline::{BookJob, BookPipeline, BookReport, ChapterState, NoProgress, ProgressObserver};
pub use providers::{OpenAI, Provider, ProviderUsage};
pub use settings::Settings;
pub use translations::TranslateOptions;
pub use translator::{strip_reasoning, FallbackReason, TranslationRequest, TranslationResult, Translator};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub model: Option<String>,
    pub source_lang: Option<String>,
    pub lang: Option<String>,
    pub chapters: Option<Vec<usize>>,
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub settings_path: Option<String>,
    pub list_chapters: bool,
    pub show_languages: bool,
}

pub async fn run<N, O>(config: Config, notifier: &mut N, observer: &mut O) -> Result<String>
where
    N: Notifier,
    O: ProgressObserver,
{
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    if config.show_languages {
        return Ok(format_languages());
    }

    let input = config
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input EPUB given"))?;
    if config.list_chapters {
        let book = epub::Book::open(&input)?;
        return Ok(format_chapter_list(&book));
    }

    let job = BookJob {
        input,
        output: config.output.clone(),
        model: config.model.clone().unwrap_or_else(|| settings.model.clone()),
        source_lang: config
            .source_lang
            .clone()
            .unwrap_or_else(|| settings.source_lang.clone()),
        target_lang: config.lang.clone().unwrap_or_else(|| settings.target_lang.clone()),
        chapters: config.chapters.clone(),
    };
    let pipeline = BookPipeline::from_settings(settings);
    let report = pipeline.run(&job, notifier, observer).await?;
    Ok(format_report(&report))
}

fn apply_overrides(settings: &mut Settings, config: &Config) {
    if let Some(endpoint) = non_blank(config.endpoint.as_deref()) {
        settings.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if let Some(key) = non_blank(config.key.as_deref()) {
        settings.api_key = key.to_string();
    }
    if let Some(model) = non_blank(config.model.as_deref()) {
        settings.model = model.to_string();
    }
    if let Some(timeout) = config.timeout_secs.filter(|secs| *secs > 0) {
        settings.timeout_secs = timeout;
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn format_languages() -> String {
    languages::COMMON_LANGUAGES
        .iter()
        .map(|(code, name)| format!("{}\t{}", code, name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_chapter_list(book: &epub::Book) -> String {
    let metadata = book.metadata();
    let summaries = epub::chapter_summaries(book);
    let mut lines = vec![
        format!("Title: {}", metadata.display_title()),
        format!("Author: {}", metadata.display_authors()),
    ];
    if let Some(language) = &metadata.language {
        lines.push(format!("Language: {}", language));
    }
    if let Some(code) = languages::suggest_source_language(book) {
        let name = languages::display_name(code).unwrap_or(code);
        lines.push(format!("Detected source language: {} ({})", code, name));
    }
    lines.push(format!(
        "{} chapter documents found in the EPUB.",
        summaries.len()
    ));
    lines.extend(summaries.iter().map(|summary| summary.label()));
    lines.join("\n")
}

fn format_report(report: &BookReport) -> String {
    let mut lines = vec![format!(
        "Translated {} block(s) in {} chapter(s) from {}.",
        report.translated_blocks(),
        report.chapters.len(),
        report.source_lang
    )];
    for failure in &report.failures {
        lines.push(format!(
            "Chapter {} ({}) was left untranslated: {}",
            failure.index, failure.name, failure.error
        ));
    }
    if report.stopped {
        lines.push("Stopped before all selected chapters were processed.".to_string());
    }
    lines.push(format!("Output: {}", report.output.display()));
    lines.join("\n")
}
