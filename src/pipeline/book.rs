use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{ChapterPipeline, ChapterReport, ProgressObserver};
use crate::epub::Book;
use crate::html::Document;
use crate::languages::{self, Detection};
use crate::notify::Notifier;
use crate::providers::{OpenAI, Provider};
use crate::settings::Settings;
use crate::translations::TranslateOptions;
use crate::translator::Translator;

/// One book translation request.
#[derive(Debug, Clone)]
pub struct BookJob {
    pub input: PathBuf,
    /// Defaults to `translated_<input name>` next to the input.
    pub output: Option<PathBuf>,
    pub model: String,
    /// A language code or `auto`.
    pub source_lang: String,
    pub target_lang: String,
    /// Document indices in processing order; `None` selects every document.
    pub chapters: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub index: usize,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BookReport {
    pub output: PathBuf,
    /// The source language actually used, after detection.
    pub source_lang: String,
    pub chapters: Vec<(String, ChapterReport)>,
    pub failures: Vec<ChapterFailure>,
    pub stopped: bool,
}

impl BookReport {
    pub fn translated_blocks(&self) -> usize {
        self.chapters.iter().map(|(_, report)| report.translated).sum()
    }
}

pub struct BookPipeline<P: Provider> {
    translator: Translator<P>,
    settings: Settings,
}

impl BookPipeline<OpenAI> {
    pub fn from_settings(settings: Settings) -> Self {
        Self::new(OpenAI::from_settings(&settings), settings)
    }
}

impl<P: Provider> BookPipeline<P> {
    pub fn new(provider: P, settings: Settings) -> Self {
        Self {
            translator: Translator::new(provider),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the whole job. Precondition failures abort before any chapter is
    /// touched and are also sent to `notifier` as errors; chapter failures are
    /// reported and skipped.
    pub async fn run<N, O>(&self, job: &BookJob, notifier: &mut N, observer: &mut O) -> Result<BookReport>
    where
        N: Notifier,
        O: ProgressObserver,
    {
        match self.execute(job, notifier, observer).await {
            Ok(report) => Ok(report),
            Err(err) => {
                notifier.error(format!("{:#}", err));
                Err(err)
            }
        }
    }

    async fn execute<N, O>(&self, job: &BookJob, notifier: &mut N, observer: &mut O) -> Result<BookReport>
    where
        N: Notifier,
        O: ProgressObserver,
    {
        let model = job.model.trim();
        if model.is_empty() {
            bail!("no model name given; pass --model or set llm.model");
        }
        let mut book = self.open_book(&job.input, notifier)?;

        let selection = select_chapters(job.chapters.as_deref(), book.documents().len(), notifier);
        if selection.is_empty() {
            bail!("No valid chapters selected.");
        }

        let models = self
            .translator
            .provider()
            .list_models()
            .await
            .with_context(|| format!("LLM service at {} is unreachable", self.settings.endpoint))?;
        if !models.iter().any(|name| name == model) {
            debug!("model {} is not in the served list {:?}", model, models);
        }

        let source_lang = resolve_source_language(&book, &job.source_lang, notifier);
        let options = TranslateOptions::new(source_lang.clone(), job.target_lang.trim());
        info!(
            "translating {} chapter(s) with {} ({} -> {})",
            selection.len(),
            model,
            options.source_lang,
            options.lang
        );

        let pipeline = ChapterPipeline::new(&self.translator, model, &options);
        let total = selection.len();
        let mut chapters = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut stopped = false;

        for (done, &index) in selection.iter().enumerate() {
            let name = book.documents()[index].name.clone();
            match translate_chapter(&mut book, index, &pipeline, notifier, observer).await {
                Ok(report) => {
                    stopped = report.stopped;
                    chapters.push((name, report));
                }
                Err(err) => {
                    warn!("chapter '{}' failed: {:#}", name, err);
                    notifier.warning(format!(
                        "Error processing chapter '{}': {:#}. The chapter was left as it was.",
                        name, err
                    ));
                    failures.push(ChapterFailure {
                        index,
                        name,
                        error: format!("{:#}", err),
                    });
                }
            }

            let flow = observer.book_progress(done + 1, total);
            if stopped || (flow.is_break() && done + 1 < total) {
                stopped = true;
                notifier.info(format!(
                    "Translation stopped after {} of {} chapter(s).",
                    done + 1,
                    total
                ));
                break;
            }
        }

        let output = job
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&job.input));
        book.save(&output)?;
        info!("wrote {}", output.display());

        Ok(BookReport {
            output,
            source_lang,
            chapters,
            failures,
            stopped,
        })
    }

    fn open_book<N: Notifier>(&self, input: &Path, notifier: &mut N) -> Result<Book> {
        let metadata = fs::metadata(input)
            .ok()
            .filter(|metadata| metadata.is_file())
            .ok_or_else(|| anyhow!("input file not found: {}", input.display()))?;
        let limit = self.settings.max_input_bytes();
        if metadata.len() > limit {
            bail!(
                "EPUB file size ({:.2} MB) exceeds the limit of {} MB.",
                metadata.len() as f64 / (1024.0 * 1024.0),
                self.settings.max_input_mb
            );
        }

        let book = Book::open(input)
            .with_context(|| "Error reading EPUB file. It might be corrupted or not a valid EPUB")?;
        if !book.has_epub_mimetype() {
            notifier.warning(format!(
                "{} does not declare the 'application/epub+zip' mimetype. Processing will continue but may fail.",
                input.display()
            ));
        }
        Ok(book)
    }
}

async fn translate_chapter<P, N, O>(
    book: &mut Book,
    index: usize,
    pipeline: &ChapterPipeline<'_, P>,
    notifier: &mut N,
    observer: &mut O,
) -> Result<ChapterReport>
where
    P: Provider,
    N: Notifier,
    O: ProgressObserver,
{
    let name = book.document(index)?.name.clone();
    let content = book.content_str(index)?;
    let document = Document::parse(&content);
    let report = pipeline.run(&document, &name, notifier, observer).await;
    if report.translated > 0 {
        book.set_content(index, document.serialize().into_bytes())?;
    }
    Ok(report)
}

/// Keeps the requested order, dropping out-of-range and repeated indices.
fn select_chapters<N: Notifier>(requested: Option<&[usize]>, available: usize, notifier: &mut N) -> Vec<usize> {
    let Some(requested) = requested else {
        return (0..available).collect();
    };

    let mut seen = BTreeSet::new();
    let mut selection = Vec::with_capacity(requested.len());
    let mut out_of_range = Vec::new();
    for &index in requested {
        if index >= available {
            out_of_range.push(index);
        } else if seen.insert(index) {
            selection.push(index);
        } else {
            debug!("chapter index {} selected twice", index);
        }
    }
    if !out_of_range.is_empty() {
        notifier.warning(format!(
            "Ignoring chapter index(es) {:?}: the book has {} chapter document(s).",
            out_of_range, available
        ));
    }
    selection
}

fn resolve_source_language<N: Notifier>(book: &Book, requested: &str, notifier: &mut N) -> String {
    if !languages::is_auto(requested) {
        return requested.trim().to_string();
    }
    let fallback = languages::FALLBACK_SOURCE_LANG;
    match languages::detect_book_language(book) {
        Detection::Detected(code) => {
            notifier.info(format!("Auto-detected source language for translation as: {}", code));
            code.to_string()
        }
        Detection::NoText => {
            notifier.info(format!(
                "Not enough text in EPUB to auto-detect source language. Assuming '{}'.",
                fallback
            ));
            fallback.to_string()
        }
        Detection::Unsupported(_) | Detection::Uncertain => {
            notifier.info(format!(
                "Could not robustly auto-detect source language from EPUB content. Assuming '{}'.",
                fallback
            ));
            fallback.to_string()
        }
    }
}

pub(crate) fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book.epub".to_string());
    input.with_file_name(format!("translated_{}", name))
}
