use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use epub_llm_translator::{ChapterState, Notice, Notifier, ProgressObserver};

#[derive(Parser, Debug)]
#[command(
    name = "epub-llm-translator",
    version,
    about = "Translate EPUB books block by block with a local LLM"
)]
struct Cli {
    /// EPUB file to translate
    input: Option<PathBuf>,

    /// Output path (default: translated_<input name> next to the input)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Model served by the endpoint (default from settings: qwen3:14b)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Source language code. Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language code (default from settings: PT-BR)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Chapter document indices to translate, comma separated (default: all)
    #[arg(short = 'c', long = "chapters", value_delimiter = ',')]
    chapters: Option<Vec<usize>>,

    /// List the book's metadata and chapter documents and exit
    #[arg(long = "list-chapters")]
    list_chapters: bool,

    /// Show the known language codes and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// OpenAI-compatible base URL (overrides settings)
    #[arg(long = "endpoint")]
    endpoint: Option<String>,

    /// API key sent as bearer token (overrides settings)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Per-request timeout in seconds (overrides settings)
    #[arg(long = "timeout")]
    timeout: Option<u64>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    epub_llm_translator::logging::init(cli.verbose)?;

    let progress = MultiProgress::new();
    let mut notifier = ConsoleNotifier {
        progress: progress.clone(),
    };
    let mut observer = ProgressBars::new(progress);

    let output = epub_llm_translator::run(
        epub_llm_translator::Config {
            input: cli.input,
            output: cli.output,
            model: cli.model,
            source_lang: cli.source_lang,
            lang: cli.lang,
            chapters: cli.chapters,
            endpoint: cli.endpoint,
            key: cli.key,
            timeout_secs: cli.timeout,
            settings_path: cli.read_settings,
            list_chapters: cli.list_chapters,
            show_languages: cli.show_languages,
        },
        &mut notifier,
        &mut observer,
    )
    .await;
    observer.finish();

    println!("{}", output?);
    Ok(())
}

struct ConsoleNotifier {
    progress: MultiProgress,
}

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, notice: Notice) {
        let label = notice.severity.as_str();
        self.progress
            .suspend(|| eprintln!("[{}] {}", label, notice.message));
    }
}

struct ProgressBars {
    progress: MultiProgress,
    book: Option<ProgressBar>,
    chapter: Option<ProgressBar>,
}

impl ProgressBars {
    fn new(progress: MultiProgress) -> Self {
        Self {
            progress,
            book: None,
            chapter: None,
        }
    }

    fn bar(&self, total: usize, unit: &str) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} {{msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = self.progress.add(ProgressBar::new(total as u64));
        bar.set_style(style);
        bar
    }

    fn finish(&mut self) {
        if let Some(bar) = self.chapter.take() {
            bar.finish_and_clear();
        }
        if let Some(bar) = self.book.take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressObserver for ProgressBars {
    fn chapter_state(&mut self, chapter: &str, state: ChapterState) {
        match state {
            ChapterState::Pending => {
                if let Some(bar) = self.chapter.take() {
                    bar.finish_and_clear();
                }
            }
            ChapterState::Translating { index: 0, total } => {
                let bar = self.bar(total, "blocks");
                bar.set_message(chapter.to_string());
                self.chapter = Some(bar);
            }
            ChapterState::Done => {
                if let Some(bar) = self.chapter.take() {
                    bar.finish_and_clear();
                }
            }
            _ => {}
        }
    }

    fn block_progress(&mut self, _chapter: &str, done: usize, _total: usize) -> ControlFlow<()> {
        if let Some(bar) = &self.chapter {
            bar.set_position(done as u64);
        }
        ControlFlow::Continue(())
    }

    fn book_progress(&mut self, done: usize, total: usize) -> ControlFlow<()> {
        if self.book.is_none() {
            let bar = self.bar(total, "chapters");
            bar.set_message("Translating");
            self.book = Some(bar);
        }
        if let Some(bar) = &self.book {
            bar.set_position(done as u64);
        }
        ControlFlow::Continue(())
    }
}
