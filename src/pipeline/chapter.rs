use tracing::{debug, info};

use super::{ChapterState, ProgressObserver};
use crate::html::{extract_units, reconcile, BlockContext, Document, Extraction, ReconcileOutcome};
use crate::notify::Notifier;
use crate::providers::Provider;
use crate::translations::TranslateOptions;
use crate::translator::{FallbackReason, TranslationRequest, Translator};

/// What happened to each block of one chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterReport {
    pub blocks: usize,
    pub translated: usize,
    pub unchanged: usize,
    pub stale: usize,
    /// Blocks kept in the original language because the request failed.
    pub fallbacks: usize,
    /// Text-only replacements that lost inline markup.
    pub degraded: usize,
    /// Replacements that discarded part of the model output.
    pub lossy: usize,
    pub failed: usize,
    pub nothing_to_translate: bool,
    pub stopped: bool,
}

/// Translates one chapter document in place, one block at a time.
pub struct ChapterPipeline<'a, P: Provider> {
    translator: &'a Translator<P>,
    model: &'a str,
    options: &'a TranslateOptions,
}

impl<'a, P: Provider> ChapterPipeline<'a, P> {
    pub fn new(translator: &'a Translator<P>, model: &'a str, options: &'a TranslateOptions) -> Self {
        Self {
            translator,
            model,
            options,
        }
    }

    pub async fn run<N, O>(
        &self,
        document: &Document,
        chapter: &str,
        notifier: &mut N,
        observer: &mut O,
    ) -> ChapterReport
    where
        N: Notifier,
        O: ProgressObserver,
    {
        let mut report = ChapterReport::default();
        observer.chapter_state(chapter, ChapterState::Pending);
        observer.chapter_state(chapter, ChapterState::Extracting);

        let extraction = extract_units(document);
        if extraction.is_empty() {
            report.nothing_to_translate = true;
            notifier.info(format!("No translatable content found in '{}'.", chapter));
            observer.chapter_state(chapter, ChapterState::Done);
            return report;
        }
        let kind = match extraction {
            Extraction::TextRuns(_) => "bare text runs",
            _ => "blocks",
        };
        let total = extraction.len();
        report.blocks = total;
        info!("chapter '{}': {} {} to translate", chapter, total, kind);
        let units = extraction.into_units();

        for (index, unit) in units.iter().enumerate() {
            let context = BlockContext {
                chapter,
                index,
                total,
            };
            if !unit.is_live(document) {
                debug!(
                    "chapter '{}': block {}/{} (<{}>) was replaced with an ancestor",
                    chapter,
                    index + 1,
                    total,
                    unit.tag_name()
                );
                report.stale += 1;
            } else {
                observer.chapter_state(chapter, ChapterState::Translating { index, total });
                let fragment = unit.outer_html();
                debug!(
                    "chapter '{}': translating block {}/{} (<{}>, {} chars)",
                    chapter,
                    index + 1,
                    total,
                    unit.tag_name(),
                    fragment.len()
                );
                let request = TranslationRequest::new(fragment, self.model, self.options);
                let result = self.translator.translate(request, notifier).await;
                match result.fallback_reason() {
                    None => {
                        observer.chapter_state(chapter, ChapterState::Reconciling { index, total });
                        let outcome = reconcile(unit, result.text(), document, context, notifier);
                        record(&mut report, outcome);
                    }
                    Some(reason) => {
                        debug!(
                            "chapter '{}': block {}/{} kept as is ({})",
                            chapter,
                            index + 1,
                            total,
                            reason.as_str()
                        );
                        if reason == FallbackReason::RequestFailed {
                            report.fallbacks += 1;
                        } else {
                            report.unchanged += 1;
                        }
                    }
                }
            }

            let flow = observer.block_progress(chapter, index + 1, total);
            if flow.is_break() && index + 1 < total {
                info!(
                    "chapter '{}': stopped after block {}/{}",
                    chapter,
                    index + 1,
                    total
                );
                report.stopped = true;
                break;
            }
        }

        observer.chapter_state(chapter, ChapterState::Done);
        report
    }
}

fn record(report: &mut ChapterReport, outcome: ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Stale => report.stale += 1,
        ReconcileOutcome::Unchanged => report.unchanged += 1,
        ReconcileOutcome::Replaced => report.translated += 1,
        ReconcileOutcome::ReplacedLossy { .. } => {
            report.translated += 1;
            report.lossy += 1;
        }
        ReconcileOutcome::TextOnly { degraded } => {
            report.translated += 1;
            if degraded {
                report.degraded += 1;
            }
        }
        ReconcileOutcome::Failed => report.failed += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NoticeLog, Severity};
    use crate::pipeline::NoProgress;
    use crate::test_util::StubProvider;
    use anyhow::anyhow;
    use std::ops::ControlFlow;

    fn options() -> TranslateOptions {
        TranslateOptions::new("EN", "PT-BR")
    }

    fn dictionary(input: &str) -> anyhow::Result<String> {
        Ok(input
            .replace("Hello", "Olá")
            .replace("World", "Mundo")
            .replace("Inner", "Interno"))
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<ChapterState>,
        progress: Vec<(usize, usize)>,
        stop_after: Option<usize>,
    }

    impl ProgressObserver for Recorder {
        fn chapter_state(&mut self, _chapter: &str, state: ChapterState) {
            self.states.push(state);
        }

        fn block_progress(&mut self, _chapter: &str, done: usize, total: usize) -> ControlFlow<()> {
            self.progress.push((done, total));
            match self.stop_after {
                Some(limit) if done >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    #[tokio::test]
    async fn translates_blocks_in_order_without_warnings() {
        let provider = StubProvider::new(dictionary);
        let translator = Translator::new(provider.clone());
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        let document = Document::parse("<html><body><p>Hello</p><p>World</p></body></html>");
        let mut notices = NoticeLog::new();
        let mut recorder = Recorder::default();

        let report = pipeline
            .run(&document, "ch1.xhtml", &mut notices, &mut recorder)
            .await;

        assert_eq!(document.body_html(), "<p>Olá</p><p>Mundo</p>");
        assert_eq!(report.translated, 2);
        assert_eq!(notices.count(Severity::Warning), 0);
        assert_eq!(recorder.progress, vec![(1, 2), (2, 2)]);
        assert_eq!(recorder.states.first(), Some(&ChapterState::Pending));
        assert_eq!(recorder.states.last(), Some(&ChapterState::Done));
        assert!(recorder.states.contains(&ChapterState::Reconciling { index: 1, total: 2 }));
    }

    #[tokio::test]
    async fn nested_block_is_not_translated_twice() {
        let provider = StubProvider::new(dictionary);
        let translator = Translator::new(provider.clone());
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        // <p> units come before <div> units, so the inner paragraph goes first
        // and the container is then translated around it.
        let document = Document::parse(
            "<html><body><div><span>Hello</span><div><p>Inner</p></div></div></body></html>",
        );
        let mut notices = NoticeLog::new();
        let mut recorder = Recorder::default();

        let report = pipeline
            .run(&document, "ch1.xhtml", &mut notices, &mut recorder)
            .await;

        assert_eq!(report.blocks, 3);
        assert_eq!(report.stale, 1);
        assert_eq!(provider.calls(), 2);
        let translating = recorder
            .states
            .iter()
            .filter(|state| matches!(state, ChapterState::Translating { .. }))
            .count();
        assert_eq!(translating, 2);
        assert!(!recorder.states.contains(&ChapterState::Translating { index: 2, total: 3 }));
        assert_eq!(recorder.progress.last(), Some(&(3, 3)));
        assert_eq!(
            document.body_html(),
            "<div><span>Olá</span><div><p>Interno</p></div></div>"
        );
    }

    #[tokio::test]
    async fn failed_block_keeps_its_markup_and_siblings_still_translate() {
        let provider = StubProvider::new(|input| {
            if input.contains("World") {
                Err(anyhow!("timed out"))
            } else {
                dictionary(input)
            }
        });
        let translator = Translator::new(provider.clone());
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        let document = Document::parse(
            "<html><body><p>Hello</p><p class=\"x\">World <b>!</b></p><p>Hello</p></body></html>",
        );
        let mut notices = NoticeLog::new();

        let report = pipeline
            .run(&document, "ch1.xhtml", &mut notices, &mut NoProgress)
            .await;

        assert_eq!(
            document.body_html(),
            "<p>Olá</p><p class=\"x\">World <b>!</b></p><p>Olá</p>"
        );
        assert_eq!(report.fallbacks, 1);
        assert_eq!(report.translated, 2);
        assert_eq!(notices.count(Severity::Warning), 1);
    }

    #[tokio::test]
    async fn bare_text_response_degrades_to_text_replacement() {
        let provider = StubProvider::new(|_| Ok("Olá Mundo".to_string()));
        let translator = Translator::new(provider);
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        let document = Document::parse("<html><body><p>Hello</p></body></html>");
        let mut notices = NoticeLog::new();

        let report = pipeline
            .run(&document, "ch1.xhtml", &mut notices, &mut NoProgress)
            .await;

        assert_eq!(document.body_html(), "<p>Olá Mundo</p>");
        assert_eq!(report.degraded, 1);
        assert_eq!(notices.count(Severity::Warning), 1);
    }

    #[tokio::test]
    async fn empty_chapter_reports_nothing_to_translate() {
        let provider = StubProvider::new(dictionary);
        let translator = Translator::new(provider.clone());
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        let document = Document::parse("<html><body><img src=\"cover.png\"/></body></html>");
        let before = document.serialize();
        let mut notices = NoticeLog::new();
        let mut recorder = Recorder::default();

        let report = pipeline
            .run(&document, "cover.xhtml", &mut notices, &mut recorder)
            .await;

        assert!(report.nothing_to_translate);
        assert_eq!(document.serialize(), before);
        assert_eq!(provider.calls(), 0);
        assert_eq!(notices.count(Severity::Info), 1);
        assert_eq!(
            recorder.states,
            vec![ChapterState::Pending, ChapterState::Extracting, ChapterState::Done]
        );
    }

    #[tokio::test]
    async fn observer_can_stop_before_the_next_block() {
        let provider = StubProvider::new(dictionary);
        let translator = Translator::new(provider.clone());
        let options = options();
        let pipeline = ChapterPipeline::new(&translator, "qwen3:14b", &options);
        let document =
            Document::parse("<html><body><p>Hello</p><p>World</p><p>Hello</p></body></html>");
        let mut notices = NoticeLog::new();
        let mut recorder = Recorder {
            stop_after: Some(1),
            ..Recorder::default()
        };

        let report = pipeline
            .run(&document, "ch1.xhtml", &mut notices, &mut recorder)
            .await;

        assert!(report.stopped);
        assert_eq!(provider.calls(), 1);
        assert_eq!(
            document.body_html(),
            "<p>Olá</p><p>World</p><p>Hello</p>"
        );
    }
}
