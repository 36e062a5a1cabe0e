use std::ops::ControlFlow;

mod book;
mod chapter;

pub use book::{BookJob, BookPipeline, BookReport, ChapterFailure};
pub use chapter::{ChapterPipeline, ChapterReport};

/// Where one chapter is in its run. Translating and reconciling alternate per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Pending,
    Extracting,
    Translating { index: usize, total: usize },
    Reconciling { index: usize, total: usize },
    Done,
}

/// Progress side channel. Returning `ControlFlow::Break` asks the pipeline to
/// stop before the next block or chapter; a request already in flight finishes.
pub trait ProgressObserver {
    fn chapter_state(&mut self, _chapter: &str, _state: ChapterState) {}

    fn block_progress(&mut self, _chapter: &str, _done: usize, _total: usize) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn book_progress(&mut self, _done: usize, _total: usize) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}
