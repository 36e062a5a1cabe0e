use tracing::warn;

use super::Book;
use crate::html::document::{collapse_whitespace, element_name};
use crate::html::Document;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSummary {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub char_count: usize,
    pub preview: String,
}

impl ChapterSummary {
    pub fn label(&self) -> String {
        format!(
            "Ch. {}: {} ({} chars) - \"{}...\"",
            self.index + 1,
            self.name,
            self.char_count,
            self.preview
        )
    }
}

/// One entry per content document, named after its first `h1`/`h2`.
pub fn chapter_summaries(book: &Book) -> Vec<ChapterSummary> {
    book.documents()
        .iter()
        .enumerate()
        .map(|(index, document)| {
            let content = match book.content_str(index) {
                Ok(content) => content,
                Err(err) => {
                    warn!("could not read {}: {:#}", document.name, err);
                    String::new()
                }
            };
            let parsed = Document::parse(&content);
            let text = parsed.text();
            let heading = parsed
                .root()
                .descendants()
                .find(|node| matches!(element_name(node).as_deref(), Some("h1" | "h2")))
                .map(|node| collapse_whitespace(&node.text_contents()))
                .filter(|heading| !heading.is_empty());
            let name = heading
                .or_else(|| Some(document.name.clone()).filter(|name| !name.is_empty()))
                .unwrap_or_else(|| format!("Chapter Document {}", index + 1));

            ChapterSummary {
                index,
                id: document.name.clone(),
                name,
                char_count: text.chars().count(),
                preview: text.chars().take(PREVIEW_CHARS).collect::<String>().trim().to_string(),
            }
        })
        .collect()
}
