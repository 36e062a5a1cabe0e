use anyhow::{anyhow, Result};
use kuchiki::traits::*;
use kuchiki::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::document::{
    element_name, expand_self_closing, html_name, marked_span, replace_text, Document,
};
use super::extract::{is_text_wrapper, TranslatableUnit};
use crate::notify::Notifier;

/// Marks a `<span>` synthesized to hold a translation that had no element of its own.
pub const TRANSLATED_WRAPPER_MARKER: &str = "data-translated-wrapper";

static EXPLICIT_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<body[\s>/]").expect("body tag pattern"));

/// A model response parsed into nodes that can be moved into the chapter tree.
#[derive(Debug)]
pub struct ParsedFragment {
    // Owns the parsed tree while nodes are picked out of it.
    _tree: NodeRef,
    roots: Vec<NodeRef>,
    explicit_body: bool,
}

impl ParsedFragment {
    /// Responses that carry their own `<body>` are parsed as whole documents.
    /// Anything else is parsed as a fragment inside `context`, the element name
    /// of the unit's parent, so table cells and list items keep their tags.
    pub fn parse(text: &str, context: &str) -> Self {
        if EXPLICIT_BODY.is_match(text) {
            let document = Document::parse(text);
            let roots = document
                .body()
                .map(|body| body.children().collect())
                .unwrap_or_default();
            return Self {
                _tree: document.root().clone(),
                roots,
                explicit_body: true,
            };
        }

        let tree =
            kuchiki::parse_fragment(html_name(context), Vec::new()).one(expand_self_closing(text));
        // Fragment parsing puts the nodes under a synthetic <html> element.
        let roots = tree
            .first_child()
            .map(|html| html.children().collect())
            .unwrap_or_default();
        Self {
            _tree: tree,
            roots,
            explicit_body: false,
        }
    }

    pub fn roots(&self) -> &[NodeRef] {
        &self.roots
    }

    pub fn has_explicit_body(&self) -> bool {
        self.explicit_body
    }

    pub fn plain_text(&self) -> String {
        self.roots.iter().map(|node| node.text_contents()).collect()
    }
}

/// Which rule picked the replacement for a translated block. Checked in
/// declaration order; the first match wins.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Explicit body holding exactly one element.
    SingleElement(NodeRef),
    /// Explicit body with several nodes: the first element is kept, the
    /// `dropped` other non-blank nodes are lost.
    FirstElementOfMany { node: NodeRef, dropped: usize },
    /// Explicit body with content but no element, moved into a marked span.
    WrappedContent(NodeRef),
    /// No body: the first top-level node, when it is an element.
    TopLevelElement(NodeRef),
    Unresolved,
}

impl Resolution {
    pub fn replacement(&self) -> Option<&NodeRef> {
        match self {
            Resolution::SingleElement(node)
            | Resolution::FirstElementOfMany { node, .. }
            | Resolution::WrappedContent(node)
            | Resolution::TopLevelElement(node) => Some(node),
            Resolution::Unresolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::SingleElement(_) => "single_element",
            Resolution::FirstElementOfMany { .. } => "first_element_of_many",
            Resolution::WrappedContent(_) => "wrapped_content",
            Resolution::TopLevelElement(_) => "top_level_element",
            Resolution::Unresolved => "unresolved",
        }
    }
}

pub fn resolve_replacement(fragment: &ParsedFragment) -> Resolution {
    if !fragment.explicit_body {
        return match fragment.roots.first() {
            Some(first) if first.as_element().is_some() => {
                Resolution::TopLevelElement(first.clone())
            }
            _ => Resolution::Unresolved,
        };
    }

    let content = fragment
        .roots
        .iter()
        .filter(|node| !is_blank_text(node))
        .collect::<Vec<_>>();
    if content.is_empty() {
        return Resolution::Unresolved;
    }

    if let [only] = content.as_slice()
        && only.as_element().is_some()
    {
        return Resolution::SingleElement((*only).clone());
    }

    if let Some(first) = content.iter().find(|node| node.as_element().is_some()) {
        return Resolution::FirstElementOfMany {
            node: (*first).clone(),
            dropped: content.len() - 1,
        };
    }

    let wrapper = marked_span(TRANSLATED_WRAPPER_MARKER);
    for node in &fragment.roots {
        wrapper.append(node.clone());
    }
    Resolution::WrappedContent(wrapper)
}

/// Where a block sits, for log lines and notices.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    pub chapter: &'a str,
    pub index: usize,
    pub total: usize,
}

impl BlockContext<'_> {
    fn position(&self) -> String {
        format!("{}/{}", self.index + 1, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The unit was detached by an earlier replacement.
    Stale,
    Unchanged,
    Replaced,
    ReplacedLossy { dropped: usize },
    /// Only the text was swapped; `degraded` is false for synthesized text wrappers.
    TextOnly { degraded: bool },
    Failed,
}

pub fn reconcile<N: Notifier>(
    unit: &TranslatableUnit,
    translated: &str,
    document: &Document,
    context: BlockContext<'_>,
    notifier: &mut N,
) -> ReconcileOutcome {
    if !unit.is_live(document) {
        debug!(
            "skipping detached <{}> (block {}) in '{}'",
            unit.tag_name(),
            context.position(),
            context.chapter
        );
        return ReconcileOutcome::Stale;
    }

    let translated = translated.trim();
    if translated.is_empty() || translated == unit.outer_html().trim() {
        return ReconcileOutcome::Unchanged;
    }

    match apply(unit, translated, context, notifier) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(
                "could not reconcile block {} (<{}>) in '{}': {:#}",
                context.position(),
                unit.tag_name(),
                context.chapter,
                err
            );
            notifier.warning(format!(
                "Could not process translated block in '{}': {}. Original content kept for this block.",
                context.chapter, err
            ));
            ReconcileOutcome::Failed
        }
    }
}

fn apply<N: Notifier>(
    unit: &TranslatableUnit,
    translated: &str,
    context: BlockContext<'_>,
    notifier: &mut N,
) -> Result<ReconcileOutcome> {
    let node = unit.node();
    let parent = node
        .parent()
        .ok_or_else(|| anyhow!("block <{}> has no parent", unit.tag_name()))?;
    let parent_name = element_name(&parent)
        .filter(|name| name != "html")
        .unwrap_or_else(|| "body".to_string());

    let fragment = ParsedFragment::parse(translated, &parent_name);
    let resolution = resolve_replacement(&fragment);
    debug!(
        "block {} in '{}' resolved as {}",
        context.position(),
        context.chapter,
        resolution.as_str()
    );

    if let Some(replacement) = resolution.replacement() {
        node.insert_before(replacement.clone());
        node.detach();
    }

    let outcome = match resolution {
        Resolution::FirstElementOfMany { dropped, .. } => {
            warn!(
                "block {} in '{}': discarded {} node(s) after the first element",
                context.position(),
                context.chapter,
                dropped
            );
            notifier.warning(format!(
                "Translated block {} in '{}' contained {} extra node(s) after its first element; that content was discarded.",
                context.position(),
                context.chapter,
                dropped
            ));
            ReconcileOutcome::ReplacedLossy { dropped }
        }
        Resolution::Unresolved => {
            let text = fragment.plain_text();
            if text.trim().is_empty() {
                return Ok(ReconcileOutcome::Unchanged);
            }
            let degraded = !is_text_wrapper(node);
            if degraded {
                warn!(
                    "block {} in '{}' was not a single element; replacing text only",
                    context.position(),
                    context.chapter
                );
                notifier.warning(format!(
                    "Translated content for a block in '{}' was not a single valid HTML element. Its text was inserted without the original inline markup.",
                    context.chapter
                ));
            }
            replace_text(node, &text);
            ReconcileOutcome::TextOnly { degraded }
        }
        _ => ReconcileOutcome::Replaced,
    };
    Ok(outcome)
}

fn is_blank_text(node: &NodeRef) -> bool {
    node.as_text()
        .map(|text| text.borrow().trim().is_empty())
        .unwrap_or(false)
}
