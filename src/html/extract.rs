use kuchiki::NodeRef;

use super::document::{element_name, has_marker, marked_span, outer_html, Document};

/// Block tags in the order they are gathered. Units are collected tag by tag, so a
/// chapter's `<p>`s all come before its headings, list items and containers.
pub const BLOCK_TAGS: [&str; 14] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "div", "caption", "td", "th", "dt", "dd",
];

/// Marks a `<span>` created around a bare text run of `<body>`.
pub const TEXT_NODE_MARKER: &str = "data-text-node";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Block,
    TextWrapper,
}

/// Handle to a node selected for translation. The node may be detached later by
/// the reconciliation of an ancestor; check [`TranslatableUnit::is_live`] before use.
#[derive(Debug, Clone)]
pub struct TranslatableUnit {
    node: NodeRef,
    kind: UnitKind,
}

impl TranslatableUnit {
    pub(crate) fn new(node: NodeRef, kind: UnitKind) -> Self {
        Self { node, kind }
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn tag_name(&self) -> String {
        element_name(&self.node).unwrap_or_default()
    }

    pub fn is_live(&self, document: &Document) -> bool {
        document.contains(&self.node)
    }

    pub fn outer_html(&self) -> String {
        outer_html(&self.node)
    }
}

#[derive(Debug, Clone)]
pub enum Extraction {
    Blocks(Vec<TranslatableUnit>),
    /// No block tag matched; bare body text was wrapped instead.
    TextRuns(Vec<TranslatableUnit>),
    NothingToTranslate,
}

impl Extraction {
    pub fn len(&self) -> usize {
        match self {
            Extraction::Blocks(units) | Extraction::TextRuns(units) => units.len(),
            Extraction::NothingToTranslate => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_units(self) -> Vec<TranslatableUnit> {
        match self {
            Extraction::Blocks(units) | Extraction::TextRuns(units) => units,
            Extraction::NothingToTranslate => Vec::new(),
        }
    }
}

pub fn extract_units(document: &Document) -> Extraction {
    let mut units = Vec::new();
    for tag in BLOCK_TAGS {
        units.extend(
            document
                .root()
                .descendants()
                .filter(|node| element_name(node).as_deref() == Some(tag))
                .map(|node| TranslatableUnit::new(node, UnitKind::Block)),
        );
    }
    if !units.is_empty() {
        return Extraction::Blocks(units);
    }

    let wrapped = wrap_body_text_runs(document);
    if wrapped.is_empty() {
        Extraction::NothingToTranslate
    } else {
        Extraction::TextRuns(wrapped)
    }
}

fn wrap_body_text_runs(document: &Document) -> Vec<TranslatableUnit> {
    let Some(body) = document.body() else {
        return Vec::new();
    };
    let runs = body
        .children()
        .filter(|child| {
            child
                .as_text()
                .map(|text| !text.borrow().trim().is_empty())
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    runs.into_iter()
        .map(|text| {
            let wrapper = marked_span(TEXT_NODE_MARKER);
            text.insert_before(wrapper.clone());
            wrapper.append(text);
            TranslatableUnit::new(wrapper, UnitKind::TextWrapper)
        })
        .collect()
}

pub(crate) fn is_text_wrapper(node: &NodeRef) -> bool {
    element_name(node).as_deref() == Some("span") && has_marker(node, TEXT_NODE_MARKER)
}
