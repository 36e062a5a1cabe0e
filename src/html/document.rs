use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::*;
use kuchiki::{Attribute, ExpandedName, NodeData, NodeRef};
use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

static XML_PROLOG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(<\?xml[^>]*\?>)").expect("xml prolog pattern"));

static XML_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"encoding\s*=\s*(["'])([A-Za-z0-9._:-]+)["']"#).expect("xml encoding pattern")
});

static RAW_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:script|style)(?:\s[^>]*[^/])?>.*?</(?:script|style)\s*>")
        .expect("raw text pattern")
});

static SELF_CLOSING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9:_.-]*)(\s[^<>]*?)?\s*/>").expect("self-closing tag pattern")
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// One chapter's markup. The tree is mutated in place by the reconciler.
#[derive(Debug, Clone)]
pub struct Document {
    root: NodeRef,
    prolog: Option<String>,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        let source = source.trim_start_matches('\u{feff}');
        let (prolog, markup) = match XML_PROLOG.captures(source) {
            Some(captures) => {
                let whole = captures.get(0).map(|m| m.end()).unwrap_or(0);
                (
                    captures.get(1).map(|m| m.as_str().to_string()),
                    &source[whole..],
                )
            }
            None => (None, source),
        };
        Self {
            root: kuchiki::parse_html().one(expand_self_closing(markup)),
            prolog: prolog.map(|prolog| declare_utf8(&prolog)),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn body(&self) -> Option<NodeRef> {
        find_element(&self.root, "body")
    }

    /// True while `node` still hangs off this document's root.
    pub fn contains(&self, node: &NodeRef) -> bool {
        node.inclusive_ancestors()
            .last()
            .map(|top| top == self.root)
            .unwrap_or(false)
    }

    pub fn body_html(&self) -> String {
        self.body().map(|body| inner_html(&body)).unwrap_or_default()
    }

    /// Whitespace-collapsed text of the body.
    pub fn text(&self) -> String {
        let raw = self
            .body()
            .map(|body| body.text_contents())
            .unwrap_or_default();
        collapse_whitespace(&raw)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(prolog) = &self.prolog {
            out.push_str(prolog);
            out.push('\n');
        }
        for child in self.root.children() {
            write_node(&child, &mut out);
        }
        out
    }
}

/// Rewrites XHTML `<name .../>` into an explicit open and close pair so the
/// HTML parser keeps the element empty. Void elements and the contents of
/// `script`/`style` are left alone.
pub(crate) fn expand_self_closing(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len() + 64);
    let mut last = 0;
    for raw in RAW_TEXT.find_iter(markup) {
        expand_into(&markup[last..raw.start()], &mut out);
        out.push_str(raw.as_str());
        last = raw.end();
    }
    expand_into(&markup[last..], &mut out);
    out
}

fn expand_into(markup: &str, out: &mut String) {
    let expanded = SELF_CLOSING.replace_all(markup, |captures: &regex::Captures<'_>| {
        let name = &captures[1];
        if VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
            return captures[0].to_string();
        }
        let attributes = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        format!("<{name}{attributes}></{name}>")
    });
    out.push_str(&expanded);
}

/// The serialized chapter is always UTF-8, whatever the source declared.
fn declare_utf8(prolog: &str) -> String {
    match XML_ENCODING.captures(prolog) {
        Some(captures) if !captures[2].eq_ignore_ascii_case("utf-8") => {
            let (start, end) = captures
                .get(2)
                .map(|m| (m.start(), m.end()))
                .unwrap_or((0, 0));
            format!("{}utf-8{}", &prolog[..start], &prolog[end..])
        }
        _ => prolog.to_string(),
    }
}

pub fn outer_html(node: &NodeRef) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

pub fn inner_html(node: &NodeRef) -> String {
    let mut out = String::new();
    for child in node.children() {
        write_node(&child, &mut out);
    }
    out
}

pub(crate) fn element_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|element| element.name.local.to_string())
}

pub(crate) fn find_element(root: &NodeRef, name: &str) -> Option<NodeRef> {
    root.descendants().find(|node| {
        node.as_element()
            .map(|element| &*element.name.local == name)
            .unwrap_or(false)
    })
}

pub(crate) fn html_name(local: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NS), LocalName::from(local))
}

/// `<span marker="true">`, used for synthesized wrappers.
pub(crate) fn marked_span(marker: &str) -> NodeRef {
    NodeRef::new_element(
        html_name("span"),
        vec![(
            ExpandedName::new("", marker),
            Attribute {
                prefix: None,
                value: "true".to_string(),
            },
        )],
    )
}

pub(crate) fn has_marker(node: &NodeRef, marker: &str) -> bool {
    node.as_element()
        .map(|element| element.attributes.borrow().get(marker) == Some("true"))
        .unwrap_or(false)
}

pub(crate) fn replace_text(node: &NodeRef, text: &str) {
    let children = node.children().collect::<Vec<_>>();
    for child in children {
        child.detach();
    }
    node.append(NodeRef::new_text(text));
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn write_node(node: &NodeRef, out: &mut String) {
    match node.data() {
        NodeData::Element(element) => {
            let name: &str = &element.name.local;
            let is_html = &*element.name.ns == HTML_NS;
            out.push('<');
            out.push_str(name);
            for (key, attr) in element.attributes.borrow().map.iter() {
                out.push(' ');
                if let Some(prefix) = &attr.prefix {
                    out.push_str(prefix);
                    out.push(':');
                }
                out.push_str(&key.local);
                out.push_str("=\"");
                escape_into(&attr.value, true, out);
                out.push('"');
            }

            let has_children = node.first_child().is_some();
            if !has_children && (!is_html || VOID_ELEMENTS.contains(&name)) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if is_html && VOID_ELEMENTS.contains(&name) {
                // Void elements never carry content in well-formed input.
                return;
            }
            let raw = is_html && matches!(name, "script" | "style");
            for child in node.children() {
                match child.as_text() {
                    Some(text) if raw => out.push_str(&text.borrow()),
                    _ => write_node(&child, out),
                }
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Text(text) => escape_into(&text.borrow(), false, out),
        NodeData::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(&comment.borrow());
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction(pi) => {
            let pi = pi.borrow();
            out.push_str("<?");
            out.push_str(&pi.0);
            if !pi.1.is_empty() {
                out.push(' ');
                out.push_str(&pi.1);
            }
            out.push_str("?>");
        }
        NodeData::Doctype(doctype) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(&doctype.name);
            if !doctype.public_id.is_empty() {
                out.push_str(" PUBLIC \"");
                out.push_str(&doctype.public_id);
                out.push('"');
                if !doctype.system_id.is_empty() {
                    out.push_str(" \"");
                    out.push_str(&doctype.system_id);
                    out.push('"');
                }
            } else if !doctype.system_id.is_empty() {
                out.push_str(" SYSTEM \"");
                out.push_str(&doctype.system_id);
                out.push('"');
            }
            out.push_str(">\n");
        }
        _ => {
            for child in node.children() {
                write_node(&child, out);
            }
        }
    }
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
