#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use epub_llm_translator::providers::{ModelsFuture, Provider, ProviderFuture, ProviderResponse};

type Reply = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Provider double answering every fragment through `reply`.
#[derive(Clone)]
pub struct StubProvider {
    reply: Arc<Reply>,
    reachable: bool,
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
    user_input: Option<String>,
}

impl StubProvider {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            reply: Arc::new(reply),
            reachable: true,
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
            user_input: None,
        }
    }

    /// Replaces a few English words, leaving the markup alone.
    pub fn dictionary() -> Self {
        Self::new(|input| {
            Ok(input
                .replace("Hello", "Olá")
                .replace("World", "Mundo")
                .replace("Goodbye", "Adeus"))
        })
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::dictionary()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Provider for StubProvider {
    fn with_model(self, _model: String) -> Self {
        self
    }

    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.user_input = Some(input);
        self
    }

    fn complete(self) -> ProviderFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = self.user_input.unwrap_or_default();
        self.inputs.lock().unwrap().push(input.clone());
        let result = (self.reply)(&input).map(|content| ProviderResponse {
            content,
            model: Some("stub".to_string()),
            usage: None,
        });
        Box::pin(async move { result })
    }

    fn list_models(&self) -> ModelsFuture {
        let reachable = self.reachable;
        Box::pin(async move {
            if reachable {
                Ok(vec!["qwen3:14b".to_string()])
            } else {
                Err(anyhow!("error sending request: connection refused"))
            }
        })
    }
}

pub fn xhtml(body: &str) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Chapter</title></head><body>{body}</body></html>"
    )
    .into_bytes()
}

/// Writes an EPUB 3 container whose manifest lists `chapters` in order.
pub fn write_epub(path: &Path, chapters: &[(&str, Vec<u8>)]) {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("mimetype", stored).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    writer.start_file("META-INF/container.xml", deflated).unwrap();
    writer
        .write_all(br#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#)
        .unwrap();

    let items = chapters
        .iter()
        .enumerate()
        .map(|(i, (href, _))| {
            format!(r#"<item id="c{i}" href="{href}" media-type="application/xhtml+xml"/>"#)
        })
        .collect::<String>();
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><package xmlns="http://www.idpf.org/2007/opf" version="3.0"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Test Book</dc:title><dc:creator>A. Writer</dc:creator></metadata><manifest><item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>{items}</manifest><spine/></package>"#
    );
    writer.start_file("OEBPS/content.opf", deflated).unwrap();
    writer.write_all(opf.as_bytes()).unwrap();
    writer.start_file("OEBPS/nav.xhtml", deflated).unwrap();
    writer.write_all(&xhtml("<nav><ol><li>Hello</li></ol></nav>")).unwrap();

    for (href, content) in chapters {
        writer.start_file(format!("OEBPS/{href}"), deflated).unwrap();
        writer.write_all(content).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    std::fs::write(path, bytes).unwrap();
}
