use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

mod decode;
mod package;
mod summary;

pub use package::BookMetadata;
pub use summary::{chapter_summaries, ChapterSummary};

pub const EPUB_MIME: &str = "application/epub+zip";
const MIMETYPE_ENTRY: &str = "mimetype";

#[derive(Debug, Clone)]
struct ArchiveEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// One content document of the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDocument {
    pub id: String,
    /// The manifest href, relative to the package file.
    pub name: String,
    path: String,
    entry: usize,
}

impl BookDocument {
    /// Location inside the archive.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// An EPUB held in memory. Entries other than the content documents are
/// written back untouched.
#[derive(Debug, Clone)]
pub struct Book {
    entries: Vec<ArchiveEntry>,
    documents: Vec<BookDocument>,
    metadata: BookMetadata,
}

impl Book {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("failed to open EPUB {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).with_context(|| "failed to read zip archive")?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .with_context(|| "failed to read zip entry")?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .with_context(|| format!("failed to read zip entry {}", file.name()))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        let find = |name: &str| entries.iter().position(|entry| entry.name == name);
        let container = find(package::CONTAINER_PATH)
            .ok_or_else(|| anyhow!("not an EPUB: missing {}", package::CONTAINER_PATH))?;
        let opf_path = package::rootfile_path(&entries[container].data)?;
        let opf = find(&opf_path)
            .ok_or_else(|| anyhow!("package document {} is missing", opf_path))?;
        let package = package::parse_package(&entries[opf].data, &opf_path)?;

        let mut documents = Vec::new();
        for item in package.manifest.into_iter().filter(|item| item.is_document()) {
            match find(&item.path) {
                Some(entry) => documents.push(BookDocument {
                    id: item.id,
                    name: item.href,
                    path: item.path,
                    entry,
                }),
                None => warn!("manifest item {} points at missing {}", item.id, item.path),
            }
        }
        debug!(
            "opened EPUB with {} entries and {} documents",
            entries.len(),
            documents.len()
        );

        Ok(Self {
            entries,
            documents,
            metadata: package.metadata,
        })
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    pub fn documents(&self) -> &[BookDocument] {
        &self.documents
    }

    pub fn document(&self, index: usize) -> Result<&BookDocument> {
        self.documents
            .get(index)
            .ok_or_else(|| anyhow!("document index {} out of range", index))
    }

    pub fn content(&self, index: usize) -> Result<&[u8]> {
        let document = self.document(index)?;
        Ok(&self.entries[document.entry].data)
    }

    /// Decoded text of a document, honouring a byte order mark or the declared encoding.
    pub fn content_str(&self, index: usize) -> Result<String> {
        let document = self.document(index)?;
        decode::decode_document(self.content(index)?)
            .with_context(|| format!("failed to decode {}", document.name))
    }

    pub fn set_content(&mut self, index: usize, content: Vec<u8>) -> Result<()> {
        let entry = self.document(index)?.entry;
        self.entries[entry].data = content;
        Ok(())
    }

    /// True when the `mimetype` entry declares `application/epub+zip`.
    pub fn has_epub_mimetype(&self) -> bool {
        self.entries
            .iter()
            .find(|entry| entry.name == MIMETYPE_ENTRY)
            .map(|entry| String::from_utf8_lossy(&entry.data).trim() == EPUB_MIME)
            .unwrap_or(false)
    }

    /// Serializes the archive with `mimetype` first and stored uncompressed.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        let mimetype = self
            .entries
            .iter()
            .find(|entry| entry.name == MIMETYPE_ENTRY)
            .map(|entry| entry.data.as_slice())
            .unwrap_or(EPUB_MIME.as_bytes());
        writer
            .start_file(MIMETYPE_ENTRY, stored)
            .with_context(|| "failed to write zip entry")?;
        writer
            .write_all(mimetype)
            .with_context(|| "failed to write zip content")?;

        for entry in self.entries.iter().filter(|entry| entry.name != MIMETYPE_ENTRY) {
            let options = FileOptions::default().compression_method(entry.compression);
            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .with_context(|| "failed to write zip directory")?;
                continue;
            }
            writer
                .start_file(entry.name.as_str(), options)
                .with_context(|| "failed to write zip entry")?;
            writer
                .write_all(&entry.data)
                .with_context(|| "failed to write zip content")?;
        }

        let bytes = writer
            .finish()
            .with_context(|| "failed to finalize zip output")?
            .into_inner();
        Ok(bytes)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Minimal EPUB 3 archive with one XHTML document per `(href, body)` pair.
    pub(crate) fn epub_bytes(title: &str, chapters: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("mimetype", deflated).unwrap();
        writer.write_all(b"application/epub+zip").unwrap();
        writer.start_file("META-INF/container.xml", deflated).unwrap();
        writer
            .write_all(
                br#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
            )
            .unwrap();

        let items = chapters
            .iter()
            .enumerate()
            .map(|(i, (href, _))| {
                format!(r#"<item id="c{i}" href="{href}" media-type="application/xhtml+xml"/>"#)
            })
            .collect::<String>();
        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><package xmlns="http://www.idpf.org/2007/opf" version="3.0"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title><dc:language>en</dc:language></metadata><manifest>{items}<item id="css" href="style.css" media-type="text/css"/></manifest><spine/></package>"#
        );
        writer.start_file("OEBPS/content.opf", deflated).unwrap();
        writer.write_all(opf.as_bytes()).unwrap();
        writer.start_file("OEBPS/style.css", deflated).unwrap();
        writer.write_all(b"p { margin: 0; }").unwrap();

        for (href, body) in chapters {
            let xhtml = format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>"
            );
            writer.start_file(format!("OEBPS/{href}"), deflated).unwrap();
            writer.write_all(xhtml.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
