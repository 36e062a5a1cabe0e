use anyhow::{anyhow, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";

const DOCUMENT_MEDIA_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

/// Title, creators and language from the package `<metadata>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub language: Option<String>,
}

impl BookMetadata {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown Title")
    }

    pub fn display_authors(&self) -> String {
        if self.creators.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.creators.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestItem {
    pub id: String,
    pub href: String,
    /// Archive path of the item, resolved against the package file.
    pub path: String,
    pub media_type: String,
    pub properties: String,
}

impl ManifestItem {
    /// XHTML content documents, leaving out the navigation document.
    pub fn is_document(&self) -> bool {
        DOCUMENT_MEDIA_TYPES.contains(&self.media_type.as_str())
            && !self.properties.split_whitespace().any(|p| p == "nav")
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Package {
    pub metadata: BookMetadata,
    pub manifest: Vec<ManifestItem>,
}

/// `full-path` of the first `<rootfile>` in `META-INF/container.xml`.
pub(crate) fn rootfile_path(container: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(container);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse {}: {}", CONTAINER_PATH, err)),
        }
        buf.clear();
    }
    Err(anyhow!("{} declares no rootfile", CONTAINER_PATH))
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Creator,
    Language,
}

pub(crate) fn parse_package(opf: &[u8], opf_path: &str) -> Result<Package> {
    let base = parent_dir(opf_path);
    let mut reader = Reader::from_reader(opf);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut package = Package::default();
    let mut in_metadata = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = true,
                b"title" if in_metadata => field = Some(Field::Title),
                b"creator" if in_metadata => field = Some(Field::Creator),
                b"language" if in_metadata => field = Some(Field::Language),
                b"item" => package.manifest.extend(manifest_item(&e, &base)?),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"item" => {
                package.manifest.extend(manifest_item(&e, &base)?);
            }
            Ok(Event::Text(e)) if field.is_some() => {
                text.push_str(&e.unescape().with_context(|| "invalid text in package metadata")?);
            }
            Ok(Event::CData(e)) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = false,
                b"title" | b"creator" | b"language" => {
                    if let Some(current) = field.take() {
                        let value = text.trim().to_string();
                        text.clear();
                        if !value.is_empty() {
                            let metadata = &mut package.metadata;
                            match current {
                                Field::Title if metadata.title.is_none() => {
                                    metadata.title = Some(value)
                                }
                                Field::Creator => metadata.creators.push(value),
                                Field::Language if metadata.language.is_none() => {
                                    metadata.language = Some(value)
                                }
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse {}: {}", opf_path, err)),
        }
        buf.clear();
    }
    Ok(package)
}

fn manifest_item(e: &BytesStart, base: &str) -> Result<Option<ManifestItem>> {
    let (Some(id), Some(href)) = (attribute(e, b"id")?, attribute(e, b"href")?) else {
        return Ok(None);
    };
    Ok(Some(ManifestItem {
        path: resolve_href(base, &href),
        id,
        href,
        media_type: attribute(e, b"media-type")?.unwrap_or_default(),
        properties: attribute(e, b"properties")?.unwrap_or_default(),
    }))
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.with_context(|| "malformed xml attribute")?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .with_context(|| "invalid xml attribute value")?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..index].to_string(),
        None => String::new(),
    }
}

/// Joins a manifest href onto the package directory, decoding `%XX` escapes
/// and folding `.` and `..` segments.
pub(crate) fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    let href = percent_decode(href);
    let joined = if base.is_empty() || href.starts_with('/') {
        href.trim_start_matches('/').to_string()
    } else {
        format!("{base}/{href}")
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn percent_decode(value: &str) -> String {
    match urlencoding::decode(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(value.as_bytes())).into_owned(),
    }
}
