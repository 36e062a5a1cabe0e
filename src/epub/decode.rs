use anyhow::{anyhow, Result};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("declared encoding pattern")
});

/// Bytes of the prolog inspected for an `encoding` declaration.
const SNIFF_LEN: usize = 512;

/// Decodes a content document: a byte order mark wins, then the XML
/// declaration, then strict UTF-8. Undecodable bytes are an error.
pub(crate) fn decode_document(bytes: &[u8]) -> Result<String> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(anyhow!("not valid {} after its byte order mark", encoding.name()));
        }
        return Ok(text.into_owned());
    }

    let encoding = declared_encoding(bytes).unwrap_or(UTF_8);
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| anyhow!("not valid {}", encoding.name()))
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_LEN)]);
    let label = DECLARED_ENCODING.captures(&head)?.get(1)?.as_str().to_string();
    // An ASCII-readable declaration cannot be truthfully UTF-16.
    let encoding = Encoding::for_label(label.as_bytes()).map(Encoding::output_encoding);
    if encoding.is_none() {
        debug!("unknown declared encoding {}, assuming UTF-8", label);
    }
    encoding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_with_bom_is_decoded() {
        let mut bytes = vec![0xff, 0xfe];
        for unit in "<p>Olá</p>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_document(&bytes).unwrap(), "<p>Olá</p>");
    }

    #[test]
    fn declared_latin1_is_honoured() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<p>Caf".to_vec();
        bytes.extend_from_slice(&[0xe9, b'<', b'/', b'p', b'>']);
        assert!(decode_document(&bytes).unwrap().ends_with("<p>Café</p>"));
    }

    #[test]
    fn undeclared_bytes_must_be_utf8() {
        assert_eq!(decode_document("<p>Olá</p>".as_bytes()).unwrap(), "<p>Olá</p>");
        let err = decode_document(&[b'<', b'p', b'>', 0xc3, 0x28]).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn unknown_declared_label_falls_back_to_utf8() {
        let bytes = "<?xml version=\"1.0\" encoding=\"x-made-up\"?><p>Olá</p>".as_bytes();
        assert!(decode_document(bytes).unwrap().ends_with("<p>Olá</p>"));
    }
}
