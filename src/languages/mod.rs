use whatlang::Lang;

use crate::epub::Book;
use crate::html::Document;

/// Source-language sentinel asking for detection.
pub const AUTO: &str = "auto";
/// Used when detection cannot settle on a known language.
pub const FALLBACK_SOURCE_LANG: &str = "EN";

const SAMPLE_DOCUMENTS: usize = 5;
const SAMPLE_CHARS_PER_DOCUMENT: usize = 200;
const SAMPLE_BUDGET: usize = 1000;

/// Codes offered for translation, with display names.
pub const COMMON_LANGUAGES: &[(&str, &str)] = &[
    ("EN", "English"),
    ("PT-BR", "Portuguese (Brazil)"),
    ("PT-PT", "Portuguese (Portugal)"),
    ("ES", "Spanish"),
    ("FR", "French"),
    ("DE", "German"),
    ("IT", "Italian"),
    ("RU", "Russian"),
    ("JA", "Japanese"),
    ("ZH-CN", "Chinese (Simplified)"),
    ("PL", "Polish"),
];

pub fn is_auto(code: &str) -> bool {
    code.trim().eq_ignore_ascii_case(AUTO)
}

pub fn display_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    COMMON_LANGUAGES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Upper-case ISO 639-1 code of the dominant language, or `None` when
/// whatlang is unsure.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text.trim())?;
    if !info.is_reliable() {
        return None;
    }
    lang_to_code(info.lang()).map(str::to_string)
}

/// Maps a detected base code onto the table: an exact entry first, then the
/// first regional variant (`PT` becomes `PT-BR`).
pub fn match_known_code(code: &str) -> Option<&'static str> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return None;
    }
    let regional = format!("{code}-");
    COMMON_LANGUAGES
        .iter()
        .map(|(known, _)| *known)
        .find(|known| *known == code)
        .or_else(|| {
            COMMON_LANGUAGES
                .iter()
                .map(|(known, _)| *known)
                .find(|known| known.starts_with(&regional))
        })
}

/// Up to 200 collapsed characters from each of the first documents, stopping
/// once the sample passes the budget. Undecodable documents are skipped.
pub fn sample_book_text(book: &Book) -> String {
    let mut sample = String::new();
    for index in 0..book.documents().len().min(SAMPLE_DOCUMENTS) {
        let Ok(content) = book.content_str(index) else {
            continue;
        };
        let text = Document::parse(&content).text();
        sample.extend(text.chars().take(SAMPLE_CHARS_PER_DOCUMENT));
        sample.push(' ');
        if sample.chars().count() > SAMPLE_BUDGET {
            break;
        }
    }
    sample.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Detected(&'static str),
    /// Detected, reliable, but not one of [`COMMON_LANGUAGES`].
    Unsupported(String),
    Uncertain,
    NoText,
}

impl Detection {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Detection::Detected(code) => Some(*code),
            _ => None,
        }
    }
}

pub fn detect_book_language(book: &Book) -> Detection {
    let sample = sample_book_text(book);
    if sample.is_empty() {
        return Detection::NoText;
    }
    match detect_language(&sample) {
        Some(code) => match match_known_code(&code) {
            Some(known) => Detection::Detected(known),
            None => Detection::Unsupported(code),
        },
        None => Detection::Uncertain,
    }
}

/// The known language a book appears to be written in, if any.
pub fn suggest_source_language(book: &Book) -> Option<&'static str> {
    detect_book_language(book).code()
}

fn lang_to_code(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "EN",
        Lang::Por => "PT",
        Lang::Spa => "ES",
        Lang::Fra => "FR",
        Lang::Deu => "DE",
        Lang::Ita => "IT",
        Lang::Rus => "RU",
        Lang::Jpn => "JA",
        Lang::Cmn => "ZH",
        Lang::Pol => "PL",
        Lang::Nld => "NL",
        Lang::Ukr => "UK",
        Lang::Kor => "KO",
        Lang::Ara => "AR",
        Lang::Tur => "TR",
        Lang::Swe => "SV",
        Lang::Dan => "DA",
        Lang::Fin => "FI",
        Lang::Ces => "CS",
        Lang::Hin => "HI",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_is_case_insensitive() {
        assert!(is_auto("auto"));
        assert!(is_auto(" AUTO "));
        assert!(!is_auto("EN"));
    }

    #[test]
    fn known_codes_prefer_exact_then_regional() {
        assert_eq!(match_known_code("en"), Some("EN"));
        assert_eq!(match_known_code("PT"), Some("PT-BR"));
        assert_eq!(match_known_code("zh"), Some("ZH-CN"));
        assert_eq!(match_known_code("NL"), None);
        assert_eq!(match_known_code(""), None);
    }

    #[test]
    fn detects_english_prose() {
        let text = "The quick brown fox jumps over the lazy dog while the children \
                    watch from the window and laugh at the way it runs across the field.";
        assert_eq!(detect_language(text).as_deref(), Some("EN"));
    }

    #[test]
    fn display_names_come_from_the_table() {
        assert_eq!(display_name("pt-br"), Some("Portuguese (Brazil)"));
        assert_eq!(display_name("xx"), None);
    }
}
