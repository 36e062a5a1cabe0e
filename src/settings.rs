use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1";
pub const DEFAULT_API_KEY: &str = "ollama";
pub const DEFAULT_MODEL: &str = "qwen3:14b";

/// Runtime configuration handed to the book pipeline and the LLM client.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_input_mb: u64,
    pub target_lang: String,
    pub source_lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 180,
            temperature: 0.2,
            max_input_mb: 50,
            target_lang: "PT-BR".to_string(),
            source_lang: "auto".to_string(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_input_bytes(&self) -> u64 {
        self.max_input_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    llm: Option<LlmSettings>,
    book: Option<BookSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct BookSettings {
    max_input_mb: Option<u64>,
    target_lang: Option<String>,
    source_lang: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_with_home(home_dir().as_deref(), extra_path)
}

pub(crate) fn load_settings_with_home(
    home: Option<&Path>,
    extra_path: Option<&Path>,
) -> Result<Settings> {
    let mut settings = Settings::default();
    if let Some(home) = home {
        ensure_home_settings_file(home)?;
    }

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content).with_context(|| {
                format!("failed to parse settings: {}", path.display())
            })?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(llm) = incoming.llm {
            if let Some(endpoint) = non_blank(llm.endpoint) {
                self.endpoint = endpoint.trim_end_matches('/').to_string();
            }
            if let Some(key) = non_blank(llm.api_key) {
                self.api_key = key;
            }
            if let Some(model) = non_blank(llm.model) {
                self.model = model;
            }
            if let Some(timeout) = llm.timeout_secs {
                if timeout > 0 {
                    self.timeout_secs = timeout;
                }
            }
            if let Some(temperature) = llm.temperature {
                if (0.0..=2.0).contains(&temperature) {
                    self.temperature = temperature;
                }
            }
        }
        if let Some(book) = incoming.book {
            if let Some(limit) = book.max_input_mb {
                if limit > 0 {
                    self.max_input_mb = limit;
                }
            }
            if let Some(lang) = non_blank(book.target_lang) {
                self.target_lang = lang;
            }
            if let Some(lang) = non_blank(book.source_lang) {
                self.source_lang = lang;
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file(home: &Path) -> Result<()> {
    fs::create_dir_all(home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".epub-llm-translator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_struct_defaults() {
        let mut settings = Settings::default();
        settings.merge_str(DEFAULT_SETTINGS_TOML).unwrap();
        let defaults = Settings::default();
        assert_eq!(settings.endpoint, defaults.endpoint);
        assert_eq!(settings.model, defaults.model);
        assert_eq!(settings.timeout_secs, 180);
        assert_eq!(settings.max_input_mb, 50);
        assert_eq!(settings.target_lang, "PT-BR");
    }

    #[test]
    fn merge_ignores_blank_and_out_of_range_values() {
        let mut settings = Settings::default();
        settings
            .merge_str(
                r#"
[llm]
endpoint = "http://127.0.0.1:8080/v1/"
model = "  "
timeout_secs = 0
temperature = 9.0

[book]
max_input_mb = 10
"#,
            )
            .unwrap();
        assert_eq!(settings.endpoint, "http://127.0.0.1:8080/v1");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.timeout_secs, 180);
        assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(settings.max_input_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn home_settings_file_is_created_and_extra_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let extra = dir.path().join("extra.toml");
        fs::write(&extra, "[llm]\nmodel = \"mistral\"\n").unwrap();

        let settings = load_settings_with_home(Some(&home), Some(&extra)).unwrap();
        assert!(home.join("settings.toml").exists());
        assert_eq!(settings.model, "mistral");
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_settings_with_home(None, Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }
}
