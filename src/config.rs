//! Runtime configuration loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so an empty file (or no file at all)
//! yields the built-in values the parser was tuned with.

use crate::core::signal::HierarchyLevel;
use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "STATUTE_PARSER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "statute_parser.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// A literal `from` → `to` replacement applied to every line before
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

impl Substitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Keywords that open a heading line, e.g. `PART 2`.
    pub level_keywords: Vec<String>,
    pub substitutions: Vec<Substitution>,
    /// Line prefixes that always continue the current body, never opening
    /// a section or subsection.
    pub text_continuations: Vec<String>,
    pub note_marker: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            level_keywords: ["TITLE", "ARTICLE", "PART", "SUBPART"]
                .into_iter()
                .map(String::from)
                .collect(),
            substitutions: vec![
                Substitution::new("\u{a0} ", "\u{a0}"),
                Substitution::new(" \u{a0}", "\u{a0}"),
                Substitution::new("Editor\u{2019}s note", "Editor's note"),
                Substitution::new("Editors note", "Editor's note"),
            ],
            text_continuations: vec![
                "(Effective".to_string(),
                "(Temporary".to_string(),
                "(Terminated".to_string(),
            ],
            note_marker: "Editor's note".to_string(),
        }
    }
}

/// Disambiguates an uppercase label that is both a letter and a roman
/// numeral, keyed on the first character of the open sub-subparagraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomanRule {
    pub label: String,
    pub after: char,
    pub level: HierarchyLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    pub roman_rules: Vec<RomanRule>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            roman_rules: vec![
                RomanRule {
                    label: "I".to_string(),
                    after: 'H',
                    level: HierarchyLevel::Subsubparagraph,
                },
                RomanRule {
                    label: "V".to_string(),
                    after: 'U',
                    level: HierarchyLevel::Subsubparagraph,
                },
                RomanRule {
                    label: "X".to_string(),
                    after: 'W',
                    level: HierarchyLevel::Subdivision,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub record_queue_capacity: usize,
    pub signal_queue_capacity: usize,
    pub max_concurrent_documents: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            record_queue_capacity: 32,
            signal_queue_capacity: 32,
            max_concurrent_documents: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of in-process docx renderers when no addresses are given.
    pub pool_size: usize,
    /// Remote rendering workers (`host:port`); one pool slot each.
    pub addresses: Vec<String>,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub read_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            addresses: Vec::new(),
            connect_attempts: 10,
            connect_backoff_ms: 500,
            read_timeout_secs: 120,
        }
    }
}

impl WorkerConfig {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration in order: explicit path, `$STATUTE_PARSER_CONFIG`,
    /// `./statute_parser.toml`, built-in defaults.
    ///
    /// An explicit path that fails to load is an error; the implicit
    /// locations fall back to defaults with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            match Self::load_from_file(&p) {
                Ok(config) => {
                    info!("Loaded config from ${} ({})", CONFIG_ENV_VAR, p.display());
                    return Ok(config);
                }
                Err(e) => warn!("Failed to load config from ${}: {}, falling back", CONFIG_ENV_VAR, e),
            }
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", DEFAULT_CONFIG_FILE);
                    return Ok(config);
                }
                Err(e) => warn!("Failed to load ./{}: {}, using defaults", DEFAULT_CONFIG_FILE, e),
            }
        }

        info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.level_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "classifier.level_keywords must not be empty".to_string(),
            ));
        }
        if self.classifier.substitutions.iter().any(|s| s.from.is_empty()) {
            return Err(ConfigError::Invalid(
                "classifier.substitutions entries need a non-empty `from`".to_string(),
            ));
        }
        if self.pipeline.record_queue_capacity == 0 || self.pipeline.signal_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline queue capacities must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_concurrent_documents == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrent_documents must be at least 1".to_string(),
            ));
        }
        if self.workers.addresses.is_empty() && self.workers.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "workers.pool_size must be at least 1 when no addresses are configured".to_string(),
            ));
        }
        if self.workers.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "workers.read_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.workers.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "workers.connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.classifier.level_keywords, vec!["TITLE", "ARTICLE", "PART", "SUBPART"]);
        assert_eq!(config.pipeline.record_queue_capacity, 32);
        assert_eq!(config.assembler.roman_rules.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let toml_str = r#"
            [pipeline]
            max_concurrent_documents = 8

            [[assembler.roman_rules]]
            label = "L"
            after = "K"
            level = "subdivision"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.max_concurrent_documents, 8);
        assert_eq!(config.pipeline.signal_queue_capacity, 32);
        assert_eq!(config.assembler.roman_rules.len(), 1);
        assert_eq!(config.assembler.roman_rules[0].level, HierarchyLevel::Subdivision);
        assert_eq!(config.workers.connect_attempts, 10);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.record_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unbounded_read_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.workers.read_timeout_secs = 0;
        match config.validate() {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("read_timeout_secs")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nmax_concurrent_documents = \"many\"").unwrap();
        let err = AppConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_, _)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/statute_parser.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
