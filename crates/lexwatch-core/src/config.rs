//! Console configuration.
//!
//! Loaded from a YAML file (`lexwatch.yml` by default). Every field has a
//! default so an empty or missing file yields a working configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lexwatch.yml";

/// Round marker matched in research messages, capturing the round number.
pub const DEFAULT_ROUND_PATTERN: &str = r"(?i)\bround\s+(\d+)";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid round pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("segmentation.{field} must not be empty")]
    EmptyField { field: &'static str },
}

/// Top-level console configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend: BackendConfig,
    pub segmentation: SegmentationConfig,
    pub transcript: TranscriptConfig,
    pub artifacts: ArtifactsConfig,
}

impl ConsoleConfig {
    /// Parses and validates configuration from a YAML string.
    pub fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_yaml(&raw)
    }

    /// Loads the given file, or `lexwatch.yml` when present, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            Self::from_file(fallback)
        } else {
            Ok(Self::default())
        }
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segmentation.round_regex()?;
        let seg = &self.segmentation;
        for (field, value) in [
            ("compiling_marker", &seg.compiling_marker),
            ("research_title", &seg.research_title),
            ("final_title", &seg.final_title),
            ("initial_title", &seg.initial_title),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField { field });
            }
        }
        Ok(())
    }
}

/// Where the backend lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the case/analysis REST API.
    pub api_url: String,
    /// Base URL of the websocket endpoint; the client id is appended.
    pub ws_url: String,
    /// Client id presented to the websocket endpoint. Generated when unset.
    pub client_id: Option<String>,
    pub request_timeout_secs: u64,
    /// When false, the subscription counts as acknowledged as soon as the
    /// subscribe command is written (for backends that never ack).
    pub require_subscribe_ack: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            client_id: None,
            request_timeout_secs: 30,
            require_subscribe_ack: true,
        }
    }
}

impl BackendConfig {
    /// Returns the configured client id or derives one for this process.
    pub fn client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            format!(
                "lexwatch-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            )
        })
    }

    /// Returns the websocket URL for a client id.
    pub fn socket_url(&self, client_id: &str) -> String {
        format!("{}/{}", self.ws_url.trim_end_matches('/'), client_id)
    }
}

/// Heuristics used to segment the event stream into steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Regex with one capture group for the round number.
    pub round_pattern: String,
    /// Case-insensitive marker for the final synthesis phase.
    pub compiling_marker: String,
    /// Title of a research step; `{round}` is replaced by the round number.
    pub research_title: String,
    pub final_title: String,
    /// Title used when the opening event carries no text of its own.
    pub initial_title: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            round_pattern: DEFAULT_ROUND_PATTERN.to_string(),
            compiling_marker: "compiling".to_string(),
            research_title: "Research round {round}".to_string(),
            final_title: "Compiling final analysis".to_string(),
            initial_title: "Preparing analysis".to_string(),
        }
    }
}

impl SegmentationConfig {
    /// Compiles the round pattern.
    pub fn round_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.round_pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: self.round_pattern.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Collapse consecutive identical assistant messages.
    pub collapse_repeats: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            collapse_repeats: true,
        }
    }
}

/// Optional on-disk artifacts written while watching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub status_dir: Option<PathBuf>,
    pub record_path: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ConsoleConfig::parse_yaml("").unwrap();
        assert_eq!(config, ConsoleConfig::default());
        assert!(config.backend.require_subscribe_ack);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
backend:
  api_url: "https://discovery.internal"
segmentation:
  final_title: "Writing memo"
"#;
        let config = ConsoleConfig::parse_yaml(yaml).unwrap();
        assert_eq!(config.backend.api_url, "https://discovery.internal");
        assert_eq!(config.backend.ws_url, "ws://localhost:8000/ws");
        assert_eq!(config.segmentation.final_title, "Writing memo");
        assert_eq!(config.segmentation.compiling_marker, "compiling");
    }

    #[test]
    fn test_invalid_round_pattern_rejected() {
        let yaml = "segmentation:\n  round_pattern: \"(unclosed\"\n";
        let err = ConsoleConfig::parse_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let yaml = "segmentation:\n  compiling_marker: \"  \"\n";
        let err = ConsoleConfig::parse_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyField {
                field: "compiling_marker"
            }
        ));
    }

    #[test]
    fn test_socket_url_joins_client_id() {
        let backend = BackendConfig {
            ws_url: "ws://host:9000/ws/".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.socket_url("abc"), "ws://host:9000/ws/abc");
    }

    #[test]
    fn test_from_file_missing_reports_path() {
        let err = ConsoleConfig::from_file(Path::new("/nonexistent/lexwatch.yml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lexwatch.yml"));
    }
}
