//! Sentinel configuration
//!
//! YAML config file plus environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ENV_API_KEY: &str = "SENTINEL_API_KEY";
pub const ENV_BASE_URL: &str = "SENTINEL_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Dashboard server connection
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for non-streaming requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked_key = self.api_key.as_ref().map(|key| {
            if key.len() > 8 {
                format!("{}***", key.chars().take(4).collect::<String>())
            } else {
                "***".to_string()
            }
        });
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &masked_key)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Terminal session limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Hard ceiling from socket open to forced close (seconds)
    #[serde(default = "default_safety_timeout")]
    pub safety_timeout_secs: u64,
}

fn default_safety_timeout() -> u64 {
    300
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            safety_timeout_secs: default_safety_timeout(),
        }
    }
}

impl TerminalConfig {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_timeout_secs)
    }
}

/// Post-execution analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cap on captured output characters sent for analysis
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,
}

fn default_true() -> bool {
    true
}

fn default_max_chars() -> usize {
    3000
}

fn default_truncation_marker() -> String {
    "\n... [output truncated]".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: default_max_chars(),
            truncation_marker: default_truncation_marker(),
        }
    }
}

impl SentinelConfig {
    /// Default config file location: `~/.config/sentinel/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sentinel").join("config.yaml"))
    }

    /// Load from `path` (or the default location when it exists), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config from {}", path.display());
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Overrides come through a lookup so tests never touch the process environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.server.base_url = url.trim().to_string();
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.server.api_key = Some(key.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                message: format!("server.base_url must be http(s), got '{}'", url),
            });
        }
        if self.terminal.safety_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "terminal.safety_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SentinelConfig::default();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.terminal.safety_timeout(), Duration::from_secs(300));
        assert_eq!(config.analysis.max_chars, 3000);
        assert!(config.analysis.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SentinelConfig::from_yaml(
            "server:\n  base_url: https://soc.example\nanalysis:\n  max_chars: 500\n",
        )
        .unwrap();
        assert_eq!(config.server.base_url, "https://soc.example");
        assert_eq!(config.server.request_timeout_secs, 60);
        assert_eq!(config.analysis.max_chars, 500);
        assert_eq!(config.terminal.safety_timeout_secs, 300);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SentinelConfig::default();
        config.apply_env_overrides(|key| match key {
            ENV_API_KEY => Some("  key-from-env ".to_string()),
            ENV_BASE_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.server.api_key.as_deref(), Some("key-from-env"));
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "terminal:\n  safety_timeout_secs: 30").unwrap();
        let config = SentinelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.terminal.safety_timeout_secs, 30);
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not, a, map").unwrap();
        let err = SentinelConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SentinelConfig::default();
        config.server.base_url = "ftp://host".to_string();
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.terminal.safety_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let server = ServerConfig {
            api_key: Some("abcdefghijklmnop".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", server);
        assert!(rendered.contains("abcd***"));
        assert!(!rendered.contains("ijklmnop"));
    }
}
