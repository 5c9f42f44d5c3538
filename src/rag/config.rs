//! RAG service configuration: defaults, YAML file, environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Kinds of calls made to the service, each with its own timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    Embed,
    Search,
    Health,
}

/// Connection and retry settings for the RAG service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub host: String,
    pub port: u16,
    /// When false every call fails with `service-disabled` without I/O
    pub enabled: bool,
    pub embed_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub base_backoff_ms: u64,
    pub health_interval_secs: u64,
    pub embedding_model: String,
    pub embedding_version: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            enabled: true,
            embed_timeout_secs: 30,
            search_timeout_secs: 10,
            health_timeout_secs: 5,
            max_attempts: 3,
            base_backoff_ms: 1000,
            health_interval_secs: 60,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_version: "1".to_string(),
        }
    }
}

impl RagConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout_for(&self, class: CallClass) -> Duration {
        Duration::from_secs(match class {
            CallClass::Embed => self.embed_timeout_secs,
            CallClass::Search => self.search_timeout_secs,
            CallClass::Health => self.health_timeout_secs,
        })
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Parse a YAML document; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults, then the optional YAML file, then `RAG_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `RAG_*` overrides from an arbitrary lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RAG_SERVICE_HOST") {
            self.host = host;
        }
        if let Some(port) = parse_var(&lookup, "RAG_SERVICE_PORT")? {
            self.port = port;
        }
        if let Some(raw) = lookup("RAG_ENABLED") {
            self.enabled = parse_flag(&raw).ok_or(ConfigError::InvalidEnv {
                var: "RAG_ENABLED",
                value: raw.clone(),
            })?;
        }
        if let Some(secs) = parse_var(&lookup, "RAG_EMBED_TIMEOUT_SECS")? {
            self.embed_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "RAG_SEARCH_TIMEOUT_SECS")? {
            self.search_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "RAG_HEALTH_TIMEOUT_SECS")? {
            self.health_timeout_secs = secs;
        }
        if let Some(attempts) = parse_var(&lookup, "RAG_MAX_ATTEMPTS")? {
            self.max_attempts = attempts;
        }
        if let Some(ms) = parse_var(&lookup, "RAG_BASE_BACKOFF_MS")? {
            self.base_backoff_ms = ms;
        }
        if let Some(secs) = parse_var(&lookup, "RAG_HEALTH_INTERVAL_SECS")? {
            self.health_interval_secs = secs;
        }
        if let Some(model) = lookup("RAG_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(version) = lookup("RAG_EMBEDDING_VERSION") {
            self.embedding_version = version;
        }
        self.validate()
    }

    /// Reject timeouts and intervals that would never elapse
    fn validate(self) -> Result<Self, ConfigError> {
        let durations = [
            ("embed_timeout_secs", self.embed_timeout_secs),
            ("search_timeout_secs", self.search_timeout_secs),
            ("health_timeout_secs", self.health_timeout_secs),
            ("health_interval_secs", self.health_interval_secs),
        ];
        match durations.into_iter().find(|(_, secs)| *secs == 0) {
            Some((field, _)) => Err(ConfigError::Zero { field }),
            None => Ok(self),
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_service_contract() {
        let config = RagConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.timeout_for(CallClass::Embed), Duration::from_secs(30));
        assert_eq!(config.timeout_for(CallClass::Search), Duration::from_secs(10));
        assert_eq!(config.timeout_for(CallClass::Health), Duration::from_secs(5));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.health_interval(), Duration::from_secs(60));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RagConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(4000));
        // Saturates instead of overflowing
        assert_eq!(config.backoff_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn yaml_fills_missing_keys_with_defaults() {
        let config = RagConfig::from_yaml_str("host: rag.internal\nport: 9000\n").unwrap();
        assert_eq!(config.base_url(), "http://rag.internal:9000");
        assert_eq!(config.embedding_model, "all-MiniLM-L6-v2");
        assert_eq!(RagConfig::from_yaml_str("").unwrap(), RagConfig::default());
    }

    #[test]
    fn yaml_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.yaml");
        std::fs::write(&path, "enabled: false\nmax_attempts: 5\n").unwrap();

        let config = RagConfig::from_yaml_file(&path).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.max_attempts, 5);

        assert!(matches!(
            RagConfig::from_yaml_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_on_top() {
        let env: HashMap<&str, &str> = [
            ("RAG_SERVICE_HOST", "10.0.0.5"),
            ("RAG_SERVICE_PORT", "8181"),
            ("RAG_ENABLED", "off"),
            ("RAG_BASE_BACKOFF_MS", "5"),
        ]
        .into_iter()
        .collect();

        let config = RagConfig::default()
            .with_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url(), "http://10.0.0.5:8181");
        assert!(!config.enabled);
        assert_eq!(config.base_backoff_ms, 5);
        assert_eq!(config.search_timeout_secs, 10);
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let err = RagConfig::default()
            .with_overrides(|var| (var == "RAG_SERVICE_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: "RAG_SERVICE_PORT", .. }
        ));
    }

    #[test]
    fn zero_interval_in_yaml_is_rejected() {
        let err = RagConfig::from_yaml_str("health_interval_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "health_interval_secs" }));

        let err = RagConfig::from_yaml_str("search_timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "search_timeout_secs" }));
    }

    #[test]
    fn zero_env_overrides_are_rejected() {
        for (var, field) in [
            ("RAG_HEALTH_INTERVAL_SECS", "health_interval_secs"),
            ("RAG_EMBED_TIMEOUT_SECS", "embed_timeout_secs"),
            ("RAG_HEALTH_TIMEOUT_SECS", "health_timeout_secs"),
        ] {
            let err = RagConfig::default()
                .with_overrides(|name| (name == var).then(|| "0".to_string()))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Zero { field: f } if f == field));
        }
    }
}
