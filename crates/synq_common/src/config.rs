//! Synq Configuration
//!
//! Backend selection and driver settings for the activity store.
//!
//! Configuration lives in /etc/synq/config.toml. Every section is optional;
//! missing keys fall back to the defaults below. A handful of environment
//! variables override the file so containers can be configured without one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregate::DEFAULT_SAMPLE_INTERVAL_SECS;

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/synq";
const CONFIG_FILE: &str = "config.toml";

/// Synq data directory (relational database)
pub const DATA_DIR: &str = "/var/lib/synq";

/// Row cap the reference remote store enforces per request
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Which backend driver the store is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Transactional SQL store
    #[default]
    Relational,
    /// Paginated REST store
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Remote => "remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "sqlite" | "postgresql" | "sql" => Some(BackendKind::Relational),
            "remote" | "rest" | "supabase" => Some(BackendKind::Remote),
            _ => None,
        }
    }
}

/// Relational driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalSettings {
    /// Database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a statement waits on a locked database (seconds)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DATA_DIR).join("synq.db")
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for RelationalSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Remote REST driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Project base URL, e.g. https://xyz.supabase.co
    #[serde(default)]
    pub url: String,

    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: String,

    /// Rows per read request (valid: 1-1000). Must equal the server's
    /// max-rows setting: a page shorter than this ends the read, so a lower
    /// server cap truncates results.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request HTTP timeout (seconds)
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_remote_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            page_size: default_page_size(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

impl RemoteSettings {
    /// Clamp page_size to what the remote store accepts (1-1000)
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, DEFAULT_PAGE_SIZE)
    }

    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Store section: backend choice plus per-driver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub relational: RelationalSettings,

    #[serde(default)]
    pub remote: RemoteSettings,
}

/// Settings the dashboard-facing queries use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSettings {
    /// Seconds between collector samples (valid: 1-3600)
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Rows returned by "recent samples" when no limit is given
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_sample_interval() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_SECS
}

fn default_recent_limit() -> usize {
    crate::store::DEFAULT_SAMPLE_LIMIT
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl DashboardSettings {
    /// Clamp sample_interval_secs to the valid range (1-3600)
    pub fn effective_sample_interval(&self) -> u64 {
        self.sample_interval_secs.clamp(1, 3600)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynqConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub dashboard: DashboardSettings,

    #[serde(default)]
    pub log: LogConfig,
}

impl SynqConfig {
    /// Load config from the system config directory, defaults if absent or unreadable
    pub fn load() -> Self {
        let system_path = config_path();
        if system_path.exists() {
            if let Ok(content) = fs::read_to_string(&system_path) {
                if let Ok(config) = toml::from_str(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Unlike `load`, errors are reported.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply SYNQ_* environment overrides on top of the file values.
    ///
    /// Returns one message per rejected value. Logging is usually not set up
    /// yet at this point, so the caller reports them.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();
        if let Some(value) = lookup("SYNQ_BACKEND") {
            match BackendKind::parse(&value) {
                Some(kind) => self.store.backend = kind,
                None => rejected.push(format!("Ignoring unknown SYNQ_BACKEND value: {}", value)),
            }
        }
        if let Some(path) = lookup("SYNQ_DB_PATH") {
            self.store.relational.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SYNQ_REMOTE_URL") {
            self.store.remote.url = url;
        }
        if let Some(key) = lookup("SYNQ_REMOTE_KEY") {
            self.store.remote.api_key = key;
        }
        rejected
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SynqConfig::default();
        assert_eq!(config.store.backend, BackendKind::Relational);
        assert_eq!(config.store.remote.page_size, 1000);
        assert_eq!(config.store.relational.busy_timeout_secs, 5);
        assert_eq!(config.dashboard.sample_interval_secs, 5);
        assert_eq!(config.dashboard.recent_limit, 10);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SynqConfig::from_toml(
            r#"
            [store]
            backend = "remote"

            [store.remote]
            url = "https://example.supabase.co"
            page_size = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, BackendKind::Remote);
        assert_eq!(config.store.remote.url, "https://example.supabase.co");
        assert_eq!(config.store.remote.effective_page_size(), 250);
        assert_eq!(config.store.remote.timeout_secs, 10);
        assert_eq!(config.dashboard.sample_interval_secs, 5);
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        assert!(SynqConfig::from_toml("[store]\nbackend = \"mongo\"\n").is_err());
    }

    #[test]
    fn test_clamping() {
        let mut remote = RemoteSettings {
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(remote.effective_page_size(), 1);
        remote.page_size = 5000;
        assert_eq!(remote.effective_page_size(), 1000);

        let dashboard = DashboardSettings {
            sample_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(dashboard.effective_sample_interval(), 1);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SYNQ_BACKEND", "supabase"),
            ("SYNQ_REMOTE_URL", "https://abc.supabase.co"),
            ("SYNQ_REMOTE_KEY", "anon-key"),
            ("SYNQ_DB_PATH", "/tmp/synq-test.db"),
        ]
        .into_iter()
        .collect();

        let mut config = SynqConfig::default();
        let rejected = config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert!(rejected.is_empty());

        assert_eq!(config.store.backend, BackendKind::Remote);
        assert_eq!(config.store.remote.url, "https://abc.supabase.co");
        assert_eq!(config.store.remote.api_key, "anon-key");
        assert_eq!(config.store.relational.path, PathBuf::from("/tmp/synq-test.db"));
    }

    #[test]
    fn test_bad_backend_override_is_ignored() {
        let mut config = SynqConfig::default();
        let rejected =
            config.apply_overrides(|key| (key == "SYNQ_BACKEND").then(|| "mongo".to_string()));
        assert_eq!(config.store.backend, BackendKind::Relational);
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].contains("mongo"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        assert!(SynqConfig::load_from("/nonexistent/synq/config.toml").is_err());
    }
}
