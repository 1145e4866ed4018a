//! Gateway configuration
//!
//! Typed structs mapping the YAML configuration file, with serde defaults
//! so a partial file (or none at all) yields a working dev configuration.
//! A handful of deployment knobs can be overridden from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limiting: RateLimitingConfig,
    pub transfer: TransferConfig,
    pub notifications: NotificationsConfig,
    pub providers: ProvidersConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address, e.g. "127.0.0.1:7777".
    pub listen: String,
}

/// Auth handler selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// "static" (dev, accepts configured tokens) or "remote".
    pub mode: String,
    /// Base URL of the remote auth provider; required in "remote" mode.
    pub url: Option<String>,
    /// Per-call timeout for auth provider requests.
    pub timeout_secs: u64,
}

/// Fixed-window rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    /// Requests allowed per window per classified credential.
    pub limit: u64,
    /// Window length in seconds; doubles as the counter TTL.
    pub window_secs: u64,
    /// "memory" or "sqlite".
    pub store: String,
    /// Database path for the sqlite store.
    pub sqlite_path: Option<PathBuf>,
}

/// Copy/move engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Abort a transfer after this long without a byte moving.
    pub inactivity_timeout_secs: u64,
    /// Cap on the " (n)" suffix search for conflict=keep.
    pub keep_suffix_cap: u32,
}

/// Post-mutation webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// POST target for mutation records; no hook when unset.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

/// Bundled provider adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Directory the localfs provider serves resources under; the adapter
    /// is not registered when unset.
    pub localfs_root: Option<PathBuf>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, overridable via RUST_LOG.
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: "127.0.0.1:7777".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { mode: "static".to_string(), url: None, timeout_secs: 100 }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 3600,
            window_secs: 3600,
            store: "memory".to_string(),
            sqlite_path: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { inactivity_timeout_secs: 600, keep_suffix_cap: 999 }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { webhook_url: None, timeout_secs: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Applies environment overrides for the deployment-facing knobs.
    ///
    /// `SLUICE_LISTEN`, `SLUICE_AUTH_URL` and
    /// `SLUICE_ENABLE_RATE_LIMITING` (true/false) are recognised.
    pub fn apply_env(&mut self) {
        if let Ok(listen) = std::env::var("SLUICE_LISTEN") {
            self.server.listen = listen;
        }
        if let Ok(url) = std::env::var("SLUICE_AUTH_URL") {
            self.auth.mode = "remote".to_string();
            self.auth.url = Some(url);
        }
        if let Ok(flag) = std::env::var("SLUICE_ENABLE_RATE_LIMITING") {
            self.rate_limiting.enabled = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
    }
}
