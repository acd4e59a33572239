use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::activity::Thresholds;

/// Environment variable overriding `jellyfin.host`.
pub const ENV_HOST: &str = "JELLYFIN_HOST";
/// Environment variable overriding `jellyfin.token`.
pub const ENV_TOKEN: &str = "JELLYFIN_TOKEN";
/// Environment variable overriding the listen port.
pub const ENV_PORT: &str = "PORT";

/// Top-level configuration for the exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Jellyfin server connection configuration.
    #[serde(default)]
    pub jellyfin: JellyfinConfig,

    /// Metrics server listen address. Default: ":8097".
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// How often to poll Jellyfin and republish metrics. Default: 15s.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Session staleness windows.
    #[serde(default)]
    pub staleness: StalenessConfig,
}

/// Jellyfin server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JellyfinConfig {
    /// Base URL of the server. Default: "http://localhost:8096".
    #[serde(default = "default_host")]
    pub host: String,

    /// API token. Required; usually supplied through JELLYFIN_TOKEN.
    #[serde(default)]
    pub token: String,

    /// How the token is presented. Default: header.
    #[serde(default)]
    pub auth: AuthScheme,

    /// Per-request timeout. Default: 30s.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// How the API token is sent to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: MediaBrowser Token="..."`.
    #[default]
    Header,
    /// `?ApiKey=...` query parameter, for older servers.
    Query,
}

/// Session staleness windows.
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessConfig {
    /// Maximum age of the last playback check-in for a stream to count.
    /// Default: 2m.
    #[serde(default = "default_playback_window", with = "humantime_serde")]
    pub playback_check_in: Duration,

    /// Maximum age of the last activity for a client to count as connected.
    /// Default: 5m.
    #[serde(default = "default_activity_window", with = "humantime_serde")]
    pub last_activity: Duration,
}

impl StalenessConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            playback_check_in: self.playback_check_in,
            last_activity: self.last_activity,
        }
    }
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    ":8097".to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_host() -> String {
    "http://localhost:8096".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_playback_window() -> Duration {
    Thresholds::default().playback_check_in
}

fn default_activity_window() -> Duration {
    Thresholds::default().last_activity
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            jellyfin: JellyfinConfig::default(),
            listen_addr: default_listen_addr(),
            refresh_interval: default_refresh_interval(),
            staleness: StalenessConfig::default(),
        }
    }
}

impl Default for JellyfinConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: String::new(),
            auth: AuthScheme::default(),
            timeout: default_request_timeout(),
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            playback_check_in: default_playback_window(),
            last_activity: default_activity_window(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Build the effective configuration: optional YAML file, then
    /// environment overrides, then validation.
    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        cfg.apply_env(env)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Parse a YAML configuration file without validating it.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Apply environment overrides. Unset or empty variables are ignored.
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = lookup(ENV_HOST) {
            self.jellyfin.host = host;
        }

        if let Some(token) = lookup(ENV_TOKEN) {
            self.jellyfin.token = token;
        }

        if let Some(port) = lookup(ENV_PORT) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("parsing {ENV_PORT} value {port:?}"))?;
            self.listen_addr = format!(":{port}");
        }

        Ok(())
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.jellyfin.token.is_empty() {
            bail!("jellyfin.token is required (supply the {ENV_TOKEN} environment variable)");
        }

        let host = &self.jellyfin.host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            bail!("jellyfin.host must start with http:// or https://, got {host:?}");
        }

        if self.jellyfin.timeout.is_zero() {
            bail!("jellyfin.timeout must be positive");
        }

        if self.listen_addr.is_empty() {
            bail!("listen_addr is required");
        }

        if self.refresh_interval.is_zero() {
            bail!("refresh_interval must be positive");
        }

        if self.staleness.playback_check_in.is_zero() {
            bail!("staleness.playback_check_in must be positive");
        }

        if self.staleness.last_activity.is_zero() {
            bail!("staleness.last_activity must be positive");
        }

        Ok(())
    }
}
