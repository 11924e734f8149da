//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`SIGHTLINE_*`)
//! - CLI arguments (for the `sightline` binary)
//!
//! [`Config::load`] reads the file named by `SIGHTLINE_CONFIG`, falling back
//! to `<config dir>/sightline/config.toml` when it exists, then applies
//! environment overrides on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SightlineError};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SIGHTLINE_CONFIG";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Detection service endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Reply reconciliation policy
    #[serde(default)]
    pub reconcile: ReconcilePolicy,

    /// Outbound field mapping options
    #[serde(default)]
    pub wire: WireConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SightlineError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| SightlineError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Resolve the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `SIGHTLINE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("SIGHTLINE_SERVER_URL") {
            self.endpoints.base_url = url;
        }
        if let Some(secs) = env_parse("SIGHTLINE_TIMEOUT_SECS")? {
            self.transport.timeout_secs = secs;
        }
        if let Some(secs) = env_parse("SIGHTLINE_CONNECT_TIMEOUT_SECS")? {
            self.transport.connect_timeout_secs = secs;
        }
        if let Some(max) = env_parse("SIGHTLINE_MAX_CONSECUTIVE_FAILURES")? {
            self.transport.max_consecutive_failures = max;
        }
        if let Some(proxy) = env_value("SIGHTLINE_PROXY") {
            self.transport.proxy = Some(proxy);
        }
        if let Some(escalate) = env_parse("SIGHTLINE_ESCALATE_TRANSPORT_LOSS")? {
            self.reconcile.escalate_transport_loss = escalate;
        }
        if let Some(mode) = env_value("SIGHTLINE_COLOR_FIELDS") {
            self.wire.color_fields = mode
                .parse()
                .map_err(|e: String| SightlineError::Config(e))?;
        }
        Ok(())
    }

    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        let base = self.endpoints.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SightlineError::Config(format!(
                "server url must start with http:// or https://, got '{base}'"
            )));
        }
        if self.transport.timeout_secs == 0 {
            return Err(SightlineError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SightlineError::Config(format!("Failed to render config: {e}")))
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env_value(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|p| p.is_file())
}

/// Per-user default config location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sightline").join("config.toml"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_value(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SightlineError::Config(format!("{name} has an invalid value: '{raw}'"))),
        None => Ok(None),
    }
}

/// Detection service endpoints: a base URL plus one path per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Service base URL (e.g., http://localhost:8000)
    pub base_url: String,

    /// Path of the start-session endpoint
    pub start_session: String,

    /// Path of the per-person record endpoint
    pub person_detection: String,

    /// Path of the stop-session endpoint
    pub stop_session: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            start_session: "/start_session/".to_string(),
            person_detection: "/person_detection/".to_string(),
            stop_session: "/stop_session/".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Endpoints rooted at another base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Full start-session URL
    pub fn start_session_url(&self) -> String {
        self.join(&self.start_session)
    }

    /// Full person-detection URL
    pub fn person_detection_url(&self) -> String {
        self.join(&self.person_detection)
    }

    /// Full stop-session URL
    pub fn stop_session_url(&self) -> String {
        self.join(&self.stop_session)
    }

    fn join(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Consecutive failed replies before the link is reported lost (0 = never)
    pub max_consecutive_failures: u32,

    /// Runtime worker threads for in-flight requests
    pub worker_threads: usize,

    /// Optional HTTP proxy URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 5,
            max_consecutive_failures: 10,
            worker_threads: 2,
            proxy: None,
        }
    }
}

/// How reconciliation treats replies lost at transport level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilePolicy {
    /// Treat a lost/failed reply as a server stop signal.
    ///
    /// Off by default: only a non-zero code or unreadable body stops the
    /// session, sustained loss is reported by the transport.
    pub escalate_transport_loss: bool,
}

/// How clothing colors map onto request fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFields {
    /// The first three colors are written over `ClothesColors_1`; the third
    /// (or the last of fewer) wins.
    #[default]
    LastWins,
    /// One field per color: `ClothesColors_1`, `ClothesColors_2`, ...
    Numbered,
}

impl std::str::FromStr for ColorFields {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "last_wins" | "last" => Ok(Self::LastWins),
            "numbered" => Ok(Self::Numbered),
            _ => Err(format!("Unknown color field mode: {s}")),
        }
    }
}

/// Outbound field mapping options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Clothing color field layout
    pub color_fields: ColorFields,
}

/// Read a config file if present, otherwise defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}
