//! Shared configuration for the SensorDeck CLI and TUI.
//!
//! Layered loading (defaults → TOML file → `SENSORDECK_*` env), named
//! endpoint profiles, translation to `sensordeck_core::ConsoleConfig`, and
//! the on-disk device-filter preference. Both binaries depend on this
//! crate; the CLI adds flag overrides on top.

mod prefs;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use sensordeck_core::{ConsoleConfig, ReconnectPolicy, TlsVerification};

pub use prefs::FilePreferences;

/// Prefix for environment overrides; nesting uses `__`.
pub const ENV_PREFIX: &str = "SENSORDECK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration shared by CLI and TUI.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Registry base URL, e.g. `http://localhost:8080/iot/`.
    pub registry_url: String,
    /// Event stream URL, e.g. `http://localhost:8081/api/stream`.
    pub stream_url: String,

    pub timeout_secs: u64,
    /// Skip TLS verification.
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,

    /// Trailing window plotted per sensor.
    pub window_secs: u64,
    pub compact_floor: usize,
    pub coalesce_quiet_ms: u64,
    pub frame_interval_ms: u64,
    pub max_log_lines: usize,

    /// Filter used until one has been applied and saved.
    pub default_filter: Option<String>,
    /// Bias step for the `+`/`-` keys.
    pub adjust_step: f64,
    /// Default CLI output format.
    pub output: String,

    pub reconnect: Reconnect,

    /// Named endpoint profiles.
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: None,
            registry_url: "http://localhost:8080/iot/".into(),
            stream_url: "http://localhost:8081/api/stream".into(),
            timeout_secs: 10,
            insecure: false,
            ca_cert: None,
            window_secs: 60,
            compact_floor: sensordeck_core::series::DEFAULT_COMPACT_FLOOR,
            coalesce_quiet_ms: 150,
            frame_interval_ms: 33,
            max_log_lines: sensordeck_core::view::DEFAULT_MAX_LOG_LINES,
            default_filter: None,
            adjust_step: 0.5,
            output: "table".into(),
            reconnect: Reconnect::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Event stream reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Reconnect {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Unset retries forever.
    pub max_retries: Option<u32>,
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_retries: None,
        }
    }
}

/// Endpoint overrides for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    pub registry_url: Option<String>,
    pub stream_url: Option<String>,
    pub insecure: Option<bool>,
    pub ca_cert: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub default_filter: Option<String>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "sensordeck", "sensordeck")
}

fn home_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("sensordeck");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Where preferences and logs live.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

pub fn prefs_path() -> PathBuf {
    data_dir().join("prefs.toml")
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full config from the canonical file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file plus environment. A missing file is fine.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

/// Serialize config to TOML, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Look up a profile by explicit name, falling back to
    /// `default_profile`. `Ok(None)` means "top-level settings only".
    pub fn profile(&self, name: Option<&str>) -> Result<Option<&Profile>, ConfigError> {
        let Some(name) = name.or(self.default_profile.as_deref()) else {
            return Ok(None);
        };
        self.profiles
            .get(name)
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }

    /// Resolve top-level settings plus an optional profile into an engine
    /// config.
    pub fn to_console_config(&self, profile: Option<&str>) -> Result<ConsoleConfig, ConfigError> {
        let profile = self.profile(profile)?.cloned().unwrap_or_default();

        let registry_url = parse_url(
            "registry_url",
            profile.registry_url.as_deref().unwrap_or(&self.registry_url),
        )?;
        let stream_url = parse_url(
            "stream_url",
            profile.stream_url.as_deref().unwrap_or(&self.stream_url),
        )?;

        let tls = if profile.insecure.unwrap_or(self.insecure) {
            TlsVerification::DangerAcceptInvalid
        } else if let Some(ca) = profile.ca_cert.or_else(|| self.ca_cert.clone()) {
            TlsVerification::CustomCa(ca)
        } else {
            TlsVerification::SystemDefaults
        };

        if self.window_secs == 0 {
            return Err(ConfigError::Validation {
                field: "window_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Validation {
                field: "frame_interval_ms".into(),
                reason: "must be at least 1".into(),
            });
        }

        let mut console = ConsoleConfig::new(registry_url, stream_url);
        console.tls = tls;
        console.timeout = Duration::from_secs(profile.timeout_secs.unwrap_or(self.timeout_secs));
        console.reconnect = ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_retries: self.reconnect.max_retries,
        };
        console.window = Duration::from_secs(self.window_secs);
        console.compact_floor = self.compact_floor;
        console.coalesce_quiet = Duration::from_millis(self.coalesce_quiet_ms);
        console.frame_interval = Duration::from_millis(self.frame_interval_ms);
        console.initial_filter = profile.default_filter.or_else(|| self.default_filter.clone());
        Ok(console)
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("{raw:?} is not a valid URL ({e})"),
    })
}
