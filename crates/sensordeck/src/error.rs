//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use sensordeck_config::ConfigError;
use sensordeck_core::{CoreError, RegistryOp};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the sensor registry ({op}): {reason}")]
    #[diagnostic(
        code(sensordeck::connection_failed),
        help(
            "Check that the registry is running and accessible.\n\
             Registry URL: {url}\n\
             Override with --registry-url or a profile in `sensordeck config path`."
        )
    )]
    ConnectionFailed {
        op: RegistryOp,
        url: String,
        reason: String,
    },

    #[error("Event stream closed: {reason}")]
    #[diagnostic(
        code(sensordeck::stream_closed),
        help("Raise [reconnect] max_retries or leave it unset to retry forever.")
    )]
    StreamClosed { reason: String },

    // ── Registry ─────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(sensordeck::not_found),
        help("Run: sensordeck {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Registry rejected the {op}: {message}")]
    #[diagnostic(code(sensordeck::conflict))]
    Conflict { op: RegistryOp, message: String },

    #[error("Registry {op} failed ({status}): {message}")]
    #[diagnostic(code(sensordeck::registry))]
    Registry {
        op: RegistryOp,
        status: u16,
        message: String,
    },

    #[error("Registry sent an unreadable response: {message}")]
    #[diagnostic(code(sensordeck::decode))]
    Decode { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sensordeck::validation))]
    Validation { field: String, reason: String },

    #[error("Device filter {expr:?} selects no devices")]
    #[diagnostic(
        code(sensordeck::filter),
        help("Use comma-separated ids and inclusive ranges, e.g. \"10-12,15\".")
    )]
    InvalidFilter { expr: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sensordeck::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(sensordeck::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(sensordeck::config))]
    Config(ConfigError),

    #[error("Could not store preferences: {message}")]
    #[diagnostic(code(sensordeck::preferences))]
    Preferences { message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(sensordeck::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(sensordeck::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::StreamClosed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. }
            | Self::InvalidFilter { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the registry URL the failed call was aimed at.
    pub fn with_registry_url(mut self, registry_url: &str) -> Self {
        if let Self::ConnectionFailed { url, .. } = &mut self {
            registry_url.clone_into(url);
        }
        self
    }

    /// Map a sensor-scoped failure, turning 404s into `NotFound`.
    pub fn for_sensor(err: CoreError, sensor: &str) -> Self {
        match err {
            CoreError::RegistryCallFailed {
                status: Some(404), ..
            } => Self::NotFound {
                resource_type: "sensor".into(),
                identifier: sensor.into(),
                list_command: "sensors list".into(),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RegistryCallFailed {
                op,
                message,
                status: None,
            } => CliError::ConnectionFailed {
                op,
                url: "(unknown)".into(),
                reason: message,
            },
            CoreError::RegistryCallFailed {
                op,
                message,
                status: Some(409),
            } => CliError::Conflict { op, message },
            CoreError::RegistryCallFailed {
                op,
                message,
                status: Some(status),
            } => CliError::Registry {
                op,
                status,
                message,
            },
            CoreError::TransportTransient { reason } => CliError::StreamClosed { reason },
            CoreError::DecodeFailed { message } => CliError::Decode { message },
            CoreError::FilterRejected { expr } => CliError::InvalidFilter { expr },
            CoreError::Validation(e) => CliError::Validation {
                field: "sensor".into(),
                reason: e.to_string(),
            },
            CoreError::Disconnected => CliError::StreamClosed {
                reason: "session ended".into(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "connection".into(),
                reason: message,
            },
            CoreError::Preferences { message } => CliError::Preferences { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
