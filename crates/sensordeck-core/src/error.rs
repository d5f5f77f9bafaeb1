// ── Core error types ──
//
// Session-level failures. Consumers never see HTTP status codes or raw
// JSON errors directly: `From<sensordeck_api::Error>` and
// `CoreError::registry` translate transport-layer errors into this
// taxonomy, and the session turns every instance into a notification.

use thiserror::Error;

use crate::model::FormError;

/// Which registry call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RegistryOp {
    List,
    Add,
    Delete,
    Adjust,
    /// Not attributed to a specific call.
    Request,
}

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// The push stream dropped; it reconnects on its own.
    #[error("Event stream interrupted: {reason}")]
    TransportTransient { reason: String },

    // ── Registry ─────────────────────────────────────────────────────
    #[error("Registry {op} failed: {message}")]
    RegistryCallFailed {
        op: RegistryOp,
        message: String,
        status: Option<u16>,
    },

    // ── Payloads ─────────────────────────────────────────────────────
    #[error("Malformed event payload: {message}")]
    DecodeFailed { message: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Device filter {expr:?} selects no devices")]
    FilterRejected { expr: String },

    #[error("Invalid sensor form: {0}")]
    Validation(#[from] FormError),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Not connected")]
    Disconnected,

    // ── Configuration / storage ──────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Preference storage error: {message}")]
    Preferences { message: String },
}

impl CoreError {
    /// Attribute an API failure to a specific registry call.
    pub fn registry(op: RegistryOp, err: sensordeck_api::Error) -> Self {
        let status = err.status();
        let message = match err {
            sensordeck_api::Error::Conflict { message }
            | sensordeck_api::Error::Registry { message, .. } => message,
            other => other.to_string(),
        };
        Self::RegistryCallFailed {
            op,
            message,
            status,
        }
    }

    /// `true` for failures that only affect the status indicator.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportTransient { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sensordeck_api::Error> for CoreError {
    fn from(err: sensordeck_api::Error) -> Self {
        match err {
            sensordeck_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            sensordeck_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            sensordeck_api::Error::Stream(reason) => CoreError::TransportTransient { reason },
            sensordeck_api::Error::Deserialization { message, body: _ } => {
                CoreError::DecodeFailed { message }
            }
            other @ (sensordeck_api::Error::Transport(_)
            | sensordeck_api::Error::Conflict { .. }
            | sensordeck_api::Error::Registry { .. }) => {
                let status = other.status();
                CoreError::RegistryCallFailed {
                    op: RegistryOp::Request,
                    message: other.to_string(),
                    status,
                }
            }
        }
    }
}
