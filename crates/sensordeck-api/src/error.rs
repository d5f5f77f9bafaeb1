use thiserror::Error;

/// Top-level error type for the `sensordeck-api` crate.
///
/// Covers the registry's request/response surface and the event stream.
/// `sensordeck-core` maps these into its own session-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Registry ────────────────────────────────────────────────────
    /// The registry refused a create because the device id is taken.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Any other non-success status from the registry.
    #[error("Registry error (HTTP {status}): {message}")]
    Registry { status: u16, message: String },

    // ── Event stream ────────────────────────────────────────────────
    /// The event stream could not be opened or dropped mid-flight.
    #[error("Event stream error: {0}")]
    Stream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Registry { status, .. } => *status >= 500,
            Self::Stream(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Registry { status: 404, .. } => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Registry { status, .. } => Some(*status),
            Self::Conflict { .. } => Some(409),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Registry {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Registry {
            status: 404,
            message: "no such sensor".into(),
        };
        assert!(!err.is_transient());
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn conflict_reports_409() {
        let err = Error::Conflict {
            message: "deviceId 7 already registered".into(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "Conflict: deviceId 7 already registered");
    }
}
