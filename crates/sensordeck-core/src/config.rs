// ── Runtime console configuration ──
//
// Where the registry and the stream live, plus engine tuning. Core never
// reads config files: the CLI/TUI builds a `ConsoleConfig` (usually via
// `sensordeck-config`) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::series::DEFAULT_COMPACT_FLOOR;

/// Trailing window rendered per sensor.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Quiet period an adjust lane waits before flushing its summed delta.
pub const DEFAULT_COALESCE_QUIET: Duration = Duration::from_millis(150);
/// Redraw batching interval (~30 fps).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed lab registries).
    DangerAcceptInvalid,
}

/// Backoff for the event stream's own reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Everything the session engine needs to run.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Registry base, e.g. `http://localhost:8080/iot/`.
    pub registry_url: Url,
    /// Event stream endpoint, e.g. `http://localhost:8080/api/stream`.
    pub stream_url: Url,
    pub tls: TlsVerification,
    /// Total timeout for registry calls.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub window: Duration,
    pub compact_floor: usize,
    pub coalesce_quiet: Duration,
    pub frame_interval: Duration,
    /// Filter used when no preference has been persisted yet.
    pub initial_filter: Option<String>,
}

impl ConsoleConfig {
    /// Config with default tuning for the given endpoints.
    pub fn new(registry_url: Url, stream_url: Url) -> Self {
        Self {
            registry_url,
            stream_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            window: DEFAULT_WINDOW,
            compact_floor: DEFAULT_COMPACT_FLOOR,
            coalesce_quiet: DEFAULT_COALESCE_QUIET,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            initial_filter: None,
        }
    }
}
