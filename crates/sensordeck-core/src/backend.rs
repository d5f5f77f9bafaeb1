// ── Backend seams ──
//
// The session engine talks to the outside world only through these traits.
// `convert.rs` implements them for the HTTP clients in `sensordeck-api`;
// tests and headless tools plug in their own.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::CoreError;
use crate::filter::IntervalSet;
use crate::model::{Entity, EntityId, NewEntity};

pub use sensordeck_api::StreamEvent;

/// Request/response access to the sensor registry.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn list(&self) -> Result<Vec<Entity>, CoreError>;

    async fn add(&self, entity: &NewEntity) -> Result<Entity, CoreError>;

    async fn delete(&self, id: &EntityId) -> Result<(), CoreError>;

    /// Shift the sensor's bias by `delta`; returns the new absolute bias.
    async fn adjust(&self, id: &EntityId, delta: f64) -> Result<f64, CoreError>;
}

/// Push-event transport.
///
/// `open` returns an infinite stream. Reconnects are the transport's own
/// business and show up only as repeated `Opened`/`TransportError` items.
/// Dropping the stream must tear the connection down.
pub trait EventSource: Send + Sync {
    fn open(&self, filter: &IntervalSet) -> BoxStream<'static, StreamEvent>;
}

/// Storage for the last applied device filter expression.
pub trait FilterStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, CoreError>;

    fn save(&self, expr: &str) -> Result<(), CoreError>;
}

/// The three collaborators a session needs.
#[derive(Clone)]
pub struct Backends {
    pub registry: Arc<dyn Registry>,
    pub events: Arc<dyn EventSource>,
    pub preferences: Arc<dyn FilterStore>,
}

// ── In-memory filter store ───────────────────────────────────────────

/// Process-local [`FilterStore`], for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryFilterStore {
    value: Mutex<Option<String>>,
}

impl MemoryFilterStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl FilterStore for MemoryFilterStore {
    fn load(&self) -> Result<Option<String>, CoreError> {
        self.value
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| CoreError::Preferences {
                message: e.to_string(),
            })
    }

    fn save(&self, expr: &str) -> Result<(), CoreError> {
        let mut guard = self.value.lock().map_err(|e| CoreError::Preferences {
            message: e.to_string(),
        })?;
        *guard = Some(expr.to_owned());
        Ok(())
    }
}
