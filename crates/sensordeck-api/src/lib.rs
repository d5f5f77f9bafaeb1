// sensordeck-api: Async clients for the sensor registry and its event stream

pub mod error;
pub mod models;
pub mod registry;
pub mod sse;
pub mod transport;

pub use error::Error;
pub use models::{AdjustResponse, CreateEntityBody, EntityRecord, ReadingPayload, WirePeriod};
pub use registry::RegistryClient;
pub use sse::{EventSubscription, ReconnectConfig, SseClient, StreamEvent};
pub use transport::{TlsMode, TransportConfig};
