//! Console engine between `sensordeck-api` and the front ends (CLI / TUI).
//!
//! - **[`SessionController`]**: facade over one runtime task that owns all
//!   console state. Commands go in through the [`ActionBus`]; status,
//!   notifications and [`ViewUpdate`]s come out.
//!
//! - **[`EntityRegistry`]**: `DashMap` + `watch` projection of the remote
//!   registry, plus the set of sensors with a delete in flight.
//!
//! - **[`IntervalSet`]**, **[`BoundedSeries`]**, **[`RequestCoalescer`]**,
//!   **[`EventIngestor`]**: the building blocks the runtime is made of.
//!
//! - **Backend seams** ([`backend`]): `Registry`, `EventSource` and
//!   `FilterStore` traits, implemented over HTTP in [`convert`].

pub mod action;
pub mod backend;
pub mod coalesce;
pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod registry;
pub mod series;
pub mod session;
pub mod stream;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{ActionBus, Command, CommandKind, CommandReceiver};
pub use backend::{Backends, EventSource, FilterStore, MemoryFilterStore, Registry, StreamEvent};
pub use coalesce::{AdjustOutcome, RequestCoalescer};
pub use config::{ConsoleConfig, ReconnectPolicy, TlsVerification};
pub use error::{CoreError, RegistryOp};
pub use filter::IntervalSet;
pub use ingest::{EventIngestor, IngestEvent, IngestStream};
pub use registry::EntityRegistry;
pub use series::BoundedSeries;
pub use session::{ConnectionStatus, SessionController, SessionState};
pub use stream::EntityStream;
pub use view::{CardLog, Notification, NotificationKind, NotificationLevel, ViewUpdate};

pub use model::{AddForm, Entity, EntityId, FormError, NewEntity, Reading, SensorKind, SeriesPoint};
