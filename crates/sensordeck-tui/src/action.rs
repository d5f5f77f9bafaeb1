//! UI actions. Every state change in the app goes through one.

use sensordeck_core::{
    ConnectionStatus, EntityId, Notification, SensorKind, SessionState, ViewUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub enum Action {
    // ── Lifecycle ─────────────────────────────────────────────────
    Quit,
    Tick,
    Render,
    Resize(u16, u16),

    // ── From the session ──────────────────────────────────────────
    View(ViewUpdate),
    Notify(Notification),
    Status(ConnectionStatus),
    State(SessionState),
    FilterChanged(String),
    /// A delete for this sensor was published on the bus.
    DeleteRequested(EntityId),

    // ── Session commands ──────────────────────────────────────────
    Connect,
    Disconnect,
    Reload,
    AdjustSelected(f64),
    DeleteSelected,
    ToggleKind(SensorKind),

    // ── Navigation ────────────────────────────────────────────────
    Select(Direction),

    // ── Overlays ──────────────────────────────────────────────────
    ToggleHelp,
    OpenAddForm,
    OpenFilterPrompt,
    CloseOverlay,
    DismissToasts,
}
