// ── Rendering surface ──
//
// Everything a front end needs to draw the console, as plain messages.
// The session runtime is the only producer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::CoreError;
use crate::model::{Entity, EntityId, Reading, SensorKind, SeriesPoint};

/// Per-card log capacity used when the front end does not override it.
pub const DEFAULT_MAX_LOG_LINES: usize = 200;

/// One change to the rendered console.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// A sensor became visible for the first time this session.
    CardCreated {
        entity_id: EntityId,
        kind: SensorKind,
        device_id: String,
        name: String,
    },
    /// Registry metadata for a card changed.
    CardMeta { entity: Arc<Entity> },
    /// Current window of points for one card, oldest first.
    Redraw {
        entity_id: EntityId,
        kind: SensorKind,
        points: Arc<[SeriesPoint]>,
    },
    Log { entity_id: EntityId, line: String },
    /// `confirmed` is `false` for the optimistic local value.
    Bias {
        entity_id: EntityId,
        bias: f64,
        confirmed: bool,
    },
    CardRemoved { entity_id: EntityId },
    KindFilter { kind: SensorKind, visible: bool },
    /// Every card was dropped (new session with a different filter).
    Cleared,
}

impl ViewUpdate {
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::CardCreated { entity_id, .. }
            | Self::Redraw { entity_id, .. }
            | Self::Log { entity_id, .. }
            | Self::Bias { entity_id, .. }
            | Self::CardRemoved { entity_id } => Some(entity_id),
            Self::CardMeta { entity } => Some(&entity.id),
            Self::KindFilter { .. } | Self::Cleared => None,
        }
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// What a [`Notification`] is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    FilterRejected,
    FilterApplied,
    PreferenceSaveFailed,
    RegistryCallFailed,
    DecodeFailed,
    ValidationFailed,
    AddSucceeded,
    AddFailed,
    DeleteSucceeded,
    DeleteFailed,
    AdjustFailed,
    NotConnected,
    /// Emitted once per session, after its sub-activities are torn down.
    SessionEnded { session_id: u64, superseded: bool },
}

/// A user-facing message. One per error instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub kind: NotificationKind,
    pub message: String,
    pub entity_id: Option<EntityId>,
}

impl Notification {
    pub fn info(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            kind,
            message: message.into(),
            entity_id: None,
        }
    }

    pub fn warning(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            ..Self::info(kind, message)
        }
    }

    pub fn error(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            ..Self::info(kind, message)
        }
    }

    /// Wrap a caught [`CoreError`].
    pub fn from_error(kind: NotificationKind, err: &CoreError) -> Self {
        Self::error(kind, err.to_string())
    }

    pub fn for_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(id) => write!(f, "[{}] {}: {}", self.level, id, self.message),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

// ── Log lines ────────────────────────────────────────────────────────

/// `[THERMOMETER] 21.5°C @ 2026-10-19T12:00:00.250Z`
pub fn reading_line(reading: &Reading) -> String {
    format!(
        "[{}] {:.1}{} @ {}",
        reading.kind,
        reading.value,
        reading.kind.unit(),
        timestamp(reading.observed_at)
    )
}

pub fn card_created_line() -> String {
    "[open] sensor card created".to_owned()
}

pub fn adjust_line(delta: f64, bias: f64) -> String {
    format!("[adjust] delta={delta} => bias={bias}")
}

pub fn adjust_failed_line(delta: f64, err: &CoreError) -> String {
    format!("[adjust] delta={delta} failed: {err}")
}

pub fn delete_failed_line(err: &CoreError) -> String {
    format!("[delete] failed: {err}")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Card log buffer ──────────────────────────────────────────────────

/// Bounded per-card log: newest line last, oldest evicted first.
#[derive(Debug, Clone)]
pub struct CardLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for CardLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl CardLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_LOG_LINES)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reading_line_format() {
        let reading = Reading {
            entity_id: "s1".into(),
            device_id: "11".into(),
            kind: SensorKind::Thermometer,
            value: 21.46,
            observed_at: DateTime::parse_from_rfc3339("2026-10-19T12:00:00.25Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        insta::assert_snapshot!(reading_line(&reading), @"[THERMOMETER] 21.5°C @ 2026-10-19T12:00:00.250Z");

        let motion = Reading {
            kind: SensorKind::Motion,
            value: 1.0,
            ..reading
        };
        assert_eq!(
            reading_line(&motion),
            "[MOTION] 1.0 @ 2026-10-19T12:00:00.250Z"
        );
    }

    #[test]
    fn adjust_line_format() {
        assert_eq!(adjust_line(2.5, 3.0), "[adjust] delta=2.5 => bias=3");
    }

    #[test]
    fn card_log_evicts_oldest() {
        let mut log = CardLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            vec!["line 2", "line 3", "line 4"]
        );
    }

    #[test]
    fn notification_display() {
        let note = Notification::error(NotificationKind::DeleteFailed, "gone")
            .for_entity("s9".into());
        assert_eq!(note.to_string(), "[error] s9: gone");
        assert_eq!(note.level, NotificationLevel::Error);
    }
}
