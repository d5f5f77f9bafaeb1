// ── Domain model ──
//
// Sensors, readings and series points as the console sees them. These are
// decoupled from the registry's wire shapes; see `convert.rs`.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── EntityId ────────────────────────────────────────────────────────

/// Stable registry identifier of a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ── SensorKind ──────────────────────────────────────────────────────

/// What a sensor measures. Wire names are `THERMOMETER`, `HUMIDITY`, `MOTION`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SensorKind {
    Thermometer,
    Humidity,
    Motion,
}

impl SensorKind {
    /// Unit suffix used in log lines.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Thermometer => "°C",
            Self::Humidity => "%",
            Self::Motion => "",
        }
    }

    /// Map a raw value onto what gets plotted.
    ///
    /// Motion is binary: anything at or above 1 counts as movement.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            Self::Motion => {
                if value >= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Thermometer | Self::Humidity => value,
        }
    }
}

// ── Entity ──────────────────────────────────────────────────────────

/// Last-known metadata for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Numeric-coded label matched against the device filter. Not unique.
    pub device_id: String,
    pub kind: SensorKind,
    pub name: String,
    pub period: Duration,
    pub enabled: bool,
    /// `None` until the registry or an adjust call has reported it.
    pub bias: Option<f64>,
}

impl Entity {
    /// Placeholder for a sensor first seen on the live stream.
    pub fn observed(reading: &Reading) -> Self {
        Self {
            id: reading.entity_id.clone(),
            device_id: reading.device_id.clone(),
            kind: reading.kind,
            name: String::new(),
            period: Duration::ZERO,
            enabled: true,
            bias: None,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

/// A validated request to register a new sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub name: String,
    pub kind: SensorKind,
    pub device_id: String,
    pub period: Duration,
}

// ── Reading / SeriesPoint ───────────────────────────────────────────

/// One timestamped observation from the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub entity_id: EntityId,
    pub device_id: String,
    pub kind: SensorKind,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// A single plotted sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub v: f64,
}

// ── Add form ────────────────────────────────────────────────────────

/// Raw, unvalidated fields of the "add sensor" form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddForm {
    pub name: String,
    pub kind: String,
    pub device_id: String,
    /// Sampling period in whole seconds.
    pub period_secs: String,
}

/// Why an [`AddForm`] was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("name is required")]
    MissingName,
    #[error("unknown sensor type {0:?}")]
    UnknownKind(String),
    #[error("device id is required")]
    MissingDeviceId,
    #[error("device id {0:?} is not a number")]
    InvalidDeviceId(String),
    #[error("period must be a positive number of seconds, got {0:?}")]
    InvalidPeriod(String),
}

impl AddForm {
    pub fn validate(&self) -> Result<NewEntity, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName);
        }

        let kind_text = self.kind.trim();
        let kind = SensorKind::from_str(kind_text)
            .map_err(|_| FormError::UnknownKind(kind_text.to_owned()))?;

        let device_id = self.device_id.trim();
        if device_id.is_empty() {
            return Err(FormError::MissingDeviceId);
        }
        if device_id.parse::<i64>().is_err() {
            return Err(FormError::InvalidDeviceId(device_id.to_owned()));
        }

        let period_text = self.period_secs.trim();
        let period = match period_text.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => return Err(FormError::InvalidPeriod(period_text.to_owned())),
        };

        Ok(NewEntity {
            name: name.to_owned(),
            kind,
            device_id: device_id.to_owned(),
            period,
        })
    }
}
