// ── API-to-domain type conversions ──
//
// Bridges raw `sensordeck_api` wire types into `sensordeck_core::model`
// types, and wires the HTTP clients up as the engine's backend traits.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use tracing::warn;

use sensordeck_api::models::format_iso_duration;
use sensordeck_api::transport::{TlsMode, TransportConfig};
use sensordeck_api::{
    CreateEntityBody, EntityRecord, ReadingPayload, ReconnectConfig, RegistryClient, SseClient,
    StreamEvent,
};

use crate::backend::{Backends, EventSource, FilterStore, Registry};
use crate::config::{ConsoleConfig, TlsVerification};
use crate::error::{CoreError, RegistryOp};
use crate::filter::IntervalSet;
use crate::model::{Entity, EntityId, NewEntity, Reading, SensorKind};

// ── Helpers ────────────────────────────────────────────────────────

/// Accept either an RFC 3339 string or epoch seconds (fractional allowed).
fn parse_timestamp(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    match raw {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let millis = (secs * 1_000.0).round() as i64;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

/// Coerce a JSON number or numeric string into a finite `f64`.
fn coerce_value(raw: &serde_json::Value) -> Option<f64> {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    value.is_finite().then_some(value)
}

// ── Entity ─────────────────────────────────────────────────────────

impl TryFrom<EntityRecord> for Entity {
    type Error = CoreError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        let kind = SensorKind::from_str(&record.kind).map_err(|_| CoreError::DecodeFailed {
            message: format!("sensor {} has unknown type {:?}", record.id, record.kind),
        })?;

        Ok(Self {
            id: EntityId::from(record.id),
            device_id: record.device_id,
            kind,
            name: record.name,
            period: record
                .period
                .and_then(|p| p.to_duration())
                .unwrap_or_default(),
            enabled: record.enabled,
            bias: record.bias,
        })
    }
}

impl From<&NewEntity> for CreateEntityBody {
    fn from(entity: &NewEntity) -> Self {
        Self {
            name: entity.name.clone(),
            kind: entity.kind.to_string(),
            device_id: entity.device_id.clone(),
            period: format_iso_duration(entity.period),
        }
    }
}

// ── Reading ────────────────────────────────────────────────────────

impl TryFrom<ReadingPayload> for Reading {
    type Error = CoreError;

    fn try_from(payload: ReadingPayload) -> Result<Self, Self::Error> {
        let kind = SensorKind::from_str(&payload.kind).map_err(|_| CoreError::DecodeFailed {
            message: format!("unknown sensor type {:?}", payload.kind),
        })?;
        let value = coerce_value(&payload.value).ok_or_else(|| CoreError::DecodeFailed {
            message: format!("value {} is not a number", payload.value),
        })?;
        let observed_at = parse_timestamp(&payload.ts).ok_or_else(|| CoreError::DecodeFailed {
            message: format!("timestamp {} is not RFC 3339 or epoch seconds", payload.ts),
        })?;

        Ok(Self {
            entity_id: EntityId::from(payload.sensor_id),
            device_id: payload.device_id,
            kind,
            value,
            observed_at,
        })
    }
}

// ── Backends over HTTP ─────────────────────────────────────────────

#[async_trait]
impl Registry for RegistryClient {
    async fn list(&self) -> Result<Vec<Entity>, CoreError> {
        let records = RegistryClient::list(self)
            .await
            .map_err(|e| CoreError::registry(RegistryOp::List, e))?;

        Ok(records
            .into_iter()
            .filter_map(|record| match Entity::try_from(record) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(error = %e, "skipping registry record");
                    None
                }
            })
            .collect())
    }

    async fn add(&self, entity: &NewEntity) -> Result<Entity, CoreError> {
        let record = RegistryClient::add(self, &CreateEntityBody::from(entity))
            .await
            .map_err(|e| CoreError::registry(RegistryOp::Add, e))?;
        Entity::try_from(record)
    }

    async fn delete(&self, id: &EntityId) -> Result<(), CoreError> {
        self.delete_entity(id.as_str())
            .await
            .map_err(|e| CoreError::registry(RegistryOp::Delete, e))
    }

    async fn adjust(&self, id: &EntityId, delta: f64) -> Result<f64, CoreError> {
        RegistryClient::adjust(self, id.as_str(), delta)
            .await
            .map(|resp| resp.bias)
            .map_err(|e| CoreError::registry(RegistryOp::Adjust, e))
    }
}

impl EventSource for SseClient {
    fn open(&self, filter: &IntervalSet) -> BoxStream<'static, StreamEvent> {
        Box::pin(self.subscribe(&filter.to_string()))
    }
}

fn transport_config(config: &ConsoleConfig) -> TransportConfig {
    TransportConfig {
        tls: match &config.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        },
        timeout: config.timeout,
        connect_timeout: config.connect_timeout,
    }
}

impl Backends {
    /// HTTP registry + SSE stream built from `config`.
    pub fn from_config(
        config: &ConsoleConfig,
        preferences: Arc<dyn FilterStore>,
    ) -> Result<Self, CoreError> {
        let transport = transport_config(config);
        let reconnect = ReconnectConfig {
            initial_delay: config.reconnect.initial_delay,
            max_delay: config.reconnect.max_delay,
            max_retries: config.reconnect.max_retries,
        };

        let registry = RegistryClient::new(config.registry_url.as_str(), &transport)?;
        let events = SseClient::new(config.stream_url.as_str(), &transport, reconnect)?;

        Ok(Self {
            registry: Arc::new(registry),
            events: Arc::new(events),
            preferences,
        })
    }
}
