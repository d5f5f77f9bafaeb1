// Wire types for the registry and the event stream.
//
// Field names follow the registry's camelCase JSON. Only the shapes the
// console consumes are modelled; unknown fields are ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Registry records ────────────────────────────────────────────────

/// A sensor as returned by `GET /list` and `POST /add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub device_id: String,
    #[serde(default)]
    pub period: Option<WirePeriod>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Only present on registries that report the current bias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

/// Sampling period as the registry encodes it.
///
/// Registries emit either an ISO-8601 duration (`"PT5S"`) or a plain
/// number of seconds, depending on their serializer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WirePeriod {
    Seconds(f64),
    Iso(String),
}

impl WirePeriod {
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(secs) if secs.is_finite() && *secs >= 0.0 => {
                Some(Duration::from_secs_f64(*secs))
            }
            Self::Seconds(_) => None,
            Self::Iso(text) => parse_iso_duration(text),
        }
    }
}

/// Body for `POST /add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityBody {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub device_id: String,
    /// ISO-8601 duration, e.g. `"PT5S"`.
    pub period: String,
}

/// Response of `POST /{id}/adjust`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustResponse {
    pub bias: f64,
}

// ── Event stream payload ────────────────────────────────────────────

/// One JSON reading pushed over the event stream.
///
/// `ts` and `value` are kept as raw JSON: producers disagree on whether
/// timestamps are ISO strings or epoch seconds, and whether values are
/// numbers or numeric strings. The core coerces both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPayload {
    pub sensor_id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: serde_json::Value,
    pub value: serde_json::Value,
}

// ── ISO-8601 durations ──────────────────────────────────────────────

/// Format a duration as an ISO-8601 `PT..S` string.
pub fn format_iso_duration(period: Duration) -> String {
    let secs = period.as_secs();
    let millis = period.subsec_millis();
    if millis == 0 {
        format!("PT{secs}S")
    } else {
        format!("PT{secs}.{millis:03}S")
    }
}

/// Parse the time-only subset of ISO-8601 durations (`PT1H2M3.5S`).
///
/// Date components (`P1D`) are accepted for days only; years and months
/// have no fixed length and are rejected.
pub fn parse_iso_duration(text: &str) -> Option<Duration> {
    let rest = text.trim().strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total = 0.0_f64;
    let mut seen = false;

    let mut number = String::new();
    for ch in date_part.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            'D' => {
                total += number.parse::<f64>().ok()? * 86_400.0;
                number.clear();
                seen = true;
            }
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }

    if let Some(time) = time_part {
        for ch in time.chars() {
            let unit = match ch {
                '0'..='9' | '.' => {
                    number.push(ch);
                    continue;
                }
                'H' => 3_600.0,
                'M' => 60.0,
                'S' => 1.0,
                _ => return None,
            };
            total += number.parse::<f64>().ok()? * unit;
            number.clear();
            seen = true;
        }
        if !number.is_empty() {
            return None;
        }
    }

    seen.then(|| Duration::from_secs_f64(total))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deserialize_entity_record() {
        let json = r#"{
            "id": "65f0c1",
            "name": "kitchen",
            "type": "THERMOMETER",
            "deviceId": "11",
            "period": "PT2S",
            "enabled": true
        }"#;

        let record: EntityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "65f0c1");
        assert_eq!(record.kind, "THERMOMETER");
        assert_eq!(record.device_id, "11");
        assert_eq!(
            record.period.and_then(|p| p.to_duration()),
            Some(Duration::from_secs(2))
        );
        assert_eq!(record.bias, None);
    }

    #[test]
    fn numeric_period_is_seconds() {
        let json = r#"{"id":"a","type":"MOTION","deviceId":"3","period":1.5}"#;
        let record: EntityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.period.and_then(|p| p.to_duration()),
            Some(Duration::from_millis(1500))
        );
        assert!(record.enabled);
    }

    #[test]
    fn create_body_uses_wire_names() {
        let body = CreateEntityBody {
            name: "hall".into(),
            kind: "HUMIDITY".into(),
            device_id: "42".into(),
            period: format_iso_duration(Duration::from_secs(5)),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "hall",
                "type": "HUMIDITY",
                "deviceId": "42",
                "period": "PT5S"
            })
        );
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration("PT1S"), Some(Duration::from_secs(1)));
        assert_eq!(parse_iso_duration("PT1M30S"), Some(Duration::from_secs(90)));
        assert_eq!(parse_iso_duration("PT0.25S"), Some(Duration::from_millis(250)));
        assert_eq!(parse_iso_duration("P1D"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_iso_duration("PT"), None);
        assert_eq!(parse_iso_duration("P1Y"), None);
        assert_eq!(parse_iso_duration("5s"), None);
    }

    #[test]
    fn format_round_trips_subsecond_periods() {
        assert_eq!(format_iso_duration(Duration::from_millis(1250)), "PT1.250S");
        assert_eq!(
            parse_iso_duration(&format_iso_duration(Duration::from_millis(1250))),
            Some(Duration::from_millis(1250))
        );
    }
}
