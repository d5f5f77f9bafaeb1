//! Sensor registry command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use sensordeck_core::{AddForm, Entity, EntityId, MemoryFilterStore, Registry};

use crate::cli::{GlobalOpts, OutputFormat, SensorsArgs, SensorsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Period")]
    period: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Bias")]
    bias: String,
}

impl From<&Entity> for SensorRow {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id.to_string(),
            name: e.name.clone(),
            kind: e.kind.to_string(),
            device: e.device_id.clone(),
            period: humantime::format_duration(e.period).to_string(),
            enabled: if e.enabled { "yes" } else { "no" }.into(),
            bias: format_bias(e.bias),
        }
    }
}

fn format_bias(bias: Option<f64>) -> String {
    bias.map_or_else(|| "-".into(), |b| format!("{b:.2}"))
}

fn detail(e: &Entity) -> String {
    [
        format!("ID:      {}", e.id),
        format!("Name:    {}", e.display_name()),
        format!("Type:    {}", e.kind),
        format!("Device:  {}", e.device_id),
        format!("Period:  {}", humantime::format_duration(e.period)),
        format!("Enabled: {}", e.enabled),
        format!("Bias:    {}", format_bias(e.bias)),
    ]
    .join("\n")
}

#[derive(Serialize)]
struct BiasReport<'a> {
    id: &'a str,
    delta: f64,
    bias: f64,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    registry: &dyn Registry,
    args: SensorsArgs,
    format: OutputFormat,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SensorsCommand::List { filter, kind } => {
            let filter = filter.as_deref().map(util::parse_filter).transpose()?;
            let kind = kind.as_deref().map(util::parse_kind).transpose()?;

            let mut sensors: Vec<Entity> = registry
                .list()
                .await?
                .into_iter()
                .filter(|e| filter.as_ref().is_none_or(|f| f.contains(&e.device_id)))
                .filter(|e| kind.is_none_or(|k| e.kind == k))
                .collect();
            sensors.sort_by(|a, b| a.id.cmp(&b.id));

            let out = output::render_list(
                format,
                &sensors,
                |e| SensorRow::from(e),
                |e| e.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SensorsCommand::Add {
            name,
            kind,
            device_id,
            period,
        } => {
            let form = AddForm {
                name,
                kind,
                device_id,
                period_secs: period,
            };
            let new = form.validate().map_err(|e| CliError::Validation {
                field: "sensor".into(),
                reason: e.to_string(),
            })?;

            let created = registry.add(&new).await?;
            tracing::debug!(entity_id = %created.id, "sensor registered");
            let out = output::render_single(format, &created, detail, |e| e.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SensorsCommand::Delete { sensor } => {
            if !util::confirm(&format!("Delete sensor {sensor}?"), "delete", global.yes)? {
                return Ok(());
            }
            let id = EntityId::from(sensor.as_str());
            registry
                .delete(&id)
                .await
                .map_err(|e| CliError::for_sensor(e, &sensor))?;
            if !global.quiet {
                eprintln!("Sensor {sensor} deleted");
            }
            Ok(())
        }

        SensorsCommand::Adjust { sensor, delta } => {
            let id = EntityId::from(sensor.as_str());
            let bias = registry
                .adjust(&id, delta)
                .await
                .map_err(|e| CliError::for_sensor(e, &sensor))?;

            let report = BiasReport {
                id: &sensor,
                delta,
                bias,
            };
            let out = output::render_single(
                format,
                &report,
                |r| format!("{}: delta={} => bias={:.2}", r.id, r.delta, r.bias),
                |r| format!("{:.2}", r.bias),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// Registry client for one-shot commands; filters are never persisted here.
pub fn registry(
    console: &sensordeck_core::ConsoleConfig,
) -> Result<Arc<dyn Registry>, CliError> {
    let backends = util::backends(console, Arc::new(MemoryFilterStore::default()))?;
    Ok(backends.registry)
}
