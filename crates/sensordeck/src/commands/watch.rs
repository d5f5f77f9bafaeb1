//! `watch`: a headless console session that prints card log lines.

use std::collections::HashSet;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::sync::broadcast::error::RecvError;

use sensordeck_core::{
    ConnectionStatus, ConsoleConfig, FilterStore, MemoryFilterStore, NotificationKind,
    NotificationLevel, SensorKind, SessionController, ViewUpdate,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;

use super::util;

#[derive(Serialize)]
struct LogLine<'a> {
    sensor: &'a str,
    line: &'a str,
}

#[allow(clippy::too_many_lines)]
pub async fn handle(
    mut console: ConsoleConfig,
    args: WatchArgs,
    prefs: Arc<dyn FilterStore>,
    format: OutputFormat,
    color: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // A one-off filter must not overwrite the saved preference.
    let prefs: Arc<dyn FilterStore> = match &args.filter {
        Some(expr) => {
            util::parse_filter(expr)?;
            console.initial_filter = Some(expr.clone());
            Arc::new(MemoryFilterStore::new(Some(expr.clone())))
        }
        None => prefs,
    };
    let hidden = kinds_to_hide(&args.kind)?;
    let deadline = args
        .duration
        .as_deref()
        .map(|raw| {
            humantime::parse_duration(raw).map_err(|e| CliError::Validation {
                field: "duration".into(),
                reason: e.to_string(),
            })
        })
        .transpose()?;

    let backends = util::backends(&console, prefs)?;
    let controller = SessionController::start(&console, backends);
    let mut views = controller
        .take_view_updates()
        .await
        .ok_or_else(|| CliError::StreamClosed {
            reason: "view updates already taken".into(),
        })?;
    let mut notifications = controller.subscribe_notifications();
    let mut status = controller.subscribe_status();

    for kind in hidden {
        controller.set_kind_visible(kind, false);
    }
    controller.connect();

    let spinner = (!global.quiet && std::io::stderr().is_terminal()).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("connecting to {}", console.stream_url));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    });

    let sleep = tokio::time::sleep(deadline.unwrap_or(Duration::MAX));
    tokio::pin!(sleep);

    let mut was_live = false;
    let outcome = loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => break Ok(()),

            () = &mut sleep, if deadline.is_some() => break Ok(()),

            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let now = *status.borrow_and_update();
                tracing::debug!(status = %now, "connection status");
                match now {
                    ConnectionStatus::Online => {
                        was_live = true;
                        if let Some(bar) = &spinner {
                            bar.finish_and_clear();
                        }
                    }
                    ConnectionStatus::Reconnecting if !global.quiet => {
                        eprintln!("stream interrupted, reconnecting");
                    }
                    ConnectionStatus::Offline if was_live => {
                        break Err(CliError::StreamClosed {
                            reason: "reconnect attempts exhausted".into(),
                        });
                    }
                    _ => {}
                }
            }

            note = notifications.recv() => match note {
                Ok(note) => {
                    if let NotificationKind::SessionEnded { superseded: false, .. } = note.kind {
                        break Ok(());
                    }
                    if note.kind == NotificationKind::FilterRejected {
                        break Err(CliError::InvalidFilter { expr: controller.current_filter() });
                    }
                    if !global.quiet || note.level == NotificationLevel::Error {
                        eprintln!("{note}");
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "notifications lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },

            update = views.recv() => match update {
                Some(ViewUpdate::Log { entity_id, line }) => {
                    print_line(entity_id.as_str(), &line, format, color);
                }
                Some(_) => {}
                None => break Ok(()),
            },
        }
    };

    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    controller.shutdown().await;
    outcome
}

/// Kinds to hide so that only `shown` are printed. Empty shows everything.
fn kinds_to_hide(shown: &[String]) -> Result<Vec<SensorKind>, CliError> {
    if shown.is_empty() {
        return Ok(Vec::new());
    }
    let shown = shown
        .iter()
        .map(|raw| util::parse_kind(raw))
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(SensorKind::iter().filter(|k| !shown.contains(k)).collect())
}

fn print_line(sensor: &str, line: &str, format: OutputFormat, color: bool) {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            if let Ok(json) = serde_json::to_string(&LogLine { sensor, line }) {
                println!("{json}");
            }
        }
        OutputFormat::Table | OutputFormat::Plain => {
            if color {
                println!("{} {line}", sensor.cyan());
            } else {
                println!("{sensor} {line}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_kinds_hides_nothing() {
        assert!(kinds_to_hide(&[]).unwrap().is_empty());
    }

    #[test]
    fn listed_kinds_stay_visible() {
        let hidden = kinds_to_hide(&["motion".into()]).unwrap();
        assert_eq!(hidden, vec![SensorKind::Thermometer, SensorKind::Humidity]);
    }

    #[test]
    fn unknown_kind_is_a_usage_error() {
        let err = kinds_to_hide(&["lux".into()]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::USAGE);
    }
}
