//! Device filter command handlers.

use serde::Serialize;
use tabled::Tabled;

use sensordeck_config::Config;
use sensordeck_core::FilterStore;

use crate::cli::{FilterArgs, FilterCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct FilterReport {
    expr: String,
    normalized: String,
    source: &'static str,
}

#[derive(Serialize)]
struct DeviceMatch {
    device: String,
    selected: bool,
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Selected")]
    selected: String,
}

pub fn handle(
    prefs: &dyn FilterStore,
    config: &Config,
    args: FilterArgs,
    format: OutputFormat,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        FilterCommand::Show => {
            let (expr, source) = match prefs.load()? {
                Some(expr) => (expr, "saved"),
                None => match &config.default_filter {
                    Some(expr) => (expr.clone(), "config"),
                    None => (String::new(), "none"),
                },
            };
            let report = FilterReport {
                normalized: sensordeck_core::IntervalSet::parse(&expr).to_string(),
                expr,
                source,
            };
            let out = output::render_single(
                format,
                &report,
                |r| {
                    if r.source == "none" {
                        "No device filter set".into()
                    } else {
                        format!("{} ({})", r.normalized, r.source)
                    }
                },
                |r| r.normalized.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        FilterCommand::Set { expr } => {
            let set = util::parse_filter(&expr)?;
            prefs.save(&expr)?;
            tracing::debug!(expr, normalized = %set, "filter saved");
            if !global.quiet {
                eprintln!("Device filter saved: {set}");
            }
            Ok(())
        }

        FilterCommand::Check { expr, device } => {
            let set = util::parse_filter(&expr)?;
            if device.is_empty() {
                let report = FilterReport {
                    normalized: set.to_string(),
                    expr,
                    source: "argument",
                };
                let out =
                    output::render_single(format, &report, |r| r.normalized.clone(), |r| {
                        r.normalized.clone()
                    })?;
                output::print_output(&out, global.quiet);
                return Ok(());
            }

            let matches: Vec<DeviceMatch> = device
                .into_iter()
                .map(|d| DeviceMatch {
                    selected: set.contains(&d),
                    device: d,
                })
                .collect();
            let out = output::render_list(
                format,
                &matches,
                |m| MatchRow {
                    device: m.device.clone(),
                    selected: if m.selected { "yes" } else { "no" }.into(),
                },
                |m| format!("{}\t{}", m.device, m.selected),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use sensordeck_core::MemoryFilterStore;

    use super::*;
    use crate::cli::{Cli, Command};

    fn parse(args: &[&str]) -> (FilterArgs, GlobalOpts) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Filter(f) => (f, cli.global),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn set_persists_the_raw_expression() {
        let store = MemoryFilterStore::default();
        let (args, global) = parse(&["sensordeck", "-q", "filter", "set", "12-10,15"]);

        handle(&store, &Config::default(), args, OutputFormat::Plain, &global).unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("12-10,15"));
    }

    #[test]
    fn set_refuses_an_empty_selection() {
        let store = MemoryFilterStore::default();
        let (args, global) = parse(&["sensordeck", "filter", "set", "abc"]);

        let err = handle(&store, &Config::default(), args, OutputFormat::Plain, &global)
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidFilter { .. }));
        assert_eq!(store.load().unwrap(), None);
    }
}
