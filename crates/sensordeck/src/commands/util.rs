//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::Arc;

use sensordeck_core::{
    Backends, ConsoleConfig, FilterStore, IntervalSet, SensorKind,
};

use crate::error::CliError;

/// HTTP backends for `console`, persisting filters through `preferences`.
pub fn backends(
    console: &ConsoleConfig,
    preferences: Arc<dyn FilterStore>,
) -> Result<Backends, CliError> {
    Ok(Backends::from_config(console, preferences)?)
}

/// Parse a filter expression, refusing one that selects nothing.
pub fn parse_filter(expr: &str) -> Result<IntervalSet, CliError> {
    let set = IntervalSet::parse(expr);
    if set.is_empty() {
        return Err(CliError::InvalidFilter { expr: expr.into() });
    }
    Ok(set)
}

pub fn parse_kind(raw: &str) -> Result<SensorKind, CliError> {
    SensorKind::from_str(raw.trim()).map_err(|_| CliError::Validation {
        field: "type".into(),
        reason: format!("expected thermometer, humidity or motion, got {raw:?}"),
    })
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_is_refused() {
        assert!(matches!(
            parse_filter(" , x"),
            Err(CliError::InvalidFilter { .. })
        ));
        assert!(parse_filter("10-12").is_ok());
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert!(matches!(parse_kind("Humidity"), Ok(SensorKind::Humidity)));
        assert!(parse_kind("barometer").is_err());
    }
}
