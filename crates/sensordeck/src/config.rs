//! CLI configuration: the shared `sensordeck_config` layers plus flag
//! overrides from `GlobalOpts`.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use sensordeck_config::{Config, ConfigError, FilePreferences};
use sensordeck_core::{ConsoleConfig, TlsVerification};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Config file in effect: `--config` / `SENSORDECK_CONFIG`, else the
/// platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(sensordeck_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(sensordeck_config::load_config_from(&config_path(global))?)
}

/// Translate config + flags into an engine config.
///
/// Flag overrides take priority over profile values.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<ConsoleConfig, CliError> {
    let mut console = config
        .to_console_config(global.profile.as_deref())
        .map_err(|e| match e {
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: available_profiles(config),
            },
            other => other.into(),
        })?;

    if let Some(raw) = &global.registry_url {
        console.registry_url = parse_url("registry-url", raw)?;
    }
    if let Some(raw) = &global.stream_url {
        console.stream_url = parse_url("stream-url", raw)?;
    }
    if global.insecure {
        console.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        console.timeout = Duration::from_secs(secs);
    }
    Ok(console)
}

/// `--output`, else the config's `output`, else table.
pub fn output_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&config.output, true).unwrap_or_else(|_| {
            tracing::warn!(output = %config.output, "unknown output format in config");
            OutputFormat::Table
        })
    })
}

pub fn preferences() -> FilePreferences {
    FilePreferences::at_default_location()
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, CliError> {
    url::Url::parse(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })
}
