//! Config command handlers. These never touch the network.

use std::path::Path;

use sensordeck_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(
    args: ConfigArgs,
    config: &Config,
    path: &Path,
    format: OutputFormat,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let out = output::render_single(
                format,
                config,
                |c| {
                    toml::to_string_pretty(c)
                        .unwrap_or_else(|e| format!("# could not render config: {e}"))
                },
                |_| path.display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut fresh = Config::default();
            if let Some(url) = &global.registry_url {
                fresh.registry_url.clone_from(url);
            }
            if let Some(url) = &global.stream_url {
                fresh.stream_url.clone_from(url);
            }
            // Validate endpoints before writing.
            fresh.to_console_config(None)?;

            sensordeck_config::save_config_to(&fresh, path)?;
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
    }
}
