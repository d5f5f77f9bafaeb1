mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("SENSORDECK_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;

    // Completions need no configuration at all.
    if let Command::Completions(args) = &cli.command {
        use clap::CommandFactory;

        let mut cmd = Cli::command();
        clap_complete::generate(args.shell, &mut cmd, "sensordeck", &mut std::io::stdout());
        return Ok(());
    }

    let path = config::config_path(global);
    let cfg = config::load(global)?;
    let format = config::output_format(global, &cfg);

    match cli.command {
        Command::Config(args) => commands::config_cmd::handle(args, &cfg, &path, format, global),

        Command::Filter(args) => {
            let prefs = config::preferences();
            commands::filter::handle(&prefs, &cfg, args, format, global)
        }

        Command::Sensors(args) => {
            let console = config::resolve(global, &cfg)?;
            let registry = commands::sensors::registry(&console)?;
            tracing::debug!(registry = %console.registry_url, "dispatching sensors command");
            commands::sensors::handle(registry.as_ref(), args, format, global)
                .await
                .map_err(|e| e.with_registry_url(console.registry_url.as_str()))
        }

        Command::Watch(args) => {
            let console = config::resolve(global, &cfg)?;
            let color = output::should_color(global.color);
            commands::watch::handle(
                console,
                args,
                Arc::new(config::preferences()),
                format,
                color,
                global,
            )
            .await
        }

        Command::Completions(_) => Ok(()),
    }
}
