//! `sensordeck-tui`: live sensor console in the terminal.
//!
//! One card per visible sensor with a rolling chart, its bias and the
//! latest log lines. The console connects on startup and follows the
//! registry's event stream until you quit.
//!
//! Logs go to a file (default under the data directory) so they never
//! corrupt the UI.

mod action;
mod app;
mod data_bridge;
mod event;
mod form;
mod terminal;
mod theme;
mod widgets;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use sensordeck_config::{Config, FilePreferences};
use sensordeck_core::{Backends, ConsoleConfig, SessionController};

use crate::app::{App, AppSettings};

/// Terminal console for live sensor readings.
#[derive(Parser, Debug)]
#[command(name = "sensordeck-tui", version, about)]
struct Cli {
    /// Endpoint profile from the config file
    #[arg(short = 'p', long, env = "SENSORDECK_PROFILE")]
    profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SENSORDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Registry base URL (overrides profile)
    #[arg(short = 'r', long)]
    registry_url: Option<String>,

    /// Event stream URL (overrides profile)
    #[arg(long)]
    stream_url: Option<String>,

    /// Log file path (defaults to sensordeck-tui.log in the data directory)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// File-only tracing. The returned guard must outlive the app so the
/// writer flushes.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("SENSORDECK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sensordeck_tui={log_level},sensordeck_core={log_level}"
        ))
    });

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| sensordeck_config::data_dir().join("sensordeck-tui.log"));
    let log_dir = log_file
        .parent()
        .map_or_else(std::env::temp_dir, std::path::Path::to_path_buf);
    let _ = std::fs::create_dir_all(&log_dir);
    let log_name = log_file
        .file_name()
        .map_or_else(|| "sensordeck-tui.log".into(), std::ffi::OsStr::to_os_string);

    let file_appender = tracing_appender::rolling::never(log_dir, log_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let cfg = match &cli.config {
        Some(path) => sensordeck_config::load_config_from(path),
        None => sensordeck_config::load_config(),
    };
    cfg.wrap_err("failed to load configuration")
}

/// Profile and file settings, then command-line overrides.
fn console_config(cli: &Cli, cfg: &Config) -> Result<ConsoleConfig> {
    let mut console = cfg
        .to_console_config(cli.profile.as_deref())
        .wrap_err("invalid configuration")?;
    if let Some(raw) = &cli.registry_url {
        console.registry_url =
            Url::parse(raw).wrap_err_with(|| format!("invalid registry URL {raw:?}"))?;
    }
    if let Some(raw) = &cli.stream_url {
        console.stream_url =
            Url::parse(raw).wrap_err_with(|| format!("invalid stream URL {raw:?}"))?;
    }
    Ok(console)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    terminal::install_hooks()?;
    let _log_guard = setup_tracing(&cli);

    let cfg = load_config(&cli)?;
    let console = console_config(&cli, &cfg)?;
    info!(
        registry = %console.registry_url,
        stream = %console.stream_url,
        "starting sensordeck-tui"
    );

    let prefs = Arc::new(FilePreferences::at_default_location());
    let backends = Backends::from_config(&console, prefs).wrap_err("failed to build clients")?;
    let controller = SessionController::start(&console, backends);

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let settings = AppSettings {
        adjust_step: cfg.adjust_step,
        window_secs: cfg.window_secs as f64,
        max_log_lines: cfg.max_log_lines,
        frame_interval: Duration::from_millis(cfg.frame_interval_ms.max(1)),
    };

    let mut app = App::new(controller.clone(), settings);
    let mut term = terminal::enter()?;
    let outcome = app.run(&mut term).await;
    terminal::leave();

    controller.shutdown().await;
    info!("sensordeck-tui exited");
    outcome
}
