//! Clap derive structures for the `sensordeck` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so this file may
//! only depend on `clap` and `clap_complete`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sensordeck -- inspect and drive a live sensor registry
#[derive(Debug, Parser)]
#[command(
    name = "sensordeck",
    version,
    about = "Manage sensors and watch their readings from the command line",
    long_about = "Command-line companion to the SensorDeck console.\n\n\
        Talks to the sensor registry over HTTP and follows the live\n\
        reading stream over server-sent events.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Endpoint profile to use
    #[arg(long, short = 'p', env = "SENSORDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SENSORDECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Registry base URL (overrides profile)
    #[arg(long, short = 'r', global = true)]
    pub registry_url: Option<String>,

    /// Event stream URL (overrides profile)
    #[arg(long, global = true)]
    pub stream_url: Option<String>,

    /// Output format
    #[arg(long, short = 'o', env = "SENSORDECK_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List, register, delete and adjust sensors
    #[command(alias = "s")]
    Sensors(SensorsArgs),

    /// Follow live readings in the terminal
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Show, check or save the device filter
    #[command(alias = "f")]
    Filter(FilterArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Sensors ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SensorsArgs {
    #[command(subcommand)]
    pub command: SensorsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SensorsCommand {
    /// List registered sensors
    #[command(alias = "ls")]
    List {
        /// Only sensors whose device id the filter selects
        #[arg(long, short = 'f')]
        filter: Option<String>,

        /// Only sensors of this kind (thermometer, humidity, motion)
        #[arg(long, short = 't')]
        kind: Option<String>,
    },

    /// Register a new sensor
    Add {
        /// Display name
        #[arg(long, short = 'n')]
        name: String,

        /// Sensor kind (thermometer, humidity, motion)
        #[arg(long = "type", short = 't')]
        kind: String,

        /// Numeric device id
        #[arg(long, short = 'd')]
        device_id: String,

        /// Sampling period in seconds
        #[arg(long, default_value = "1")]
        period: String,
    },

    /// Delete a sensor
    #[command(alias = "rm")]
    Delete {
        /// Sensor id
        sensor: String,
    },

    /// Shift a sensor's bias
    Adjust {
        /// Sensor id
        sensor: String,

        /// Amount to add to the current bias (may be negative)
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device filter for this run (not persisted)
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Stop after this long (e.g. "30s", "5m")
    #[arg(long)]
    pub duration: Option<String>,

    /// Only print readings of these kinds (repeatable)
    #[arg(long, short = 't')]
    pub kind: Vec<String>,
}

// ── Filter ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[command(subcommand)]
    pub command: FilterCommand,
}

#[derive(Debug, Subcommand)]
pub enum FilterCommand {
    /// Print the saved filter (or the configured default)
    Show,

    /// Validate and save a filter expression
    Set {
        /// Expression such as "10-12,15"
        #[arg(allow_hyphen_values = true)]
        expr: String,
    },

    /// Parse an expression and report what it selects
    Check {
        #[arg(allow_hyphen_values = true)]
        expr: String,

        /// Device ids to test against the expression
        #[arg(long, short = 'd', allow_hyphen_values = true)]
        device: Vec<String>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a config file, taking endpoints from --registry-url / --stream-url
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
