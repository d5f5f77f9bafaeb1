//! Command dispatch: CLI args -> registry calls / sessions -> output.

pub mod config_cmd;
pub mod filter;
pub mod sensors;
pub mod util;
pub mod watch;
