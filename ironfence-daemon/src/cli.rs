//! CLI argument definitions for ironfence-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Ironfence XDP packet filter daemon.
///
/// Loads the compiled XDP program, attaches it to the configured interface,
/// writes the rule tables, and keeps them in sync until shutdown.
/// Send SIGHUP to reload the rule file.
#[derive(Parser, Debug)]
#[command(name = "ironfence-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ironfence.toml configuration file.
    #[arg(short, long, default_value = "/etc/ironfence/ironfence.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the network interface to attach to.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Override the rule file path.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Validate configuration and rule file, then exit without attaching.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
