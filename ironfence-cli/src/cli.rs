//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ironfence_xdp_engine::FilterMode;

/// Ironfence -- per-packet XDP source filter.
///
/// Use `ironfence <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironfence", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironfence.toml configuration file.
    #[arg(short, long, default_value = "ironfence.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Decision engine selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Ordered allow/block subnet rules.
    Acl,
    /// Per-subnet packets-per-second limits.
    Ratelimit,
}

impl From<ModeArg> for FilterMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Acl => Self::Acl,
            ModeArg::Ratelimit => Self::RateLimit,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate source addresses offline against a rule file.
    Check(CheckArgs),

    /// Check whether the daemon is running.
    Status(StatusArgs),

    /// Inspect rule files.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- check ----

/// Evaluate addresses with the same decision logic the kernel runs.
///
/// Without `--rules` the rule file and mode come from the configuration file.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Source addresses, one per packet.
    #[arg(required = true, num_args = 1..)]
    pub addrs: Vec<IpAddr>,

    /// Decision engine (default: `xdp.mode` from the config, or acl with `--rules`).
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Rule file to evaluate (default: `xdp.rules_path` from the config).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Arrival time of each packet in milliseconds, comma separated.
    ///
    /// With a single address, that address is replayed once per offset.
    #[arg(long, value_delimiter = ',')]
    pub at_ms: Vec<u64>,
}

// ---- status ----

/// Report daemon liveness from its PID file.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show interface and mode details.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- rules ----

/// Inspect rule files.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List compiled table entries.
    List {
        /// Rule file (default: `xdp.rules_path` from the config).
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Compile a rule file for both tables and report errors.
    Validate {
        /// Rule file (default: `xdp.rules_path` from the config).
        path: Option<PathBuf>,
    },
}

// ---- config ----

/// Manage ironfence configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, xdp, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_check_addresses() {
        let cli = Cli::try_parse_from(["ironfence", "check", "10.0.0.1", "fd00::1"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.addrs.len(), 2);
                assert!(args.addrs[1].is_ipv6());
                assert!(args.mode.is_none());
                assert!(args.rules.is_none());
                assert!(args.at_ms.is_empty());
            }
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn test_cli_parse_check_replay() {
        let cli = Cli::try_parse_from([
            "ironfence",
            "check",
            "10.0.0.1",
            "--mode",
            "ratelimit",
            "--rules",
            "/tmp/rules.toml",
            "--at-ms",
            "0,10,1200",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.mode, Some(ModeArg::Ratelimit));
                assert_eq!(args.rules, Some(PathBuf::from("/tmp/rules.toml")));
                assert_eq!(args.at_ms, vec![0, 10, 1200]);
            }
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn test_cli_parse_check_requires_address() {
        assert!(Cli::try_parse_from(["ironfence", "check"]).is_err());
    }

    #[test]
    fn test_cli_parse_check_rejects_bad_address() {
        assert!(Cli::try_parse_from(["ironfence", "check", "10.0.0.300"]).is_err());
    }

    #[test]
    fn test_mode_arg_maps_to_filter_mode() {
        assert_eq!(FilterMode::from(ModeArg::Acl), FilterMode::Acl);
        assert_eq!(FilterMode::from(ModeArg::Ratelimit), FilterMode::RateLimit);
    }

    #[test]
    fn test_cli_parse_status_verbose() {
        let cli = Cli::try_parse_from(["ironfence", "status", "-v"]).expect("parse succeeded");
        match cli.command {
            Commands::Status(args) => assert!(args.verbose),
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_list() {
        let cli = Cli::try_parse_from(["ironfence", "rules", "list"]).expect("parse succeeded");
        match cli.command {
            Commands::Rules(args) => match args.action {
                RulesAction::List { rules } => assert!(rules.is_none()),
                _ => panic!("expected List action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate_path() {
        let cli = Cli::try_parse_from(["ironfence", "rules", "validate", "/etc/ironfence/rules.toml"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Rules(args) => match args.action {
                RulesAction::Validate { path } => {
                    assert_eq!(path, Some(PathBuf::from("/etc/ironfence/rules.toml")));
                }
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["ironfence", "config", "show", "--section", "xdp"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(args) => match args.action {
                ConfigAction::Show { section } => assert_eq!(section, Some("xdp".to_owned())),
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "ironfence",
            "-c",
            "/custom/ironfence.toml",
            "--output",
            "json",
            "--log-level",
            "debug",
            "status",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/custom/ironfence.toml"));
        assert!(matches!(cli.output, OutputFormat::Json));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        assert!(Cli::try_parse_from(["ironfence"]).is_err());
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "ironfence");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for name in ["check", "status", "rules", "config"] {
            assert!(subcommands.contains(&name), "should have '{name}' subcommand");
        }
    }
}
