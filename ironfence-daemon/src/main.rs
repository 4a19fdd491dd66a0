mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use ironfence_core::config::IronfenceConfig;
use ironfence_daemon::orchestrator::Orchestrator;
use ironfence_xdp_engine::{CompiledRules, FilterMode, RuleFile};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드: 파일 → 환경변수 → CLI 인자
    let mut config = IronfenceConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, &cli);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        if config.xdp.enabled {
            let mode: FilterMode = config.xdp.mode.parse()?;
            let rules = RuleFile::load(&config.xdp.rules_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load {}: {}", config.xdp.rules_path, e))?;
            let compiled = CompiledRules::compile(&rules, mode)?;
            println!(
                "{}: {} {} rules",
                config.xdp.rules_path,
                compiled.len(),
                compiled.table_name()
            );
        }
        println!("configuration OK");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ironfence-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await?;

    tracing::info!("ironfence-daemon shut down");
    Ok(())
}

fn apply_cli_overrides(config: &mut IronfenceConfig, cli: &DaemonCli) {
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(pid_file) = &cli.pid_file {
        config.general.pid_file = pid_file.clone();
    }
    if let Some(interface) = &cli.interface {
        config.xdp.interface = interface.clone();
    }
    if let Some(rules) = &cli.rules {
        config.xdp.rules_path = rules.display().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "ironfence-daemon",
            "--log-level",
            "debug",
            "--interface",
            "ens5",
            "--rules",
            "/tmp/rules.toml",
            "--pid-file",
            "",
        ]);
        let mut config = IronfenceConfig::default();
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.xdp.interface, "ens5");
        assert_eq!(config.xdp.rules_path, "/tmp/rules.toml");
        assert!(config.general.pid_file.is_empty());
    }

    #[test]
    fn default_config_path() {
        let cli = DaemonCli::parse_from(["ironfence-daemon"]);
        assert_eq!(
            cli.config,
            std::path::PathBuf::from("/etc/ironfence/ironfence.toml")
        );
        assert!(!cli.validate);
    }
}
