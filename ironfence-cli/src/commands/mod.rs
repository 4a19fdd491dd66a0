//! Command handlers -- one module per subcommand

pub mod check;
pub mod config;
pub mod rules;
pub mod status;

use std::path::{Path, PathBuf};

use tracing::debug;

use ironfence_core::config::IronfenceConfig;
use ironfence_xdp_engine::{FilterMode, RuleFile};

use crate::cli::ModeArg;
use crate::error::CliError;

/// Rule file and engine mode a command operates on.
#[derive(Debug)]
pub struct RuleSource {
    pub path: PathBuf,
    pub mode: FilterMode,
}

impl RuleSource {
    /// Pick the rule file and mode from flags, falling back to the config file.
    ///
    /// The config file is only read when `--rules` is absent.
    pub async fn resolve(
        config_path: &Path,
        rules: Option<PathBuf>,
        mode: Option<ModeArg>,
    ) -> Result<Self, CliError> {
        if let Some(path) = rules {
            return Ok(Self {
                path,
                mode: mode.map_or(FilterMode::Acl, FilterMode::from),
            });
        }

        let config = IronfenceConfig::load(config_path).await?;
        debug!(path = %config_path.display(), rules = %config.xdp.rules_path, "rule file from config");
        let mode = match mode {
            Some(mode) => mode.into(),
            None => config.xdp.mode.parse()?,
        };
        Ok(Self {
            path: PathBuf::from(config.xdp.rules_path),
            mode,
        })
    }

    /// Load the rule file.
    pub async fn load(&self) -> Result<RuleFile, CliError> {
        RuleFile::load(&self.path)
            .await
            .map_err(|e| CliError::Rule(format!("{}: {}", self.path.display(), e)))
    }
}
