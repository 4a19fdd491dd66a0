//! Daemon orchestration -- engine assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `ironfence-daemon`.
//! It validates configuration, installs the metrics recorder, builds the
//! XDP filter engine, and runs the main loop until a shutdown signal.
//!
//! # Main Loop
//!
//! - `SIGTERM` / `SIGINT`: stop the engine (detaches the XDP program) and exit
//! - `SIGHUP`: reload the rule file and rewrite the kernel tables
//! - every [`HEALTH_CHECK_INTERVAL`]: log the filter and exporter health

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};

use ironfence_core::config::IronfenceConfig;
use ironfence_core::pipeline::Pipeline;
use ironfence_xdp_engine::{EngineConfig, FilterEngine};

use crate::health::{DaemonHealth, FilterHealth};
use crate::metrics_server::MetricsExporter;

/// Interval between health checks in the main loop.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// The main daemon orchestrator.
///
/// Manages the filter engine lifecycle: configuration validation,
/// startup, rule reloads, health monitoring, and graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: IronfenceConfig,
    /// XDP filter engine (None when `[xdp] enabled = false`).
    engine: Option<FilterEngine>,
    /// Prometheus exporter (None when `[metrics] enabled = false`).
    exporter: Option<MetricsExporter>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Build from a loaded configuration with env and CLI overrides applied.
    ///
    /// Must be called from within a tokio runtime when metrics are enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics listener cannot be started
    /// - The filter engine cannot be built
    pub fn build_from_config(config: IronfenceConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install the recorder before the engine records anything
        let exporter = if config.metrics.enabled {
            let interface = config.xdp.enabled.then_some(config.xdp.interface.as_str());
            Some(MetricsExporter::start(&config.metrics, interface)?)
        } else {
            None
        };

        let engine = if config.xdp.enabled {
            tracing::info!(
                interface = config.xdp.interface.as_str(),
                mode = config.xdp.mode.as_str(),
                "initializing XDP filter engine"
            );
            let engine_config = EngineConfig::from_core(&config.xdp)
                .map_err(|e| anyhow::anyhow!("invalid engine config: {}", e))?;
            let engine = FilterEngine::builder()
                .config(engine_config)
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build filter engine: {}", e))?;
            Some(engine)
        } else {
            tracing::warn!("xdp filter disabled in config; daemon will only serve metrics");
            None
        };

        Ok(Self {
            config,
            engine,
            exporter,
            start_time: Instant::now(),
        })
    }

    /// Start the engine and enter the main loop.
    ///
    /// This method blocks until a shutdown signal is received.
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.pid_file_path();
        if let Some(path) = pid_file.as_deref() {
            write_pid_file(path)?;
        }

        if let Some(engine) = self.engine.as_mut() {
            tracing::info!("starting XDP filter engine");
            if let Err(e) = engine.start().await {
                tracing::error!(error = %e, "filter engine failed to start");
                if let Some(path) = pid_file.as_deref() {
                    remove_pid_file(path);
                }
                return Err(e.into());
            }
        }

        let result = self.main_loop().await;

        // Stop the engine even if the main loop failed
        let shutdown = self.shutdown().await;

        if let Some(path) = pid_file.as_deref() {
            remove_pid_file(path);
        }

        result.and(shutdown)
    }

    async fn main_loop(&mut self) -> Result<()> {
        let mut signals = Signals::install()?;
        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);

        tracing::info!("entering main loop");
        loop {
            tokio::select! {
                signal = signals.next() => match signal {
                    DaemonSignal::Shutdown(name) => {
                        tracing::info!(signal = name, "shutdown signal received");
                        return Ok(());
                    }
                    DaemonSignal::Reload => {
                        tracing::info!(signal = "SIGHUP", "reloading rules");
                        if let Err(e) = self.reload_rules().await {
                            // Keep running with the previous rule set
                            tracing::error!(error = %e, "rule reload failed");
                        }
                    }
                },
                _ = health_tick.tick() => self.health().await.log(),
            }
        }
    }

    /// Re-read the configured rule file and rewrite the kernel tables.
    ///
    /// Returns the number of rules written. A no-op when the engine is disabled.
    pub async fn reload_rules(&mut self) -> Result<usize> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(0);
        };
        let count = engine
            .reload_rules(&self.config.xdp.rules_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to reload rules: {}", e))?;
        Ok(count)
    }

    /// Stop the filter engine (detaches the XDP program).
    async fn shutdown(&mut self) -> Result<()> {
        match self.engine.as_mut() {
            Some(engine) if engine.is_running() => {
                tracing::info!("stopping XDP filter engine");
                engine.stop().await.map_err(Into::into)
            }
            _ => Ok(()),
        }
    }

    /// Collect the filter and exporter state into a health report.
    pub async fn health(&self) -> DaemonHealth {
        let filter = match self.engine.as_ref() {
            Some(engine) => Some(FilterHealth::collect(engine).await),
            None => None,
        };
        DaemonHealth::new(
            self.start_time.elapsed().as_secs(),
            filter,
            self.exporter.as_ref().map(MetricsExporter::health),
        )
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &IronfenceConfig {
        &self.config
    }

    /// Whether the filter engine is configured.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    fn pid_file_path(&self) -> Option<PathBuf> {
        let path = &self.config.general.pid_file;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Signals handled by the main loop.
enum DaemonSignal {
    Shutdown(&'static str),
    Reload,
}

struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl Signals {
    fn install() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| anyhow::anyhow!("failed to install {} handler: {}", name, e))
        };
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    async fn next(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
            _ = self.sighup.recv() => DaemonSignal::Reload,
        }
    }
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file
/// - Creates parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file already exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
