//! `ironfence status` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use ironfence_core::config::IronfenceConfig;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = IronfenceConfig::load(config_path).await?;
    let report = build_status_report(&config, args.verbose);
    writer.render(&report)
}

fn build_status_report(config: &IronfenceConfig, verbose: bool) -> StatusReport {
    let pid = read_pid(&config.general.pid_file);
    let daemon_running = pid.is_some_and(is_process_alive);

    StatusReport {
        daemon_running,
        pid: pid.filter(|_| daemon_running),
        xdp_enabled: config.xdp.enabled,
        details: verbose.then(|| {
            format!(
                "interface={}, xdp_mode={}, mode={}, rules={}",
                config.xdp.interface, config.xdp.xdp_mode, config.xdp.mode, config.xdp.rules_path
            )
        }),
    }
}

/// Read the daemon PID from its PID file.
fn read_pid(pid_file: &str) -> Option<u32> {
    if pid_file.is_empty() {
        debug!("pid file disabled in config");
        return None;
    }

    let content = match std::fs::read_to_string(pid_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(pid_file, "pid file does not exist");
            return None;
        }
        Err(e) => {
            warn!(pid_file, error = %e, "failed to read pid file");
            return None;
        }
    };

    match content.trim().parse::<u32>() {
        // kill(0, 0) targets our own process group, not a daemon
        Ok(0) => {
            warn!(pid_file, "pid file contains pid 0");
            None
        }
        Ok(pid) => Some(pid),
        Err(e) => {
            warn!(pid_file, error = %e, "failed to parse pid");
            None
        }
    }
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) with signal 0 performs only the existence and permission check
    let result = unsafe { libc::kill(pid, 0) };

    result == 0 || std::io::Error::last_os_error().kind() == std::io::ErrorKind::PermissionDenied
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    warn!("process liveness check not supported on this platform");
    false
}

#[derive(Serialize)]
pub struct StatusReport {
    pub daemon_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub xdp_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match (self.daemon_running, self.pid) {
            (true, Some(pid)) => writeln!(w, "Daemon: {} (pid {})", "running".green().bold(), pid)?,
            _ => writeln!(w, "Daemon: {}", "not running".red().bold())?,
        }
        let filter = if self.xdp_enabled { "enabled" } else { "disabled" };
        writeln!(w, "XDP filter: {}", filter)?;
        if let Some(details) = &self.details {
            writeln!(w, "  {}", details.dimmed())?;
        }
        Ok(())
    }
}
