//! Daemon health report.
//!
//! The daemon runs at most two components: the XDP filter and the Prometheus
//! exporter. Each one reports what it is actually doing next to its status,
//! and the daemon status is the worst status among the components present.
//! A component disabled in config is absent from the report.

use std::net::SocketAddr;

use serde::Serialize;

use ironfence_core::pipeline::{HealthStatus, Pipeline};
use ironfence_xdp_engine::FilterEngine;

/// Component name reported for the XDP filter engine.
pub const XDP_FILTER: &str = "xdp-filter";

/// Component name reported for the Prometheus exporter.
pub const METRICS_EXPORTER: &str = "metrics";

/// Health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among the present components.
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExporterHealth>,
}

/// State of the attached XDP filter.
#[derive(Debug, Clone, Serialize)]
pub struct FilterHealth {
    pub status: HealthStatus,
    pub interface: String,
    /// Decision engine: `acl` or `ratelimit`.
    pub mode: &'static str,
    /// Entries in the last compiled rule set (0 before the first load).
    pub rules_loaded: usize,
    pub passed: u64,
    pub dropped: u64,
    pub pps: f64,
}

impl FilterHealth {
    /// Read the engine's lifecycle status, rule count, and verdict counters.
    pub async fn collect(engine: &FilterEngine) -> Self {
        let verdicts = engine.verdict_metrics().await;
        let config = engine.config();
        Self {
            status: engine.health_check().await,
            interface: config.base.interface.clone(),
            mode: config.mode.as_str(),
            rules_loaded: engine.rules().map_or(0, |rules| rules.len()),
            passed: verdicts.passed,
            dropped: verdicts.dropped,
            pps: verdicts.pps,
        }
    }
}

/// State of the Prometheus exporter.
#[derive(Debug, Clone, Serialize)]
pub struct ExporterHealth {
    pub status: HealthStatus,
    pub listen_addr: SocketAddr,
}

impl DaemonHealth {
    /// Build the report and derive the daemon status from the components.
    pub fn new(
        uptime_secs: u64,
        filter: Option<FilterHealth>,
        metrics: Option<ExporterHealth>,
    ) -> Self {
        let components = filter
            .as_ref()
            .map(|f| (XDP_FILTER, &f.status))
            .into_iter()
            .chain(metrics.as_ref().map(|m| (METRICS_EXPORTER, &m.status)));
        Self {
            status: worst_status(components),
            uptime_secs,
            filter,
            metrics,
        }
    }

    /// Log the report: debug when healthy, warn otherwise.
    pub fn log(&self) {
        let (passed, dropped) = self
            .filter
            .as_ref()
            .map_or((0, 0), |f| (f.passed, f.dropped));
        match &self.status {
            HealthStatus::Healthy => tracing::debug!(
                uptime_secs = self.uptime_secs,
                passed,
                dropped,
                "daemon healthy"
            ),
            status => tracing::warn!(status = ?status, passed, dropped, "daemon health degraded"),
        }
    }
}

/// Fold named component statuses into the worst one.
///
/// Unhealthy beats Degraded beats Healthy. The reason lists every component
/// that is not healthy as `name: reason`, in input order.
pub fn worst_status<'a>(
    components: impl IntoIterator<Item = (&'a str, &'a HealthStatus)>,
) -> HealthStatus {
    let mut unhealthy = false;
    let mut reasons = Vec::new();

    for (name, status) in components {
        match status {
            HealthStatus::Healthy => continue,
            HealthStatus::Degraded(reason) => reasons.push(format!("{name}: {reason}")),
            HealthStatus::Unhealthy(reason) => {
                unhealthy = true;
                reasons.push(format!("{name}: {reason}"));
            }
        }
    }

    match (reasons.is_empty(), unhealthy) {
        (true, _) => HealthStatus::Healthy,
        (false, true) => HealthStatus::Unhealthy(reasons.join("; ")),
        (false, false) => HealthStatus::Degraded(reasons.join("; ")),
    }
}
