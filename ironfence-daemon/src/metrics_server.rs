//! Prometheus exporter for the filter counters.
//!
//! [`MetricsExporter::start`] binds the scrape listener, installs the global
//! recorder, and runs the exporter as a tokio task owned by the returned
//! handle. Every series carries an `interface` label naming the NIC the XDP
//! program is attached to, so several daemons can share one Prometheus job.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::task::JoinHandle;

use ironfence_core::config::MetricsConfig;
use ironfence_core::metrics::LABEL_INTERFACE;
use ironfence_core::pipeline::HealthStatus;

use crate::health::ExporterHealth;

/// Scrape path served by the built-in listener.
pub const SCRAPE_PATH: &str = "/metrics";

/// Resolve the listen address for the scrape endpoint.
///
/// # Errors
///
/// - `endpoint` is anything other than [`SCRAPE_PATH`]
/// - `listen_addr:port` is not a socket address
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != SCRAPE_PATH {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': the exporter only serves '{}'",
            config.endpoint,
            SCRAPE_PATH
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Running Prometheus exporter.
///
/// Dropping the handle stops the listener.
pub struct MetricsExporter {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MetricsExporter {
    /// Bind the scrape listener and install the global recorder.
    ///
    /// Must be called from within a tokio runtime, once per process.
    ///
    /// # Errors
    ///
    /// - The listen address is invalid or cannot be bound
    /// - A global recorder is already installed
    pub fn start(config: &MetricsConfig, interface: Option<&str>) -> Result<Self> {
        let addr = listen_addr(config)?;
        if addr.ip().is_unspecified() {
            tracing::warn!(
                listen_addr = %addr,
                "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
            );
        }

        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        if let Some(interface) = interface {
            builder = builder.add_global_label(LABEL_INTERFACE, interface);
        }

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to start metrics listener on {}: {}", addr, e))?;
        metrics::set_global_recorder(recorder)
            .map_err(|_| anyhow::anyhow!("a global metrics recorder is already installed"))?;
        ironfence_core::metrics::describe_all();

        let task = tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "metrics exporter stopped");
            }
        });

        tracing::info!(listen_addr = %addr, interface, "Prometheus metrics endpoint active");
        Ok(Self { addr, task })
    }

    /// Address the scrape listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Exporter state for the daemon health report.
    pub fn health(&self) -> ExporterHealth {
        let status = if self.task.is_finished() {
            HealthStatus::Unhealthy("exporter task exited".to_owned())
        } else {
            HealthStatus::Healthy
        };
        ExporterHealth {
            status,
            listen_addr: self.addr(),
        }
    }
}

impl Drop for MetricsExporter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
