//! Health report tests.

use std::net::SocketAddr;

use ironfence_core::pipeline::HealthStatus;
use ironfence_daemon::health::{DaemonHealth, ExporterHealth, FilterHealth, worst_status};

fn filter(status: HealthStatus) -> FilterHealth {
    FilterHealth {
        status,
        interface: "eth0".to_owned(),
        mode: "ratelimit",
        rules_loaded: 3,
        passed: 120,
        dropped: 7,
        pps: 12.5,
    }
}

fn exporter(status: HealthStatus) -> ExporterHealth {
    let listen_addr: SocketAddr = "127.0.0.1:9100".parse().expect("valid addr");
    ExporterHealth {
        status,
        listen_addr,
    }
}

#[test]
fn test_no_components_is_healthy() {
    assert!(worst_status([]).is_healthy());
    assert!(DaemonHealth::new(0, None, None).status.is_healthy());
}

#[test]
fn test_all_healthy() {
    let health = DaemonHealth::new(
        5,
        Some(filter(HealthStatus::Healthy)),
        Some(exporter(HealthStatus::Healthy)),
    );
    assert!(health.status.is_healthy());
}

#[test]
fn test_degraded_reason_names_component() {
    let health = DaemonHealth::new(
        5,
        Some(filter(HealthStatus::Degraded("1 poller task(s) exited".to_owned()))),
        Some(exporter(HealthStatus::Healthy)),
    );
    match health.status {
        HealthStatus::Degraded(reason) => {
            assert_eq!(reason, "xdp-filter: 1 poller task(s) exited");
        }
        other => panic!("expected Degraded, got {other:?}"),
    }
}

#[test]
fn test_unhealthy_wins_over_degraded() {
    let health = DaemonHealth::new(
        5,
        Some(filter(HealthStatus::Degraded("slow".to_owned()))),
        Some(exporter(HealthStatus::Unhealthy("exporter task exited".to_owned()))),
    );
    match health.status {
        HealthStatus::Unhealthy(reason) => {
            assert_eq!(reason, "xdp-filter: slow; metrics: exporter task exited");
        }
        other => panic!("expected Unhealthy, got {other:?}"),
    }
}

#[test]
fn test_report_serializes_component_state() {
    let health = DaemonHealth::new(42, Some(filter(HealthStatus::Healthy)), None);
    let json = serde_json::to_value(&health).expect("should serialize");

    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["filter"]["interface"], "eth0");
    assert_eq!(json["filter"]["mode"], "ratelimit");
    assert_eq!(json["filter"]["rules_loaded"], 3);
    assert_eq!(json["filter"]["dropped"], 7);
    assert!(json.get("metrics").is_none(), "disabled exporter is omitted");
}

#[test]
fn test_exporter_reports_listen_addr() {
    let health = DaemonHealth::new(1, None, Some(exporter(HealthStatus::Healthy)));
    let json = serde_json::to_value(&health).expect("should serialize");
    assert_eq!(json["metrics"]["listen_addr"], "127.0.0.1:9100");
}
