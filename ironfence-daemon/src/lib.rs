//! Ironfence daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `ironfence-daemon` is used as a binary (main.rs).

pub mod health;
pub mod metrics_server;
pub mod orchestrator;
