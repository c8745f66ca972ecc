//! intersight-metrics-bridge
//!
//! A bridge that polls the Cisco Intersight telemetry API for the power draw
//! of UCS servers and writes it into InfluxDB 2.x.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod influx;
pub mod internal_metrics;
pub mod intersight;
pub mod inventory;
pub mod scheduler;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
pub use crate::error::{BridgeError, BridgeResult};
