//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the bridge using the
//! `clap` crate. These arguments are parsed at startup and then merged on top
//! of the optional TOML file and the environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Bridges Cisco Intersight server power telemetry into InfluxDB.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the YAML inventory of Intersight domains.
    #[arg(short, long, value_name = "FILE")]
    pub inventory: Option<PathBuf>,

    /// Seconds between two polling cycles of a domain.
    #[arg(long, value_name = "SECONDS")]
    pub interval_seconds: Option<u64>,

    /// Seconds to wait before reading the inventory.
    #[arg(long, value_name = "SECONDS")]
    pub startup_delay_seconds: Option<u64>,

    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Periodically log the internal counters.
    #[arg(long, value_name = "BOOL")]
    pub log_metrics: Option<bool>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut core = Dict::new();
        let mut bridge = Dict::new();

        if let Some(path) = &self.inventory {
            bridge.insert(
                "config_inventory".into(),
                Value::from(path.display().to_string()),
            );
        }

        if let Some(interval) = self.interval_seconds {
            bridge.insert("interval_seconds".into(), Value::from(interval));
        }

        if let Some(delay) = self.startup_delay_seconds {
            bridge.insert("startup_delay_seconds".into(), Value::from(delay));
        }

        if let Some(level) = &self.log_level {
            core.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(enabled) = self.log_metrics {
            core.insert("log_metrics".into(), Value::from(enabled));
        }

        let mut dict = Dict::new();
        if !core.is_empty() {
            dict.insert("core".into(), Value::from(core));
        }
        if !bridge.is_empty() {
            dict.insert("bridge".into(), Value::from(bridge));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
