//! Configuration management for the bridge
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer built-in defaults, an optional TOML file, the
//! `INFLUXDB_*` and `INTERSIGHT_METRICS_BRIDGE_*` environment variables, and
//! finally the command-line arguments.

use crate::cli::Cli;
use crate::error::{BridgeError, BridgeResult};
use anyhow::Result;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the InfluxDB connection variables.
pub const INFLUXDB_ENV_PREFIX: &str = "INFLUXDB_";
/// Prefix of the bridge's own variables.
pub const BRIDGE_ENV_PREFIX: &str = "INTERSIGHT_METRICS_BRIDGE_";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub influxdb: InfluxDbConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Process-wide settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// The logging level for the application.
    pub log_level: String,
    /// Log the internal counters periodically.
    pub log_metrics: bool,
    /// Seconds between two metric snapshots in the log.
    pub log_metrics_interval_seconds: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_metrics: false,
            log_metrics_interval_seconds: 60,
        }
    }
}

/// InfluxDB connection, read from the `INFLUXDB_*` variables.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub url: Option<String>,
    pub organization: Option<String>,
    pub bucket: Option<String>,
    pub token: Option<String>,
}

/// Polling settings, read from the `INTERSIGHT_METRICS_BRIDGE_*` variables.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to the YAML inventory of Intersight domains.
    pub config_inventory: Option<PathBuf>,
    pub interval_seconds: u64,
    /// Delay before the inventory is read, to let co-scheduled containers start.
    pub startup_delay_seconds: u64,
    /// Deadline of a single Intersight API call.
    pub request_timeout_seconds: u64,
    /// IANA timezone of the telemetry query window.
    pub timezone: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            config_inventory: None,
            interval_seconds: 60,
            startup_delay_seconds: 10,
            request_timeout_seconds: 30,
            timezone: "Europe/Paris".to_string(),
        }
    }
}

/// Resolved InfluxDB connection settings.
#[derive(Clone, PartialEq)]
pub struct InfluxDbSettings {
    pub url: String,
    pub organization: String,
    pub bucket: String,
    pub token: String,
}

impl std::fmt::Debug for InfluxDbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxDbSettings")
            .field("url", &self.url)
            .field("organization", &self.organization)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Resolved settings shared by every polling worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub timezone: Tz,
}

impl Config {
    /// Loads the configuration by layering defaults, the optional TOML file,
    /// the environment, and the command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let influxdb_env = Env::prefixed(INFLUXDB_ENV_PREFIX)
            .map(|key| format!("influxdb.{}", key.as_str().to_ascii_lowercase()).into());
        let bridge_strings = Env::prefixed(BRIDGE_ENV_PREFIX)
            .only(&BRIDGE_STRING_KEYS)
            .map(|key| bridge_env_key(key.as_str()).into());
        let config: Config = figment
            .merge(verbatim(&influxdb_env))
            .merge(
                Env::prefixed(BRIDGE_ENV_PREFIX)
                    .ignore(&BRIDGE_STRING_KEYS)
                    .map(|key| bridge_env_key(key.as_str()).into()),
            )
            .merge(verbatim(&bridge_strings))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    /// Checks that every required value is present and well-formed.
    pub fn validate(&self) -> BridgeResult<()> {
        self.influxdb_settings()?;
        self.inventory_path()?;
        self.poll_settings()?;
        Ok(())
    }

    pub fn influxdb_settings(&self) -> BridgeResult<InfluxDbSettings> {
        Ok(InfluxDbSettings {
            url: required(&self.influxdb.url, "INFLUXDB_URL")?,
            organization: required(&self.influxdb.organization, "INFLUXDB_ORGANIZATION")?,
            bucket: required(&self.influxdb.bucket, "INFLUXDB_BUCKET")?,
            token: required(&self.influxdb.token, "INFLUXDB_TOKEN")?,
        })
    }

    pub fn inventory_path(&self) -> BridgeResult<&Path> {
        match &self.bridge.config_inventory {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.as_path()),
            _ => Err(BridgeError::Config(format!(
                "{}CONFIG_INVENTORY is not set",
                BRIDGE_ENV_PREFIX
            ))),
        }
    }

    pub fn poll_settings(&self) -> BridgeResult<PollSettings> {
        if self.bridge.interval_seconds == 0 {
            return Err(BridgeError::Config(
                "interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.bridge.request_timeout_seconds == 0 {
            return Err(BridgeError::Config(
                "request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(PollSettings {
            interval: Duration::from_secs(self.bridge.interval_seconds),
            request_timeout: Duration::from_secs(self.bridge.request_timeout_seconds),
            timezone: parse_timezone(&self.bridge.timezone)?,
        })
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.bridge.startup_delay_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            influxdb: InfluxDbConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Parses an IANA timezone name such as `Europe/Paris`.
pub fn parse_timezone(name: &str) -> BridgeResult<Tz> {
    name.parse::<Tz>()
        .map_err(|e| BridgeError::Config(format!("unknown timezone '{}': {}", name, e)))
}

/// Bridge variables whose values are kept as text even when they look numeric.
const BRIDGE_STRING_KEYS: [&str; 3] = ["config_inventory", "timezone", "log_level"];

/// The variables of `env` as plain strings. `Env` alone would turn `12345`
/// into an integer that a `String` field rejects.
fn verbatim(env: &Env) -> Figment {
    env.iter().fold(Figment::new(), |figment, (key, value)| {
        figment.merge(Serialized::default(key.as_str(), value))
    })
}

/// Routes a bridge variable to its section: logging keys go to `core`.
fn bridge_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "log_level" | "log_metrics" | "log_metrics_interval_seconds" => format!("core.{}", key),
        _ => format!("bridge.{}", key),
    }
}

fn required(value: &Option<String>, variable: &str) -> BridgeResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(BridgeError::Config(format!("{} is not set", variable))),
    }
}
