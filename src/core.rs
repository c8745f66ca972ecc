//! Core domain types and service traits for the bridge
//!
//! This module defines the data that flows from the Intersight telemetry API
//! to InfluxDB, and the trait contract of the point sink that the polling
//! workers share.

use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use chrono_tz::Tz;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// InfluxDB measurement holding the power samples.
pub const MEASUREMENT_NAME: &str = "power_usage_ucs_servers_intersight";
/// Tag carrying the server serial number.
pub const SERVER_TAG: &str = "server";
/// Field carrying the power draw in watts.
pub const POWER_FIELD: &str = "current_power_usage_of_ucs_server";

/// Serial number of a physical server.
///
/// Comparison is case-sensitive. An empty serial is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    pub fn new(serial: impl Into<String>) -> BridgeResult<Self> {
        let serial = serial.into();
        if serial.trim().is_empty() {
            return Err(BridgeError::Config(
                "server serial number must not be empty".to_string(),
            ));
        }
        Ok(Self(serial))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerId {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        id.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a domain's private key comes from.
#[derive(Clone, PartialEq)]
pub enum KeyMaterial {
    /// Path to a PEM file, read when the worker builds its signing client.
    Path(PathBuf),
    /// PEM text given directly in the inventory.
    InlinePem(String),
}

impl KeyMaterial {
    /// Interprets an inventory value: PEM text is used inline, anything else is a path.
    pub fn from_config_value(value: &str) -> Self {
        if value.trim_start().starts_with("-----BEGIN") {
            KeyMaterial::InlinePem(value.to_string())
        } else {
            KeyMaterial::Path(PathBuf::from(value))
        }
    }
}

// Inline keys must never reach the logs.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Path(path) => f.debug_tuple("Path").field(path).finish(),
            KeyMaterial::InlinePem(_) => f.write_str("InlinePem(<redacted>)"),
        }
    }
}

/// One managed Intersight account, as described by the inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDescriptor {
    /// Base URL of the Intersight API (SaaS or appliance).
    pub endpoint_url: Url,
    /// API key identifier.
    pub key_id: String,
    pub private_key: KeyMaterial,
    /// Servers to poll. Empty means the worker discovers them.
    pub explicit_servers: Vec<ServerId>,
    /// Overrides the process-wide query timezone for this domain.
    pub timezone: Option<Tz>,
}

impl DomainDescriptor {
    /// Returns `true` if the worker must discover its servers.
    pub fn needs_discovery(&self) -> bool {
        self.explicit_servers.is_empty()
    }
}

/// A single power measurement for one server.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub server_id: ServerId,
    pub power_watts: f64,
    /// Truncated to whole seconds.
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    /// Builds a sample, rejecting negative or non-finite power values.
    pub fn new(
        server_id: ServerId,
        power_watts: f64,
        observed_at: DateTime<Utc>,
    ) -> BridgeResult<Self> {
        if !power_watts.is_finite() || power_watts < 0.0 {
            return Err(BridgeError::MalformedResponse(format!(
                "invalid power value {} for server {}",
                power_watts, server_id
            )));
        }
        Ok(Self {
            server_id,
            power_watts,
            observed_at: observed_at.trunc_subsecs(0),
        })
    }
}

/// Wire form of a sample in the time-series database.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    /// When absent the database assigns the ingest time.
    pub time: Option<DateTime<Utc>>,
}

impl From<&Sample> for Point {
    fn from(sample: &Sample) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(SERVER_TAG.to_string(), sample.server_id.to_string());
        let mut fields = BTreeMap::new();
        fields.insert(POWER_FIELD.to_string(), sample.power_watts);
        Self {
            measurement: MEASUREMENT_NAME.to_string(),
            tags,
            fields,
            time: Some(sample.observed_at),
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Persists points into a time-series database.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// A short name for the sink, used in logs.
    fn name(&self) -> &str;

    /// Writes one point synchronously.
    ///
    /// # Returns
    /// * `Ok(())` once the database acknowledged the write
    /// * `Err(BridgeError::Write)` if the write failed
    async fn write(&self, point: &Point) -> BridgeResult<()>;
}
