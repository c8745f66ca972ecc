//! Error kinds raised while bridging Intersight telemetry into InfluxDB.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Missing or invalid process configuration, or an unusable inventory.
    #[error("configuration error: {0}")]
    Config(String),

    /// The domain's key material could not be read or understood.
    #[error("failed to initialize request signing: {0}")]
    AuthInit(String),

    /// Listing the domain's servers failed.
    #[error("server discovery failed: {0}")]
    Discovery(String),

    /// The telemetry API answered with an error or could not be reached.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The telemetry API had no measurement for the requested window.
    #[error("no telemetry datum: {0}")]
    MissingDatum(String),

    /// A result row lacked an expected field or carried an invalid value.
    #[error("malformed telemetry response: {0}")]
    MalformedResponse(String),

    /// The time-series database rejected or failed the write.
    #[error("failed to write point: {0}")]
    Write(String),
}

impl BridgeError {
    /// Returns `true` when the error ends the worker that raised it.
    ///
    /// Per-request errors only skip the affected server for one cycle.
    pub fn is_fatal_to_worker(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_) | BridgeError::AuthInit(_) | BridgeError::Discovery(_)
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
