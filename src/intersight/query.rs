//! Druid time-series query for the current power draw of one server.
//!
//! The payload asks the `PhysicalEntities` data source for the `hw.host`
//! power measurements of a serial number over the last minute, summed and
//! averaged into a single bucket. The aggregation names below are shared with
//! the response parser.

use crate::core::{Sample, ServerId};
use crate::error::{BridgeError, BridgeResult};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

pub const TIME_SERIES_PATH: &str = "/api/v1/telemetry/TimeSeries";
pub const DATA_SOURCE: &str = "PhysicalEntities";
pub const GRANULARITY_PERIOD: &str = "PT1M";

pub const COUNT_AGGREGATION: &str = "count";
pub const POWER_SUM_AGGREGATION: &str = "hw.host.power-Sum";
pub const ENDPOINT_COUNT_AGGREGATION: &str = "endpoint_count";
pub const POWER_AVG_POST_AGGREGATION: &str = "hw-host-power-Avg";

/// Length of the queried window, ending now.
pub fn query_window() -> Duration {
    Duration::minutes(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryQuery {
    pub query_type: String,
    pub data_source: DataSource,
    pub intervals: Vec<String>,
    pub granularity: Granularity,
    pub filter: Filter,
    pub dimensions: Vec<String>,
    pub aggregations: Vec<Aggregator>,
    pub post_aggregations: Vec<PostAggregator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Granularity {
    #[serde(rename = "type")]
    pub kind: String,
    pub period: String,
    #[serde(rename = "timeZone")]
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    And { fields: Vec<Filter> },
    Selector { dimension: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Aggregator {
    LongSum {
        name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    DoubleSum {
        name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    ThetaSketch {
        name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PostAggregator {
    Expression { name: String, expression: String },
}

impl TelemetryQuery {
    /// Average power of `server` over the minute ending at `now`, bucketed in `tz`.
    pub fn power_of(server: &ServerId, now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            query_type: "groupBy".to_string(),
            data_source: DataSource {
                kind: "table".to_string(),
                name: DATA_SOURCE.to_string(),
            },
            intervals: vec![query_interval(now, tz)],
            granularity: Granularity {
                kind: "period".to_string(),
                period: GRANULARITY_PERIOD.to_string(),
                time_zone: tz.name().to_string(),
            },
            filter: Filter::And {
                fields: vec![
                    selector("serial_number", server.as_str()),
                    selector("instrument.name", "hw.host"),
                ],
            },
            dimensions: Vec::new(),
            aggregations: vec![
                Aggregator::LongSum {
                    name: COUNT_AGGREGATION.to_string(),
                    field_name: "hw.host.power_count".to_string(),
                },
                Aggregator::DoubleSum {
                    name: POWER_SUM_AGGREGATION.to_string(),
                    field_name: "hw.host.power".to_string(),
                },
                Aggregator::ThetaSketch {
                    name: ENDPOINT_COUNT_AGGREGATION.to_string(),
                    field_name: "host.id".to_string(),
                },
            ],
            post_aggregations: vec![PostAggregator::Expression {
                name: POWER_AVG_POST_AGGREGATION.to_string(),
                expression: format!("(\"{}\" / \"{}\")", POWER_SUM_AGGREGATION, COUNT_AGGREGATION),
            }],
        }
    }
}

fn selector(dimension: &str, value: &str) -> Filter {
    Filter::Selector {
        dimension: dimension.to_string(),
        value: value.to_string(),
    }
}

/// The `start/end` interval of the minute ending at `now`, as local times in `tz`.
pub fn query_interval(now: DateTime<Utc>, tz: Tz) -> String {
    let start = now - query_window();
    format!("{}/{}", format_local(start, tz), format_local(now, tz))
}

/// ISO-8601 local time with four fractional digits and the UTC offset.
fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    let local = at.with_timezone(&tz);
    let fraction = (local.timestamp_subsec_micros() / 100).min(9_999);
    format!(
        "{}.{:04}{}",
        local.format("%Y-%m-%dT%H:%M:%S"),
        fraction,
        local.format("%:z")
    )
}

/// Extracts the power sample from a `TimeSeries` response body.
///
/// Only the first row is considered. An empty result, or a bucket without
/// raw measurements, is `MissingDatum`; missing or invalid fields are
/// `MalformedResponse`.
pub fn parse_power_response(server: &ServerId, body: &Value) -> BridgeResult<Sample> {
    let rows = body.as_array().ok_or_else(|| {
        BridgeError::MalformedResponse(format!(
            "expected an array of result rows for server {}",
            server
        ))
    })?;

    let Some(row) = rows.first() else {
        return Err(BridgeError::MissingDatum(format!(
            "empty result set for server {}",
            server
        )));
    };

    let event = row.get("event").and_then(Value::as_object).ok_or_else(|| {
        BridgeError::MalformedResponse(format!("result row for server {} has no event", server))
    })?;

    if let Some(count) = event.get(COUNT_AGGREGATION).and_then(Value::as_f64) {
        if count <= 0.0 {
            return Err(BridgeError::MissingDatum(format!(
                "no power measurement for server {} in the window",
                server
            )));
        }
    }

    let power_watts = event
        .get(POWER_AVG_POST_AGGREGATION)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            BridgeError::MalformedResponse(format!(
                "result row for server {} has no numeric {}",
                server, POWER_AVG_POST_AGGREGATION
            ))
        })?;

    let timestamp = row.get("timestamp").and_then(Value::as_str).ok_or_else(|| {
        BridgeError::MalformedResponse(format!("result row for server {} has no timestamp", server))
    })?;
    let observed_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| {
            BridgeError::MalformedResponse(format!(
                "invalid timestamp '{}' for server {}: {}",
                timestamp, server, e
            ))
        })?
        .with_timezone(&Utc);

    Sample::new(server.clone(), power_watts, observed_at)
}
