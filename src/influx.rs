//! Conversion of samples into InfluxDB points, and the InfluxDB 2.x sink.

use crate::config::InfluxDbSettings;
use crate::core::{Point, PointWriter, Sample};
use crate::error::{BridgeError, BridgeResult};
use crate::internal_metrics::{POINTS_WRITTEN_TOTAL, WRITE_ERRORS_TOTAL};
use async_trait::async_trait;
use futures::stream;
use influxdb2::api::write::TimestampPrecision;
use influxdb2::models::DataPoint;
use influxdb2::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// The writer shared by every domain worker.
///
/// At most one write is outstanding at a time, across all workers.
pub struct TsdbWriter {
    sink: Arc<dyn PointWriter>,
    write_lock: Mutex<()>,
}

impl TsdbWriter {
    pub fn new(sink: Arc<dyn PointWriter>) -> Self {
        Self {
            sink,
            write_lock: Mutex::new(()),
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Writes the point of `sample`.
    ///
    /// Returns `Ok(false)` without writing when there is no sample.
    pub async fn write_sample(&self, sample: Option<&Sample>) -> BridgeResult<bool> {
        let Some(sample) = sample else {
            warn!("No sample to write");
            return Ok(false);
        };

        let point = Point::from(sample);
        let _guard = self.write_lock.lock().await;
        match self.sink.write(&point).await {
            Ok(()) => {
                metrics::counter!(POINTS_WRITTEN_TOTAL).increment(1);
                debug!(
                    server = %sample.server_id,
                    power_watts = sample.power_watts,
                    sink = self.sink.name(),
                    "Sample written"
                );
                Ok(true)
            }
            Err(e) => {
                metrics::counter!(WRITE_ERRORS_TOTAL).increment(1);
                Err(e)
            }
        }
    }
}

/// Writes points to one bucket with second precision.
pub struct InfluxPointWriter {
    client: Client,
    bucket: String,
}

impl InfluxPointWriter {
    pub fn new(settings: &InfluxDbSettings) -> Self {
        Self {
            client: Client::new(
                settings.url.trim_end_matches('/'),
                &settings.organization,
                &settings.token,
            ),
            bucket: settings.bucket.clone(),
        }
    }
}

/// Converts a point to the client's line-protocol builder.
fn to_data_point(point: &Point) -> BridgeResult<DataPoint> {
    let mut builder = DataPoint::builder(&point.measurement);
    for (key, value) in &point.tags {
        builder = builder.tag(key, value);
    }
    for (key, value) in &point.fields {
        builder = builder.field(key, *value);
    }
    if let Some(time) = point.time {
        builder = builder.timestamp(time.timestamp());
    }
    builder
        .build()
        .map_err(|e| BridgeError::Write(format!("invalid point: {}", e)))
}

#[async_trait]
impl PointWriter for InfluxPointWriter {
    fn name(&self) -> &str {
        "influxdb"
    }

    #[instrument(skip(self, point), fields(bucket = %self.bucket))]
    async fn write(&self, point: &Point) -> BridgeResult<()> {
        let data_point = to_data_point(point)?;
        self.client
            .write_with_precision(
                &self.bucket,
                stream::iter(vec![data_point]),
                TimestampPrecision::Seconds,
            )
            .await
            .map_err(|e| BridgeError::Write(e.to_string()))?;
        debug!(measurement = %point.measurement, "Point written");
        Ok(())
    }
}
