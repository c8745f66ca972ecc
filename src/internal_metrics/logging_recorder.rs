//! A metrics recorder that periodically logs all captured metrics.

use crate::task_manager::TaskManager;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// A metrics recorder that periodically logs all captured metrics with `tracing::info!`.
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    /// Creates a recorder and spawns its reporting task on `task_manager`.
    ///
    /// The task logs a snapshot every `interval` and exits on shutdown.
    pub fn new(interval: Duration, task_manager: &TaskManager) -> Self {
        let registry = Arc::new(Registry::new(AtomicStorage));
        let reporter_registry = registry.clone();
        let mut shutdown_rx = task_manager.get_shutdown_rx();

        task_manager.spawn("metrics-logger", async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        log_snapshot(&reporter_registry);
                        tracing::info!("Metrics logging task received shutdown signal.");
                        break;
                    }
                    _ = ticker.tick() => log_snapshot(&reporter_registry),
                }
            }
        });

        Self { registry }
    }

    /// Current counter and gauge values, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        snapshot(&self.registry)
    }
}

fn snapshot(registry: &Registry<Key, AtomicStorage>) -> Vec<(String, f64)> {
    let mut values: Vec<(String, f64)> = registry
        .get_counter_handles()
        .into_iter()
        .map(|(key, counter)| (key.name().to_string(), counter.load(Ordering::Relaxed) as f64))
        .chain(
            registry
                .get_gauge_handles()
                .into_iter()
                .map(|(key, gauge)| (key.name().to_string(), f64::from_bits(gauge.load(Ordering::Relaxed)))),
        )
        .collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

fn log_snapshot(registry: &Registry<Key, AtomicStorage>) {
    tracing::debug!("--- Metrics Snapshot ---");
    for (key, value) in snapshot(registry) {
        tracing::info!("[Metric] {}: {}", key, value);
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    // Histograms are recorded but not logged.
    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}
