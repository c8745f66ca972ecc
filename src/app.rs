//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::PointWriter,
    influx::{InfluxPointWriter, TsdbWriter},
    internal_metrics::{self, LoggingRecorder},
    inventory,
    scheduler::PollingScheduler,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    scheduler: Option<PollingScheduler>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The scheduler, absent when the inventory has no domains.
    pub fn scheduler(&self) -> Option<&PollingScheduler> {
        self.scheduler.as_ref()
    }

    /// Returns `true` when there is nothing to poll.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_none()
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    ///
    /// An idle application returns immediately.
    pub async fn run(self) -> Result<()> {
        if self.is_idle() {
            self.task_manager.shutdown().await;
            return Ok(());
        }

        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        info!("Shutdown signal received. Waiting for workers to stop...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Tests replace the InfluxDB sink through `point_writer_override`.
pub struct AppBuilder {
    config: Config,
    point_writer_override: Option<Arc<dyn PointWriter>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            point_writer_override: None,
        }
    }

    /// Overrides the time-series sink for testing.
    pub fn point_writer_override(mut self, writer: Arc<dyn PointWriter>) -> Self {
        self.point_writer_override = Some(writer);
        self
    }

    /// Validates the configuration, reads the inventory, and launches one
    /// worker per domain.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate().context("invalid configuration")?;
        let task_manager = TaskManager::new(shutdown_rx);

        let inventory_path = config.inventory_path()?;
        let domains = inventory::load_from_file(inventory_path)
            .await
            .with_context(|| format!("failed to load inventory {}", inventory_path.display()))?;
        if domains.is_empty() {
            warn!("Inventory lists no Intersight domains; nothing to poll");
            return Ok(App {
                task_manager,
                scheduler: None,
            });
        }

        // The reporting task runs until shutdown.
        if config.core.log_metrics {
            install_logging_recorder(
                Duration::from_secs(config.core.log_metrics_interval_seconds.max(1)),
                &task_manager,
            );
        }

        let sink = match self.point_writer_override {
            Some(sink) => sink,
            None => Arc::new(InfluxPointWriter::new(&config.influxdb_settings()?)) as Arc<dyn PointWriter>,
        };
        let writer = Arc::new(TsdbWriter::new(sink));
        info!(sink = writer.sink_name(), domains = domains.len(), "Starting workers");

        let scheduler =
            PollingScheduler::start(domains, config.poll_settings()?, writer, &task_manager);

        Ok(App {
            task_manager,
            scheduler: Some(scheduler),
        })
    }
}

fn install_logging_recorder(interval: Duration, task_manager: &TaskManager) {
    let recorder = LoggingRecorder::new(interval, task_manager);
    match metrics::set_global_recorder(recorder) {
        Ok(()) => {
            internal_metrics::describe();
            info!(
                "Logging recorder enabled. Metrics will be printed every {} seconds.",
                interval.as_secs()
            );
        }
        Err(e) => warn!(error = %e, "Failed to install logging recorder"),
    }
}
