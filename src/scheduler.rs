//! The multi-domain polling scheduler.
//!
//! One worker task is launched per inventory domain. A worker owns its signed
//! client, resolves its server list once, then polls every server in order,
//! sleeps for the configured interval and starts over. Workers share nothing
//! but the [`TsdbWriter`].

use crate::config::PollSettings;
use crate::core::{DomainDescriptor, ServerId};
use crate::error::{BridgeError, BridgeResult};
use crate::influx::TsdbWriter;
use crate::internal_metrics::{
    LIVE_WORKERS, MALFORMED_RESPONSE_TOTAL, MISSING_DATUM_TOTAL, POLLS_TOTAL, SAMPLES_TOTAL,
    UPSTREAM_ERRORS_TOTAL,
};
use crate::intersight::IntersightClient;
use crate::task_manager::TaskManager;
use chrono::Utc;
use chrono_tz::Tz;
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of a domain worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Loading the key and building the signed client.
    Initializing,
    /// Listing the domain's servers.
    Discovering,
    Polling,
    /// Stopped after a fatal error or on shutdown.
    Terminated,
}

/// Read-only view of a launched worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    domain: Url,
    state_rx: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    pub fn domain(&self) -> &Url {
        &self.domain
    }

    pub fn state(&self) -> WorkerState {
        *self.state_rx.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }
}

pub struct PollingScheduler {
    workers: Vec<WorkerHandle>,
}

impl PollingScheduler {
    /// Launches one worker per domain on `task_manager`.
    pub fn start(
        domains: Vec<DomainDescriptor>,
        settings: PollSettings,
        writer: Arc<TsdbWriter>,
        task_manager: &TaskManager,
    ) -> Self {
        let mut workers = Vec::with_capacity(domains.len());
        for (index, domain) in domains.into_iter().enumerate() {
            let (state_tx, state_rx) = watch::channel(WorkerState::Initializing);
            workers.push(WorkerHandle {
                domain: domain.endpoint_url.clone(),
                state_rx,
            });

            let worker = DomainWorker {
                timezone: domain.timezone.unwrap_or(settings.timezone),
                domain,
                settings: settings.clone(),
                writer: writer.clone(),
                state_tx,
                shutdown_rx: task_manager.get_shutdown_rx(),
            };
            metrics::gauge!(LIVE_WORKERS).increment(1.0);
            task_manager.spawn(format!("domain-worker-{}", index), worker.run());
        }
        info!(workers = workers.len(), "Polling scheduler started");
        Self { workers }
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Number of workers that have not terminated.
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Terminated)
            .count()
    }
}

/// Outcome of a step that raced the shutdown signal.
enum Step<T> {
    Done(T),
    Shutdown,
}

struct DomainWorker {
    domain: DomainDescriptor,
    timezone: Tz,
    settings: PollSettings,
    writer: Arc<TsdbWriter>,
    state_tx: watch::Sender<WorkerState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DomainWorker {
    #[instrument(name = "domain_worker", skip(self), fields(domain = %self.domain.endpoint_url))]
    async fn run(mut self) {
        match self.run_until_stopped().await {
            Ok(()) => info!("Worker stopped on shutdown"),
            Err(e) if e.is_fatal_to_worker() => error!(error = %e, "Worker terminated"),
            Err(e) => error!(error = %e, "Worker stopped on unexpected error"),
        }
        self.state_tx.send_replace(WorkerState::Terminated);
        metrics::gauge!(LIVE_WORKERS).decrement(1.0);
    }

    async fn run_until_stopped(&mut self) -> BridgeResult<()> {
        self.set_state(WorkerState::Initializing);
        let client = match until_shutdown(
            &mut self.shutdown_rx,
            IntersightClient::from_descriptor(&self.domain, self.settings.request_timeout),
        )
        .await
        {
            Step::Done(client) => client?,
            Step::Shutdown => return Ok(()),
        };

        self.set_state(WorkerState::Discovering);
        let servers = if self.domain.needs_discovery() {
            match until_shutdown(&mut self.shutdown_rx, client.discover_servers()).await {
                Step::Done(servers) => servers?,
                Step::Shutdown => return Ok(()),
            }
        } else {
            self.domain.explicit_servers.clone()
        };
        if servers.is_empty() {
            warn!("Domain has no servers to poll");
        } else {
            info!(servers = servers.len(), timezone = %self.timezone, "Polling servers");
        }

        self.set_state(WorkerState::Polling);
        loop {
            if let Step::Shutdown = self.poll_cycle(&client, &servers).await {
                return Ok(());
            }
            let pause = tokio::time::sleep(self.settings.interval);
            if let Step::Shutdown = until_shutdown(&mut self.shutdown_rx, pause).await {
                return Ok(());
            }
        }
    }

    /// Queries and writes every server once, in order.
    async fn poll_cycle(&mut self, client: &IntersightClient, servers: &[ServerId]) -> Step<()> {
        let mut written = 0usize;
        for server in servers {
            metrics::counter!(POLLS_TOTAL).increment(1);
            let query = client.fetch_power_sample(server, Utc::now(), self.timezone);
            let result = match until_shutdown(&mut self.shutdown_rx, query).await {
                Step::Done(result) => result,
                Step::Shutdown => return Step::Shutdown,
            };

            let sample = match result {
                Ok(sample) => {
                    metrics::counter!(SAMPLES_TOTAL).increment(1);
                    sample
                }
                Err(e) => {
                    log_query_error(server, &e);
                    continue;
                }
            };

            let write = self.writer.write_sample(Some(&sample));
            match until_shutdown(&mut self.shutdown_rx, write).await {
                Step::Done(Ok(true)) => written += 1,
                Step::Done(Ok(false)) => {}
                Step::Done(Err(e)) => warn!(server = %server, error = %e, "Failed to write sample"),
                Step::Shutdown => return Step::Shutdown,
            }
        }
        debug!(servers = servers.len(), written, "Polling cycle complete");
        Step::Done(())
    }

    fn set_state(&self, state: WorkerState) {
        debug!(?state, "Worker state changed");
        self.state_tx.send_replace(state);
    }
}

/// Runs `future` unless the shutdown signal arrives first.
async fn until_shutdown<F: Future>(
    shutdown_rx: &mut watch::Receiver<bool>,
    future: F,
) -> Step<F::Output> {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown_rx) => Step::Shutdown,
        output = future => Step::Done(output),
    }
}

/// Resolves once shutdown is requested, or when the signal sender is gone.
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

fn log_query_error(server: &ServerId, error: &BridgeError) {
    match error {
        BridgeError::MissingDatum(_) => {
            metrics::counter!(MISSING_DATUM_TOTAL).increment(1);
            debug!(server = %server, error = %error, "No datum this cycle");
        }
        BridgeError::MalformedResponse(_) => {
            metrics::counter!(MALFORMED_RESPONSE_TOTAL).increment(1);
            warn!(server = %server, error = %error, "Skipping server this cycle");
        }
        _ => {
            metrics::counter!(UPSTREAM_ERRORS_TOTAL).increment(1);
            error!(server = %server, error = %error, "Telemetry query failed");
        }
    }
}
