//! Manages the lifecycle of all spawned tasks in the application.
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type NamedHandle = (String, JoinHandle<()>);

/// A centralized manager for all spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Providing a graceful shutdown mechanism by awaiting all tasks.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Number of tasks spawned and not yet awaited.
    pub fn len(&self) -> usize {
        self.lock_handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking task never holds this lock, so a poisoned guard is still consistent.
    fn lock_handles(&self) -> MutexGuard<'_, Vec<NamedHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles = self.lock_handles().drain(..).collect::<Vec<_>>();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (task_names, joins): (Vec<String>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(joins).await;

        let mut panicked = Vec::new();
        for (task_name, result) in task_names.iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = %task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name = %task_name, error = %e, "Task panicked during shutdown.");
                    panicked.push(task_name.as_str());
                }
            }
        }

        if !panicked.is_empty() {
            error!(
                "{} tasks panicked during shutdown: {:?}",
                panicked.len(),
                panicked
            );
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}
