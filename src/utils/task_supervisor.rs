use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::error::{Error, Result};
use tracing::{error, info, warn};

/// Task Supervisor - owns the relay's background workers
///
/// Every worker is handed a child of the supervisor's cancellation token.
/// `shutdown` cancels the token, gives each worker `grace` to return and
/// aborts the ones that do not.
///
/// ```ignore
/// let mut supervisor = TaskSupervisor::new(CancellationToken::new());
/// let token = supervisor.token();
/// supervisor.spawn("router", async move { token.cancelled().await });
/// supervisor.shutdown(Duration::from_secs(5)).await;
/// ```
pub struct TaskSupervisor {
    token: CancellationToken,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new(token: CancellationToken) -> Self {
        TaskSupervisor {
            token,
            tasks: HashMap::new(),
        }
    }

    /// Token workers should watch; cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Spawn a new background task and register it for monitoring
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!(task = %name, "Spawned background task");
        if let Some(previous) = self.tasks.insert(name.clone(), handle) {
            warn!(task = %name, "Replaced running task with the same name");
            previous.abort();
        }
        self
    }

    /// Returns an error naming every task that ended while the relay is
    /// still running. Ended tasks are forgotten.
    pub fn check_health(&mut self) -> Result<()> {
        if self.token.is_cancelled() {
            return Ok(());
        }

        let failed: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if failed.is_empty() {
            return Ok(());
        }

        for name in &failed {
            self.tasks.remove(name);
        }
        let details = format!("terminated unexpectedly: {:?}", failed);
        error!("Background tasks {}", details);
        Err(Error::TaskFailed {
            name: failed.join(","),
            details,
        })
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels every worker, waits up to `grace` for each, then aborts.
    pub async fn shutdown(&mut self, grace: Duration) {
        info!(tasks = self.tasks.len(), "Shutting down background tasks");
        self.token.cancel();

        for (name, mut handle) in self.tasks.drain() {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!(task = %name, "Task stopped"),
                Ok(Err(e)) => error!(task = %name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = %name, grace_ms = grace.as_millis() as u64, "Task ignored shutdown, aborting");
                    handle.abort();
                }
            }
        }
    }
}
