//! Background timers for approval timeouts and best-effort cleanup.
//!
//! Each task sleeps until its deadline, runs once and exits. Tasks are not
//! cancelled when the work they guard resolves early; they re-check state on
//! wake instead. Shutdown cancels every pending timer at once.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spawner for deadline-driven background work sharing one shutdown signal.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    shutdown: CancellationToken,
}

impl DeferredTasks {
    /// Creates a spawner with a fresh shutdown signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` once after `delay` unless shutdown happens first.
    pub fn spawn_after<F>(&self, name: &'static str, delay: Duration, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(task = name, "deferred task cancelled by shutdown");
                }
                () = tokio::time::sleep(delay) => task.await,
            }
        })
    }

    /// Runs `task` every `period` until shutdown. The first run happens after one period.
    pub fn spawn_every<F, Fut>(
        &self,
        name: &'static str,
        period: Duration,
        mut task: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!(task = name, "periodic task stopped by shutdown");
                        break;
                    }
                    _ = ticker.tick() => task().await,
                }
            }
        })
    }

    /// Cancels every pending and future timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
