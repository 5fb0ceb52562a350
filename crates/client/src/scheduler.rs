//! Cancellable background tasks: debounced one-shots and periodic jobs.
//!
//! Both abort their task on `cancel()` and on drop, so nothing runs after
//! the owner is torn down.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

fn lock(slot: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the most recently scheduled future after a quiet period.
#[derive(Debug, Default)]
pub struct Debouncer {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay`, replacing any job still waiting.
    pub fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });

        if let Some(previous) = lock(&self.task).replace(handle) {
            previous.abort();
        }
    }

    /// Drop the waiting job, if any.
    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }

    /// Whether a job is waiting or running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs a job at a fixed period until cancelled.
#[derive(Debug, Default)]
pub struct Periodic {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Periodic {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking. The first run happens one `period` from now.
    ///
    /// Restarting replaces the running job.
    pub fn start<F, Fut>(&self, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                job().await;
            }
        });

        if let Some(previous) = lock(&self.task).replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Periodic {
    fn drop(&mut self) {
        self.cancel();
    }
}
