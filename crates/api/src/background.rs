//! Tracked background tasks
//!
//! Work that should outlive the request that started it (sending mail, for
//! instance) is spawned through [`Background`] so shutdown can wait for it.
//! A failing or panicking task is logged and otherwise ignored.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::FutureExt;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    running: AtomicUsize,
    idle: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct Background {
    inner: Arc<Inner>,
}

/// Decrements the running count even if the task's future is dropped
struct Guard(Arc<Inner>);

impl Drop for Guard {
    fn drop(&mut self) {
        if self.0.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the runtime. Errors and panics are logged under `name`.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.running.fetch_add(1, Ordering::AcqRel);
        let guard = Guard(self.inner.clone());

        tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(task = name, "background task finished"),
                Ok(Err(e)) => tracing::error!(task = name, error = ?e, "background task failed"),
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    tracing::error!(task = name, panic = %detail, "background task panicked");
                }
            }
        });
    }

    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Resolve once no tracked task is running
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.running() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait at most `limit` for tracked tasks. On timeout, returns how many
    /// were still running; they keep running but are no longer waited on.
    pub async fn drain(&self, limit: Duration) -> Result<(), usize> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(self.running()),
        }
    }
}
