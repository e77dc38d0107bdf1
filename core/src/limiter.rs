use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Fixed-budget admission gate for all background work.
///
/// Feedback modalities and handler invocations compete for the same slots,
/// so total in-flight work stays bounded no matter how many tasks one
/// command cycle fans out to. A slow handler can transiently starve
/// feedback; that is the documented trade-off of a single shared pool.
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    budget: usize,
}

/// An admission ticket. Dropping it releases the slot, on success and
/// failure alike; there is no way to leak a slot past the task that held it.
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(budget: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(budget)),
            budget,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Suspend until a slot is free.
    pub async fn acquire(&self) -> ConcurrencySlot {
        // The semaphore lives as long as the limiter and is never closed.
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");
        ConcurrencySlot { _permit: permit }
    }

    /// Awaited admission: run `fut` under a slot and hand its output back
    /// to the caller, errors included.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        fut.await
    }

    /// Fire-and-forget admission: the task's failure is logged, never
    /// propagated. The returned handle resolves once the task has finished,
    /// so callers may still join on completion timing.
    pub fn spawn<F, T, E>(&self, label: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("limiter semaphore closed");
            if let Err(e) = fut.await {
                error!(target: "limiter", task = label, "Task failed");
                debug!(target: "limiter", task = label, error = %e, "Task failure detail");
            }
        })
    }
}
