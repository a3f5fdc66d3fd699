//! Bounded worker pool for outbound source fetches.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Caps how many source fetches run at once.
///
/// Cloning shares the same permits, so every request handled by one
/// aggregator draws from a single budget. Waiters are served in FIFO order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` fetches concurrently.
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently idle.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free worker. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.permits).acquire_owned().await
    }
}
