use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool for heavy render work: a fixed number of concurrently
/// running renders plus a bounded wait queue behind them. Submissions beyond
/// both bounds are rejected immediately so the caller can shed load.
pub struct RenderPool {
    workers: Arc<Semaphore>,
    queue: Arc<Semaphore>,
}

/// Holding a permit keeps one worker slot occupied; dropping it releases
/// the slot. Move it into whatever task finishes the render.
pub struct RenderPermit {
    _worker: OwnedSemaphorePermit,
}

impl RenderPool {
    pub fn new(workers: usize, queue: usize) -> Self {
        RenderPool {
            workers: Arc::new(Semaphore::new(workers)),
            queue: Arc::new(Semaphore::new(queue)),
        }
    }

    /// Claims a worker slot, waiting in the queue if every worker is busy.
    /// Returns `None` without waiting when the queue is full too.
    pub async fn try_submit(&self) -> Option<RenderPermit> {
        if let Ok(permit) = self.workers.clone().try_acquire_owned() {
            return Some(RenderPermit { _worker: permit });
        }

        let queued = self.queue.clone().try_acquire_owned().ok()?;
        let permit = self.workers.clone().acquire_owned().await.ok()?;
        drop(queued);
        Some(RenderPermit { _worker: permit })
    }
}
