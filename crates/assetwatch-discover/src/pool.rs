//! Bounded worker pool for chunk tasks.
//!
//! At most `size` tasks run at once; submission waits for a free slot.
//! Results are collected once every task has finished, in completion order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run every task and wait for all of them.
    ///
    /// A task that panics is logged and contributes no result; the rest are
    /// unaffected.
    pub async fn run_all<I, F, T>(&self, tasks: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set = JoinSet::new();

        for task in tasks {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                tracing::error!("Worker pool semaphore closed");
                break;
            };
            set.spawn(async move {
                let _permit = permit;
                task.await
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok(value) => results.push(value),
                Err(e) => tracing::error!(error = %e, "Worker task failed"),
            }
        }
        results
    }
}
