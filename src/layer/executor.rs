// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio::sync::Semaphore;

/// A bounded executor for blocking replica I/O. At most `concurrency` tasks
/// run at once; submissions past the bound queue on the semaphore and are
/// never dropped.
#[derive(Clone, Debug)]
pub struct BlockingExecutor {
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl BlockingExecutor {
    /// Create an executor running at most `concurrency` blocking tasks.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// The concurrency bound.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` on the blocking pool once a permit frees up, without ever
    /// blocking the scheduling thread.
    pub async fn submit<T, F>(&self, task: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("executor is shut down"))?;
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| anyhow::anyhow!("blocking task failed: {}", e))?;
        Ok(result)
    }
}

impl Default for BlockingExecutor {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn bounds_concurrent_tasks() {
        let executor = BlockingExecutor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let executor = executor.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                executor
                    .submit(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn returns_task_output() {
        let executor = BlockingExecutor::new(1);
        let out = executor.submit(|| 21 * 2).await.unwrap();
        assert_eq!(out, 42);
    }
}
