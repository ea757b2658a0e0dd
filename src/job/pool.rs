use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::foundation::error::{ReelError, ReelResult};

/// Work executed by a pool worker. A runner reports its own failures; the pool only schedules.
#[async_trait]
pub trait JobRunner<T>: Send + Sync + 'static {
    async fn run(&self, worker_id: usize, item: T);
}

/// Fixed number of workers draining one bounded queue. Each item runs to completion on the
/// worker that dequeued it.
pub struct WorkerPool<T> {
    tx: mpsc::Sender<T>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn start(size: usize, capacity: usize, runner: Arc<dyn JobRunner<T>>) -> ReelResult<Self> {
        if size == 0 {
            return Err(ReelError::validation("worker pool needs at least one worker"));
        }
        let (tx, rx) = mpsc::channel::<T>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..size)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let runner = Arc::clone(&runner);
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "worker started");
                    loop {
                        let next = rx.lock().await.recv().await;
                        match next {
                            Some(item) => runner.run(worker_id, item).await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker_id, "worker stopped");
                })
            })
            .collect();
        Ok(Self { tx, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue an item, waiting while the queue is full.
    pub async fn submit(&self, item: T) -> ReelResult<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| ReelError::validation("worker pool is shut down"))
    }

    /// Stop accepting work and wait for queued items to finish.
    pub async fn shutdown(self) {
        let Self { tx, workers } = self;
        drop(tx);
        for (worker_id, w) in workers.into_iter().enumerate() {
            if let Err(e) = w.await {
                tracing::error!(worker_id, err = %e, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[derive(Default)]
    struct Counting {
        running: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner<u32> for Counting {
        async fn run(&self, _worker_id: usize, _item: u32) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_pool_size() {
        let runner = Arc::new(Counting::default());
        let pool = WorkerPool::<u32>::start(2, 16, runner.clone()).unwrap();
        for i in 0..8 {
            pool.submit(i).await.unwrap();
        }
        pool.shutdown().await;
        assert_eq!(runner.done.load(Ordering::SeqCst), 8);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_pool_is_rejected() {
        let runner: Arc<dyn JobRunner<u32>> = Arc::new(Counting::default());
        assert!(WorkerPool::start(0, 1, runner).is_err());
    }
}
