//! Keyed Worker Stage
//!
//! A fixed pool of tokio tasks, each draining its own unbounded queue. `put`
//! picks the queue by `source_key % workers`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::sink::Sink;
use crate::error::RouteError;

/// Items that know which source they came from
pub trait SourceKeyed {
    fn source_key(&self) -> u64;
}

#[async_trait]
pub trait EventHandler<T>: Send + Sync {
    async fn handle_event(&self, event: T);
}

pub struct Stage<T> {
    name: String,
    queues: RwLock<Option<Vec<mpsc::UnboundedSender<T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
}

impl<T: SourceKeyed + Send + 'static> Stage<T> {
    /// Spawn `workers` tasks on the current runtime.
    pub fn start(name: impl Into<String>, workers: usize, handler: Arc<dyn EventHandler<T>>) -> Arc<Self> {
        let name = name.into();
        let workers = workers.max(1);
        let processed = Arc::new(AtomicU64::new(0));

        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, mut rx) = mpsc::unbounded_channel::<T>();
            let handler = handler.clone();
            let processed = processed.clone();
            let stage = name.clone();
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    handler.handle_event(event).await;
                    processed.fetch_add(1, Ordering::Relaxed);
                }
                debug!(stage = %stage, worker, "Stage worker stopped");
            }));
            queues.push(tx);
        }
        info!(stage = %name, workers, "Stage started");

        Arc::new(Self {
            name,
            queues: RwLock::new(Some(queues)),
            workers: Mutex::new(handles),
            processed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.queues.read().as_ref().map_or(0, Vec::len)
    }

    /// Events handled so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.queues.read().is_some()
    }

    /// Stop accepting work. Queued events still drain.
    pub fn shutdown(&self) {
        if self.queues.write().take().is_some() {
            info!(stage = %self.name, "Stage shutting down");
        }
    }

    /// Shut down and wait for the workers to drain their queues.
    pub async fn stop(&self) {
        self.shutdown();
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl<T: SourceKeyed + Send + 'static> Sink<T> for Stage<T> {
    fn put(&self, item: T) -> Result<(), RouteError> {
        let closed = || RouteError::StageClosed {
            stage: self.name.clone(),
        };
        let queues = self.queues.read();
        let queues = queues.as_ref().ok_or_else(closed)?;
        let index = (item.source_key() % queues.len() as u64) as usize;
        queues[index].send(item).map_err(|_| closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Keyed(u64, u32);

    impl SourceKeyed for Keyed {
        fn source_key(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct Record {
        seen: Mutex<Vec<(u64, u32)>>,
    }

    #[async_trait]
    impl EventHandler<Keyed> for Record {
        async fn handle_event(&self, event: Keyed) {
            self.seen.lock().push((event.0, event.1));
        }
    }

    #[tokio::test]
    async fn test_per_key_order_preserved() {
        let record = Arc::new(Record::default());
        let stage = Stage::<Keyed>::start("test", 3, record.clone());

        for seq in 0..50 {
            for key in 0..4 {
                stage.put(Keyed(key, seq)).unwrap();
            }
        }
        stage.stop().await;

        assert_eq!(stage.processed(), 200);
        let seen = record.seen.lock();
        for key in 0..4 {
            let order: Vec<u32> = seen.iter().filter(|(k, _)| *k == key).map(|(_, s)| *s).collect();
            assert_eq!(order, (0..50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_put_after_shutdown_fails() {
        let stage = Stage::<Keyed>::start("closed", 1, Arc::new(Record::default()));
        stage.shutdown();
        let err = stage.put(Keyed(1, 1)).unwrap_err();
        assert_eq!(err, RouteError::StageClosed { stage: "closed".to_string() });
    }
}
