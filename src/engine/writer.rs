use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use crate::{BlobStore, StorageError};

/// How the write queue retries a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per save, including the first one.
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

enum WriteOp {
    Save { name: String, value: serde_json::Value },
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget blob writes, applied to the store in the order they were enqueued.
///
/// A single background task owns the receiving end of the channel, so two saves can
/// never race each other. Cloning the queue shares the same task.
#[derive(Clone)]
pub struct WriteQueue {
    sender: mpsc::UnboundedSender<WriteOp>,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl WriteQueue {
    /// Starts the writer task. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run(store, policy, receiver, pending.clone(), failed.clone()));

        Self { sender, pending, failed }
    }

    /// Queues `value` to replace the blob `name`. Never blocks.
    pub fn enqueue(&self, name: impl Into<String>, value: serde_json::Value) {
        let name = name.into();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(WriteOp::Save { name, value }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.failed.fetch_add(1, Ordering::SeqCst);
            warn!("Write queue is closed; dropping save");
        }
    }

    /// Waits until every save enqueued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriteOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Number of saves queued but not yet applied.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of saves that were given up on.
    pub fn failed_writes(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

async fn run(
    store: Arc<dyn BlobStore>,
    policy: RetryPolicy,
    mut receiver: mpsc::UnboundedReceiver<WriteOp>,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
) {
    while let Some(op) = receiver.recv().await {
        match op {
            WriteOp::Save { name, value } => {
                if !save_with_retry(store.as_ref(), &policy, &name, value).await {
                    failed.fetch_add(1, Ordering::SeqCst);
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Write queue stopped (channel closed)");
}

async fn save_with_retry(
    store: &dyn BlobStore,
    policy: &RetryPolicy,
    name: &str,
    value: serde_json::Value,
) -> bool {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match store.save(name, value.clone()).await {
            Ok(()) => {
                debug!("Persisted blob {} (attempt {})", name, attempt);
                return true;
            }
            // Retrying cannot fix these.
            Err(e @ (StorageError::NotInitialized | StorageError::Serialization(_))) => {
                warn!("Dropping save of blob {}: {}", name, e);
                return false;
            }
            Err(e) if attempt == attempts => {
                warn!("Failed to persist blob {} after {} attempts: {}", name, attempts, e);
                return false;
            }
            Err(e) => {
                debug!("Save of blob {} failed (attempt {}): {}", name, attempt, e);
                tokio::time::sleep(policy.backoff * attempt).await;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemStore;
    use crate::{BlobReader, BlobWriter};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every save it sees; fails the first `fail_first` saves.
    #[derive(Default)]
    struct RecordingStore {
        saves: Mutex<Vec<(String, serde_json::Value)>>,
        fail_first: AtomicUsize,
    }

    #[async_trait]
    impl BlobReader for RecordingStore {
        async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StorageError> {
            let saves = self.saves.lock().unwrap();
            Ok(saves.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v.clone()))
        }
    }

    #[async_trait]
    impl BlobWriter for RecordingStore {
        async fn save(&self, name: &str, value: serde_json::Value) -> Result<(), StorageError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::WriteFailed("quota exceeded".to_string()));
            }
            self.saves.lock().unwrap().push((name.to_string(), value));
            Ok(())
        }
    }

    #[async_trait]
    impl BlobStore for RecordingStore {
        async fn init(&self) -> Result<(), StorageError> {
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn is_durable(&self) -> bool {
            false
        }

        async fn names(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy { attempts, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn test_writes_applied_in_order() {
        let store = Arc::new(RecordingStore::default());
        let queue = WriteQueue::spawn(store.clone(), fast_retry(1));

        for i in 0..50 {
            queue.enqueue("all_records", json!(i));
        }
        queue.flush().await;

        let saves = store.saves.lock().unwrap();
        let values: Vec<i64> = saves.iter().map(|(_, v)| v.as_i64().unwrap()).collect();
        assert_eq!(values, (0..50i64).collect::<Vec<_>>());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let store = Arc::new(RecordingStore::default());
        store.fail_first.store(2, Ordering::SeqCst);
        let queue = WriteQueue::spawn(store.clone(), fast_retry(3));

        queue.enqueue("ai_settings", json!({"model": "m"}));
        queue.flush().await;

        assert_eq!(store.load("ai_settings").await.unwrap(), Some(json!({"model": "m"})));
        assert_eq!(queue.failed_writes(), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let store = Arc::new(MemStore::ready());
        store.set_fail_writes(true);
        let queue = WriteQueue::spawn(store.clone(), fast_retry(2));

        queue.enqueue("a", json!(1));
        queue.flush().await;

        assert_eq!(queue.failed_writes(), 1);
        assert_eq!(queue.pending(), 0);

        store.set_fail_writes(false);
        queue.enqueue("a", json!(2));
        queue.flush().await;
        assert_eq!(store.load("a").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_not_initialized_is_not_retried() {
        let store = Arc::new(MemStore::new());
        let queue = WriteQueue::spawn(store.clone(), RetryPolicy {
            attempts: 5,
            backoff: Duration::from_secs(60),
        });

        queue.enqueue("a", json!(1));
        queue.flush().await;

        assert_eq!(queue.failed_writes(), 1);
    }
}
