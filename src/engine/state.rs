use std::collections::HashSet;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use log::{error, info};
use tokio::sync::mpsc;
use crate::engine::WriteQueue;
use crate::{BlobStore, NotFoundError, Record, StateError, StorageError};

/// Notification sent to subscribers after every successful state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(String),
    Updated(String),
    Deleted(String),
    Selected(String),
    Cleared,
}

struct Collection<R> {
    records: Vec<R>,
    /// Only the id is kept; the active record is always read out of `records`.
    active: Option<String>,
}

impl<R: Record> Collection<R> {
    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }
}

/// Owns a collection of records plus the currently active one, and keeps both
/// durable through a [`WriteQueue`].
///
/// All mutation goes through `&self` methods that take the write lock, so
/// operations are serialized and the active record can never diverge from its
/// copy in the collection. Each change enqueues a snapshot of the whole
/// collection before the lock is released, which keeps durable writes in the
/// same order as the in-memory updates.
pub struct StateManager<R: Record> {
    blob: String,
    state: RwLock<Collection<R>>,
    writer: WriteQueue,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl<R: Record> StateManager<R> {
    /// Wraps an in-memory collection. Fails if two records share an id.
    pub fn new(blob: impl Into<String>, records: Vec<R>, writer: WriteQueue) -> Result<Self, StateError> {
        check_unique(&records)?;
        Ok(Self {
            blob: blob.into(),
            state: RwLock::new(Collection { records, active: None }),
            writer,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Loads the collection stored under `blob`.
    ///
    /// When the blob was never saved, `default` is used and saved right away (not
    /// through the queue), so a later load cannot confuse "empty by seed" with
    /// "empty by deletion".
    pub async fn load(
        store: &dyn BlobStore,
        writer: WriteQueue,
        blob: &str,
        default: Vec<R>,
    ) -> Result<Self, StateError> {
        let records = match store.load(blob).await? {
            Some(value) => serde_json::from_value(value).map_err(StorageError::from)?,
            None => {
                info!("Seeding blob {} with {} default records", blob, default.len());
                check_unique(&default)?;
                let value = serde_json::to_value(&default).map_err(StorageError::from)?;
                store.save(blob, value).await?;
                default
            }
        };
        Self::new(blob, records, writer)
    }

    pub fn blob_name(&self) -> &str {
        &self.blob
    }

    fn read(&self) -> RwLockReadGuard<'_, Collection<R>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    // Writers only assign once every check has passed, so a poisoned lock still
    // guards a consistent collection.
    fn write(&self) -> RwLockWriteGuard<'_, Collection<R>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every record, in display order.
    pub fn records(&self) -> Vec<R> {
        self.read().records.clone()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        let state = self.read();
        state.position(id).map(|pos| state.records[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// The active record, as currently stored in the collection.
    pub fn active(&self) -> Option<R> {
        let state = self.read();
        let id = state.active.as_deref()?;
        state.position(id).map(|pos| state.records[pos].clone())
    }

    pub fn active_id(&self) -> Option<String> {
        self.read().active.clone()
    }

    /// Makes the record with `id` the active one. On failure the selection is untouched.
    pub fn select_active(&self, id: &str) -> Result<(), NotFoundError> {
        let mut state = self.write();
        if state.position(id).is_none() {
            return Err(NotFoundError::new(id));
        }
        state.active = Some(id.to_string());
        self.notify(ChangeEvent::Selected(id.to_string()));
        Ok(())
    }

    pub fn clear_active(&self) {
        let mut state = self.write();
        if state.active.take().is_some() {
            self.notify(ChangeEvent::Cleared);
        }
    }

    /// Replaces the record `id` with `transform(record)` in place and returns the new record.
    ///
    /// The active selection reflects the change on the very next read. Nothing is
    /// applied if `id` is absent or the transform changes the record's id.
    pub fn mutate<F>(&self, id: &str, transform: F) -> Result<R, StateError>
    where
        F: FnOnce(R) -> R,
    {
        let mut state = self.write();
        let pos = state.position(id).ok_or_else(|| NotFoundError::new(id))?;

        let updated = transform(state.records[pos].clone());
        if updated.id() != id {
            return Err(StateError::IdChanged {
                expected: id.to_string(),
                actual: updated.id().to_string(),
            });
        }

        state.records[pos] = updated.clone();
        self.persist(&state.records);
        self.notify(ChangeEvent::Updated(id.to_string()));
        Ok(updated)
    }

    /// Appends the record built by `factory`. The factory must produce a fresh id.
    pub fn add_record<F>(&self, factory: F) -> Result<R, StateError>
    where
        F: FnOnce() -> R,
    {
        let mut state = self.write();
        let record = factory();
        if state.position(record.id()).is_some() {
            return Err(StateError::DuplicateId(record.id().to_string()));
        }

        state.records.push(record.clone());
        self.persist(&state.records);
        self.notify(ChangeEvent::Added(record.id().to_string()));
        Ok(record)
    }

    /// Removes the record `id`, clearing the selection if it was active.
    pub fn delete_record(&self, id: &str) -> Result<(), NotFoundError> {
        let mut state = self.write();
        let pos = state.position(id).ok_or_else(|| NotFoundError::new(id))?;

        state.records.remove(pos);
        let was_active = state.active.as_deref() == Some(id);
        if was_active {
            state.active = None;
        }

        self.persist(&state.records);
        self.notify(ChangeEvent::Deleted(id.to_string()));
        if was_active {
            self.notify(ChangeEvent::Cleared);
        }
        Ok(())
    }

    /// Receives a [`ChangeEvent`] after every successful operation.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    /// Waits for every write enqueued so far to reach the store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn writer(&self) -> &WriteQueue {
        &self.writer
    }

    fn persist(&self, records: &[R]) {
        match serde_json::to_value(records) {
            Ok(value) => self.writer.enqueue(self.blob.as_str(), value),
            Err(e) => error!("Failed to serialize collection {}: {}", self.blob, e),
        }
    }

    fn notify(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn check_unique<R: Record>(records: &[R]) -> Result<(), StateError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id()) {
            return Err(StateError::DuplicateId(record.id().to_string()));
        }
    }
    Ok(())
}
