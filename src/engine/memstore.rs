use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use async_trait::async_trait;
use crate::engine::persistence::validate_name;
use crate::{BlobReader, BlobStore, BlobWriter, StorageError};

type StoreResult<T> = std::result::Result<T, StorageError>;

/// Non-durable [`BlobStore`] kept entirely in memory.
///
/// Used as the degraded-mode fallback when the file store cannot be opened, and in
/// tests. `fail_writes` makes every save fail, to exercise write error handling.
#[derive(Default)]
pub struct MemStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
    initialized: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that is already initialized.
    pub fn ready() -> Self {
        let store = Self::new();
        store.initialized.store(true, Ordering::SeqCst);
        store
    }

    /// Makes subsequent saves fail with [`StorageError::WriteFailed`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_init(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }
}

#[async_trait]
impl BlobReader for MemStore {
    async fn load(&self, name: &str) -> StoreResult<Option<serde_json::Value>> {
        self.check_init()?;
        validate_name(name).map_err(StorageError::ReadFailed)?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(name).cloned())
    }
}

#[async_trait]
impl BlobWriter for MemStore {
    async fn save(&self, name: &str, value: serde_json::Value) -> StoreResult<()> {
        self.check_init()?;
        validate_name(name).map_err(StorageError::WriteFailed)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("simulated write failure".to_string()));
        }
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(name.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemStore {
    async fn init(&self) -> StoreResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_durable(&self) -> bool {
        false
    }

    async fn names(&self) -> StoreResult<Vec<String>> {
        self.check_init()?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
