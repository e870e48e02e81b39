//! Tenant Store is the persistence and state core of a multi-tenant retail console.
//!
//! Data lives in a handful of *named blobs* (the tenant collection, AI settings, the
//! module catalog, ...). Every blob is a JSON value that is replaced wholesale on save.
//! On top of the blob store, a [`StateManager`](engine::StateManager) keeps the full
//! tenant collection and the currently active tenant in sync while writes are drained
//! to disk in program order by a background queue.
//!
//! ## Core Components
//! - [`engine`]: Blob stores (file-backed and in-memory), the ordered write queue and
//!   the collection/selection state manager.
//! - [`model`]: Typed shapes of the named blobs.
//! - [`console`]: Application root wiring the store, the state and the assistant.
//! - [`config`]: Environment-driven configuration.

pub mod config;
pub mod console;
pub mod engine;
pub mod model;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Blob holding the array of tenant records.
pub const ALL_RECORDS: &str = "all_records";
/// Blob holding the single AI settings object.
pub const AI_SETTINGS: &str = "ai_settings";
/// Blob holding the feature module catalog.
pub const MODULE_CATALOG: &str = "module_catalog";
/// Secondary blobs, loaded independently with the same whole-replace semantics.
pub const GLOBAL_SETTINGS: &str = "global_settings";
pub const BUILDER_TEMPLATES: &str = "builder_templates";
pub const BUILDER_BLOCKS: &str = "builder_blocks";
pub const WEBSITE_PLANS: &str = "website_plans";

/// Errors raised by a [`BlobStore`].
#[derive(Error, Debug)]
pub enum StorageError {
    /// `init()` has not completed on this store.
    #[error("store not initialized")]
    NotInitialized,
    /// The underlying storage could not be read.
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// The underlying storage could not be written (quota, permissions, ...).
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// A value could not be serialized, or a stored blob is malformed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An operation referenced a record id absent from the collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record not found: {id}")]
pub struct NotFoundError {
    pub id: String,
}

impl NotFoundError {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Errors returned by collection operations.
#[derive(Error, Debug)]
pub enum StateError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    /// A transform returned a record carrying a different id.
    #[error("transform changed record id from {expected} to {actual}")]
    IdChanged { expected: String, actual: String },
    /// A record with this id is already in the collection.
    #[error("duplicate record id: {0}")]
    DuplicateId(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by the Tenant Store.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

/// A specialized Result type for Tenant Store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A value kept in a collection, identified by a stable unique id.
///
/// The state manager never looks inside a record beyond its id.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl Record for serde_json::Value {
    /// Plain JSON objects are records keyed by their `"id"` string field.
    fn id(&self) -> &str {
        self.get("id").and_then(|v| v.as_str()).unwrap_or_default()
    }
}

/// Read side of a blob store.
#[async_trait]
pub trait BlobReader: Send + Sync {
    /// Returns the blob saved under `name`, or `None` if it was never saved.
    async fn load(&self, name: &str) -> std::result::Result<Option<serde_json::Value>, StorageError>;
}

/// Write side of a blob store.
#[async_trait]
pub trait BlobWriter: Send + Sync {
    /// Replaces whatever was stored under `name` with `value`.
    async fn save(&self, name: &str, value: serde_json::Value) -> std::result::Result<(), StorageError>;
}

/// A durable (or not) key-value store of named JSON blobs.
#[async_trait]
pub trait BlobStore: BlobReader + BlobWriter {
    /// Opens or creates the underlying table. Idempotent.
    async fn init(&self) -> std::result::Result<(), StorageError>;
    fn is_initialized(&self) -> bool;
    /// Whether saved blobs survive a process restart.
    fn is_durable(&self) -> bool;
    /// Lists the names of every saved blob, sorted.
    async fn names(&self) -> std::result::Result<Vec<String>, StorageError>;
}

/// Loads a blob and deserializes it into `T`.
pub async fn load_typed<T: DeserializeOwned>(
    store: &dyn BlobStore,
    name: &str,
) -> std::result::Result<Option<T>, StorageError> {
    match store.load(name).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serializes `value` and saves it under `name`.
pub async fn save_typed<T: Serialize + ?Sized>(
    store: &dyn BlobStore,
    name: &str,
    value: &T,
) -> std::result::Result<(), StorageError> {
    let value = serde_json::to_value(value)?;
    store.save(name, value).await
}
