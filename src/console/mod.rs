/// Generative-AI assistant interface.
pub mod assistant;

use std::sync::{Arc, PoisonError, RwLock};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::config::StoreConfig;
use crate::engine::{FileStore, MemStore, RetryPolicy, StateManager, WriteQueue};
use crate::model::{default_catalog, AiSettings, ModuleDescriptor, Tenant};
use crate::{
    load_typed, save_typed, BlobStore, NotFoundError, Result, StateError, StorageError, AI_SETTINGS,
    ALL_RECORDS, BUILDER_BLOCKS, BUILDER_TEMPLATES, GLOBAL_SETTINGS, MODULE_CATALOG, WEBSITE_PLANS,
};

/// Secondary blobs the console loads on demand.
pub const SECONDARY_BLOBS: [&str; 4] = [GLOBAL_SETTINGS, BUILDER_TEMPLATES, BUILDER_BLOCKS, WEBSITE_PLANS];

/// Application root: owns the blob store, the tenant collection with its active
/// tenant, and the global settings blobs.
pub struct Console {
    store: Arc<dyn BlobStore>,
    writer: WriteQueue,
    tenants: StateManager<Tenant>,
    ai_settings: RwLock<AiSettings>,
    catalog: RwLock<Vec<ModuleDescriptor>>,
    degraded: bool,
}

impl Console {
    /// Opens the file store under `config.data_dir` and loads every primary blob.
    ///
    /// If the database cannot be set up or the tenant collection cannot be read,
    /// the console keeps running on an in-memory store seeded with
    /// `default_tenants`; changes then last only for this process. The saved
    /// collection is left untouched on disk.
    pub async fn open(config: &StoreConfig, default_tenants: Vec<Tenant>) -> Result<Self> {
        let file_store = Arc::new(FileStore::new(&config.data_dir));
        match file_store.init().await {
            Ok(()) => {
                info!("Opened blob store in {:?}", config.data_dir);
                Self::with_store(file_store, config.retry_policy(), default_tenants).await
            }
            Err(e) => {
                warn!("database setup failed, using defaults: {}", e);
                Self::degraded(config.retry_policy(), default_tenants).await
            }
        }
    }

    /// Builds a console on an already chosen store.
    pub async fn with_store(
        store: Arc<dyn BlobStore>,
        retry: RetryPolicy,
        default_tenants: Vec<Tenant>,
    ) -> Result<Self> {
        store.init().await?;
        let writer = WriteQueue::spawn(store.clone(), retry);
        match StateManager::load(store.as_ref(), writer.clone(), ALL_RECORDS, default_tenants.clone()).await {
            Ok(tenants) => Ok(Self::assemble(store, writer, tenants, false).await),
            // An unreadable or inconsistent collection must not be overwritten.
            Err(e @ (StateError::Storage(_) | StateError::DuplicateId(_))) => {
                warn!("Could not load tenants, continuing without persistence: {}", e);
                Self::degraded(retry, default_tenants).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn degraded(retry: RetryPolicy, default_tenants: Vec<Tenant>) -> Result<Self> {
        let store: Arc<dyn BlobStore> = Arc::new(MemStore::ready());
        let writer = WriteQueue::spawn(store.clone(), retry);
        let tenants = StateManager::load(store.as_ref(), writer.clone(), ALL_RECORDS, default_tenants).await?;
        Ok(Self::assemble(store, writer, tenants, true).await)
    }

    async fn assemble(
        store: Arc<dyn BlobStore>,
        writer: WriteQueue,
        tenants: StateManager<Tenant>,
        degraded: bool,
    ) -> Self {
        let ai_settings = load_or_seed(store.as_ref(), AI_SETTINGS, AiSettings::default()).await;
        let catalog = load_or_seed(store.as_ref(), MODULE_CATALOG, default_catalog()).await;
        info!(
            "Console ready: {} tenants, {} modules{}",
            tenants.len(),
            catalog.len(),
            if degraded { " (degraded, not persistent)" } else { "" }
        );
        Self {
            store,
            writer,
            tenants,
            ai_settings: RwLock::new(ai_settings),
            catalog: RwLock::new(catalog),
            degraded,
        }
    }

    /// True when running on the in-memory fallback store.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn tenants(&self) -> &StateManager<Tenant> {
        &self.tenants
    }

    /// Makes `id` the active tenant and returns it.
    pub fn login(&self, id: &str) -> std::result::Result<Tenant, NotFoundError> {
        self.tenants.select_active(id)?;
        self.tenants.active().ok_or_else(|| NotFoundError::new(id))
    }

    pub fn logout(&self) {
        self.tenants.clear_active();
    }

    pub fn current_tenant(&self) -> Option<Tenant> {
        self.tenants.active()
    }

    pub fn ai_settings(&self) -> AiSettings {
        self.ai_settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the AI settings blob.
    pub fn update_ai_settings(&self, settings: AiSettings) -> Result<()> {
        let value = serde_json::to_value(&settings).map_err(StorageError::from)?;
        let mut current = self.ai_settings.write().unwrap_or_else(PoisonError::into_inner);
        *current = settings;
        self.writer.enqueue(AI_SETTINGS, value);
        Ok(())
    }

    pub fn module_catalog(&self) -> Vec<ModuleDescriptor> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Turns a catalog module on or off and saves the whole catalog.
    pub fn set_module_enabled(&self, module_id: &str, enabled: bool) -> Result<ModuleDescriptor> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let pos = catalog
            .iter()
            .position(|m| m.id == module_id)
            .ok_or_else(|| NotFoundError::new(module_id))?;

        let mut updated = catalog.clone();
        updated[pos].enabled = enabled;
        let value = serde_json::to_value(&updated).map_err(StorageError::from)?;
        let module = updated[pos].clone();
        *catalog = updated;
        self.writer.enqueue(MODULE_CATALOG, value);
        Ok(module)
    }

    /// Loads one of the [`SECONDARY_BLOBS`].
    pub async fn load_secondary(&self, name: &str) -> std::result::Result<Option<serde_json::Value>, StorageError> {
        check_secondary(name).map_err(StorageError::ReadFailed)?;
        self.store.load(name).await
    }

    /// Replaces one of the [`SECONDARY_BLOBS`], waiting for the write.
    pub async fn save_secondary(&self, name: &str, value: serde_json::Value) -> std::result::Result<(), StorageError> {
        check_secondary(name).map_err(StorageError::WriteFailed)?;
        self.store.save(name, value).await
    }

    /// Waits until every queued write has reached the store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}

fn check_secondary(name: &str) -> std::result::Result<(), String> {
    if SECONDARY_BLOBS.contains(&name) {
        Ok(())
    } else {
        Err(format!("{} is not a secondary blob", name))
    }
}

/// Loads a typed blob, saving `default` when it is absent or malformed.
async fn load_or_seed<T: Serialize + DeserializeOwned>(store: &dyn BlobStore, name: &str, default: T) -> T {
    match load_typed(store, name).await {
        Ok(Some(value)) => return value,
        Ok(None) => info!("Seeding blob {}", name),
        Err(StorageError::Serialization(e)) => warn!("Blob {} is malformed, reseeding: {}", name, e),
        Err(e) => {
            warn!("Could not read blob {}, using defaults: {}", name, e);
            return default;
        }
    }
    if let Err(e) = save_typed(store, name, &default).await {
        warn!("Could not seed blob {}: {}", name, e);
    }
    default
}
