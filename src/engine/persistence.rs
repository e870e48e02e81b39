use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::{BlobReader, BlobStore, BlobWriter, StorageError};

/// Version of the on-disk table layout (not of blob contents).
pub const TABLE_VERSION: u32 = 1;

const TABLE_DIR: &str = "blobs";
const TABLE_MARKER: &str = "_table.json";

#[derive(Serialize, Deserialize)]
struct TableMarker {
    version: u32,
}

type StoreResult<T> = std::result::Result<T, StorageError>;

/// Durable [`BlobStore`] over a data directory.
///
/// Each named blob is stored as `<data_dir>/blobs/<name>.json`. Saves use an atomic
/// "write-then-rename" strategy so a crash mid-write never leaves a torn blob.
pub struct FileStore {
    data_dir: PathBuf,
    table: OnceLock<PathBuf>,
}

impl FileStore {
    /// Creates a handle for `dir`. Nothing touches the disk until [`BlobStore::init`].
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            data_dir: dir.as_ref().to_path_buf(),
            table: OnceLock::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_dir(&self) -> StoreResult<PathBuf> {
        self.table.get().cloned().ok_or(StorageError::NotInitialized)
    }

    /// Creates the table directory and checks the version marker.
    fn open_table(data_dir: &Path) -> StoreResult<PathBuf> {
        let table = data_dir.join(TABLE_DIR);
        fs::create_dir_all(&table).map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let marker_path = table.join(TABLE_MARKER);
        match fs::read(&marker_path) {
            Ok(bytes) => {
                let marker: TableMarker = serde_json::from_slice(&bytes)?;
                if marker.version > TABLE_VERSION {
                    return Err(StorageError::ReadFailed(format!(
                        "table version {} is newer than supported version {}",
                        marker.version, TABLE_VERSION
                    )));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let bytes = serde_json::to_vec_pretty(&TableMarker { version: TABLE_VERSION })?;
                write_atomic(&marker_path, &bytes)?;
                info!("Created blob table v{} in {:?}", TABLE_VERSION, table);
            }
            Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
        }
        Ok(table)
    }

    fn save_blob(table: &Path, name: &str, value: &serde_json::Value) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&table.join(format!("{}.json", name)), &bytes)?;
        debug!("Saved blob {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn load_blob(table: &Path, name: &str) -> StoreResult<Option<serde_json::Value>> {
        let path = table.join(format!("{}.json", name));
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn list_blobs(table: &Path) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(table).map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::ReadFailed(e.to_string()))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Writes to a temporary sibling first and then renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    fs::rename(&temp_path, path).map_err(|e| StorageError::WriteFailed(e.to_string()))
}

/// Blob names become file names: keep them to `[A-Za-z0-9_-]`, leading `_` is reserved.
pub(crate) fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("blob name is empty".to_string());
    }
    if name.starts_with('_') {
        return Err(format!("blob name {:?} is reserved", name));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(format!("invalid blob name {:?}", name));
    }
    Ok(())
}

/// Runs blocking file I/O off the async runtime.
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::WriteFailed(format!("storage task failed: {}", e)))?
}

#[async_trait]
impl BlobReader for FileStore {
    async fn load(&self, name: &str) -> StoreResult<Option<serde_json::Value>> {
        let table = self.table_dir()?;
        validate_name(name).map_err(StorageError::ReadFailed)?;
        let name = name.to_string();
        blocking(move || FileStore::load_blob(&table, &name)).await
    }
}

#[async_trait]
impl BlobWriter for FileStore {
    async fn save(&self, name: &str, value: serde_json::Value) -> StoreResult<()> {
        let table = self.table_dir()?;
        validate_name(name).map_err(StorageError::WriteFailed)?;
        let name = name.to_string();
        blocking(move || FileStore::save_blob(&table, &name, &value)).await
    }
}

#[async_trait]
impl BlobStore for FileStore {
    async fn init(&self) -> StoreResult<()> {
        if self.table.get().is_some() {
            return Ok(());
        }
        let data_dir = self.data_dir.clone();
        let table = blocking(move || FileStore::open_table(&data_dir)).await?;
        // A concurrent init may have won the race; both opened the same directory.
        let _ = self.table.set(table);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.table.get().is_some()
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn names(&self) -> StoreResult<Vec<String>> {
        let table = self.table_dir()?;
        blocking(move || FileStore::list_blobs(&table)).await
    }
}
