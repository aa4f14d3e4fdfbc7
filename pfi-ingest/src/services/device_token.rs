//! Device token store
//!
//! The parse endpoint authenticates a device by an opaque bearer token that is
//! minted locally once and kept in a keyed store. A 401 means the server no
//! longer accepts it, so it is replaced.

use crate::error::{ImportError, ImportResult};
use pfi_common::uuid_utils;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info};

/// Store key holding the device token
pub const DEVICE_TOKEN_KEY: &str = "device_token";

/// File name of the file-backed store inside the data folder
pub const DEVICE_STORE_FILE: &str = "device.json";

/// Small persistent string map
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ImportResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ImportResult<()>;
    fn remove(&self, key: &str) -> ImportResult<()>;
}

/// Process-lifetime store, used in tests and when no data folder is set
#[derive(Default)]
pub struct MemoryKeyStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ImportError {
    ImportError::Common(pfi_common::Error::Internal(
        "key store lock poisoned".to_string(),
    ))
}

impl KeyValueStore for MemoryKeyStore {
    fn get(&self, key: &str) -> ImportResult<Option<String>> {
        let values = self.values.lock().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ImportResult<()> {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ImportResult<()> {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        values.remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten atomically (temp file + rename) on change
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<data_folder>/device.json`
    pub fn in_data_folder(data_folder: &Path) -> Self {
        Self::new(data_folder.join(DEVICE_STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> ImportResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| ImportError::Common(pfi_common::Error::Serialization(e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> ImportResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| ImportError::Common(pfi_common::Error::Serialization(e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, change: F) -> ImportResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read_map()?;
        change(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileKeyStore {
    fn get(&self, key: &str) -> ImportResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> ImportResult<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> ImportResult<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

/// Lazily created, rotatable device token
///
/// Reads share an `RwLock`; creation and rotation are serialized so that
/// concurrent 401s produce exactly one replacement token.
pub struct DeviceTokenProvider {
    store: Arc<dyn KeyValueStore>,
    cached: RwLock<Option<String>>,
    rotation: AsyncMutex<()>,
}

impl DeviceTokenProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
            rotation: AsyncMutex::new(()),
        }
    }

    /// Current token, minting and persisting one on first use
    pub async fn token(&self) -> ImportResult<String> {
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(token.clone());
        }

        let _guard = self.rotation.lock().await;
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(token.clone());
        }

        let stored = self.with_store(|store| store.get(DEVICE_TOKEN_KEY)).await?;
        let token = match stored {
            Some(token) if !token.trim().is_empty() => {
                debug!("Loaded device token from store");
                token
            }
            _ => self.mint().await?,
        };

        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    /// Replace `rejected` with a fresh token
    ///
    /// If another caller already rotated away from `rejected`, the token it
    /// installed is returned instead of minting again.
    pub async fn rotate(&self, rejected: &str) -> ImportResult<String> {
        let _guard = self.rotation.lock().await;

        if let Some(current) = self.cached.read().await.as_ref() {
            if current != rejected {
                debug!("Device token already rotated by a concurrent request");
                return Ok(current.clone());
            }
        }

        *self.cached.write().await = None;
        self.with_store(|store| store.remove(DEVICE_TOKEN_KEY)).await?;

        let token = self.mint().await?;
        *self.cached.write().await = Some(token.clone());
        info!("Device token rotated after rejection");
        Ok(token)
    }

    async fn mint(&self) -> ImportResult<String> {
        let token = uuid_utils::generate_token();
        let persisted = token.clone();
        self.with_store(move |store| store.set(DEVICE_TOKEN_KEY, &persisted))
            .await?;
        info!("Created new device token");
        Ok(token)
    }

    /// Run a store operation on the blocking pool
    ///
    /// File-backed stores do synchronous disk I/O.
    async fn with_store<T, F>(&self, op: F) -> ImportResult<T>
    where
        F: FnOnce(&dyn KeyValueStore) -> ImportResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| {
                ImportError::Common(pfi_common::Error::Internal(format!(
                    "key store task failed: {}",
                    e
                )))
            })?
    }
}
