use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::models::StoreKey;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {key} store at {path}: {source}")]
    Io {
        key: StoreKey,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize {key} store: {source}")]
    Serde {
        key: StoreKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Synchronous key-value persistence for the per-chat maps. Reads return
/// `None` when nothing has been written for the key yet.
pub trait KvStore: Send + Sync {
    fn read_raw(&self, key: StoreKey) -> Result<Option<String>, StoreError>;
    fn write_raw(&self, key: StoreKey, body: &str) -> Result<(), StoreError>;
}

pub fn read_map<V: DeserializeOwned>(
    store: &dyn KvStore,
    key: StoreKey,
) -> Result<BTreeMap<i64, V>, StoreError> {
    let Some(body) = store.read_raw(key)? else {
        return Ok(BTreeMap::new());
    };
    if body.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&body).map_err(|source| StoreError::Serde { key, source })
}

pub fn write_map<V: Serialize>(
    store: &dyn KvStore,
    key: StoreKey,
    map: &BTreeMap<i64, V>,
) -> Result<(), StoreError> {
    let body = serde_json::to_string(map).map_err(|source| StoreError::Serde { key, source })?;
    store.write_raw(key, &body)
}

/// One JSON document per map inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: StoreKey::Opened,
            path: dir.display().to_string(),
            source,
        })?;
        info!("Using data directory {}", dir.display());
        Ok(FileStore { dir })
    }

    fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl KvStore for FileStore {
    fn read_raw(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No {} store at {}; starting empty", key, path.display());
                Ok(None)
            }
            Err(source) => Err(StoreError::Io {
                key,
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn write_raw(&self, key: StoreKey, body: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            key,
            path: path.display().to_string(),
            source,
        };
        fs::write(&tmp_path, body).map_err(io_err)?;
        fs::rename(&tmp_path, &path).map_err(io_err)?;
        Ok(())
    }
}
