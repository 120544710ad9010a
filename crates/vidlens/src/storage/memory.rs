use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use bytes::Bytes;

use super::{Storage, StorageKind};
use crate::error::VidlensResult;

/// Keeps saved data in memory, addressed by a virtual `kind/file_name` path.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Bytes> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    async fn save(&self, data: &[u8], kind: StorageKind, file_name: &str) -> VidlensResult<PathBuf> {
        let path = Path::new(kind.dir_name()).join(file_name);
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if files.contains_key(&path) {
            log::warn!("File {} already exists, overwriting.", path.display());
        }
        files.insert(path.clone(), Bytes::copy_from_slice(data));
        Ok(path)
    }
}
