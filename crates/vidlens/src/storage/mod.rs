pub mod file;
pub mod memory;

use std::{fmt, future::Future, path::PathBuf, sync::Arc};

use serde::Serialize;

use crate::error::VidlensResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Manifest,
    Segment,
    Append,
}

impl StorageKind {
    /// Sub-directory of a session the kind is saved under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Manifest => "manifests",
            Self::Segment => "segments",
            Self::Append => "appends",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => f.write_str("manifest"),
            Self::Segment => f.write_str("segment"),
            Self::Append => f.write_str("append"),
        }
    }
}

/// Where handled manifests, segments and appends are persisted.
pub trait Storage: Send + Sync + 'static {
    /// Save `data` under `file_name` and return the path it can be found at.
    fn save(
        &self,
        data: &[u8],
        kind: StorageKind,
        file_name: &str,
    ) -> impl Future<Output = VidlensResult<PathBuf>> + Send;
}

impl<S> Storage for Arc<S>
where
    S: Storage,
{
    fn save(
        &self,
        data: &[u8],
        kind: StorageKind,
        file_name: &str,
    ) -> impl Future<Output = VidlensResult<PathBuf>> + Send {
        self.as_ref().save(data, kind, file_name)
    }
}

pub enum VidlensStorage {
    Memory(memory::MemoryStorage),
    File(file::FileStorage),
}

impl VidlensStorage {
    pub fn memory() -> Self {
        Self::Memory(memory::MemoryStorage::new())
    }

    pub async fn file(session_dir: impl Into<PathBuf>) -> VidlensResult<Self> {
        Ok(Self::File(file::FileStorage::create(session_dir).await?))
    }
}

impl Storage for VidlensStorage {
    async fn save(&self, data: &[u8], kind: StorageKind, file_name: &str) -> VidlensResult<PathBuf> {
        match self {
            VidlensStorage::Memory(storage) => storage.save(data, kind, file_name).await,
            VidlensStorage::File(storage) => storage.save(data, kind, file_name).await,
        }
    }
}
