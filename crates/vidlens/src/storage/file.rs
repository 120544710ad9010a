use std::path::{Path, PathBuf};

use super::{Storage, StorageKind};
use crate::{error::VidlensResult, util::now_millis};

/// A session directory with one sub-directory per [`StorageKind`].
pub struct FileStorage {
    session_dir: PathBuf,
    session_id: i64,
}

impl FileStorage {
    pub async fn create(session_dir: impl Into<PathBuf>) -> VidlensResult<Self> {
        let session_dir = session_dir.into();
        for kind in [StorageKind::Manifest, StorageKind::Segment, StorageKind::Append] {
            tokio::fs::create_dir_all(session_dir.join(kind.dir_name())).await?;
        }

        Ok(Self {
            session_dir,
            session_id: now_millis(),
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Creation time of the session in milliseconds.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    fn path_of(&self, kind: StorageKind, file_name: &str) -> PathBuf {
        // File names are derived from URLs in some cases
        let file_name = file_name.replace(['/', '\\'], "__");
        self.session_dir.join(kind.dir_name()).join(file_name)
    }
}

impl Storage for FileStorage {
    async fn save(&self, data: &[u8], kind: StorageKind, file_name: &str) -> VidlensResult<PathBuf> {
        let path = self.path_of(kind, file_name);
        log::info!(
            "Saving {kind} of {} bytes as file: {}",
            data.len(),
            path.display()
        );
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}
