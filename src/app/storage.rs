//! File placement on the local filesystem
//!
//! Files live below a storage root, split by storage location:
//!
//! - `{root}/internal/{folder}/{name}`
//! - `{root}/external/{folder}/{name}`
//!
//! Entries without a folder fall back to a folder derived from their storage
//! type, so resource and global files never mix with issue content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::app::models::{FileEntry, StorageLocation, StorageType};
use crate::app::services::StorageService;
use crate::constants::storage;
use crate::errors::{CacheResult, StorageError};

/// Storage service rooted at a directory
#[derive(Debug, Clone)]
pub struct FsStorageService {
    root: PathBuf,
}

impl FsStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a storage location
    pub fn location_root(&self, location: StorageLocation) -> PathBuf {
        let folder = match location {
            StorageLocation::Internal => storage::INTERNAL_FOLDER,
            StorageLocation::External => storage::EXTERNAL_FOLDER,
        };
        self.root.join(folder)
    }

    /// Path a file is written to before it is renamed into place
    pub fn temp_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_os_string();
        name.push(storage::TEMP_FILE_SUFFIX);
        PathBuf::from(name)
    }

    fn folder_of(entry: &FileEntry) -> &str {
        if !entry.folder.is_empty() {
            return &entry.folder;
        }
        match entry.storage_type {
            StorageType::Issue => "",
            StorageType::Resource => storage::RESOURCE_FOLDER,
            StorageType::Global => storage::GLOBAL_FOLDER,
        }
    }
}

#[async_trait]
impl StorageService for FsStorageService {
    fn absolute_path(&self, entry: &FileEntry) -> CacheResult<PathBuf> {
        let location = entry.storage_location.ok_or_else(|| StorageError::Unresolvable {
            name: entry.name.clone(),
            reason: "no storage location assigned".to_string(),
        })?;

        if entry.name.is_empty() || entry.name.contains('/') || entry.name == ".." {
            return Err(StorageError::Unresolvable {
                name: entry.name.clone(),
                reason: "file name is not a plain name".to_string(),
            }
            .into());
        }

        let mut path = self.location_root(location);
        for part in Self::folder_of(entry).split('/').filter(|p| !p.is_empty()) {
            if part == ".." {
                return Err(StorageError::Unresolvable {
                    name: entry.name.clone(),
                    reason: format!("folder {} leaves the storage root", entry.folder),
                }
                .into());
            }
            path.push(part);
        }
        path.push(&entry.name);
        Ok(path)
    }

    async fn delete_file(&self, entry: &FileEntry) -> CacheResult<()> {
        let path = self.absolute_path(entry)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} was already gone", path.display());
                Ok(())
            }
            Err(e) => Err(StorageError::io(&path, &e).into()),
        }
    }
}
