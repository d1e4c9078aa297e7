use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::category::Categories;
use crate::cache::dataset::DatasetEntries;
use crate::cache::schema::{CacheDocument, CacheInfo};
use crate::config::Settings;
use crate::error::DatakeepError;

/// Result of [`CacheManager::delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub file_deleted: bool,
    pub removed_dirs: Vec<Utf8PathBuf>,
}

/// Reads and writes the registry file.
///
/// Holds the last document read or written in `data`. Every mutation
/// rewrites the whole file; there is no locking, so two processes writing
/// at once keep whichever write lands last.
#[derive(Debug, Clone)]
pub struct CacheManager {
    path: Utf8PathBuf,
    settings: Settings,
    data: CacheDocument,
}

impl CacheManager {
    pub fn open(settings: &Settings) -> Result<Self, DatakeepError> {
        let mut manager = Self {
            path: settings.registry_path().to_path_buf(),
            settings: settings.clone(),
            data: CacheDocument::empty(settings.default_info()),
        };
        manager.data = manager.read()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn data(&self) -> &CacheDocument {
        &self.data
    }

    pub fn info(&self) -> &CacheInfo {
        &self.data.info
    }

    pub fn datasets(&mut self) -> DatasetEntries<'_> {
        DatasetEntries::new(self)
    }

    pub fn categories(&self) -> Categories<'_> {
        Categories::new(&self.data)
    }

    /// Loads the registry from disk, creating it with default contents when
    /// the file does not exist yet.
    pub fn read(&self) -> Result<CacheDocument, DatakeepError> {
        if !self.path.as_std_path().exists() {
            info!(path = %self.path, "creating cache file");
            let document = self.default_document();
            write_document(&self.path, &document)?;
            return Ok(document);
        }

        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(format!("read {}: {err}", self.path)))?;
        serde_json::from_str(&content).map_err(|err| DatakeepError::CacheParse {
            path: self.path.to_string(),
            message: err.to_string(),
        })
    }

    pub fn reload(&mut self) -> Result<(), DatakeepError> {
        self.data = self.read()?;
        Ok(())
    }

    pub fn write(&mut self, document: CacheDocument) -> Result<(), DatakeepError> {
        if document.info.root_cache_dir.as_str().is_empty()
            || document.info.root_downloads_dir.as_str().is_empty()
        {
            return Err(DatakeepError::InvalidArgument(
                "cache document must define root_cache_dir and root_downloads_dir".to_string(),
            ));
        }
        write_document(&self.path, &document)?;
        self.data = document;
        Ok(())
    }

    /// Replaces the registry with the default empty document. Without
    /// `force` this only warns.
    pub fn reset(&mut self, force: bool) -> Result<bool, DatakeepError> {
        if !force {
            warn!(
                path = %self.path,
                "cache not reset; pass force to overwrite the cache with default values"
            );
            return Ok(false);
        }
        let document = self.default_document();
        self.write(document)?;
        Ok(true)
    }

    pub fn set_cache_dir(&mut self, path: impl Into<Utf8PathBuf>) -> Result<(), DatakeepError> {
        let mut document = self.data.clone();
        document.info.root_cache_dir = path.into();
        self.write(document)
    }

    pub fn reset_cache_dir(&mut self) -> Result<(), DatakeepError> {
        self.set_cache_dir(self.settings.default_cache_dir())
    }

    pub fn set_download_dir(&mut self, path: impl Into<Utf8PathBuf>) -> Result<(), DatakeepError> {
        let mut document = self.data.clone();
        document.info.root_downloads_dir = path.into();
        self.write(document)
    }

    pub fn reset_download_dir(&mut self) -> Result<(), DatakeepError> {
        self.set_download_dir(self.settings.default_downloads_dir())
    }

    /// Removes the registry file and, with `force_delete_metadata`, the
    /// per-dataset directories under the root cache dir. The downloads
    /// directory is never removed here.
    pub fn delete(
        &mut self,
        force_delete_file: bool,
        force_delete_metadata: bool,
    ) -> Result<DeleteOutcome, DatakeepError> {
        let mut outcome = DeleteOutcome::default();
        if !force_delete_file {
            warn!(
                path = %self.path,
                "cache file not deleted; pass force_delete_file to remove it"
            );
            return Ok(outcome);
        }

        if self.path.as_std_path().exists() {
            fs::remove_file(self.path.as_std_path())
                .map_err(|err| DatakeepError::Filesystem(format!("remove {}: {err}", self.path)))?;
        }
        outcome.file_deleted = true;
        debug!(path = %self.path, "cache file deleted");

        if !force_delete_metadata {
            warn!(
                cache_dir = %self.data.info.root_cache_dir,
                "cache directories not deleted; pass force_delete_metadata to remove them"
            );
            return Ok(outcome);
        }
        outcome.removed_dirs = self.delete_metadata_dirs()?;
        Ok(outcome)
    }

    fn delete_metadata_dirs(&self) -> Result<Vec<Utf8PathBuf>, DatakeepError> {
        let root = &self.data.info.root_cache_dir;
        if !root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        remove_dirs_except(root, &self.data.info.root_downloads_dir, &mut removed)?;
        removed.sort();
        Ok(removed)
    }

    fn default_document(&self) -> CacheDocument {
        CacheDocument::empty(self.settings.default_info())
    }
}

/// Removes the subdirectories of `dir`, descending into ancestors of `keep`
/// so that only their other children go.
fn remove_dirs_except(
    dir: &Utf8Path,
    keep: &Utf8Path,
    removed: &mut Vec<Utf8PathBuf>,
) -> Result<(), DatakeepError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| DatakeepError::Filesystem(format!("read {dir}: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
            DatakeepError::Filesystem(format!("non-utf8 path {}", path.display()))
        })?;
        if !path.as_std_path().is_dir() || path.as_path() == keep {
            continue;
        }
        if keep.starts_with(&path) {
            remove_dirs_except(&path, keep, removed)?;
            continue;
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(format!("remove {path}: {err}")))?;
        removed.push(path);
    }
    Ok(())
}

fn write_document(path: &Utf8Path, document: &CacheDocument) -> Result<(), DatakeepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        }
    }
    let mut content = serde_json::to_vec_pretty(document)
        .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    content.push(b'\n');
    fs::write(path.as_std_path(), &content)
        .map_err(|err| DatakeepError::Filesystem(format!("write {path}: {err}")))
}
