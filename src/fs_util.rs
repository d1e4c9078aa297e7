use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use zip::ZipArchive;

use crate::domain::ArchiveKind;
use crate::error::DatakeepError;

/// Unpacks `archive_path` into `target_dir`. Returns `false` for plain
/// files, which are left as downloaded.
pub fn extract_archive(
    archive_path: &Path,
    kind: ArchiveKind,
    target_dir: &Path,
) -> Result<bool, DatakeepError> {
    match kind {
        ArchiveKind::Zip => extract_zip(archive_path, target_dir).map(|_| true),
        ArchiveKind::TarGz => extract_tar_gz(archive_path, target_dir).map(|_| true),
        ArchiveKind::Gzip => extract_gzip(archive_path, target_dir).map(|_| true),
        ArchiveKind::Plain => Ok(false),
    }
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), DatakeepError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        DatakeepError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(DatakeepError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<(), DatakeepError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        DatakeepError::Filesystem(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(target_dir).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;

    let entries = archive
        .entries()
        .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        let relative = entry
            .path()
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?
            .into_owned();
        if !is_enclosed(&relative) {
            return Err(DatakeepError::Filesystem(
                "tar entry path traversal detected".to_string(),
            ));
        }
        entry
            .unpack_in(target_dir)
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Decompresses a single `.gz` file next to its name without the suffix.
pub fn extract_gzip(archive_path: &Path, target_dir: &Path) -> Result<(), DatakeepError> {
    let stem = archive_path
        .file_stem()
        .ok_or_else(|| DatakeepError::Filesystem("gzip file has no name".to_string()))?;
    let file = fs::File::open(archive_path).map_err(|err| {
        DatakeepError::Filesystem(format!("open gzip {}: {err}", archive_path.display()))
    })?;
    fs::create_dir_all(target_dir).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    let mut decoder = GzDecoder::new(file);
    let mut outfile = fs::File::create(target_dir.join(stem))
        .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile)
        .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String, DatakeepError> {
    let mut file = fs::File::open(path)
        .map_err(|err| DatakeepError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, DatakeepError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    items.sort();
    Ok(items)
}

/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool, DatakeepError> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path)
        .map_err(|err| DatakeepError::Filesystem(format!("remove {}: {err}", path.display())))?;
    Ok(true)
}

pub fn remove_file_if_exists(path: &Path) -> Result<bool, DatakeepError> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)
        .map_err(|err| DatakeepError::Filesystem(format!("remove {}: {err}", path.display())))?;
    Ok(true)
}

fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
