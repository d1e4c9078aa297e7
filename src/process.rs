use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::catalog::DatasetDescriptor;
use crate::error::DatakeepError;
use crate::fs_util::walk_files;

/// Turns a dataset's raw files into the output file of one task.
pub trait Processor: Send + Sync {
    /// Returns the path of the file written for `task`.
    fn process(
        &self,
        dataset: &DatasetDescriptor,
        task: &str,
        data_dir: &Utf8Path,
        save_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, DatakeepError>;
}

/// Writes `<save_dir>/<task>.json` listing every raw file of the dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestProcessor;

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub dataset: String,
    pub task: String,
    pub generated_at: String,
    pub data_dir: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestFile {
    pub path: String,
    pub size: u64,
}

impl Processor for ManifestProcessor {
    fn process(
        &self,
        dataset: &DatasetDescriptor,
        task: &str,
        data_dir: &Utf8Path,
        save_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, DatakeepError> {
        if !data_dir.as_std_path().is_dir() {
            return Err(DatakeepError::Processing(format!(
                "data directory {data_dir} does not exist"
            )));
        }

        let mut files = Vec::new();
        for path in walk_files(data_dir.as_std_path())? {
            let size = fs::metadata(&path)
                .map_err(|err| DatakeepError::Filesystem(err.to_string()))?
                .len();
            let relative = path
                .strip_prefix(data_dir.as_std_path())
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            files.push(ManifestFile {
                path: relative,
                size,
            });
        }
        tracing::debug!(dataset = %dataset.name, task, files = files.len(), "writing manifest");

        let manifest = Manifest {
            dataset: dataset.name.clone(),
            task: task.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            data_dir: data_dir.to_string(),
            files,
        };
        fs::create_dir_all(save_dir.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        let filename = save_dir.join(format!("{task}.json"));
        let content = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| DatakeepError::Processing(err.to_string()))?;
        fs::write(filename.as_std_path(), content)
            .map_err(|err| DatakeepError::Filesystem(format!("write {filename}: {err}")))?;
        Ok(filename)
    }
}
