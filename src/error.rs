use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DatakeepError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dataset not found in cache: {0}")]
    DatasetNotFound(String),

    #[error("task {task} not found for dataset {dataset}")]
    TaskNotFound { dataset: String, task: String },

    #[error("category not found in cache: {0}")]
    CategoryNotFound(String),

    #[error("unknown dataset: {0}")]
    #[diagnostic(help("run `datakeep available` to see the datasets that can be downloaded"))]
    UnknownDataset(String),

    #[error("unknown task {task} for dataset {dataset}")]
    UnknownTask { dataset: String, task: String },

    #[error("failed to parse cache file {path}: {message}")]
    CacheParse { path: String, message: String },

    #[error("failed to read catalog file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON catalog: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("processing failed: {0}")]
    Processing(String),
}

impl DatakeepError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DatakeepError::DatasetNotFound(_)
                | DatakeepError::TaskNotFound { .. }
                | DatakeepError::CategoryNotFound(_)
        )
    }
}
