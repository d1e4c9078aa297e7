use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DatakeepError;

/// Name of a dataset as used for registry keys and on-disk directories.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = DatakeepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() {
            return Err(DatakeepError::InvalidArgument(
                "dataset name must not be empty".to_string(),
            ));
        }
        let is_valid = normalized
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            && !normalized.starts_with('.');
        if !is_valid {
            return Err(DatakeepError::InvalidArgument(format!(
                "invalid dataset name: {value}"
            )));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Field of the registry's global `info` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CacheField {
    CacheDir,
    DownloadDir,
}

impl fmt::Display for CacheField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheField::CacheDir => write!(f, "root_cache_dir"),
            CacheField::DownloadDir => write!(f, "root_downloads_dir"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Gzip,
    Plain,
}

impl ArchiveKind {
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        if path.ends_with(".zip") {
            ArchiveKind::Zip
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if path.ends_with(".gz") {
            ArchiveKind::Gzip
        } else {
            ArchiveKind::Plain
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::TarGz => write!(f, "targz"),
            ArchiveKind::Gzip => write!(f, "gzip"),
            ArchiveKind::Plain => write!(f, "plain"),
        }
    }
}
