use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::cache::CacheInfo;
use crate::catalog::{ArchiveSource, DatasetDescriptor, TaskDescriptor};
use crate::domain::{ArchiveKind, DatasetName};
use crate::error::DatakeepError;

pub const HOME_ENV: &str = "DATAKEEP_HOME";
pub const REGISTRY_FILE_NAME: &str = "datakeep.json";
const CACHE_DIR_NAME: &str = "datakeep";
const DOWNLOADS_DIR_NAME: &str = "downloads";

/// Locations derived from the user's home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    home: Utf8PathBuf,
    registry_path: Utf8PathBuf,
}

impl Settings {
    pub fn new() -> Result<Self, DatakeepError> {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.trim().is_empty() {
                return Ok(Self::with_home(Utf8PathBuf::from(home.trim())));
            }
        }

        let home = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
            .ok_or_else(|| {
                DatakeepError::Filesystem("unable to resolve home directory".to_string())
            })?;
        Ok(Self::with_home(home))
    }

    pub fn with_home(home: Utf8PathBuf) -> Self {
        let registry_path = home.join(REGISTRY_FILE_NAME);
        Self {
            home,
            registry_path,
        }
    }

    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    pub fn registry_path(&self) -> &Utf8Path {
        &self.registry_path
    }

    pub fn default_cache_dir(&self) -> Utf8PathBuf {
        self.home.join(CACHE_DIR_NAME)
    }

    pub fn default_downloads_dir(&self) -> Utf8PathBuf {
        self.default_cache_dir().join(DOWNLOADS_DIR_NAME)
    }

    pub fn default_info(&self) -> CacheInfo {
        CacheInfo {
            root_cache_dir: self.default_cache_dir(),
            root_downloads_dir: self.default_downloads_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datasets: Vec<CatalogDataset>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogDataset {
    pub name: String,
    #[serde(default)]
    pub urls: Vec<UrlEntry>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub tasks: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub default_task: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UrlEntry {
    Shorthand(String),
    Detailed(UrlEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UrlEntryObject {
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub archive: Option<ArchiveKind>,
}

pub struct CatalogLoader;

impl CatalogLoader {
    pub fn resolve(path: &Path) -> Result<Vec<DatasetDescriptor>, DatakeepError> {
        let content =
            fs::read_to_string(path).map_err(|_| DatakeepError::ConfigRead(path.to_path_buf()))?;
        let catalog: CatalogFile = serde_json::from_str(&content)
            .map_err(|err| DatakeepError::ConfigParse(err.to_string()))?;

        Self::resolve_catalog(catalog)
    }

    pub fn resolve_catalog(catalog: CatalogFile) -> Result<Vec<DatasetDescriptor>, DatakeepError> {
        let schema_version = catalog.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(DatakeepError::ConfigParse(format!(
                "unsupported catalog schema_version {schema_version}"
            )));
        }

        catalog
            .datasets
            .into_iter()
            .map(resolve_dataset)
            .collect::<Result<Vec<_>, DatakeepError>>()
    }
}

fn resolve_dataset(entry: CatalogDataset) -> Result<DatasetDescriptor, DatakeepError> {
    let name: DatasetName = entry.name.parse()?;
    if entry.tasks.is_empty() {
        return Err(DatakeepError::ConfigParse(format!(
            "dataset {name} declares no tasks"
        )));
    }

    let urls = entry
        .urls
        .into_iter()
        .map(|url| match url {
            UrlEntry::Shorthand(url) => ArchiveSource::new(url),
            UrlEntry::Detailed(obj) => {
                let mut source = ArchiveSource::new(obj.url);
                source.sha256 = obj.sha256.map(|hash| hash.to_ascii_lowercase());
                if let Some(kind) = obj.archive {
                    source.kind = kind;
                }
                source
            }
        })
        .collect();

    let tasks: BTreeMap<String, TaskDescriptor> = entry
        .tasks
        .into_iter()
        .map(|(task, categories)| {
            (
                task,
                TaskDescriptor {
                    categories: categories.into_iter().collect(),
                },
            )
        })
        .collect();

    let keywords: BTreeSet<String> = if entry.keywords.is_empty() {
        tasks
            .values()
            .flat_map(|task| task.categories.iter().cloned())
            .collect()
    } else {
        entry.keywords.into_iter().collect()
    };

    let default_task = match entry.default_task {
        Some(task) => task,
        None => tasks
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| DatakeepError::ConfigParse(format!("dataset {name} has no tasks")))?,
    };

    Ok(DatasetDescriptor {
        name: name.to_string(),
        urls,
        keywords,
        tasks,
        default_task,
    })
}
