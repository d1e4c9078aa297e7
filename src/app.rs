use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::cache::{
    CacheInfo, CacheManager, CategoryIndex, DatasetEntry, DatasetUpdate, DeleteOutcome, TaskEntry,
    TaskMap,
};
use crate::catalog::{ArchiveSource, DatasetCatalog, DatasetDescriptor};
use crate::config::Settings;
use crate::domain::{CacheField, DatasetName};
use crate::download::Downloader;
use crate::error::DatakeepError;
use crate::fs_util::{extract_archive, remove_dir_if_exists, remove_file_if_exists, sha256_file};
use crate::process::Processor;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub data_dir: Option<Utf8PathBuf>,
    pub extract: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            extract: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumStatus {
    Verified,
    Mismatch,
    Unchecked,
}

impl fmt::Display for ChecksumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumStatus::Verified => write!(f, "verified"),
            ChecksumStatus::Mismatch => write!(f, "mismatch"),
            ChecksumStatus::Unchecked => write!(f, "unchecked"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub dataset: String,
    pub cache_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub files: Vec<DownloadedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub url: String,
    pub path: Utf8PathBuf,
    pub action: String,
    pub checksum: ChecksumStatus,
    pub extracted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub dataset: String,
    pub task: String,
    pub filename: Utf8PathBuf,
    pub categories: Vec<String>,
}

/// Handle to a processed task, as returned by [`App::load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetLoader {
    pub name: String,
    pub task: String,
    pub data_dir: Utf8PathBuf,
    pub filename: Utf8PathBuf,
    pub categories: Vec<String>,
}

impl DatasetLoader {
    pub fn is_available(&self) -> bool {
        self.filename.as_std_path().is_file()
    }
}

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub name: String,
    pub task: String,
    pub data_dir: Utf8PathBuf,
    pub file_path: Utf8PathBuf,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub dataset: String,
    pub entry: DatasetEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub dataset: String,
    pub task: Option<String>,
    pub removed_paths: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigRequest {
    pub field: Option<CacheField>,
    pub value: Option<Utf8PathBuf>,
    pub delete_cache: bool,
    pub reset_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResult {
    pub registry_path: Utf8PathBuf,
    pub info: CacheInfo,
    pub reset: bool,
    pub deleted: Option<DeleteOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub pattern: String,
    pub datasets: BTreeMap<String, DatasetEntry>,
    pub tasks: Vec<TaskMatch>,
    pub categories: CategoryIndex,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.tasks.is_empty() && self.categories.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMatch {
    pub dataset: String,
    pub task: String,
    pub filename: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub data_dir: Utf8PathBuf,
    pub tasks: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableResult {
    pub datasets: Vec<AvailableEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableEntry {
    pub name: String,
    pub default_task: String,
    pub tasks: Vec<String>,
    pub keywords: Vec<String>,
    pub installed: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<D: Downloader, P: Processor> {
    settings: Settings,
    catalog: DatasetCatalog,
    downloader: D,
    processor: P,
}

impl<D: Downloader, P: Processor> App<D, P> {
    pub fn new(settings: Settings, catalog: DatasetCatalog, downloader: D, processor: P) -> Self {
        Self {
            settings,
            catalog,
            downloader,
            processor,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    pub fn download(
        &self,
        name: &str,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, DatakeepError> {
        let descriptor = self.catalog.get(name)?;
        let mut cache = CacheManager::open(&self.settings)?;
        let info = cache.info().clone();
        let data_dir = options
            .data_dir
            .unwrap_or_else(|| info.root_downloads_dir.join(name));
        let cache_dir = info.root_cache_dir.join(name);

        emit(sink, format!("phase=Prepare; {name} -> {data_dir}"));
        std::fs::create_dir_all(data_dir.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;

        let mut files = Vec::with_capacity(descriptor.urls.len());
        for source in &descriptor.urls {
            let path = data_dir.join(source.file_name());
            let action = if path.as_std_path().exists() {
                emit(sink, format!("phase=Download; {} already present", path));
                "present"
            } else {
                emit(sink, format!("phase=Download; {}", source.url));
                let start = Instant::now();
                self.fetch_to(source, &data_dir, &path)?;
                sink.event(ProgressEvent {
                    message: format!("phase=Download; saved {path}"),
                    elapsed: Some(start.elapsed()),
                });
                "download"
            };

            let checksum = match &source.sha256 {
                Some(expected) => {
                    let actual = sha256_file(path.as_std_path())?;
                    if actual.eq_ignore_ascii_case(expected) {
                        ChecksumStatus::Verified
                    } else {
                        warn!(
                            file = %path,
                            expected = %expected,
                            actual = %actual,
                            "checksum mismatch; keeping downloaded file"
                        );
                        ChecksumStatus::Mismatch
                    }
                }
                None => ChecksumStatus::Unchecked,
            };

            let extracted = if options.extract {
                emit(sink, format!("phase=Extract; {path}"));
                extract_archive(path.as_std_path(), source.kind, data_dir.as_std_path())?
            } else {
                false
            };

            files.push(DownloadedFile {
                url: source.url.clone(),
                path,
                action: action.to_string(),
                checksum,
                extracted,
            });
        }

        emit(sink, "phase=Store; updating cache");
        cache
            .datasets()
            .register(name, cache_dir.clone(), data_dir.clone())?;

        Ok(DownloadResult {
            dataset: name.to_string(),
            cache_dir,
            data_dir,
            files,
        })
    }

    pub fn process(
        &self,
        name: &str,
        task: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, DatakeepError> {
        let descriptor = self.catalog.get(name)?;
        let task = descriptor.resolve_task(task)?;
        let mut cache = CacheManager::open(&self.settings)?;
        let entry = cache.datasets().get(name)?.clone();

        emit(sink, format!("phase=Process; {name}/{task}"));
        let start = Instant::now();
        let filename = self
            .processor
            .process(descriptor, task, &entry.data_dir, &entry.cache_dir)?;
        sink.event(ProgressEvent {
            message: format!("phase=Process; wrote {filename}"),
            elapsed: Some(start.elapsed()),
        });

        let categories = task_categories(descriptor, task);
        cache.datasets().add_task(
            name,
            task,
            TaskEntry::new(filename.clone(), categories.iter().cloned()),
        )?;

        Ok(ProcessResult {
            dataset: name.to_string(),
            task: task.to_string(),
            filename,
            categories,
        })
    }

    /// Returns a handle to a task's output, downloading and processing the
    /// dataset first when the cache does not have it yet.
    pub fn load(
        &self,
        name: &str,
        task: Option<&str>,
        data_dir: Option<Utf8PathBuf>,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetLoader, DatakeepError> {
        let mut cache = CacheManager::open(&self.settings)?;
        if !cache.datasets().exists(name) {
            self.download(
                name,
                DownloadOptions {
                    data_dir,
                    extract: true,
                },
                sink,
            )?;
            cache.reload()?;
        }

        let task = match (self.catalog.get(name), task) {
            (Ok(descriptor), task) => descriptor.resolve_task(task)?.to_string(),
            (Err(_), Some(task)) => task.to_string(),
            (Err(_), None) => {
                return Err(DatakeepError::InvalidArgument(format!(
                    "dataset {name} is not in the catalog; a task name is required"
                )));
            }
        };

        if !cache.datasets().get(name)?.tasks.contains_key(&task) {
            if !self.catalog.contains(name) {
                return Err(DatakeepError::TaskNotFound {
                    dataset: name.to_string(),
                    task,
                });
            }
            self.process(name, Some(&task), sink)?;
            cache.reload()?;
        }

        let entry = cache.datasets().get(name)?.clone();
        let task_entry = entry
            .tasks
            .get(&task)
            .ok_or_else(|| DatakeepError::TaskNotFound {
                dataset: name.to_string(),
                task: task.clone(),
            })?;
        Ok(DatasetLoader {
            name: name.to_string(),
            task: task.clone(),
            data_dir: entry.data_dir.clone(),
            filename: task_entry.filename.clone(),
            categories: task_entry.categories.iter().cloned().collect(),
        })
    }

    /// Registers a task file produced outside this tool.
    pub fn add(&self, request: AddRequest) -> Result<EntryResult, DatakeepError> {
        let name: DatasetName = request.name.parse()?;
        if request.task.trim().is_empty() {
            return Err(DatakeepError::InvalidArgument(
                "task name must not be empty".to_string(),
            ));
        }
        let task_entry = TaskEntry::new(request.file_path, request.keywords);

        let mut cache = CacheManager::open(&self.settings)?;
        let cache_dir = cache.info().root_cache_dir.join(name.as_str());
        let mut datasets = cache.datasets();
        if datasets.exists(name.as_str()) {
            let mut tasks = datasets.get(name.as_str())?.tasks.clone();
            tasks.insert(request.task, task_entry);
            datasets.update(
                name.as_str(),
                DatasetUpdate {
                    data_dir: Some(request.data_dir),
                    tasks: Some(tasks),
                    ..DatasetUpdate::default()
                },
            )?;
        } else {
            let tasks = TaskMap::from([(request.task, task_entry)]);
            datasets.add(name.as_str(), cache_dir, request.data_dir, tasks)?;
        }

        let entry = datasets.get(name.as_str())?.clone();
        Ok(EntryResult {
            dataset: name.to_string(),
            entry,
        })
    }

    pub fn remove(
        &self,
        name: &str,
        task: Option<&str>,
        delete_data: bool,
    ) -> Result<RemoveResult, DatakeepError> {
        let mut cache = CacheManager::open(&self.settings)?;
        let mut removed_paths = Vec::new();

        match task {
            Some(task) => {
                let removed = cache.datasets().remove_task(name, task)?;
                if delete_data && remove_file_if_exists(removed.filename.as_std_path())? {
                    removed_paths.push(removed.filename);
                }
            }
            None => {
                let entry = cache.datasets().delete(name)?;
                if delete_data {
                    for dir in [entry.data_dir, entry.cache_dir] {
                        if remove_dir_if_exists(dir.as_std_path())? {
                            removed_paths.push(dir);
                        }
                    }
                }
            }
        }

        Ok(RemoveResult {
            dataset: name.to_string(),
            task: task.map(str::to_string),
            removed_paths,
        })
    }

    pub fn config_cache(&self, request: ConfigRequest) -> Result<ConfigResult, DatakeepError> {
        if request.value.is_some() && request.field.is_none() {
            return Err(DatakeepError::InvalidArgument(
                "a value requires a field to set".to_string(),
            ));
        }

        let mut cache = CacheManager::open(&self.settings)?;
        let registry_path = cache.path().to_path_buf();
        if request.delete_cache {
            let deleted = cache.delete(true, true)?;
            return Ok(ConfigResult {
                registry_path,
                info: cache.info().clone(),
                reset: false,
                deleted: Some(deleted),
            });
        }

        let reset = request.reset_cache && cache.reset(true)?;
        match (request.field, request.value) {
            (Some(CacheField::CacheDir), Some(value)) => cache.set_cache_dir(value)?,
            (Some(CacheField::CacheDir), None) => cache.reset_cache_dir()?,
            (Some(CacheField::DownloadDir), Some(value)) => cache.set_download_dir(value)?,
            (Some(CacheField::DownloadDir), None) => cache.reset_download_dir()?,
            (None, _) => {}
        }

        Ok(ConfigResult {
            registry_path,
            info: cache.info().clone(),
            reset,
            deleted: None,
        })
    }

    pub fn query(&self, pattern: &str) -> Result<QueryResult, DatakeepError> {
        let regex = Regex::new(pattern)
            .map_err(|err| DatakeepError::InvalidArgument(format!("invalid pattern: {err}")))?;
        let cache = CacheManager::open(&self.settings)?;
        let data = cache.data();

        let datasets = data
            .dataset
            .iter()
            .filter(|(name, _)| regex.is_match(name))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        let tasks = data
            .dataset
            .iter()
            .flat_map(|(name, entry)| {
                entry
                    .tasks
                    .iter()
                    .map(move |(task, task_entry)| (name, task, task_entry))
            })
            .filter(|(_, task, _)| regex.is_match(task))
            .map(|(name, task, task_entry)| TaskMatch {
                dataset: name.clone(),
                task: task.clone(),
                filename: task_entry.filename.clone(),
            })
            .collect();

        let categories = data
            .category
            .iter()
            .filter(|(category, _)| regex.is_match(category))
            .map(|(category, by_dataset)| (category.clone(), by_dataset.clone()))
            .collect();

        Ok(QueryResult {
            pattern: pattern.to_string(),
            datasets,
            tasks,
            categories,
        })
    }

    pub fn list(&self) -> Result<ListResult, DatakeepError> {
        let cache = CacheManager::open(&self.settings)?;
        let datasets = cache
            .data()
            .dataset
            .iter()
            .map(|(name, entry)| ListEntry {
                name: name.clone(),
                data_dir: entry.data_dir.clone(),
                tasks: entry.tasks.keys().cloned().collect(),
                keywords: entry.keywords.iter().cloned().collect(),
            })
            .collect();
        Ok(ListResult { datasets })
    }

    pub fn info(&self, name: &str) -> Result<EntryResult, DatakeepError> {
        let mut cache = CacheManager::open(&self.settings)?;
        let entry = cache.datasets().get(name)?.clone();
        Ok(EntryResult {
            dataset: name.to_string(),
            entry,
        })
    }

    pub fn available(&self) -> Result<AvailableResult, DatakeepError> {
        let cache = CacheManager::open(&self.settings)?;
        let installed = &cache.data().dataset;
        let datasets = self
            .catalog
            .descriptors()
            .map(|descriptor| AvailableEntry {
                name: descriptor.name.clone(),
                default_task: descriptor.default_task.clone(),
                tasks: descriptor.tasks.keys().cloned().collect(),
                keywords: descriptor.keywords.iter().cloned().collect(),
                installed: installed.contains_key(&descriptor.name),
            })
            .collect();
        Ok(AvailableResult { datasets })
    }

    fn fetch_to(
        &self,
        source: &ArchiveSource,
        data_dir: &Utf8Path,
        path: &Utf8Path,
    ) -> Result<(), DatakeepError> {
        let temp = tempfile::Builder::new()
            .prefix("datakeep-download")
            .tempfile_in(data_dir.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        self.downloader.fetch(source, temp.path())?;
        temp.persist(path.as_std_path())
            .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn task_categories(descriptor: &DatasetDescriptor, task: &str) -> Vec<String> {
    descriptor
        .tasks
        .get(task)
        .map(|task| task.categories.iter().cloned().collect())
        .unwrap_or_default()
}
