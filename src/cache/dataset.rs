use camino::Utf8PathBuf;

use crate::cache::accessor::CacheManager;
use crate::cache::schema::{CacheDocument, DatasetEntry, TaskEntry, TaskMap};
use crate::error::DatakeepError;

/// Fields to overwrite in [`DatasetEntries::update`]; `None` keeps the
/// stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetUpdate {
    pub cache_dir: Option<Utf8PathBuf>,
    pub data_dir: Option<Utf8PathBuf>,
    pub tasks: Option<TaskMap>,
}

impl DatasetUpdate {
    pub fn is_empty(&self) -> bool {
        self.cache_dir.is_none() && self.data_dir.is_none() && self.tasks.is_none()
    }
}

/// Per-dataset operations over the registry. Every mutation rebuilds the
/// category index and persists the whole document.
pub struct DatasetEntries<'a> {
    manager: &'a mut CacheManager,
}

impl<'a> DatasetEntries<'a> {
    pub(crate) fn new(manager: &'a mut CacheManager) -> Self {
        Self { manager }
    }

    pub fn add(
        &mut self,
        name: &str,
        cache_dir: impl Into<Utf8PathBuf>,
        data_dir: impl Into<Utf8PathBuf>,
        tasks: TaskMap,
    ) -> Result<(), DatakeepError> {
        let name = name.trim();
        let cache_dir = cache_dir.into();
        let data_dir = data_dir.into();
        require(!name.is_empty(), "dataset name must not be empty")?;
        require(!cache_dir.as_str().is_empty(), "cache_dir must not be empty")?;
        require(!data_dir.as_str().is_empty(), "data_dir must not be empty")?;
        require(!tasks.is_empty(), "tasks must not be empty")?;

        let entry = DatasetEntry::new(cache_dir, data_dir, tasks);
        self.commit(|document| {
            document.dataset.insert(name.to_string(), entry);
        })
    }

    /// Records a dataset's directories without touching its tasks, creating
    /// an entry with no tasks when the dataset is new.
    pub fn register(
        &mut self,
        name: &str,
        cache_dir: impl Into<Utf8PathBuf>,
        data_dir: impl Into<Utf8PathBuf>,
    ) -> Result<(), DatakeepError> {
        let name = name.trim();
        let cache_dir = cache_dir.into();
        let data_dir = data_dir.into();
        require(!name.is_empty(), "dataset name must not be empty")?;

        if self.exists(name) {
            return self.update(
                name,
                DatasetUpdate {
                    cache_dir: Some(cache_dir),
                    data_dir: Some(data_dir),
                    tasks: None,
                },
            );
        }
        let entry = DatasetEntry::new(cache_dir, data_dir, TaskMap::new());
        self.commit(|document| {
            document.dataset.insert(name.to_string(), entry);
        })
    }

    pub fn get(&self, name: &str) -> Result<&DatasetEntry, DatakeepError> {
        self.manager
            .data()
            .dataset
            .get(name)
            .ok_or_else(|| DatakeepError::DatasetNotFound(name.to_string()))
    }

    pub fn update(&mut self, name: &str, update: DatasetUpdate) -> Result<(), DatakeepError> {
        let mut entry = self.get(name)?.clone();
        if update.is_empty() {
            return Ok(());
        }

        if let Some(cache_dir) = update.cache_dir {
            entry.cache_dir = cache_dir;
        }
        if let Some(data_dir) = update.data_dir {
            entry.data_dir = data_dir;
        }
        if let Some(tasks) = update.tasks {
            entry.set_tasks(tasks);
        }
        self.commit(|document| {
            document.dataset.insert(name.to_string(), entry);
        })
    }

    pub fn delete(&mut self, name: &str) -> Result<DatasetEntry, DatakeepError> {
        let entry = self.get(name)?.clone();
        self.commit(|document| {
            document.dataset.remove(name);
        })?;
        Ok(entry)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.manager.data().dataset.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.manager.data().dataset.keys().cloned().collect()
    }

    /// Inserts or replaces a single task, keeping the dataset's other tasks.
    pub fn add_task(
        &mut self,
        name: &str,
        task: &str,
        entry: TaskEntry,
    ) -> Result<(), DatakeepError> {
        require(!task.trim().is_empty(), "task name must not be empty")?;
        let mut tasks = self.get(name)?.tasks.clone();
        tasks.insert(task.to_string(), entry);
        self.update(
            name,
            DatasetUpdate {
                tasks: Some(tasks),
                ..DatasetUpdate::default()
            },
        )
    }

    pub fn remove_task(&mut self, name: &str, task: &str) -> Result<TaskEntry, DatakeepError> {
        let mut tasks = self.get(name)?.tasks.clone();
        let removed = tasks.remove(task).ok_or_else(|| DatakeepError::TaskNotFound {
            dataset: name.to_string(),
            task: task.to_string(),
        })?;
        self.update(
            name,
            DatasetUpdate {
                tasks: Some(tasks),
                ..DatasetUpdate::default()
            },
        )?;
        Ok(removed)
    }

    fn commit<F>(&mut self, change: F) -> Result<(), DatakeepError>
    where
        F: FnOnce(&mut CacheDocument),
    {
        let mut document = self.manager.data().clone();
        change(&mut document);
        document.rebuild_category_index();
        self.manager.write(document)
    }
}

fn require(condition: bool, message: &str) -> Result<(), DatakeepError> {
    if condition {
        Ok(())
    } else {
        Err(DatakeepError::InvalidArgument(message.to_string()))
    }
}
