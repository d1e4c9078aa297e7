//! On-disk layout of the registry file.
//!
//! Every map is a `BTreeMap` and every set a `BTreeSet`, so serializing the
//! same document twice always yields the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// keyword -> dataset name -> task names carrying the keyword.
pub type CategoryIndex = BTreeMap<String, BTreeMap<String, Vec<String>>>;

pub type TaskMap = BTreeMap<String, TaskEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub info: CacheInfo,
    #[serde(default)]
    pub dataset: BTreeMap<String, DatasetEntry>,
    #[serde(default)]
    pub category: CategoryIndex,
}

impl CacheDocument {
    pub fn empty(info: CacheInfo) -> Self {
        Self {
            info,
            dataset: BTreeMap::new(),
            category: CategoryIndex::new(),
        }
    }

    /// Recomputes `category` from `dataset`, replacing it wholesale.
    pub fn rebuild_category_index(&mut self) {
        self.category = build_category_index(&self.dataset);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub root_cache_dir: Utf8PathBuf,
    pub root_downloads_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub cache_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    #[serde(default)]
    pub tasks: TaskMap,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl DatasetEntry {
    pub fn new(cache_dir: Utf8PathBuf, data_dir: Utf8PathBuf, tasks: TaskMap) -> Self {
        let keywords = derive_keywords(&tasks);
        Self {
            cache_dir,
            data_dir,
            tasks,
            keywords,
        }
    }

    pub fn set_tasks(&mut self, tasks: TaskMap) {
        self.keywords = derive_keywords(&tasks);
        self.tasks = tasks;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub filename: Utf8PathBuf,
    #[serde(default)]
    pub categories: BTreeSet<String>,
}

impl TaskEntry {
    pub fn new<I, S>(filename: impl Into<Utf8PathBuf>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filename: filename.into(),
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn derive_keywords(tasks: &TaskMap) -> BTreeSet<String> {
    tasks
        .values()
        .flat_map(|task| task.categories.iter().cloned())
        .collect()
}

pub fn build_category_index(datasets: &BTreeMap<String, DatasetEntry>) -> CategoryIndex {
    let categories: BTreeSet<&String> = datasets
        .values()
        .flat_map(|entry| entry.keywords.iter())
        .collect();

    let mut index = CategoryIndex::new();
    for category in categories {
        let mut by_dataset = BTreeMap::new();
        for (name, entry) in datasets {
            let tasks: Vec<String> = entry
                .tasks
                .iter()
                .filter(|(_, task)| task.categories.contains(category))
                .map(|(task_name, _)| task_name.clone())
                .collect();
            if !tasks.is_empty() {
                by_dataset.insert(name.clone(), tasks);
            }
        }
        if !by_dataset.is_empty() {
            index.insert(category.clone(), by_dataset);
        }
    }
    index
}
