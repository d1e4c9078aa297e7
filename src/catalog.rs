//! Datasets this tool knows how to download and process.
//!
//! Descriptors are registered explicitly: [`DatasetCatalog::builtin`] adds
//! the bundled datasets, and a user catalog file (see
//! [`crate::config::CatalogLoader`]) can add more on top.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::{ArchiveKind, DatasetName};
use crate::error::DatakeepError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSource {
    pub url: String,
    pub sha256: Option<String>,
    pub kind: ArchiveKind,
}

impl ArchiveSource {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = ArchiveKind::from_url(&url);
        Self {
            url,
            sha256: None,
            kind,
        }
    }

    /// Last path segment of the URL, used as the on-disk file name.
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("download")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescriptor {
    pub categories: BTreeSet<String>,
}

impl TaskDescriptor {
    fn new(categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|value| value.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub urls: Vec<ArchiveSource>,
    pub keywords: BTreeSet<String>,
    pub tasks: BTreeMap<String, TaskDescriptor>,
    pub default_task: String,
}

impl DatasetDescriptor {
    /// Resolves an optional task name to a known task, falling back to the
    /// default task.
    pub fn resolve_task(&self, task: Option<&str>) -> Result<&str, DatakeepError> {
        let task = task.unwrap_or(&self.default_task);
        self.tasks
            .get_key_value(task)
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| DatakeepError::UnknownTask {
                dataset: self.name.clone(),
                task: task.to_string(),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    datasets: BTreeMap<String, DatasetDescriptor>,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for descriptor in builtin_descriptors() {
            catalog
                .datasets
                .insert(descriptor.name.clone(), descriptor);
        }
        catalog
    }

    pub fn register(&mut self, descriptor: DatasetDescriptor) -> Result<(), DatakeepError> {
        let name: DatasetName = descriptor.name.parse()?;
        if self.datasets.contains_key(name.as_str()) {
            return Err(DatakeepError::InvalidArgument(format!(
                "dataset {name} is already registered"
            )));
        }
        if !descriptor.tasks.contains_key(&descriptor.default_task) {
            return Err(DatakeepError::InvalidArgument(format!(
                "default task {} is not a task of dataset {name}",
                descriptor.default_task
            )));
        }
        self.datasets.insert(name.to_string(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DatasetDescriptor, DatakeepError> {
        self.datasets
            .get(name)
            .ok_or_else(|| DatakeepError::UnknownDataset(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.datasets.values()
    }
}

fn builtin_descriptors() -> Vec<DatasetDescriptor> {
    vec![
        DatasetDescriptor {
            name: "cifar10".to_string(),
            urls: vec![ArchiveSource::new(
                "https://www.cs.toronto.edu/~kriz/cifar-10-python.tar.gz",
            )],
            keywords: keywords(&["image_processing", "classification"]),
            tasks: BTreeMap::from([(
                "classification".to_string(),
                TaskDescriptor::new(&["image_processing", "classification"]),
            )]),
            default_task: "classification".to_string(),
        },
        DatasetDescriptor {
            name: "cifar100".to_string(),
            urls: vec![ArchiveSource::new(
                "https://www.cs.toronto.edu/~kriz/cifar-100-python.tar.gz",
            )],
            keywords: keywords(&["image_processing", "classification"]),
            tasks: BTreeMap::from([(
                "classification".to_string(),
                TaskDescriptor::new(&["image_processing", "classification"]),
            )]),
            default_task: "classification".to_string(),
        },
        DatasetDescriptor {
            name: "mnist".to_string(),
            urls: [
                "train-images-idx3-ubyte.gz",
                "train-labels-idx1-ubyte.gz",
                "t10k-images-idx3-ubyte.gz",
                "t10k-labels-idx1-ubyte.gz",
            ]
            .iter()
            .map(|file| {
                ArchiveSource::new(format!(
                    "https://ossci-datasets.s3.amazonaws.com/mnist/{file}"
                ))
            })
            .collect(),
            keywords: keywords(&["image_processing", "classification"]),
            tasks: BTreeMap::from([(
                "classification".to_string(),
                TaskDescriptor::new(&["image_processing", "classification"]),
            )]),
            default_task: "classification".to_string(),
        },
        DatasetDescriptor {
            name: "coco".to_string(),
            urls: vec![
                ArchiveSource::new("http://images.cocodataset.org/zips/train2014.zip"),
                ArchiveSource::new("http://images.cocodataset.org/zips/val2014.zip"),
                ArchiveSource::new(
                    "http://images.cocodataset.org/annotations/annotations_trainval2014.zip",
                ),
            ],
            keywords: keywords(&[
                "image_processing",
                "detection",
                "captioning",
                "human_pose",
                "keypoints",
            ]),
            tasks: BTreeMap::from([
                (
                    "detection".to_string(),
                    TaskDescriptor::new(&["image_processing", "detection"]),
                ),
                (
                    "caption".to_string(),
                    TaskDescriptor::new(&["image_processing", "captioning"]),
                ),
                (
                    "keypoints".to_string(),
                    TaskDescriptor::new(&["image_processing", "human_pose", "keypoints"]),
                ),
            ]),
            default_task: "detection".to_string(),
        },
    ]
}

fn keywords(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}
