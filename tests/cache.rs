use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use datakeep::cache::{CacheDocument, CacheManager, DatasetUpdate, TaskEntry, TaskMap};
use datakeep::config::Settings;
use datakeep::error::DatakeepError;

fn temp_settings() -> (tempfile::TempDir, Settings) {
    let temp = tempfile::tempdir().unwrap();
    let home = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Settings::with_home(home))
}

fn cifar_tasks() -> TaskMap {
    TaskMap::from([(
        "classification".to_string(),
        TaskEntry::new("classification.h5", ["image_processing", "classification"]),
    )])
}

fn coco_tasks() -> TaskMap {
    TaskMap::from([
        (
            "detection".to_string(),
            TaskEntry::new("detection.h5", ["image_processing", "detection"]),
        ),
        (
            "caption".to_string(),
            TaskEntry::new("caption.h5", ["image_processing", "captioning"]),
        ),
    ])
}

fn assert_invariants(document: &CacheDocument) {
    for entry in document.dataset.values() {
        let union: BTreeSet<String> = entry
            .tasks
            .values()
            .flat_map(|task| task.categories.iter().cloned())
            .collect();
        assert_eq!(entry.keywords, union);
    }

    for (category, by_dataset) in &document.category {
        for (dataset, tasks) in by_dataset {
            let entry = &document.dataset[dataset];
            for task in tasks {
                assert!(entry.tasks[task].categories.contains(category));
            }
        }
    }
    for (dataset, entry) in &document.dataset {
        for (task, task_entry) in &entry.tasks {
            for category in &task_entry.categories {
                assert!(document.category[category][dataset].contains(task));
            }
        }
    }
}

#[test]
fn read_creates_default_file() {
    let (_temp, settings) = temp_settings();
    assert!(!settings.registry_path().as_std_path().exists());

    let cache = CacheManager::open(&settings).unwrap();
    assert!(settings.registry_path().as_std_path().exists());
    assert_eq!(cache.data(), &CacheDocument::empty(settings.default_info()));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let (_temp, settings) = temp_settings();
    fs::write(settings.registry_path().as_std_path(), b"{ not json").unwrap();

    let err = CacheManager::open(&settings).unwrap_err();
    assert_matches!(err, DatakeepError::CacheParse { .. });
}

#[test]
fn add_then_get_returns_written_entry() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();

    cache
        .datasets()
        .add("cifar10", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();

    let datasets = cache.datasets();
    assert!(datasets.exists("cifar10"));
    let entry = datasets.get("cifar10").unwrap();
    assert_eq!(entry.data_dir.as_str(), "/data/cifar10");
    assert_eq!(entry.cache_dir.as_str(), "/cache/cifar10");
    assert_eq!(entry.tasks, cifar_tasks());
    let keywords: Vec<&str> = entry.keywords.iter().map(String::as_str).collect();
    assert_eq!(keywords, ["classification", "image_processing"]);

    assert_eq!(
        cache.categories().get("classification").unwrap()["cifar10"],
        ["classification"]
    );
    assert_invariants(cache.data());
}

#[test]
fn add_requires_every_argument() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    let mut datasets = cache.datasets();

    assert_matches!(
        datasets.add("", "/cache/x", "/data/x", cifar_tasks()),
        Err(DatakeepError::InvalidArgument(_))
    );
    assert_matches!(
        datasets.add("x", "", "/data/x", cifar_tasks()),
        Err(DatakeepError::InvalidArgument(_))
    );
    assert_matches!(
        datasets.add("x", "/cache/x", "", cifar_tasks()),
        Err(DatakeepError::InvalidArgument(_))
    );
    assert_matches!(
        datasets.add("x", "/cache/x", "/data/x", TaskMap::new()),
        Err(DatakeepError::InvalidArgument(_))
    );
    assert!(!datasets.exists("x"));
}

#[test]
fn get_missing_dataset_names_it() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();

    let err = cache.datasets().get("nonexistent").unwrap_err();
    assert_matches!(err, DatakeepError::DatasetNotFound(_));
    assert!(err.to_string().contains("nonexistent"));
    assert!(err.is_not_found());
}

#[test]
fn empty_update_leaves_file_untouched() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("cifar10", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();
    let before = fs::read(settings.registry_path().as_std_path()).unwrap();

    cache
        .datasets()
        .update("cifar10", DatasetUpdate::default())
        .unwrap();

    let after = fs::read(settings.registry_path().as_std_path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn update_missing_dataset_fails() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    let err = cache
        .datasets()
        .update("ghost", DatasetUpdate::default())
        .unwrap_err();
    assert_matches!(err, DatakeepError::DatasetNotFound(name) if name == "ghost");
}

#[test]
fn update_tasks_recomputes_keywords_and_categories() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("coco", "/cache/coco", "/data/coco", coco_tasks())
        .unwrap();
    assert!(cache.categories().exists("captioning"));

    let tasks = TaskMap::from([(
        "detection".to_string(),
        TaskEntry::new("detection.h5", ["image_processing", "detection"]),
    )]);
    cache
        .datasets()
        .update(
            "coco",
            DatasetUpdate {
                data_dir: Some(Utf8PathBuf::from("/mnt/coco")),
                tasks: Some(tasks),
                ..DatasetUpdate::default()
            },
        )
        .unwrap();

    let entry = cache.datasets().get("coco").unwrap().clone();
    assert_eq!(entry.data_dir.as_str(), "/mnt/coco");
    assert_eq!(entry.cache_dir.as_str(), "/cache/coco");
    assert!(!entry.keywords.contains("captioning"));
    assert!(!cache.categories().exists("captioning"));
    assert_invariants(cache.data());
}

#[test]
fn delete_removes_dataset_from_every_category() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("cifar10", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();
    cache
        .datasets()
        .add("coco", "/cache/coco", "/data/coco", coco_tasks())
        .unwrap();

    cache.datasets().delete("cifar10").unwrap();

    assert!(!cache.datasets().exists("cifar10"));
    assert!(!cache.categories().exists("classification"));
    let image = cache.categories().get("image_processing").unwrap();
    assert!(!image.contains_key("cifar10"));
    assert_eq!(image["coco"], ["caption", "detection"]);
    assert_invariants(cache.data());

    let err = cache.datasets().delete("cifar10").unwrap_err();
    assert_matches!(err, DatakeepError::DatasetNotFound(_));
}

#[test]
fn list_is_sorted() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("mnist", "/cache/mnist", "/data/mnist", cifar_tasks())
        .unwrap();
    cache
        .datasets()
        .add("coco", "/cache/coco", "/data/coco", coco_tasks())
        .unwrap();

    assert_eq!(cache.datasets().list(), ["coco", "mnist"]);
    assert_eq!(
        cache.categories().list(),
        ["captioning", "classification", "detection", "image_processing"]
    );
}

#[test]
fn missing_category_is_not_found() {
    let (_temp, settings) = temp_settings();
    let cache = CacheManager::open(&settings).unwrap();
    let err = cache.categories().get("segmentation").unwrap_err();
    assert_matches!(err, DatakeepError::CategoryNotFound(name) if name == "segmentation");
}

#[test]
fn task_helpers_merge_and_drop_tasks() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .register("coco", "/cache/coco", "/data/coco")
        .unwrap();
    assert!(cache.datasets().get("coco").unwrap().tasks.is_empty());

    cache
        .datasets()
        .add_task(
            "coco",
            "keypoints",
            TaskEntry::new("keypoints.h5", ["human_pose"]),
        )
        .unwrap();
    assert_eq!(
        cache.categories().get("human_pose").unwrap()["coco"],
        ["keypoints"]
    );

    let removed = cache.datasets().remove_task("coco", "keypoints").unwrap();
    assert_eq!(removed.filename.as_str(), "keypoints.h5");
    assert!(!cache.categories().exists("human_pose"));

    let err = cache
        .datasets()
        .remove_task("coco", "keypoints")
        .unwrap_err();
    assert_matches!(err, DatakeepError::TaskNotFound { .. });
}

#[test]
fn register_keeps_existing_tasks() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("cifar10", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();

    cache
        .datasets()
        .register("cifar10", "/cache/cifar10", "/mnt/cifar10")
        .unwrap();

    let entry = cache.datasets().get("cifar10").unwrap().clone();
    assert_eq!(entry.data_dir.as_str(), "/mnt/cifar10");
    assert_eq!(entry.tasks, cifar_tasks());
}

#[test]
fn fresh_accessor_reads_back_written_document() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("coco", "/cache/coco", "/data/coco", coco_tasks())
        .unwrap();
    cache.set_cache_dir("/srv/datakeep").unwrap();

    let reopened = CacheManager::open(&settings).unwrap();
    assert_eq!(reopened.data(), cache.data());
    assert_eq!(reopened.info().root_cache_dir.as_str(), "/srv/datakeep");
}

#[test]
fn write_rejects_empty_info() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    let mut document = cache.data().clone();
    document.info.root_cache_dir = Utf8PathBuf::new();

    let err = cache.write(document).unwrap_err();
    assert_matches!(err, DatakeepError::InvalidArgument(_));
}

#[test]
fn reset_requires_force() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add("cifar10", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();
    cache.set_download_dir("/srv/downloads").unwrap();
    let before = cache.data().clone();

    assert!(!cache.reset(false).unwrap());
    assert_eq!(cache.data(), &before);
    assert_eq!(cache.read().unwrap(), before);

    assert!(cache.reset(true).unwrap());
    assert_eq!(cache.data(), &CacheDocument::empty(settings.default_info()));
    assert_eq!(
        cache.read().unwrap(),
        CacheDocument::empty(settings.default_info())
    );
}

#[test]
fn directory_settings_reset_to_defaults() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();

    cache.set_cache_dir("/srv/cache").unwrap();
    cache.set_download_dir("/srv/downloads").unwrap();
    assert_eq!(cache.info().root_cache_dir.as_str(), "/srv/cache");
    assert_eq!(cache.info().root_downloads_dir.as_str(), "/srv/downloads");

    cache.reset_cache_dir().unwrap();
    cache.reset_download_dir().unwrap();
    assert_eq!(cache.info(), &settings.default_info());
}

#[test]
fn delete_without_force_keeps_file() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();

    let outcome = cache.delete(false, true).unwrap();
    assert!(!outcome.file_deleted);
    assert!(outcome.removed_dirs.is_empty());
    assert!(settings.registry_path().as_std_path().exists());
}

#[test]
fn delete_metadata_spares_downloads() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    let root = settings.default_cache_dir();
    let downloads = settings.default_downloads_dir();
    fs::create_dir_all(root.join("cifar10").as_std_path()).unwrap();
    fs::create_dir_all(downloads.join("cifar10").as_std_path()).unwrap();

    let outcome = cache.delete(true, false).unwrap();
    assert!(outcome.file_deleted);
    assert!(root.join("cifar10").as_std_path().exists());

    let outcome = cache.delete(true, true).unwrap();
    assert!(!settings.registry_path().as_std_path().exists());
    assert_eq!(outcome.removed_dirs, [root.join("cifar10")]);
    assert!(downloads.join("cifar10").as_std_path().exists());
}

#[test]
fn delete_metadata_keeps_nested_downloads() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    let root = settings.default_cache_dir();
    let downloads = root.join("raw").join("downloads");
    cache.set_download_dir(downloads.clone()).unwrap();
    fs::create_dir_all(downloads.join("cifar10").as_std_path()).unwrap();
    fs::create_dir_all(root.join("raw").join("scratch").as_std_path()).unwrap();
    fs::create_dir_all(root.join("cifar10").as_std_path()).unwrap();

    let outcome = cache.delete(true, true).unwrap();

    assert!(downloads.join("cifar10").as_std_path().exists());
    assert_eq!(
        outcome.removed_dirs,
        [root.join("cifar10"), root.join("raw").join("scratch")]
    );
    assert!(!root.join("cifar10").as_std_path().exists());
}

#[test]
fn add_stores_trimmed_name() {
    let (_temp, settings) = temp_settings();
    let mut cache = CacheManager::open(&settings).unwrap();
    cache
        .datasets()
        .add(" cifar10 ", "/cache/cifar10", "/data/cifar10", cifar_tasks())
        .unwrap();
    cache
        .datasets()
        .register(" coco\t", "/cache/coco", "/data/coco")
        .unwrap();

    assert_eq!(cache.datasets().list(), ["cifar10", "coco"]);
    assert_eq!(
        cache.categories().get("classification").unwrap()["cifar10"],
        ["classification"]
    );
}
