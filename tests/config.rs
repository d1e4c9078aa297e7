use std::fs;

use assert_matches::assert_matches;

use datakeep::catalog::DatasetCatalog;
use datakeep::config::CatalogLoader;
use datakeep::domain::ArchiveKind;
use datakeep::error::DatakeepError;

const CATALOG: &str = r#"{
  "schema_version": 1,
  "datasets": [
    {
      "name": "flowers",
      "urls": [
        "https://example.org/flowers/images.tgz",
        {
          "url": "https://example.org/flowers/labels",
          "sha256": "ABCDEF",
          "archive": "gzip"
        }
      ],
      "tasks": {
        "segmentation": ["image_processing", "segmentation"],
        "classification": ["image_processing", "classification"]
      },
      "default_task": "segmentation"
    }
  ]
}"#;

#[test]
fn load_catalog_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, CATALOG).unwrap();

    let descriptors = CatalogLoader::resolve(&path).unwrap();
    assert_eq!(descriptors.len(), 1);
    let flowers = &descriptors[0];
    assert_eq!(flowers.name, "flowers");
    assert_eq!(flowers.default_task, "segmentation");
    assert_eq!(flowers.urls[0].kind, ArchiveKind::TarGz);
    assert_eq!(flowers.urls[1].kind, ArchiveKind::Gzip);
    assert_eq!(flowers.urls[1].sha256.as_deref(), Some("abcdef"));
    let keywords: Vec<&str> = flowers.keywords.iter().map(String::as_str).collect();
    assert_eq!(keywords, ["classification", "image_processing", "segmentation"]);

    let mut catalog = DatasetCatalog::builtin();
    catalog.register(flowers.clone()).unwrap();
    assert!(catalog.contains("flowers"));
    assert_eq!(
        catalog.get("flowers").unwrap().resolve_task(None).unwrap(),
        "segmentation"
    );
}

#[test]
fn missing_catalog_file() {
    let temp = tempfile::tempdir().unwrap();
    let err = CatalogLoader::resolve(&temp.path().join("missing.json")).unwrap_err();
    assert_matches!(err, DatakeepError::ConfigRead(_));
}

#[test]
fn reject_unsupported_schema_version() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, r#"{"schema_version": 2, "datasets": []}"#).unwrap();

    let err = CatalogLoader::resolve(&path).unwrap_err();
    assert_matches!(err, DatakeepError::ConfigParse(message) if message.contains("schema_version"));
}

#[test]
fn reject_dataset_without_tasks() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, r#"{"datasets": [{"name": "empty", "tasks": {}}]}"#).unwrap();

    let err = CatalogLoader::resolve(&path).unwrap_err();
    assert_matches!(err, DatakeepError::ConfigParse(_));
}

#[test]
fn builtin_names_cannot_be_shadowed() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(
        &path,
        r#"{"datasets": [{"name": "mnist", "tasks": {"classification": []}}]}"#,
    )
    .unwrap();

    let descriptors = CatalogLoader::resolve(&path).unwrap();
    let mut catalog = DatasetCatalog::builtin();
    let err = catalog.register(descriptors[0].clone()).unwrap_err();
    assert_matches!(err, DatakeepError::InvalidArgument(_));
}

#[test]
fn default_task_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(
        &path,
        r#"{"datasets": [{"name": "toy", "tasks": {"raw": []}, "default_task": "detection"}]}"#,
    )
    .unwrap();

    let descriptors = CatalogLoader::resolve(&path).unwrap();
    let err = DatasetCatalog::new()
        .register(descriptors[0].clone())
        .unwrap_err();
    assert_matches!(err, DatakeepError::InvalidArgument(_));
}
