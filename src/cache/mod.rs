//! Local registry of installed datasets, backed by a single JSON file.

mod accessor;
mod category;
mod dataset;
mod schema;

pub use accessor::{CacheManager, DeleteOutcome};
pub use category::Categories;
pub use dataset::{DatasetEntries, DatasetUpdate};
pub use schema::{
    CacheDocument, CacheInfo, CategoryIndex, DatasetEntry, TaskEntry, TaskMap,
    build_category_index, derive_keywords,
};
