use std::collections::BTreeMap;

use crate::cache::schema::CacheDocument;
use crate::error::DatakeepError;

/// Read-only view of the keyword index. The index only changes through
/// dataset mutations.
pub struct Categories<'a> {
    document: &'a CacheDocument,
}

impl<'a> Categories<'a> {
    pub(crate) fn new(document: &'a CacheDocument) -> Self {
        Self { document }
    }

    pub fn get(&self, category: &str) -> Result<&'a BTreeMap<String, Vec<String>>, DatakeepError> {
        self.document
            .category
            .get(category)
            .ok_or_else(|| DatakeepError::CategoryNotFound(category.to_string()))
    }

    pub fn exists(&self, category: &str) -> bool {
        self.document.category.contains_key(category)
    }

    pub fn list(&self) -> Vec<String> {
        self.document.category.keys().cloned().collect()
    }
}
