//! Virtual attribute cache.
//!
//! Virtual attribute values are fetched from external systems and cached per
//! `(kind, subject, schema)`. Before propagating, the cached entries of the
//! mapped virtual schemas are expired and recomputed from a
//! [`VirAttrSource`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::PropagationResult;
use crate::ids::SubjectKey;
use crate::subject::SubjectKind;

/// Cache key of one virtual attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirCacheKey {
    pub kind: SubjectKind,
    pub subject: SubjectKey,
    pub schema: String,
}

impl VirCacheKey {
    pub fn new(kind: SubjectKind, subject: SubjectKey, schema: impl Into<String>) -> Self {
        Self {
            kind,
            subject,
            schema: schema.into(),
        }
    }
}

/// Cache of virtual attribute values.
pub trait VirAttrCache: Send + Sync {
    fn get(&self, key: &VirCacheKey) -> Option<Vec<String>>;

    fn put(&self, key: VirCacheKey, values: Vec<String>);

    /// Drop the cached value, if any.
    fn expire(&self, key: &VirCacheKey);
}

/// Where virtual attribute values are recomputed from.
#[async_trait]
pub trait VirAttrSource: Send + Sync {
    /// Fetch current values. `Ok(None)` means the source cannot tell.
    async fn fetch(&self, key: &VirCacheKey) -> PropagationResult<Option<Vec<String>>>;
}

/// Process-local [`VirAttrCache`].
#[derive(Debug, Default)]
pub struct InMemoryVirAttrCache {
    entries: Mutex<HashMap<VirCacheKey, Vec<String>>>,
}

impl InMemoryVirAttrCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VirAttrCache for InMemoryVirAttrCache {
    fn get(&self, key: &VirCacheKey) -> Option<Vec<String>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: VirCacheKey, values: Vec<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, values);
    }

    fn expire(&self, key: &VirCacheKey) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
