//! Content keys already queued for upload

use std::collections::HashSet;

/// Keys of content handed to the outbound channel during this process
/// lifetime. Never persisted.
#[derive(Debug, Default, Clone)]
pub struct UploadedSet {
    keys: HashSet<String>,
}

impl UploadedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already present
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}
