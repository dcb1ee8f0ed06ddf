use std::collections::HashMap;

use crate::models::{FilePatch, UploadedFile};

/// The uploaded files, indexed by id and kept in insertion order.
///
/// All mutation goes through commands keyed by id; an unknown id is a
/// no-op, which is what makes late updates for removed files harmless.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    order: Vec<String>,
    files: HashMap<String, UploadedFile>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&UploadedFile> {
        self.files.get(id)
    }

    /// Files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &UploadedFile> {
        self.order.iter().filter_map(|id| self.files.get(id))
    }

    /// Add a file. Returns false (and leaves the store unchanged) when the
    /// id is already present.
    pub fn insert(&mut self, file: UploadedFile) -> bool {
        if self.files.contains_key(&file.id) {
            return false;
        }
        self.order.push(file.id.clone());
        self.files.insert(file.id.clone(), file);
        true
    }

    /// Apply a patch to a file. Returns false for unknown ids.
    pub fn update(&mut self, id: &str, patch: FilePatch) -> bool {
        match self.files.get_mut(id) {
            Some(file) => {
                patch.apply(file);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<UploadedFile> {
        let removed = self.files.remove(id)?;
        self.order.retain(|o| o != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.files.clear();
    }

    /// Owned copy of all files, in order, for persistence.
    pub fn snapshot(&self) -> Vec<UploadedFile> {
        self.iter().cloned().collect()
    }
}

impl FromIterator<UploadedFile> for FileStore {
    fn from_iter<I: IntoIterator<Item = UploadedFile>>(iter: I) -> Self {
        let mut store = Self::new();
        for file in iter {
            store.insert(file);
        }
        store
    }
}
