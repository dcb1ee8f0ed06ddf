use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use subseek_api::opensubtitles::types::SubtitleCandidate;

use crate::models::UploadedFile;

/// One candidate subtitle of one file, by position in the file's current
/// search results. Renders as `"{file_id}_{index}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SelectionKey {
    pub file_id: String,
    pub index: usize,
}

impl SelectionKey {
    pub fn new(file_id: impl Into<String>, index: usize) -> Self {
        Self {
            file_id: file_id.into(),
            index,
        }
    }

    /// Parse `"{file_id}_{index}"`. File ids contain underscores themselves,
    /// so the index is whatever follows the last one.
    pub fn parse(s: &str) -> Option<Self> {
        let (file_id, index) = s.rsplit_once('_')?;
        if file_id.is_empty() {
            return None;
        }
        Some(Self::new(file_id, index.parse().ok()?))
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.file_id, self.index)
    }
}

impl TryFrom<String> for SelectionKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid selection key: {s}"))
    }
}

impl From<SelectionKey> for String {
    fn from(key: SelectionKey) -> Self {
        key.to_string()
    }
}

/// Tri-state of a file's checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    None,
    Partial,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    pub selected: usize,
    pub total: usize,
    pub state: SelectionState,
}

/// Candidates queued for download.
///
/// Keys point at positions in a file's *current* results. A key whose file
/// is gone or whose index is past the end is stale: it is never counted
/// or resolved, and no operation fails because of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    keys: BTreeSet<SelectionKey>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, file_id: &str, index: usize) -> bool {
        self.keys.contains(&SelectionKey::new(file_id, index))
    }

    /// Keys in a stable order (by file id, then index).
    pub fn iter(&self) -> impl Iterator<Item = &SelectionKey> {
        self.keys.iter()
    }

    /// Flip one candidate. Returns whether it is now selected.
    pub fn toggle_one(&mut self, file_id: &str, index: usize) -> bool {
        let key = SelectionKey::new(file_id, index);
        if self.keys.remove(&key) {
            false
        } else {
            self.keys.insert(key);
            true
        }
    }

    /// Select every candidate of every file.
    pub fn select_all<'a>(&mut self, files: impl IntoIterator<Item = &'a UploadedFile>) {
        self.keys = files
            .into_iter()
            .flat_map(|f| (0..f.search_results.len()).map(move |i| SelectionKey::new(f.id.as_str(), i)))
            .collect();
    }

    pub fn select_none(&mut self) {
        self.keys.clear();
    }

    /// Select the top candidate of each file that has one, and nothing else.
    pub fn select_first_per_file<'a>(&mut self, files: impl IntoIterator<Item = &'a UploadedFile>) {
        self.keys = files
            .into_iter()
            .filter(|f| !f.search_results.is_empty())
            .map(|f| SelectionKey::new(f.id.as_str(), 0))
            .collect();
    }

    /// Select all of a file's candidates, or deselect them all when they
    /// already are.
    pub fn toggle_all_for_file(&mut self, file: &UploadedFile) {
        if self.state_for_file(file).state == SelectionState::All {
            self.purge_file(&file.id);
        } else {
            for i in 0..file.search_results.len() {
                self.keys.insert(SelectionKey::new(file.id.as_str(), i));
            }
        }
    }

    /// Selection summary for a file, ignoring stale keys.
    pub fn state_for_file(&self, file: &UploadedFile) -> FileSelection {
        let total = file.search_results.len();
        let selected = self
            .keys_for(&file.id)
            .filter(|k| k.index < total)
            .count();
        let state = match selected {
            0 => SelectionState::None,
            n if n == total => SelectionState::All,
            _ => SelectionState::Partial,
        };
        FileSelection {
            selected,
            total,
            state,
        }
    }

    /// Drop every key of a file.
    pub fn purge_file(&mut self, file_id: &str) {
        self.keys.retain(|k| k.file_id != file_id);
    }

    /// Map keys back to their file and candidate, skipping stale keys.
    pub fn resolve<'a>(
        &self,
        find: impl Fn(&str) -> Option<&'a UploadedFile>,
    ) -> Vec<(&'a UploadedFile, &'a SubtitleCandidate)> {
        self.keys
            .iter()
            .filter_map(|key| {
                let file = find(&key.file_id)?;
                let candidate = file.search_results.get(key.index)?;
                Some((file, candidate))
            })
            .collect()
    }

    fn keys_for<'s>(&'s self, file_id: &'s str) -> impl Iterator<Item = &'s SelectionKey> + 's {
        self.keys.iter().filter(move |k| k.file_id == file_id)
    }
}
