//! File and folder intake.
//!
//! Turns user-supplied paths into [`UploadedFile`] records: folders are
//! walked recursively, non-video files are skipped, and every accepted file
//! gets a fresh id and a parsed filename.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::{rng, Rng};
use walkdir::WalkDir;

use crate::models::UploadedFile;

/// Result of an intake pass.
#[derive(Debug, Clone, Default)]
pub struct IntakeResult {
    pub files: Vec<UploadedFile>,
    pub skipped: u32,
}

/// Collect video files from a mix of file and directory paths.
pub fn collect(paths: &[PathBuf]) -> IntakeResult {
    let mut result = IntakeResult::default();

    for path in paths {
        if path.is_dir() {
            tracing::info!(path = %path.display(), "Scanning dropped folder");
            // Relative paths include the dropped folder's own name.
            let root = path.parent().unwrap_or(path);
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                match accept(entry.path(), Some(root)) {
                    Some(file) => result.files.push(file),
                    None => result.skipped += 1,
                }
            }
        } else if path.is_file() {
            match accept(path, None) {
                Some(file) => result.files.push(file),
                None => result.skipped += 1,
            }
        } else {
            tracing::warn!(path = %path.display(), "Path does not exist, skipping");
            result.skipped += 1;
        }
    }

    tracing::debug!(accepted = result.files.len(), skipped = result.skipped, "Intake complete");
    result
}

fn accept(path: &Path, root: Option<&Path>) -> Option<UploadedFile> {
    let name = path.file_name()?.to_str()?;
    if !subseek_parse::is_video_file(name) {
        return None;
    }

    let size = match path.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read file metadata");
            return None;
        }
    };

    let mut file = UploadedFile::new(generate_file_id(name, size), name, size);
    file.path = Some(path.to_path_buf());
    file.relative_path = root.and_then(|root| relative_path(path, root));
    Some(file)
}

/// `a/b/c.mkv` style path below `root`, with forward slashes on every platform.
fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// `"{name}_{size}_{millis}_{random9}"`. Unique per intake even for the
/// same file added twice.
pub fn generate_file_id(name: &str, size: u64) -> String {
    let suffix: String = rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{name}_{size}_{}_{suffix}", Utc::now().timestamp_millis())
}
