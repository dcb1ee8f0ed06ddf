mod download;
mod file;

pub use download::{DownloadRecord, DownloadStatus};
pub use file::{EntityKind, FilePatch, Identity, ResolvedMetadata, UploadedFile};
