use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a subtitle download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Error,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// One fetch-and-save attempt for a subtitle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: u64,
    /// Name of the video the subtitle is for.
    pub file_name: String,
    pub subtitle_name: String,
    pub status: DownloadStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Where the subtitle ended up, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<PathBuf>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    pub fn new(id: u64, file_name: impl Into<String>, subtitle_name: impl Into<String>) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            subtitle_name: subtitle_name.into(),
            status: DownloadStatus::Pending,
            progress: 0,
            error: None,
            saved_as: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// `pending -> downloading`. Returns false if the record was not pending.
    pub fn start(&mut self) -> bool {
        if self.status != DownloadStatus::Pending {
            return false;
        }
        self.status = DownloadStatus::Downloading;
        self.progress = 10;
        true
    }

    /// Move the progress bar forward while downloading.
    pub fn advance(&mut self, progress: u8) -> bool {
        if self.status != DownloadStatus::Downloading || progress <= self.progress {
            return false;
        }
        self.progress = progress.min(99);
        true
    }

    /// `downloading -> completed`.
    pub fn complete(&mut self, subtitle_name: String, saved_as: PathBuf) -> bool {
        if self.status != DownloadStatus::Downloading {
            return false;
        }
        self.status = DownloadStatus::Completed;
        self.progress = 100;
        self.subtitle_name = subtitle_name;
        self.saved_as = Some(saved_as);
        self.end_time = Some(Utc::now());
        true
    }

    /// `downloading -> error`. A pending record may fail too, before any
    /// network call was made.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = DownloadStatus::Error;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
        true
    }

    /// Time spent so far, or in total once finished.
    pub fn elapsed(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}
