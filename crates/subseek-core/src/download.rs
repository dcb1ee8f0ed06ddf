//! Subtitle downloads: the record queue, file naming, and the sequential
//! fetch-and-save pipeline.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use subseek_api::opensubtitles::types::{DownloadOptions, SubtitleCandidate};
use subseek_api::SubtitleService;
use tokio::io::AsyncWriteExt;

use crate::models::DownloadRecord;

// ── Queue ────────────────────────────────────────────────────────

/// Download records in creation order.
#[derive(Debug, Clone, Default)]
pub struct DownloadQueue {
    next_id: u64,
    records: Vec<DownloadRecord>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending record and return its id.
    pub fn add(&mut self, file_name: &str, subtitle_name: &str) -> u64 {
        self.next_id += 1;
        self.records
            .push(DownloadRecord::new(self.next_id, file_name, subtitle_name));
        self.next_id
    }

    pub fn get(&self, id: u64) -> Option<&DownloadRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Run a state transition on a record. False for unknown ids or
    /// rejected transitions.
    pub fn update(&mut self, id: u64, f: impl FnOnce(&mut DownloadRecord) -> bool) -> bool {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .is_some_and(f)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Delete a record, whatever its state.
    pub fn remove(&mut self, id: u64) -> Option<DownloadRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Drop completed and failed records.
    pub fn clear_finished(&mut self) {
        self.records.retain(|r| !r.status.is_terminal());
    }
}

// ── File naming ──────────────────────────────────────────────────

/// Name for a saved subtitle.
///
/// `"{title} ({year}) S01E02.{language}.{format}"` from the feature details
/// when they name a title; the release name, or `subtitle_{id}`, otherwise.
/// Characters that are illegal in filenames become `_`.
pub fn subtitle_file_name(candidate: &SubtitleCandidate, format: &str) -> String {
    let attrs = &candidate.attributes;
    let language = if attrs.language.is_empty() {
        "und"
    } else {
        attrs.language.as_str()
    };

    let base = attrs
        .feature_details
        .as_ref()
        .and_then(|feature| {
            let is_episode = feature
                .feature_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("episode"));
            let title = if is_episode {
                feature.parent_title.as_deref().or(feature.title.as_deref())
            } else {
                feature.title.as_deref().or(feature.movie_name.as_deref())
            };
            let title = title.map(str::trim).filter(|t| !t.is_empty())?;

            let mut base = title.to_string();
            if let Some(year) = feature.year {
                base.push_str(&format!(" ({year})"));
            }
            if is_episode {
                let season = feature.season_number.or(attrs.season_number);
                let episode = feature.episode_number.or(attrs.episode_number);
                if let (Some(s), Some(e)) = (season, episode) {
                    base.push_str(&format!(" S{s:02}E{e:02}"));
                }
            }
            Some(base)
        })
        .or_else(|| {
            attrs
                .release
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("subtitle_{}", candidate.id));

    sanitize_file_name(&format!("{base}.{language}.{format}"))
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

// ── Sink ─────────────────────────────────────────────────────────

/// Where downloaded subtitle text ends up.
pub trait SubtitleSink: Send + Sync {
    /// Store `content` under `file_name` and return the final location.
    /// Existing files are never overwritten.
    fn save(
        &self,
        file_name: &str,
        content: &str,
    ) -> impl Future<Output = std::io::Result<PathBuf>> + Send;
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes subtitles into a directory, creating it on first use. A name
/// already taken gets a ` (n)` suffix before the extension.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SubtitleSink for DirectorySink {
    async fn save(&self, file_name: &str, content: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for n in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(numbered_name(file_name, n));
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {file_name}"),
        ))
    }
}

/// `file_name` itself for `n == 0`, `stem (n).ext` after that.
fn numbered_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{file_name} ({n})"),
    }
}

// ── Downloader ───────────────────────────────────────────────────

/// A subtitle to fetch, and the video it belongs to.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub video_name: String,
    pub candidate: SubtitleCandidate,
}

pub struct Downloader<'a, S, K> {
    subtitles: &'a S,
    sink: &'a K,
    format: &'a str,
    delay: Duration,
}

impl<'a, S: SubtitleService, K: SubtitleSink> Downloader<'a, S, K> {
    pub fn new(subtitles: &'a S, sink: &'a K, format: &'a str, delay: Duration) -> Self {
        Self {
            subtitles,
            sink,
            format,
            delay,
        }
    }

    /// Fetch one subtitle and save it. The outcome, success or error, is
    /// recorded on the returned record id; this never fails.
    #[tracing::instrument(skip_all, fields(subtitle = %job.candidate.id, video = %job.video_name))]
    pub async fn download_one(&self, queue: &Mutex<DownloadQueue>, job: &DownloadJob) -> u64 {
        let name = subtitle_file_name(&job.candidate, self.format);
        let id = {
            let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
            let id = queue.add(&job.video_name, &name);
            queue.update(id, DownloadRecord::start);
            id
        };

        match self.fetch_and_save(queue, id, &job.candidate, &name).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Subtitle saved");
                update(queue, id, |r| r.complete(name, path));
            }
            Err(message) => {
                tracing::warn!(error = %message, "Subtitle download failed");
                update(queue, id, |r| r.fail(message));
            }
        }
        id
    }

    async fn fetch_and_save(
        &self,
        queue: &Mutex<DownloadQueue>,
        id: u64,
        candidate: &SubtitleCandidate,
        name: &str,
    ) -> Result<PathBuf, String> {
        let file = candidate
            .primary_file()
            .ok_or_else(|| "Subtitle has no downloadable file".to_string())?;
        let options = DownloadOptions {
            sub_format: Some(self.format.to_string()),
            file_name: None,
        };

        let link = self
            .subtitles
            .request_download(file.file_id, &options)
            .await
            .map_err(|e| e.to_string())?;
        if let Some(remaining) = link.remaining {
            tracing::debug!(remaining, "Download link obtained");
        }
        update(queue, id, |r| r.advance(50));

        let content = self
            .subtitles
            .fetch_content(&link.link)
            .await
            .map_err(|e| e.to_string())?;
        update(queue, id, |r| r.advance(80));

        self.sink
            .save(name, &content)
            .await
            .map_err(|e| e.to_string())
    }

    /// Download jobs one after another with the configured pause between
    /// them. A failed job does not stop the rest.
    #[tracing::instrument(skip_all, fields(count = jobs.len()))]
    pub async fn download_all(&self, queue: &Mutex<DownloadQueue>, jobs: &[DownloadJob]) -> Vec<u64> {
        let mut ids = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            ids.push(self.download_one(queue, job).await);
        }
        ids
    }
}

fn update(queue: &Mutex<DownloadQueue>, id: u64, f: impl FnOnce(&mut DownloadRecord) -> bool) {
    queue.lock().unwrap_or_else(|e| e.into_inner()).update(id, f);
}
