mod db;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::{JoinError, JoinSet};

use subseek_api::opensubtitles::types::{LanguageInfo, SubtitleCandidate, UserInfo};
use subseek_api::{
    MediaDetails, MetadataService, OmdbClient, OpenSubtitlesClient, OpenSubtitlesConfig,
    SubtitleService,
};
use subseek_core::config::AppConfig;
use subseek_core::download::{
    DirectorySink, DownloadJob, DownloadQueue, Downloader, SubtitleSink,
};
use subseek_core::identity::Resolver;
use subseek_core::intake;
use subseek_core::models::{DownloadRecord, UploadedFile};
use subseek_core::organize::{self, Collections};
use subseek_core::search::{self, SearchMode, SortKey};
use subseek_core::selection::{FileSelection, SelectionSet};
use subseek_core::SubseekError;
use subseek_core::store::FileStore;
use subseek_parse::MovieInfo;

pub use db::DbHandle;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// What an intake pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    pub added: Vec<String>,
    pub skipped: u32,
}

/// A series group with what the metadata provider knows about the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesOverview {
    pub key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<MediaDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub season_count: usize,
    pub episode_count: usize,
}

/// The runtime wired to the real services.
pub type AppRuntime = Runtime<OpenSubtitlesClient, OmdbClient, DirectorySink>;

/// Owns the session: the file store, selection, download queue and the
/// services, and runs resolutions in the background.
///
/// Cloning is cheap and yields a handle to the same session.
pub struct Runtime<S, M, K> {
    subtitles: Arc<S>,
    metadata: Arc<M>,
    sink: Arc<K>,
    db: DbHandle,
    config: Arc<RwLock<AppConfig>>,
    files: Arc<RwLock<FileStore>>,
    selection: Arc<RwLock<SelectionSet>>,
    downloads: Arc<Mutex<DownloadQueue>>,
    resolutions: Arc<Semaphore>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl<S, M, K> Clone for Runtime<S, M, K> {
    fn clone(&self) -> Self {
        Self {
            subtitles: Arc::clone(&self.subtitles),
            metadata: Arc::clone(&self.metadata),
            sink: Arc::clone(&self.sink),
            db: self.db.clone(),
            config: Arc::clone(&self.config),
            files: Arc::clone(&self.files),
            selection: Arc::clone(&self.selection),
            downloads: Arc::clone(&self.downloads),
            resolutions: Arc::clone(&self.resolutions),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl AppRuntime {
    /// Load the config, open the session database and build the clients.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let db = DbHandle::open(&db_path)
            .ok_or_else(|| RuntimeError::Database("failed to open database".into()))?;

        let subtitles = OpenSubtitlesClient::new(OpenSubtitlesConfig {
            base_url: config.opensubtitles_url().to_string(),
            api_key: config.opensubtitles.api_key.clone(),
            via_proxy: config.opensubtitles.use_proxy,
            ..Default::default()
        });
        let metadata = OmdbClient::new(config.omdb.api_key.clone());
        if !metadata.is_configured() {
            tracing::warn!("No OMDb API key configured; metadata lookups will fail");
        }
        let sink = DirectorySink::new(config.download_dir());

        Ok(Self::with_services(config, db, subtitles, metadata, sink))
    }

    // ── Account ──────────────────────────────────────────────────

    pub async fn login(&self, username: &str, password: &str) -> Result<(), RuntimeError> {
        self.subtitles
            .login(username, password)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        self.db
            .save_token(self.subtitles.token())
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))
    }

    /// Log out. The stored token is forgotten even if the remote call fails.
    pub async fn logout(&self) -> Result<(), RuntimeError> {
        let result = self.subtitles.logout().await;
        self.db
            .save_token(None)
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        result.map_err(|e| RuntimeError::Api(e.to_string()))
    }

    pub fn is_logged_in(&self) -> bool {
        self.subtitles.is_logged_in()
    }

    pub async fn user_info(&self) -> Option<UserInfo> {
        self.subtitles.user_info().await
    }

    /// Languages the subtitle provider can search in.
    pub async fn supported_languages(&self) -> Result<Vec<LanguageInfo>, RuntimeError> {
        self.subtitles
            .supported_languages()
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))
    }

    /// Put back the token saved by the last session, if any.
    pub async fn restore_token(&self) -> Result<bool, RuntimeError> {
        let token = self
            .db
            .load_token()
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let restored = token.is_some();
        self.subtitles.set_token(token);
        Ok(restored)
    }
}

impl<S, M, K> Runtime<S, M, K>
where
    S: SubtitleService + 'static,
    M: MetadataService + 'static,
    K: SubtitleSink + 'static,
{
    pub fn with_services(
        config: AppConfig,
        db: DbHandle,
        subtitles: S,
        metadata: M,
        sink: K,
    ) -> Self {
        let permits = config.runtime.max_concurrent_resolutions.max(1);
        Self {
            subtitles: Arc::new(subtitles),
            metadata: Arc::new(metadata),
            sink: Arc::new(sink),
            db,
            config: Arc::new(RwLock::new(config)),
            files: Arc::new(RwLock::new(FileStore::new())),
            selection: Arc::new(RwLock::new(SelectionSet::new())),
            downloads: Arc::new(Mutex::new(DownloadQueue::new())),
            resolutions: Arc::new(Semaphore::new(permits)),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn db_handle(&self) -> DbHandle {
        self.db.clone()
    }

    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, new_config: AppConfig) -> Result<(), RuntimeError> {
        new_config
            .save()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        *self.config.write().await = new_config;
        Ok(())
    }

    // ── Files ────────────────────────────────────────────────────

    /// Add files and folders, and start resolving every accepted video.
    pub async fn add_paths(&self, paths: Vec<PathBuf>) -> Result<AddOutcome, RuntimeError> {
        let intake = tokio::task::spawn_blocking(move || intake::collect(&paths))
            .await
            .map_err(|e| RuntimeError::Config(format!("intake task failed: {e}")))?;
        let skipped = intake.skipped;
        let added = self.add_files(intake.files).await?;
        tracing::info!(added = added.len(), skipped, "Files added");
        Ok(AddOutcome { added, skipped })
    }

    /// Insert already-built file records and resolve the unprocessed ones.
    pub async fn add_files(&self, files: Vec<UploadedFile>) -> Result<Vec<String>, RuntimeError> {
        let mut pending = Vec::new();
        let mut added = Vec::new();
        {
            let mut store = self.files.write().await;
            for file in files {
                let id = file.id.clone();
                let info = (!file.processed).then(|| file.movie_info.clone());
                if store.insert(file) {
                    added.push(id.clone());
                    if let Some(info) = info {
                        pending.push((id, info));
                    }
                }
            }
        }
        self.persist().await?;

        for (id, info) in pending {
            self.spawn_resolution(id, info);
        }
        Ok(added)
    }

    /// Resolve a file again, e.g. after a search failure.
    pub async fn retry_file(&self, id: &str) -> Result<(), RuntimeError> {
        let info = {
            let store = self.files.read().await;
            let file = store
                .get(id)
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
            file.movie_info.clone()
        };
        self.spawn_resolution(id.to_string(), info);
        Ok(())
    }

    fn spawn_resolution(&self, id: String, info: MovieInfo) {
        let this = self.clone();
        let mut tasks = self.lock_tasks();
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
        tasks.spawn(async move { this.resolve_file(id, info).await });
    }

    async fn resolve_file(&self, id: String, info: MovieInfo) {
        let Ok(_permit) = self.resolutions.acquire().await else {
            return;
        };
        if !self.files.read().await.contains(&id) {
            tracing::debug!(file = %id, "File removed before resolution started");
            return;
        }

        let language = self.config.read().await.general.default_language.clone();
        let patch = Resolver::new(&*self.subtitles, &*self.metadata, &language)
            .resolve(&info)
            .await;

        {
            let mut store = self.files.write().await;
            let replaces_results = patch.search_results.is_some();
            if !store.update(&id, patch) {
                tracing::debug!(file = %id, "File removed during resolution, dropping result");
                return;
            }
            // Indices into the old result list no longer mean anything.
            if replaces_results {
                self.selection.write().await.purge_file(&id);
            }
        }
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Failed to save session");
        }
    }

    /// Wait until no resolution is running, including ones started while
    /// waiting. The task lock is never held across an await.
    pub async fn wait_idle(&self) {
        loop {
            let mut draining = Draining(std::mem::take(&mut *self.lock_tasks()));
            if draining.0.is_empty() {
                return;
            }
            while let Some(result) = draining.0.join_next().await {
                log_join(result);
            }
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn files(&self) -> Vec<UploadedFile> {
        self.files.read().await.snapshot()
    }

    pub async fn file(&self, id: &str) -> Option<UploadedFile> {
        self.files.read().await.get(id).cloned()
    }

    /// Run `f` over the current grouping of files.
    pub async fn with_collections<R>(&self, f: impl FnOnce(&Collections<'_>) -> R) -> R {
        let store = self.files.read().await;
        f(&organize::organize(store.iter()))
    }

    pub async fn remove_file(&self, id: &str) -> Result<bool, RuntimeError> {
        let removed = self.remove_files(&[id.to_string()]).await?;
        Ok(removed > 0)
    }

    pub async fn clear_files(&self) -> Result<(), RuntimeError> {
        {
            let mut store = self.files.write().await;
            store.clear();
            self.selection.write().await.select_none();
        }
        self.persist().await
    }

    pub async fn remove_series_group(&self, key: &str) -> Result<usize, RuntimeError> {
        let ids = organize::series_group_ids(self.files.read().await.iter(), key);
        self.remove_files(&ids).await
    }

    pub async fn remove_movie_group(&self, key: &str) -> Result<usize, RuntimeError> {
        let ids = organize::movie_group_ids(self.files.read().await.iter(), key);
        self.remove_files(&ids).await
    }

    async fn remove_files(&self, ids: &[String]) -> Result<usize, RuntimeError> {
        let removed = {
            let mut store = self.files.write().await;
            let mut selection = self.selection.write().await;
            let mut removed = 0;
            for id in ids {
                selection.purge_file(id);
                if store.remove(id).is_some() {
                    removed += 1;
                }
            }
            removed
        };
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Reload the file list saved by the last session and resolve anything
    /// that had not finished.
    pub async fn restore_session(&self) -> Result<usize, RuntimeError> {
        let files = self
            .db
            .load_files()
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))?;
        let restored = self.add_files(files).await?;
        tracing::info!(count = restored.len(), "Session restored");
        Ok(restored.len())
    }

    async fn persist(&self) -> Result<(), RuntimeError> {
        // Queued under the store lock so saves land in mutation order.
        let saved = {
            let store = self.files.read().await;
            self.db.save_files(store.snapshot())
        };
        saved
            .await
            .map_err(|e| RuntimeError::Database(e.to_string()))
    }

    /// Series group `key` plus the provider's series record.
    pub async fn series_overview(&self, key: &str) -> Option<SeriesOverview> {
        let mut overview = {
            let store = self.files.read().await;
            let collections = organize::organize(store.iter());
            let group = collections.series.get(key)?;
            SeriesOverview {
                key: group.key.clone(),
                title: group.title.clone(),
                details: None,
                error: None,
                season_count: group.season_count(),
                episode_count: group.episode_count(),
            }
        };
        match self.metadata.series(&overview.title).await {
            Ok(details) => overview.details = Some(details),
            Err(e) => {
                tracing::warn!(series = %overview.title, error = %e, "Series lookup failed");
                overview.error = Some(e.to_string());
            }
        }
        Some(overview)
    }

    // ── Manual search ────────────────────────────────────────────

    /// Search subtitles for what the user typed, most downloaded first.
    /// `language` falls back to the configured default.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        language: Option<&str>,
    ) -> Result<Vec<SubtitleCandidate>, RuntimeError> {
        let language = match language {
            Some(l) => l.to_string(),
            None => self.config.read().await.general.default_language.clone(),
        };
        let params = search::build_params(query, mode, &language).map_err(|e| match e {
            SubseekError::InvalidQuery(msg) => RuntimeError::InvalidInput(msg),
            e => RuntimeError::Config(e.to_string()),
        })?;
        let Some(params) = params else {
            return Ok(Vec::new());
        };

        let mut results = self
            .subtitles
            .search_subtitles(&params)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        search::sort_results(&mut results, SortKey::DownloadCount);
        tracing::debug!(?mode, count = results.len(), "Manual search finished");
        Ok(results)
    }

    // ── Selection ────────────────────────────────────────────────

    pub async fn toggle_one(&self, file_id: &str, index: usize) -> bool {
        self.selection.write().await.toggle_one(file_id, index)
    }

    pub async fn select_all(&self) {
        let store = self.files.read().await;
        self.selection.write().await.select_all(store.iter());
    }

    pub async fn select_none(&self) {
        self.selection.write().await.select_none();
    }

    pub async fn select_first_per_file(&self) {
        let store = self.files.read().await;
        self.selection.write().await.select_first_per_file(store.iter());
    }

    pub async fn toggle_all_for_file(&self, file_id: &str) {
        let store = self.files.read().await;
        if let Some(file) = store.get(file_id) {
            self.selection.write().await.toggle_all_for_file(file);
        }
    }

    pub async fn selection_state(&self, file_id: &str) -> Option<FileSelection> {
        let store = self.files.read().await;
        let file = store.get(file_id)?;
        Some(self.selection.read().await.state_for_file(file))
    }

    /// Number of selected candidates that still exist.
    pub async fn selected_count(&self) -> usize {
        let store = self.files.read().await;
        self.selection.read().await.resolve(|id| store.get(id)).len()
    }

    // ── Downloads ────────────────────────────────────────────────

    /// Download every selected candidate, one at a time.
    pub async fn download_selected(&self) -> Vec<u64> {
        let jobs: Vec<DownloadJob> = {
            let store = self.files.read().await;
            let selection = self.selection.read().await;
            selection
                .resolve(|id| store.get(id))
                .into_iter()
                .map(|(file, candidate)| DownloadJob {
                    video_name: file.name.clone(),
                    candidate: candidate.clone(),
                })
                .collect()
        };
        if jobs.is_empty() {
            return Vec::new();
        }

        let (format, delay) = self.download_settings().await;
        Downloader::new(&*self.subtitles, &*self.sink, &format, delay)
            .download_all(&self.downloads, &jobs)
            .await
    }

    /// Download a single candidate of a file.
    pub async fn download_candidate(
        &self,
        file_id: &str,
        index: usize,
    ) -> Result<u64, RuntimeError> {
        let job = {
            let store = self.files.read().await;
            let file = store
                .get(file_id)
                .ok_or_else(|| RuntimeError::NotFound(file_id.to_string()))?;
            let candidate = file
                .search_results
                .get(index)
                .ok_or_else(|| RuntimeError::NotFound(format!("{file_id}_{index}")))?;
            DownloadJob {
                video_name: file.name.clone(),
                candidate: candidate.clone(),
            }
        };

        let (format, delay) = self.download_settings().await;
        Ok(Downloader::new(&*self.subtitles, &*self.sink, &format, delay)
            .download_one(&self.downloads, &job)
            .await)
    }

    async fn download_settings(&self) -> (String, Duration) {
        let config = self.config.read().await;
        (
            config.general.subtitle_format.clone(),
            Duration::from_millis(config.runtime.download_delay_ms),
        )
    }

    pub fn downloads(&self) -> Vec<DownloadRecord> {
        self.lock_downloads().iter().cloned().collect()
    }

    pub fn remove_download(&self, id: u64) -> bool {
        self.lock_downloads().remove(id).is_some()
    }

    pub fn clear_finished_downloads(&self) {
        self.lock_downloads().clear_finished();
    }

    fn lock_downloads(&self) -> MutexGuard<'_, DownloadQueue> {
        self.downloads.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A task set taken out for draining. Tasks left in it when the wait is
/// cancelled keep running instead of being aborted.
struct Draining(JoinSet<()>);

impl Drop for Draining {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Resolution task panicked");
    }
}

#[cfg(test)]
mod tests;
