use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use subseek_api::opensubtitles::types::{
    DownloadLink, DownloadOptions, FeatureDetails, SearchParams, SubtitleAttributes,
    SubtitleCandidate, SubtitleFile,
};
use subseek_api::{MediaDetails, MediaKind, MetadataService, SubtitleService};
use subseek_core::config::AppConfig;
use subseek_core::download::SubtitleSink;
use subseek_core::models::{DownloadStatus, EntityKind, UploadedFile};

use super::*;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeError(String);

/// Shared counters the test keeps after handing the fakes to the runtime.
#[derive(Default)]
struct Counters {
    searches: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    /// Serve `FakeSubtitles::refreshed` instead of `results` once set.
    refreshed: AtomicBool,
    last_search: Mutex<Option<SearchParams>>,
}

struct FakeSubtitles {
    results: HashMap<String, Vec<SubtitleCandidate>>,
    refreshed: HashMap<String, Vec<SubtitleCandidate>>,
    /// Searches wait for a permit when set.
    gate: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
}

impl FakeSubtitles {
    fn new(counters: &Arc<Counters>) -> Self {
        Self {
            results: HashMap::new(),
            refreshed: HashMap::new(),
            gate: None,
            counters: Arc::clone(counters),
        }
    }
}

impl SubtitleService for FakeSubtitles {
    type Error = FakeError;

    async fn search_subtitles(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<SubtitleCandidate>, FakeError> {
        self.counters.searches.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_search.lock().unwrap() = Some(params.clone());
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| FakeError(e.to_string()))?
                .forget();
        }

        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        let query = params.query.clone().unwrap_or_default();
        let source = if self.counters.refreshed.load(Ordering::SeqCst) {
            &self.refreshed
        } else {
            &self.results
        };
        Ok(source.get(&query).cloned().unwrap_or_default())
    }

    async fn request_download(
        &self,
        file_id: u64,
        _options: &DownloadOptions,
    ) -> Result<DownloadLink, FakeError> {
        Ok(DownloadLink {
            link: format!("https://dl.example/{file_id}"),
            file_name: None,
            requests: None,
            remaining: None,
            message: None,
            reset_time: None,
        })
    }

    async fn fetch_content(&self, link: &str) -> Result<String, FakeError> {
        Ok(format!("content of {link}"))
    }
}

struct FakeMetadata;

impl MetadataService for FakeMetadata {
    type Error = FakeError;

    async fn by_title(&self, title: &str, _year: Option<u32>) -> Result<MediaDetails, FakeError> {
        Ok(MediaDetails::titled(title, MediaKind::Movie))
    }

    async fn by_imdb_id(&self, imdb_id: &str) -> Result<MediaDetails, FakeError> {
        Err(FakeError(format!("{imdb_id} not found")))
    }

    async fn series(&self, title: &str) -> Result<MediaDetails, FakeError> {
        if title == "Unknown Show" {
            return Err(FakeError("Series not found!".into()));
        }
        Ok(MediaDetails::titled(
            title,
            MediaKind::Series {
                total_seasons: Some(5),
            },
        ))
    }

    async fn episode(
        &self,
        _series_imdb_id: &str,
        _season: u32,
        _episode: u32,
    ) -> Result<MediaDetails, FakeError> {
        Err(FakeError("no episode endpoint".into()))
    }
}

#[derive(Default)]
struct MemorySink {
    saved: Mutex<Vec<String>>,
}

impl SubtitleSink for MemorySink {
    async fn save(&self, file_name: &str, _content: &str) -> std::io::Result<PathBuf> {
        self.saved.lock().unwrap().push(file_name.to_string());
        Ok(PathBuf::from(file_name))
    }
}

type TestRuntime = Runtime<FakeSubtitles, FakeMetadata, MemorySink>;

fn candidate(id: &str, feature: Option<FeatureDetails>) -> SubtitleCandidate {
    SubtitleCandidate {
        id: id.into(),
        kind: "subtitle".into(),
        attributes: SubtitleAttributes {
            language: "en".into(),
            files: vec![SubtitleFile {
                file_id: id.parse().unwrap_or(1),
                file_name: format!("{id}.srt"),
                cd_number: None,
            }],
            feature_details: feature,
            ..Default::default()
        },
    }
}

fn episode_of(series: &str, season: u32, episode: u32) -> Option<FeatureDetails> {
    Some(FeatureDetails {
        feature_type: Some("Episode".into()),
        parent_title: Some(series.into()),
        season_number: Some(season),
        episode_number: Some(episode),
        ..Default::default()
    })
}

fn runtime(subtitles: FakeSubtitles, permits: usize) -> TestRuntime {
    let mut config = AppConfig::default();
    config.runtime.max_concurrent_resolutions = permits;
    config.runtime.download_delay_ms = 0;
    let db = DbHandle::open_memory().unwrap();
    Runtime::with_services(config, db, subtitles, FakeMetadata, MemorySink::default())
}

fn file(id: &str, name: &str) -> UploadedFile {
    UploadedFile::new(id, name, 100)
}

/// Yield until `cond` holds, giving spawned tasks a chance to run.
async fn settle(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never reached");
}

#[tokio::test]
async fn added_files_are_resolved_and_saved() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles
        .results
        .insert("Heat".into(), vec![candidate("1", None), candidate("2", None)]);
    let rt = runtime(subtitles, 4);

    let added = rt
        .add_files(vec![file("heat", "Heat.1995.mkv"), file("none", "Nothing.mkv")])
        .await
        .unwrap();
    assert_eq!(added, vec!["heat", "none"]);
    rt.wait_idle().await;

    let heat = rt.file("heat").await.unwrap();
    assert!(heat.processed);
    assert_eq!(heat.search_results.len(), 2);
    let meta = heat.metadata.unwrap();
    assert_eq!(meta.title(), "Heat");
    assert_eq!(*meta.kind(), EntityKind::Movie);

    let none = rt.file("none").await.unwrap();
    assert!(none.processed);
    assert!(none.metadata.is_none());

    let saved = rt.db_handle().load_files().await.unwrap();
    assert!(saved.iter().all(|f| f.processed));
}

#[tokio::test]
async fn duplicate_ids_are_not_added_twice() {
    let counters = Arc::new(Counters::default());
    let rt = runtime(FakeSubtitles::new(&counters), 4);

    rt.add_files(vec![file("a", "A.mkv")]).await.unwrap();
    let added = rt.add_files(vec![file("a", "A.mkv")]).await.unwrap();
    rt.wait_idle().await;

    assert!(added.is_empty());
    assert_eq!(rt.files().await.len(), 1);
    assert_eq!(counters.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn add_paths_walks_folders() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Heat.1995.mkv"), b"x").unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

    let counters = Arc::new(Counters::default());
    let rt = runtime(FakeSubtitles::new(&counters), 4);
    let outcome = rt.add_paths(vec![dir.path().to_path_buf()]).await.unwrap();
    rt.wait_idle().await;

    assert_eq!(outcome.added.len(), 1);
    assert_eq!(outcome.skipped, 1);
    let files = rt.files().await;
    assert!(files[0].relative_path.as_deref().unwrap().ends_with("/Heat.1995.mkv"));
    assert!(files[0].processed);
}

#[tokio::test]
async fn result_for_removed_file_is_dropped() {
    let counters = Arc::new(Counters::default());
    let gate = Arc::new(Semaphore::new(0));
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.gate = Some(Arc::clone(&gate));
    subtitles.results.insert("Heat".into(), vec![candidate("1", None)]);
    let rt = runtime(subtitles, 4);

    rt.add_files(vec![file("heat", "Heat.1995.mkv")]).await.unwrap();
    settle(|| counters.active.load(Ordering::SeqCst) == 1).await;

    rt.toggle_one("heat", 0).await;
    assert!(rt.remove_file("heat").await.unwrap());
    gate.add_permits(1);
    rt.wait_idle().await;

    assert!(rt.files().await.is_empty());
    assert_eq!(rt.selected_count().await, 0);
    assert!(rt.db_handle().load_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn resolutions_are_bounded() {
    let counters = Arc::new(Counters::default());
    let gate = Arc::new(Semaphore::new(0));
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.gate = Some(Arc::clone(&gate));
    let rt = runtime(subtitles, 2);

    let files = (0..5)
        .map(|i| file(&format!("f{i}"), &format!("Movie {i}.mkv")))
        .collect();
    rt.add_files(files).await.unwrap();

    settle(|| counters.active.load(Ordering::SeqCst) == 2).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(counters.active.load(Ordering::SeqCst), 2);

    gate.add_permits(5);
    rt.wait_idle().await;
    assert_eq!(counters.peak.load(Ordering::SeqCst), 2);
    assert_eq!(counters.searches.load(Ordering::SeqCst), 5);
    assert!(rt.files().await.iter().all(|f| f.processed));
}

#[tokio::test]
async fn restore_session_resolves_only_unfinished_files() {
    let counters = Arc::new(Counters::default());
    let rt = runtime(FakeSubtitles::new(&counters), 4);

    let mut done = file("done", "Heat.1995.mkv");
    done.processed = true;
    let pending = file("pending", "Ronin.1998.mkv");
    rt.db_handle().save_files(vec![done, pending]).await.unwrap();

    assert_eq!(rt.restore_session().await.unwrap(), 2);
    rt.wait_idle().await;

    assert_eq!(counters.searches.load(Ordering::SeqCst), 1);
    let ids: Vec<String> = rt.files().await.into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["done", "pending"]);
    assert!(rt.file("pending").await.unwrap().processed);
}

#[tokio::test]
async fn removing_a_series_group_removes_its_files() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.results.insert(
        "Breaking Bad".into(),
        vec![candidate("1", episode_of("Breaking Bad", 1, 1))],
    );
    subtitles
        .results
        .insert("Lost".into(), vec![candidate("2", episode_of("Lost", 1, 1))]);
    let rt = runtime(subtitles, 4);

    rt.add_files(vec![
        file("bb1", "Breaking.Bad.S01E01.mkv"),
        file("bb2", "Breaking.Bad.S01E02.mkv"),
        file("lost", "Lost.S01E01.mkv"),
    ])
    .await
    .unwrap();
    rt.wait_idle().await;

    let (series, ungrouped) = rt
        .with_collections(|c| {
            (
                c.series.keys().cloned().collect::<Vec<_>>(),
                c.ungrouped.iter().map(|f| f.id.clone()).collect::<Vec<_>>(),
            )
        })
        .await;
    assert_eq!(series, vec!["breaking bad"]);
    assert_eq!(ungrouped, vec!["lost"]);

    rt.select_all().await;
    assert_eq!(rt.remove_series_group("breaking bad").await.unwrap(), 2);
    let ids: Vec<String> = rt.files().await.into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["lost"]);
    assert_eq!(rt.selected_count().await, 1);
    assert_eq!(rt.remove_series_group("breaking bad").await.unwrap(), 0);
}

#[tokio::test]
async fn selection_follows_the_files() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.results.insert(
        "Heat".into(),
        (1..=4).map(|i| candidate(&i.to_string(), None)).collect(),
    );
    let rt = runtime(subtitles, 4);
    rt.add_files(vec![file("heat", "Heat.1995.mkv")]).await.unwrap();
    rt.wait_idle().await;

    rt.toggle_one("heat", 0).await;
    rt.toggle_one("heat", 3).await;
    let state = rt.selection_state("heat").await.unwrap();
    assert_eq!((state.selected, state.total), (2, 4));

    rt.toggle_all_for_file("heat").await;
    assert_eq!(rt.selected_count().await, 4);
    rt.select_first_per_file().await;
    assert_eq!(rt.selected_count().await, 1);
    rt.select_none().await;
    assert_eq!(rt.selected_count().await, 0);
    assert!(rt.selection_state("missing").await.is_none());
}

#[tokio::test]
async fn downloads_selected_candidates() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles
        .results
        .insert("Heat".into(), vec![candidate("7", None), candidate("8", None)]);
    let rt = runtime(subtitles, 4);
    rt.add_files(vec![file("heat", "Heat.1995.mkv")]).await.unwrap();
    rt.wait_idle().await;

    assert!(rt.download_selected().await.is_empty());

    rt.select_all().await;
    let ids = rt.download_selected().await;
    assert_eq!(ids.len(), 2);

    let records = rt.downloads();
    assert!(records.iter().all(|r| r.status == DownloadStatus::Completed));
    assert_eq!(records[0].file_name, "Heat.1995.mkv");
    assert_eq!(records[0].subtitle_name, "subtitle_7.en.srt");

    let single = rt.download_candidate("heat", 1).await.unwrap();
    assert_eq!(rt.downloads().len(), 3);
    assert!(matches!(
        rt.download_candidate("heat", 9).await,
        Err(RuntimeError::NotFound(_))
    ));

    rt.clear_finished_downloads();
    assert!(rt.downloads().is_empty());
    assert!(!rt.remove_download(single));
}

#[tokio::test]
async fn retry_with_no_results_clears_the_old_outcome() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles
        .results
        .insert("Heat".into(), vec![candidate("1", None), candidate("2", None)]);
    let rt = runtime(subtitles, 4);
    rt.add_files(vec![file("heat", "Heat.1995.mkv")]).await.unwrap();
    rt.wait_idle().await;

    rt.toggle_one("heat", 0).await;
    assert!(rt.file("heat").await.unwrap().metadata.is_some());

    counters.refreshed.store(true, Ordering::SeqCst);
    rt.retry_file("heat").await.unwrap();
    rt.wait_idle().await;

    let heat = rt.file("heat").await.unwrap();
    assert!(heat.processed);
    assert!(heat.search_results.is_empty());
    assert!(heat.metadata.is_none());
    assert_eq!(rt.selected_count().await, 0);
    assert!(rt.with_collections(|c| c.ungrouped.len() == 1).await);

    let saved = rt.db_handle().load_files().await.unwrap();
    assert!(saved[0].metadata.is_none());
}

#[tokio::test]
async fn retry_with_new_results_drops_old_selection() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles
        .results
        .insert("Heat".into(), vec![candidate("1", None), candidate("2", None)]);
    subtitles
        .refreshed
        .insert("Heat".into(), vec![candidate("7", None), candidate("8", None)]);
    let rt = runtime(subtitles, 4);
    rt.add_files(vec![file("heat", "Heat.1995.mkv")]).await.unwrap();
    rt.wait_idle().await;

    rt.toggle_one("heat", 1).await;
    assert_eq!(rt.selected_count().await, 1);

    counters.refreshed.store(true, Ordering::SeqCst);
    rt.retry_file("heat").await.unwrap();
    rt.wait_idle().await;

    let heat = rt.file("heat").await.unwrap();
    assert_eq!(heat.search_results[1].id, "8");
    assert_eq!(rt.selected_count().await, 0);
    assert!(rt.download_selected().await.is_empty());
}

#[tokio::test]
async fn finished_resolutions_are_reaped_on_spawn() {
    let counters = Arc::new(Counters::default());
    let rt = runtime(FakeSubtitles::new(&counters), 4);
    let files = (0..3)
        .map(|i| file(&format!("f{i}"), &format!("Movie {i}.mkv")))
        .collect();
    rt.add_files(files).await.unwrap();

    // Every resolution saves after updating; once the saved list is fully
    // processed and one more round trip went through the DB, all have returned.
    for _ in 0..1000 {
        let saved = rt.db_handle().load_files().await.unwrap();
        if saved.iter().all(|f| f.processed) {
            break;
        }
        tokio::task::yield_now().await;
    }
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    rt.db_handle().load_files().await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    rt.retry_file("f0").await.unwrap();
    assert_eq!(rt.lock_tasks().len(), 1);
    rt.wait_idle().await;
    assert_eq!(counters.searches.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn waiting_does_not_block_new_files() {
    let counters = Arc::new(Counters::default());
    let gate = Arc::new(Semaphore::new(0));
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.gate = Some(Arc::clone(&gate));
    let rt = runtime(subtitles, 4);

    rt.add_files(vec![file("a", "A.mkv")]).await.unwrap();
    settle(|| counters.active.load(Ordering::SeqCst) == 1).await;

    let waiter = tokio::spawn({
        let rt = rt.clone();
        async move { rt.wait_idle().await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    rt.add_files(vec![file("b", "B.mkv")]).await.unwrap();
    assert_eq!(rt.lock_tasks().len(), 1);

    gate.add_permits(2);
    waiter.await.unwrap();
    assert!(rt.files().await.iter().all(|f| f.processed));
    assert_eq!(counters.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manual_search_cleans_and_sorts() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    let mut popular = candidate("2", None);
    popular.attributes.download_count = 500;
    let mut rare = candidate("1", None);
    rare.attributes.download_count = 10;
    subtitles.results.insert("heat".into(), vec![rare, popular]);
    let rt = runtime(subtitles, 4);

    let results = rt.search("  HEAT! ", SearchMode::Title, None).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    let params = counters.last_search.lock().unwrap().clone().unwrap();
    assert_eq!(params.languages.as_deref(), Some("en"));

    rt.search("imdb.com/title/tt0113277", SearchMode::Imdb, Some("pt"))
        .await
        .unwrap();
    let params = counters.last_search.lock().unwrap().clone().unwrap();
    assert_eq!(params.imdb_id, Some(113277));
    assert_eq!(params.languages.as_deref(), Some("pt"));
}

#[tokio::test]
async fn manual_search_rejects_bad_imdb_and_skips_blank() {
    let counters = Arc::new(Counters::default());
    let rt = runtime(FakeSubtitles::new(&counters), 4);

    assert!(matches!(
        rt.search("Heat", SearchMode::Imdb, None).await,
        Err(RuntimeError::InvalidInput(_))
    ));
    assert!(rt.search("  ", SearchMode::Title, None).await.unwrap().is_empty());
    assert_eq!(counters.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn series_overview_counts_and_fetches_series() {
    let counters = Arc::new(Counters::default());
    let mut subtitles = FakeSubtitles::new(&counters);
    subtitles.results.insert(
        "Breaking Bad".into(),
        vec![candidate("1", episode_of("Breaking Bad", 1, 1))],
    );
    subtitles.results.insert(
        "Unknown Show".into(),
        vec![candidate("2", episode_of("Unknown Show", 2, 1))],
    );
    let rt = runtime(subtitles, 4);
    rt.add_files(vec![
        file("bb1", "Breaking.Bad.S01E01.mkv"),
        file("bb2", "Breaking.Bad.S01E02.mkv"),
        file("u1", "Unknown.Show.S02E01.mkv"),
        file("u2", "Unknown.Show.S02E02.mkv"),
    ])
    .await
    .unwrap();
    rt.wait_idle().await;

    let overview = rt.series_overview("breaking bad").await.unwrap();
    assert_eq!(overview.title, "Breaking Bad");
    assert_eq!((overview.season_count, overview.episode_count), (1, 2));
    assert_eq!(overview.details.unwrap().title, "Breaking Bad");
    assert!(overview.error.is_none());

    let unknown = rt.series_overview("unknown show").await.unwrap();
    assert!(unknown.details.is_none());
    assert_eq!(unknown.error.as_deref(), Some("Series not found!"));
    assert_eq!(unknown.episode_count, 2);

    assert!(rt.series_overview("lost").await.is_none());
}
