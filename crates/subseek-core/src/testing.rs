//! In-process fakes of the remote services for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use subseek_api::opensubtitles::types::{
    DownloadLink, DownloadOptions, FeatureDetails, SearchParams, SubtitleAttributes,
    SubtitleCandidate, SubtitleFile,
};
use subseek_api::{MediaDetails, MediaKind, MetadataService, SubtitleService};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(pub String);

pub fn candidate(id: &str, file_id: u64, feature: Option<FeatureDetails>) -> SubtitleCandidate {
    SubtitleCandidate {
        id: id.into(),
        kind: "subtitle".into(),
        attributes: SubtitleAttributes {
            language: "en".into(),
            format: Some("srt".into()),
            files: vec![SubtitleFile {
                file_id,
                file_name: format!("{id}.srt"),
                cd_number: None,
            }],
            feature_details: feature,
            ..Default::default()
        },
    }
}

/// Subtitle provider serving canned search results and content per file id.
#[derive(Default)]
pub struct FakeSubtitles {
    pub results: Vec<SubtitleCandidate>,
    pub search_error: Option<String>,
    /// file ids whose content fetch fails
    pub broken_content: Vec<u64>,
    pub searches: Mutex<Vec<SearchParams>>,
}

impl SubtitleService for FakeSubtitles {
    type Error = FakeError;

    async fn search_subtitles(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<SubtitleCandidate>, FakeError> {
        self.searches.lock().unwrap().push(params.clone());
        match &self.search_error {
            Some(e) => Err(FakeError(e.clone())),
            None => Ok(self.results.clone()),
        }
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
        let file_id: u64 = link
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FakeError("bad link".into()))?;
        if self.broken_content.contains(&file_id) {
            return Err(FakeError(format!("content for {file_id} unavailable")));
        }
        Ok(format!("1\n00:00:01,000 --> 00:00:02,000\nsubtitle {file_id}\n"))
    }
}

/// Metadata provider recording every call; selected lookups fail.
#[derive(Default)]
pub struct FakeMetadata {
    pub fail_episode: bool,
    pub fail_imdb: bool,
    pub fail_title: bool,
    pub no_episode_endpoint: bool,
    pub records: HashMap<String, MediaDetails>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeMetadata {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: String, fail: bool, kind: MediaKind) -> Result<MediaDetails, FakeError> {
        self.calls.lock().unwrap().push(call.clone());
        if fail {
            return Err(FakeError(format!("{call} failed")));
        }
        Ok(self
            .records
            .get(&call)
            .cloned()
            .unwrap_or_else(|| MediaDetails::titled(call, kind)))
    }
}

impl MetadataService for FakeMetadata {
    type Error = FakeError;

    fn supports_episode_lookup(&self) -> bool {
        !self.no_episode_endpoint
    }

    async fn by_title(&self, title: &str, year: Option<u32>) -> Result<MediaDetails, FakeError> {
        let call = match year {
            Some(y) => format!("title:{title}:{y}"),
            None => format!("title:{title}"),
        };
        self.answer(call, self.fail_title, MediaKind::Movie)
    }

    async fn by_imdb_id(&self, imdb_id: &str) -> Result<MediaDetails, FakeError> {
        self.answer(format!("imdb:{imdb_id}"), self.fail_imdb, MediaKind::Movie)
    }

    async fn series(&self, title: &str) -> Result<MediaDetails, FakeError> {
        self.answer(
            format!("series:{title}"),
            self.fail_title,
            MediaKind::Series {
                total_seasons: Some(5),
            },
        )
    }

    async fn episode(
        &self,
        series_imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<MediaDetails, FakeError> {
        self.answer(
            format!("episode:{series_imdb_id}:{season}:{episode}"),
            self.fail_episode,
            MediaKind::Episode {
                series_title: None,
                series_imdb_id: Some(series_imdb_id.into()),
                season: Some(season),
                episode: Some(episode),
                episode_name: Some("Real Episode Name".into()),
            },
        )
    }
}
