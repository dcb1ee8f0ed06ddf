//! Trait definitions for the remote services.
//!
//! The resolver and download manager are written against these traits so
//! that the concrete HTTP clients can be swapped for in-process fakes.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::opensubtitles::types::{DownloadLink, DownloadOptions, SearchParams, SubtitleCandidate};

/// Subtitle search and download provider.
pub trait SubtitleService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Search subtitles. Results keep the provider's ranking.
    fn search_subtitles(
        &self,
        params: &SearchParams,
    ) -> impl Future<Output = Result<Vec<SubtitleCandidate>, Self::Error>> + Send;

    /// Exchange a subtitle file id for a time-limited download link.
    fn request_download(
        &self,
        file_id: u64,
        options: &DownloadOptions,
    ) -> impl Future<Output = Result<DownloadLink, Self::Error>> + Send;

    /// Fetch the raw subtitle text behind a download link.
    fn fetch_content(&self, link: &str)
        -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Movie/series/episode metadata provider.
pub trait MetadataService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether `episode()` is backed by a real per-episode endpoint.
    fn supports_episode_lookup(&self) -> bool {
        true
    }

    fn by_title(
        &self,
        title: &str,
        year: Option<u32>,
    ) -> impl Future<Output = Result<MediaDetails, Self::Error>> + Send;

    fn by_imdb_id(
        &self,
        imdb_id: &str,
    ) -> impl Future<Output = Result<MediaDetails, Self::Error>> + Send;

    /// Look up a series by its title.
    fn series(&self, title: &str) -> impl Future<Output = Result<MediaDetails, Self::Error>> + Send;

    fn episode(
        &self,
        series_imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> impl Future<Output = Result<MediaDetails, Self::Error>> + Send;
}

/// A normalized metadata record, validated once at the client boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    pub title: String,
    /// `"1999"` for movies, `"2008–2013"` style ranges for series.
    pub year: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: Option<String>,
    pub poster: Option<String>,
    pub plot: Option<String>,
    pub genre: Option<String>,
    pub actors: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub awards: Option<String>,
    pub rated: Option<String>,
    pub released: Option<String>,
    pub runtime: Option<String>,
    pub imdb_rating: Option<String>,
    pub imdb_votes: Option<String>,
    pub metascore: Option<String>,
    pub box_office: Option<String>,
    #[serde(flatten)]
    pub kind: MediaKind,
}

/// Content-type specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    #[serde(rename_all = "camelCase")]
    Series { total_seasons: Option<u32> },
    #[serde(rename_all = "camelCase")]
    Episode {
        series_title: Option<String>,
        #[serde(rename = "seriesImdbID")]
        series_imdb_id: Option<String>,
        season: Option<u32>,
        episode: Option<u32>,
        episode_name: Option<String>,
    },
}

impl MediaDetails {
    /// A bare record carrying only a title, used by fakes and fallbacks.
    pub fn titled(title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            year: None,
            imdb_id: None,
            poster: None,
            plot: None,
            genre: None,
            actors: None,
            director: None,
            writer: None,
            country: None,
            language: None,
            awards: None,
            rated: None,
            released: None,
            runtime: None,
            imdb_rating: None,
            imdb_votes: None,
            metascore: None,
            box_office: None,
            kind,
        }
    }

    /// First four-digit year in `year` (start year for ranges).
    pub fn release_year(&self) -> Option<u32> {
        let year = self.year.as_deref()?;
        year.get(..4)?.parse().ok()
    }

    /// The year range for series, the plain year otherwise.
    pub fn year_range(&self) -> Option<&str> {
        self.year.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            MediaKind::Movie => "movie",
            MediaKind::Series { .. } => "series",
            MediaKind::Episode { .. } => "episode",
        }
    }
}
