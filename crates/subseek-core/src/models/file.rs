use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use subseek_api::opensubtitles::types::SubtitleCandidate;
use subseek_api::MediaDetails;
use subseek_parse::MovieInfo;

/// One video added by the user, plus everything resolution learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    /// Path relative to the dropped folder, when the file came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    pub size: u64,
    /// Location on disk. Not part of the identity; absent for restored
    /// sessions whose source moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub movie_info: MovieInfo,
    #[serde(default)]
    pub search_results: Vec<SubtitleCandidate>,
    #[serde(default, rename = "omdbInfo", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResolvedMetadata>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadedFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            movie_info: subseek_parse::parse(&name),
            name,
            relative_path: None,
            size,
            path: None,
            search_results: Vec::new(),
            metadata: None,
            processed: false,
            error: None,
        }
    }
}

/// A partial update applied to an [`UploadedFile`] by id.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub search_results: Option<Vec<SubtitleCandidate>>,
    pub metadata: Option<Option<ResolvedMetadata>>,
    pub processed: Option<bool>,
    pub error: Option<Option<String>>,
}

impl FilePatch {
    pub fn apply(self, file: &mut UploadedFile) {
        if let Some(results) = self.search_results {
            file.search_results = results;
        }
        if let Some(metadata) = self.metadata {
            file.metadata = metadata;
        }
        if let Some(processed) = self.processed {
            file.processed = processed;
        }
        if let Some(error) = self.error {
            file.error = error;
        }
    }
}

// ── Identity ─────────────────────────────────────────────────────

/// What a file turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Movie,
    Episode,
    Series,
    /// Any other provider feature type, lower-cased.
    Other(String),
}

impl EntityKind {
    /// Map a provider `feature_type`; unknown or missing means movie.
    pub fn from_feature_type(feature_type: Option<&str>) -> Self {
        match feature_type {
            Some(t) if !t.trim().is_empty() => Self::from(t.trim().to_lowercase()),
            _ => Self::Movie,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
            Self::Series => "series",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "movie" => Self::Movie,
            "episode" => Self::Episode,
            "series" => Self::Series,
            _ => Self::Other(s),
        }
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields stamped on every resolution outcome, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(rename = "featureType")]
    pub kind: EntityKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, rename = "seasonNumber", skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, rename = "episodeNumber", skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    /// Episode-specific id for episodes, the title's id otherwise.
    #[serde(default, rename = "imdbID", skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, rename = "seriesImdbID", skip_serializing_if = "Option::is_none")]
    pub series_imdb_id: Option<String>,
}

impl Identity {
    pub fn movie(title: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            kind: EntityKind::Movie,
            title: title.into(),
            year,
            series_title: None,
            season: None,
            episode: None,
            episode_name: None,
            imdb_id: None,
            series_imdb_id: None,
        }
    }

    pub fn is_episode(&self) -> bool {
        self.kind == EntityKind::Episode
    }
}

/// The metadata record attached to a file: the normalized provider record
/// when a lookup succeeded, the error when it did not, and the identity in
/// both cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<MediaDetails>,
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolvedMetadata {
    pub fn found(details: MediaDetails, identity: Identity) -> Self {
        Self {
            details: Some(details),
            identity,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, identity: Identity) -> Self {
        Self {
            details: None,
            identity,
            error: Some(error.into()),
        }
    }

    pub fn kind(&self) -> &EntityKind {
        &self.identity.kind
    }

    /// Provider title when known, the resolved identity title otherwise.
    pub fn title(&self) -> &str {
        self.details
            .as_ref()
            .map(|d| d.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.identity.title)
    }

    pub fn year(&self) -> Option<u32> {
        self.details
            .as_ref()
            .and_then(|d| d.release_year())
            .or(self.identity.year)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subseek_api::MediaKind;

    #[test]
    fn new_file_parses_its_name() {
        let file = UploadedFile::new("id_1", "Inception (2010).mkv", 42);
        assert_eq!(file.movie_info.title, "Inception");
        assert_eq!(file.movie_info.year, Some(2010));
        assert!(!file.processed);
    }

    #[test]
    fn entity_kind_from_feature_type() {
        assert_eq!(EntityKind::from_feature_type(Some("Episode")), EntityKind::Episode);
        assert_eq!(EntityKind::from_feature_type(Some("Movie")), EntityKind::Movie);
        assert_eq!(EntityKind::from_feature_type(None), EntityKind::Movie);
        assert_eq!(
            EntityKind::from_feature_type(Some("Tvshow")),
            EntityKind::Other("tvshow".into())
        );
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut file = UploadedFile::new("id_1", "Alien.mkv", 1);
        file.error = Some("old".into());
        FilePatch {
            processed: Some(true),
            ..Default::default()
        }
        .apply(&mut file);
        assert!(file.processed);
        assert_eq!(file.error.as_deref(), Some("old"));

        FilePatch {
            error: Some(None),
            ..Default::default()
        }
        .apply(&mut file);
        assert_eq!(file.error, None);
    }

    #[test]
    fn patch_can_clear_metadata() {
        let mut file = UploadedFile::new("id_1", "Alien.mkv", 1);
        file.metadata = Some(ResolvedMetadata::failed("old", Identity::movie("Alien", None)));

        FilePatch::default().apply(&mut file);
        assert!(file.metadata.is_some());

        FilePatch {
            metadata: Some(None),
            ..Default::default()
        }
        .apply(&mut file);
        assert!(file.metadata.is_none());
    }

    #[test]
    fn metadata_prefers_provider_title_and_year() {
        let mut details = MediaDetails::titled("Alien", MediaKind::Movie);
        details.year = Some("1979".into());
        let meta = ResolvedMetadata::found(details, Identity::movie("alien", None));
        assert_eq!(meta.title(), "Alien");
        assert_eq!(meta.year(), Some(1979));

        let failed = ResolvedMetadata::failed("boom", Identity::movie("Alien", Some(1979)));
        assert_eq!(failed.title(), "Alien");
        assert_eq!(failed.year(), Some(1979));
        assert!(failed.is_error());
    }

    #[test]
    fn persisted_shape_round_trips() {
        let mut file = UploadedFile::new("a_1_2_x", "Breaking.Bad.S01E02.mkv", 10);
        file.metadata = Some(ResolvedMetadata::failed(
            "lookup failed",
            Identity {
                kind: EntityKind::Episode,
                series_title: Some("Breaking Bad".into()),
                season: Some(1),
                episode: Some(2),
                ..Identity::movie("Breaking Bad", Some(2008))
            },
        ));
        file.processed = true;

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["omdbInfo"]["identity"]["featureType"], "episode");
        assert_eq!(json["omdbInfo"]["identity"]["seasonNumber"], 1);
        assert_eq!(json["movieInfo"]["title"], "Breaking Bad");

        let back: UploadedFile = serde_json::from_value(json).unwrap();
        assert_eq!(back, file);
    }
}
