use std::time::Duration;

use reqwest::Client;

use super::error::OmdbError;
use super::types::OmdbResponse;
use crate::cache::TtlCache;
use crate::traits::{MediaDetails, MediaKind, MetadataService};

pub const DEFAULT_BASE_URL: &str = "https://www.omdbapi.com/";

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// OMDb client. Title, IMDb id and episode lookups are cached for an hour,
/// keyed by the exact lookup parameters.
pub struct OmdbClient {
    api_key: String,
    base_url: String,
    http: Client,
    cache: TtlCache<MediaDetails>,
}

impl OmdbClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: Client::new(),
            cache: TtlCache::new(CACHE_TTL),
        }
    }

    /// False when no usable API key has been provided.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != "demo"
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn get_raw<T>(&self, params: &[(&str, String)]) -> Result<T, OmdbError>
    where
        T: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str()), ("r", "json")])
            .query(params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OmdbError::Api { status, message });
        }

        resp.json()
            .await
            .map_err(|e| OmdbError::Parse(e.to_string()))
    }

    /// Run a detail lookup, serving and filling the cache under `key`.
    async fn lookup(
        &self,
        key: String,
        params: &[(&str, String)],
    ) -> Result<MediaDetails, OmdbError> {
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key, "OMDb cache hit");
            return Ok(hit);
        }

        let raw: OmdbResponse = self.get_raw(params).await?;
        if let Some(message) = raw.failure() {
            return Err(OmdbError::NotFound(message));
        }

        let details = raw.into_details();
        self.cache.insert(key, details.clone());
        Ok(details)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Look up a title, optionally narrowed by release year.
    pub async fn by_title(&self, title: &str, year: Option<u32>) -> Result<MediaDetails, OmdbError> {
        let mut params = vec![("t", title.to_string()), ("plot", "full".to_string())];
        if let Some(y) = year {
            params.push(("y", y.to_string()));
        }
        self.lookup(title_key(title, year), &params).await
    }

    pub async fn by_imdb_id(&self, imdb_id: &str) -> Result<MediaDetails, OmdbError> {
        let params = [("i", imdb_id.to_string()), ("plot", "full".to_string())];
        self.lookup(format!("imdb_{imdb_id}"), &params).await
    }

    /// Look up a title restricted to series.
    pub async fn series_by_title(&self, title: &str) -> Result<MediaDetails, OmdbError> {
        let params = [
            ("t", title.to_string()),
            ("type", "series".to_string()),
            ("plot", "full".to_string()),
        ];
        self.lookup(format!("series_{title}"), &params).await
    }

    /// Look up one episode of a series. When OMDb has no record for the
    /// episode, the series record is returned dressed as that episode.
    pub async fn episode(
        &self,
        series_imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<MediaDetails, OmdbError> {
        let key = format!("episode_{series_imdb_id}_S{season}E{episode}");
        let params = [
            ("i", series_imdb_id.to_string()),
            ("Season", season.to_string()),
            ("Episode", episode.to_string()),
            ("plot", "full".to_string()),
        ];

        match self.lookup(key, &params).await {
            Ok(details) => Ok(as_episode(details, series_imdb_id, season, episode)),
            Err(OmdbError::NotFound(message)) => {
                tracing::debug!(series_imdb_id, season, episode, %message, "Episode not found, using series record");
                let series = self.by_imdb_id(series_imdb_id).await?;
                Ok(series_as_episode(series, series_imdb_id, season, episode))
            }
            Err(e) => Err(e),
        }
    }
}

/// Cache key for a title lookup.
pub fn title_key(title: &str, year: Option<u32>) -> String {
    match year {
        Some(y) => format!("{title}_{y}"),
        None => format!("{title}_no_year"),
    }
}

/// Make sure an episode record carries the numbers that were asked for.
fn as_episode(mut details: MediaDetails, series_imdb_id: &str, season: u32, episode: u32) -> MediaDetails {
    let (series_title, series_id, episode_name) = match details.kind {
        MediaKind::Episode {
            series_title,
            series_imdb_id,
            episode_name,
            ..
        } => (series_title, series_imdb_id, episode_name),
        _ => (None, None, Some(details.title.clone())),
    };
    details.kind = MediaKind::Episode {
        series_title,
        series_imdb_id: series_id.or_else(|| Some(series_imdb_id.to_string())),
        season: Some(season),
        episode: Some(episode),
        episode_name: episode_name.or_else(|| Some(format!("Episode {episode}"))),
    };
    details
}

fn series_as_episode(
    mut series: MediaDetails,
    series_imdb_id: &str,
    season: u32,
    episode: u32,
) -> MediaDetails {
    series.plot = Some(format!("Episode {episode} of {}", series.title));
    series.kind = MediaKind::Episode {
        series_title: Some(series.title.clone()),
        series_imdb_id: Some(series_imdb_id.to_string()),
        season: Some(season),
        episode: Some(episode),
        episode_name: Some(format!("Season {season}, Episode {episode}")),
    };
    series
}

impl MetadataService for OmdbClient {
    type Error = OmdbError;

    async fn by_title(&self, title: &str, year: Option<u32>) -> Result<MediaDetails, Self::Error> {
        OmdbClient::by_title(self, title, year).await
    }

    async fn by_imdb_id(&self, imdb_id: &str) -> Result<MediaDetails, Self::Error> {
        OmdbClient::by_imdb_id(self, imdb_id).await
    }

    async fn series(&self, title: &str) -> Result<MediaDetails, Self::Error> {
        OmdbClient::series_by_title(self, title).await
    }

    async fn episode(
        &self,
        series_imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<MediaDetails, Self::Error> {
        OmdbClient::episode(self, series_imdb_id, season, episode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> OmdbClient {
        OmdbClient::with_base_url("key", "http://127.0.0.1:9/")
    }

    #[test]
    fn title_keys() {
        assert_eq!(title_key("The Matrix", Some(1999)), "The Matrix_1999");
        assert_eq!(title_key("The Matrix", None), "The Matrix_no_year");
    }

    #[test]
    fn configured_only_with_real_key() {
        assert!(!OmdbClient::new("").is_configured());
        assert!(!OmdbClient::new("demo").is_configured());
        assert!(OmdbClient::new("abc123").is_configured());
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let client = offline_client();
        let cached = MediaDetails::titled("The Matrix", MediaKind::Movie);
        client.cache.insert(title_key("The Matrix", Some(1999)), cached.clone());
        client.cache.insert("imdb_tt0133093", cached.clone());
        client.cache.insert("series_Breaking Bad", cached.clone());

        assert_eq!(client.by_title("The Matrix", Some(1999)).await.unwrap(), cached);
        assert_eq!(client.by_imdb_id("tt0133093").await.unwrap(), cached);
        assert_eq!(MetadataService::series(&client, "Breaking Bad").await.unwrap(), cached);
    }

    #[tokio::test]
    async fn cached_episode_gets_requested_numbers() {
        let client = offline_client();
        client.cache.insert(
            "episode_tt0903747_S1E2",
            MediaDetails::titled("Cat's in the Bag...", MediaKind::Movie),
        );

        let details = client.episode("tt0903747", 1, 2).await.unwrap();
        assert_eq!(
            details.kind,
            MediaKind::Episode {
                series_title: None,
                series_imdb_id: Some("tt0903747".into()),
                season: Some(1),
                episode: Some(2),
                episode_name: Some("Cat's in the Bag...".into()),
            }
        );
    }

    #[test]
    fn series_fallback_is_labelled_as_episode() {
        let series = MediaDetails::titled("Breaking Bad", MediaKind::Series { total_seasons: Some(5) });
        let details = series_as_episode(series, "tt0903747", 2, 3);
        assert_eq!(details.title, "Breaking Bad");
        assert_eq!(details.plot.as_deref(), Some("Episode 3 of Breaking Bad"));
        match details.kind {
            MediaKind::Episode {
                series_title,
                episode_name,
                ..
            } => {
                assert_eq!(series_title.as_deref(), Some("Breaking Bad"));
                assert_eq!(episode_name.as_deref(), Some("Season 2, Episode 3"));
            }
            other => panic!("expected episode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let err = offline_client().by_imdb_id("tt0000001").await.unwrap_err();
        assert!(matches!(err, OmdbError::Http(_)));
    }
}
