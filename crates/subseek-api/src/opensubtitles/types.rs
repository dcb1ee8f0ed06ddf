use serde::{Deserialize, Serialize};

// ── Search ───────────────────────────────────────────────────────

/// Query parameters for `GET /subtitles`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub languages: Option<String>,
    pub year: Option<u32>,
    pub imdb_id: Option<u64>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
}

impl SearchParams {
    /// Query pairs in a fixed order, skipping unset parameters.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(q) = &self.query {
            pairs.push(("query", q.clone()));
        }
        if let Some(l) = &self.languages {
            pairs.push(("languages", l.clone()));
        }
        if let Some(y) = self.year {
            pairs.push(("year", y.to_string()));
        }
        if let Some(id) = self.imdb_id {
            pairs.push(("imdb_id", id.to_string()));
        }
        if let Some(s) = self.season_number {
            pairs.push(("season_number", s.to_string()));
        }
        if let Some(e) = self.episode_number {
            pairs.push(("episode_number", e.to_string()));
        }
        pairs
    }

    /// Cache key covering the exact parameter set.
    pub fn cache_key(&self) -> String {
        let pairs: Vec<String> = self
            .to_query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("search_{}", pairs.join("&"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<SubtitleCandidate>,
    pub total_count: Option<u64>,
    pub total_pages: Option<u32>,
    pub page: Option<u32>,
}

/// An IMDb reference as the provider sends it: sometimes a number,
/// sometimes a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImdbRef {
    Number(u64),
    Text(String),
}

/// One subtitle search hit. Unknown fields are kept so the record
/// round-trips through persistence unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attributes: SubtitleAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleAttributes {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub hearing_impaired: bool,
    #[serde(default)]
    pub ratings: f64,
    #[serde(default)]
    pub points: u64,
    /// RFC 3339 timestamp.
    pub upload_date: Option<String>,
    pub format: Option<String>,
    pub release: Option<String>,
    #[serde(default)]
    pub files: Vec<SubtitleFile>,
    pub feature_details: Option<FeatureDetails>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub imdb_id: Option<ImdbRef>,
    pub imdbid: Option<ImdbRef>,
    pub imdb: Option<ImdbRef>,
    pub parent_id: Option<ImdbRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleFile {
    pub file_id: u64,
    #[serde(default)]
    pub file_name: String,
    pub cd_number: Option<u32>,
}

/// What the provider knows about the feature a subtitle belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDetails {
    pub feature_id: Option<u64>,
    /// `"Movie"`, `"Episode"`, `"Tvshow"`, ...
    pub feature_type: Option<String>,
    pub year: Option<u32>,
    pub title: Option<String>,
    pub movie_name: Option<String>,
    pub imdb_id: Option<ImdbRef>,
    pub tmdb_id: Option<u64>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub parent_imdb_id: Option<ImdbRef>,
    pub parent_title: Option<String>,
    pub parent_tmdb_id: Option<u64>,
    pub parent_feature_id: Option<u64>,
}

impl SubtitleCandidate {
    /// The first file of the subtitle, the one that gets downloaded.
    pub fn primary_file(&self) -> Option<&SubtitleFile> {
        self.attributes.files.first()
    }
}

// ── Download ─────────────────────────────────────────────────────

/// Options merged into the `POST /download` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DownloadRequest<'a> {
    pub file_id: u64,
    #[serde(flatten)]
    pub options: &'a DownloadOptions,
}

/// Response of `POST /download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub link: String,
    pub file_name: Option<String>,
    pub requests: Option<u32>,
    pub remaining: Option<i64>,
    pub message: Option<String>,
    pub reset_time: Option<String>,
}

// ── Account ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Option<serde_json::Value>,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    pub data: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: Option<u64>,
    pub level: Option<String>,
    pub allowed_downloads: Option<u32>,
    pub downloads_count: Option<u32>,
    pub remaining_downloads: Option<i64>,
    #[serde(default)]
    pub vip: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguagesResponse {
    #[serde(default)]
    pub data: Vec<LanguageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub language_code: String,
    pub language_name: String,
}

/// Error body shape returned by the provider.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}
