use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER,
    USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::error::OpenSubtitlesError;
use super::types::{
    DownloadLink, DownloadOptions, DownloadRequest, ErrorBody, LanguageInfo, LanguagesResponse,
    LoginRequest, LoginResponse, SearchParams, SearchResponse, SubtitleCandidate, UserInfo,
    UserInfoResponse,
};
use crate::cache::TtlCache;
use crate::traits::SubtitleService;

pub const DEFAULT_BASE_URL: &str = "https://api.opensubtitles.com/api/v1";
const DEFAULT_USER_AGENT: &str = concat!("subseek v", env!("CARGO_PKG_VERSION"));

const SEARCH_TTL: Duration = Duration::from_secs(5 * 60);
const LANGUAGES_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const LANGUAGES_KEY: &str = "supported_languages";

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// Seconds to wait on a 429 without a usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 10;
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Connection settings for [`OpenSubtitlesClient`].
#[derive(Debug, Clone)]
pub struct OpenSubtitlesConfig {
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    /// Requests go through the local proxy, which injects credentials itself.
    pub via_proxy: bool,
}

impl Default for OpenSubtitlesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: String::new(),
            user_agent: DEFAULT_USER_AGENT.into(),
            via_proxy: false,
        }
    }
}

/// OpenSubtitles REST client.
///
/// One instance is shared by every resolution and download; it owns the
/// bearer token, the response caches and the in-flight search gates.
pub struct OpenSubtitlesClient {
    config: OpenSubtitlesConfig,
    http: Client,
    token: RwLock<Option<String>>,
    search_cache: TtlCache<Vec<SubtitleCandidate>>,
    languages_cache: TtlCache<Vec<LanguageInfo>>,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OpenSubtitlesClient {
    pub fn new(config: OpenSubtitlesConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            token: RwLock::new(None),
            search_cache: TtlCache::new(SEARCH_TTL),
            languages_cache: TtlCache::new(LANGUAGES_TTL),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OpenSubtitlesConfig {
        &self.config
    }

    // ── Token ────────────────────────────────────────────────────────

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Restore a previously persisted token (or forget it with `None`).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    // ── Request plumbing ─────────────────────────────────────────────

    fn headers(&self, with_auth: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if !self.config.via_proxy {
            match HeaderValue::from_str(&self.config.api_key) {
                Ok(v) => {
                    headers.insert(API_KEY_HEADER, v);
                }
                Err(_) => tracing::warn!("API key contains invalid header characters"),
            }
            if let Ok(v) = HeaderValue::from_str(&self.config.user_agent) {
                headers.insert(USER_AGENT, v);
            }
        }

        if with_auth {
            if let Some(token) = self.token() {
                if let Ok(v) = HeaderValue::from_str(&format!("Bearer {token}")) {
                    headers.insert(AUTHORIZATION, v);
                }
            }
        }
        headers
    }

    fn request(&self, method: Method, path: &str, with_auth: bool) -> RequestBuilder {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        self.http
            .request(method, url)
            .headers(self.headers(with_auth))
    }

    async fn check_response(
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, OpenSubtitlesError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Unknown error".into());
            Err(OpenSubtitlesError::Api { status, message })
        }
    }

    /// Send a request, sleeping and retrying on 429, and decode the JSON body.
    async fn execute<T, F>(&self, build: F) -> Result<T, OpenSubtitlesError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Sync,
    {
        let mut rate_limited = 0;
        loop {
            let resp = build().send().await?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = parse_retry_after(
                    resp.headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok()),
                );
                if rate_limited >= MAX_RATE_LIMIT_RETRIES {
                    return Err(OpenSubtitlesError::RateLimited {
                        retry_after_secs: wait,
                    });
                }
                rate_limited += 1;
                tracing::warn!(wait_secs = wait, attempt = rate_limited, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let resp = Self::check_response(resp).await?;
            return resp
                .json()
                .await
                .map_err(|e| OpenSubtitlesError::Parse(e.to_string()));
        }
    }

    fn inflight_gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.entry(key.to_string()).or_default().clone()
    }

    fn release_gate(&self, key: &str) {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    // ── Account ──────────────────────────────────────────────────────

    /// Log in and keep the returned bearer token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, OpenSubtitlesError> {
        let body = LoginRequest { username, password };
        let resp: LoginResponse = self
            .execute(|| self.request(Method::POST, "/login", false).json(&body))
            .await?;
        self.set_token(Some(resp.token.clone()));
        tracing::info!("Logged in to OpenSubtitles");
        Ok(resp)
    }

    /// Invalidate the session. The local token is dropped even if the
    /// remote call fails.
    pub async fn logout(&self) -> Result<(), OpenSubtitlesError> {
        if !self.is_logged_in() {
            return Ok(());
        }
        let result: Result<serde_json::Value, _> = self
            .execute(|| self.request(Method::DELETE, "/logout", true))
            .await;
        self.set_token(None);
        result.map(|_| ())
    }

    /// Account quota info, `None` when logged out or the call fails.
    pub async fn user_info(&self) -> Option<UserInfo> {
        if !self.is_logged_in() {
            return None;
        }
        match self
            .execute::<UserInfoResponse, _>(|| self.request(Method::GET, "/infos/user", true))
            .await
        {
            Ok(resp) => Some(resp.data),
            Err(e) => {
                tracing::error!(error = %e, "Failed to get user info");
                None
            }
        }
    }

    pub async fn supported_languages(&self) -> Result<Vec<LanguageInfo>, OpenSubtitlesError> {
        if let Some(hit) = self.languages_cache.get(LANGUAGES_KEY) {
            return Ok(hit);
        }
        let resp: LanguagesResponse = self
            .execute(|| self.request(Method::GET, "/infos/languages", false))
            .await?;
        self.languages_cache.insert(LANGUAGES_KEY, resp.data.clone());
        Ok(resp.data)
    }

    // ── Subtitles ────────────────────────────────────────────────────

    /// Search subtitles. Identical parameter sets are served from a 5 minute
    /// cache, and concurrent identical searches share one network call.
    #[tracing::instrument(skip(self), fields(query = ?params.query))]
    pub async fn search(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<SubtitleCandidate>, OpenSubtitlesError> {
        let key = params.cache_key();
        if let Some(hit) = self.search_cache.get(&key) {
            tracing::debug!(results = hit.len(), "Search cache hit");
            return Ok(hit);
        }

        let gate = self.inflight_gate(&key);
        let _guard = gate.lock().await;
        if let Some(hit) = self.search_cache.get(&key) {
            return Ok(hit);
        }

        let pairs = params.to_query_pairs();
        let result: Result<SearchResponse, _> = self
            .execute(|| self.request(Method::GET, "/subtitles", false).query(&pairs))
            .await;
        self.release_gate(&key);

        let resp = result?;
        tracing::debug!(results = resp.data.len(), "Search complete");
        self.search_cache.insert(key, resp.data.clone());
        Ok(resp.data)
    }

    /// Request a download link for a subtitle file.
    pub async fn request_download(
        &self,
        file_id: u64,
        options: &DownloadOptions,
    ) -> Result<DownloadLink, OpenSubtitlesError> {
        let body = DownloadRequest { file_id, options };
        self.execute(|| self.request(Method::POST, "/download", true).json(&body))
            .await
    }

    /// Fetch the subtitle text behind a download link.
    pub async fn fetch_content(&self, link: &str) -> Result<String, OpenSubtitlesError> {
        let url = url::Url::parse(link)
            .map_err(|e| OpenSubtitlesError::Parse(format!("invalid download link: {e}")))?;
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(OpenSubtitlesError::Api {
                status: resp.status().as_u16(),
                message: "Failed to download subtitle".into(),
            });
        }
        resp.text()
            .await
            .map_err(|e| OpenSubtitlesError::Parse(e.to_string()))
    }

    pub fn clear_cache(&self) {
        self.search_cache.clear();
        self.languages_cache.clear();
    }
}

/// Seconds to wait from a `Retry-After` header value.
///
/// Only the delta-seconds form is honoured; anything else falls back to the
/// default.
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

impl SubtitleService for OpenSubtitlesClient {
    type Error = OpenSubtitlesError;

    async fn search_subtitles(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<SubtitleCandidate>, Self::Error> {
        self.search(params).await
    }

    async fn request_download(
        &self,
        file_id: u64,
        options: &DownloadOptions,
    ) -> Result<DownloadLink, Self::Error> {
        OpenSubtitlesClient::request_download(self, file_id, options).await
    }

    async fn fetch_content(&self, link: &str) -> Result<String, Self::Error> {
        OpenSubtitlesClient::fetch_content(self, link).await
    }
}
