//! Local forwarding proxy for the OpenSubtitles API.
//!
//! Browser builds cannot hold the API key or get CORS headers from the
//! provider, so they talk to this proxy instead. Every `/api/v1/*` request is
//! forwarded upstream with the key and user agent injected, and the
//! upstream status, body and content type are passed back unchanged.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::any,
    Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

const DEFAULT_UPSTREAM: &str = "https://api.opensubtitles.com";
const DEFAULT_USER_AGENT: &str = concat!("subseek v", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

#[derive(Parser, Debug)]
#[command(name = "subseek-proxy")]
#[command(about = "Local CORS proxy for the OpenSubtitles API")]
struct Cli {
    /// Port to listen on (localhost only)
    #[arg(short, long, env = "SUBSEEK_PROXY_PORT", default_value_t = 3001)]
    port: u16,

    /// Upstream origin; `/api/v1/...` is appended
    #[arg(long, env = "OPENSUBTITLES_UPSTREAM", default_value = DEFAULT_UPSTREAM)]
    upstream: String,

    /// API key injected into every forwarded request
    #[arg(long, env = "OPENSUBTITLES_API_KEY", default_value = "")]
    api_key: String,

    #[arg(long, env = "OPENSUBTITLES_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

#[derive(Debug, thiserror::Error)]
enum ProxyError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] header::InvalidHeaderValue),
}

struct ProxyState {
    http: reqwest::Client,
    upstream: String,
    api_key: String,
    user_agent: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("subseek=debug,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    if cli.api_key.is_empty() {
        tracing::warn!("No API key set; upstream will reject most requests");
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let state = Arc::new(ProxyState {
        http: reqwest::Client::new(),
        upstream: cli.upstream,
        api_key: cli.api_key,
        user_agent: cli.user_agent,
    });

    tracing::info!(%addr, upstream = %state.upstream, "Starting subseek proxy");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/api/v1/{*path}", any(forward))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn forward(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match forward_inner(&state, method, &path, query.as_deref(), &headers, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, path = %path, "Proxy request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Proxy server error" })),
            )
                .into_response()
        }
    }
}

async fn forward_inner(
    state: &ProxyState,
    method: Method,
    path: &str,
    query: Option<&str>,
    incoming: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let url = upstream_url(&state.upstream, path, query);
    let headers = upstream_headers(&state.api_key, &state.user_agent, incoming)?;
    tracing::debug!(%method, %url, "Forwarding");

    let mut request = state.http.request(method.clone(), &url).headers(headers);
    if method != Method::GET && method != Method::HEAD {
        request = request.body(body);
    }

    let upstream = request.send().await?;
    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = upstream.bytes().await?;

    let mut response = (status, bytes).into_response();
    match content_type {
        Some(ct) => {
            response.headers_mut().insert(header::CONTENT_TYPE, ct);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    Ok(response)
}

/// `{upstream}/api/v1/{path}` plus the original query string.
fn upstream_url(upstream: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!(
        "{}/api/v1/{}",
        upstream.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Fixed provider headers plus the caller's `Authorization`, nothing else.
fn upstream_headers(
    api_key: &str,
    user_agent: &str,
    incoming: &HeaderMap,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, HeaderValue::from_str(api_key)?);
    headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(auth) = incoming.get(header::AUTHORIZATION) {
        headers.insert(header::AUTHORIZATION, auth.clone());
    }
    Ok(headers)
}
