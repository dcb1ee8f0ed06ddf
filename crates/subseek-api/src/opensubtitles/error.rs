use thiserror::Error;

/// Errors from the OpenSubtitles API client.
#[derive(Debug, Error)]
pub enum OpenSubtitlesError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("API Error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("parse error: {0}")]
    Parse(String),
}
