use thiserror::Error;

/// Errors from the OMDb API client.
#[derive(Debug, Error)]
pub enum OmdbError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OMDB API error: {status}")]
    Api { status: u16, message: String },

    /// OMDb answered `"Response": "False"`.
    #[error("{0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),
}
