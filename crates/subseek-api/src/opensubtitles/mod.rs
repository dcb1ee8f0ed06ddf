pub mod client;
pub mod error;
pub mod types;

pub use client::{OpenSubtitlesClient, OpenSubtitlesConfig};
pub use error::OpenSubtitlesError;
