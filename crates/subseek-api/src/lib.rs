//! Clients for the remote services consumed by subseek: the OpenSubtitles
//! REST API (search, download links, subtitle content) and the OMDb
//! movie-metadata API.

pub mod cache;
pub mod omdb;
pub mod opensubtitles;
pub mod traits;

pub use omdb::{OmdbClient, OmdbError};
pub use opensubtitles::{OpenSubtitlesClient, OpenSubtitlesConfig, OpenSubtitlesError};
pub use traits::{MediaDetails, MediaKind, MetadataService, SubtitleService};
