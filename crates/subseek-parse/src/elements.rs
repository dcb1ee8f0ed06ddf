use serde::{Deserialize, Serialize};

/// Best-guess identity extracted from a video filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieInfo {
    /// Cleaned title. May be empty when the name held only noise tokens.
    pub title: String,
    /// Release year, from `(YYYY)` or a bare year token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    /// The filename as given.
    pub original: String,
    /// Season number from an `SxxEyy` / `NxMM` token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    /// Episode number from an `SxxEyy` / `NxMM` token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl MovieInfo {
    /// True when the filename carried a season/episode marker.
    pub fn is_episode(&self) -> bool {
        self.season.is_some() && self.episode.is_some()
    }
}
