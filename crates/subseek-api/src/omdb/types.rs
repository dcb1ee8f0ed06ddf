use serde::Deserialize;

use crate::traits::{MediaDetails, MediaKind};

/// Raw OMDb title response. Every field is a string, `"N/A"` marks absence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbResponse {
    pub response: Option<String>,
    pub error: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub rated: Option<String>,
    pub released: Option<String>,
    pub runtime: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub actors: Option<String>,
    pub plot: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub awards: Option<String>,
    pub poster: Option<String>,
    pub metascore: Option<String>,
    #[serde(rename = "imdbRating", alias = "ImdbRating")]
    pub imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes", alias = "ImdbVotes")]
    pub imdb_votes: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    pub box_office: Option<String>,
    #[serde(rename = "totalSeasons")]
    pub total_seasons: Option<String>,
    pub season: Option<String>,
    pub episode: Option<String>,
    #[serde(rename = "seriesID")]
    pub series_id: Option<String>,
    pub series_title: Option<String>,
}

impl OmdbResponse {
    /// `Response: "False"` with the provider's message.
    pub fn failure(&self) -> Option<String> {
        match self.response.as_deref() {
            Some(r) if r.eq_ignore_ascii_case("false") => Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| "Movie not found".into()),
            ),
            _ => None,
        }
    }

    /// Normalize into a [`MediaDetails`], dropping `"N/A"` placeholders.
    pub fn into_details(self) -> MediaDetails {
        let kind = match clean(self.kind.clone()).as_deref() {
            Some("series") => MediaKind::Series {
                total_seasons: parse_number(self.total_seasons.clone()),
            },
            Some("episode") => MediaKind::Episode {
                series_title: clean(self.series_title.clone()),
                series_imdb_id: clean(self.series_id.clone()),
                season: parse_number(self.season.clone()),
                episode: parse_number(self.episode.clone()),
                episode_name: clean(self.title.clone()),
            },
            _ => MediaKind::Movie,
        };

        MediaDetails {
            title: clean(self.title).unwrap_or_else(|| "Unknown".into()),
            year: clean(self.year),
            imdb_id: clean(self.imdb_id),
            poster: clean(self.poster).filter(|p| p != "undefined"),
            plot: clean(self.plot),
            genre: clean(self.genre),
            actors: clean(self.actors),
            director: clean(self.director),
            writer: clean(self.writer),
            country: clean(self.country),
            language: clean(self.language),
            awards: clean(self.awards),
            rated: clean(self.rated),
            released: clean(self.released),
            runtime: clean(self.runtime),
            imdb_rating: clean(self.imdb_rating),
            imdb_votes: clean(self.imdb_votes),
            metascore: clean(self.metascore),
            box_office: clean(self.box_office),
            kind,
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "N/A")
}

fn parse_number(value: Option<String>) -> Option<u32> {
    clean(value)?.parse().ok()
}
