//! Manual subtitle search: turning what the user typed into provider
//! parameters, and ordering the hits for display.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use subseek_api::opensubtitles::types::{SearchParams, SubtitleCandidate};

use crate::error::SubseekError;

/// How the search box input is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Free-text title.
    #[default]
    Title,
    /// `tt0133093` or an IMDb title URL.
    Imdb,
    /// A video filename, parsed the same way as added files.
    Filename,
}

/// Field the results are ordered by, highest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    DownloadCount,
    UploadDate,
    Ratings,
    Points,
}

/// Build search parameters for a manual query.
///
/// A blank query yields `Ok(None)`: there is nothing to search for.
pub fn build_params(
    query: &str,
    mode: SearchMode,
    language: &str,
) -> Result<Option<SearchParams>, SubseekError> {
    if query.trim().is_empty() {
        return Ok(None);
    }

    let mut params = SearchParams {
        languages: (!language.is_empty()).then(|| language.to_string()),
        ..Default::default()
    };
    match mode {
        SearchMode::Title => {
            params.query = Some(subseek_parse::clean_search_query(query));
        }
        SearchMode::Imdb => {
            let id = subseek_parse::extract_imdb_id(query)
                .ok_or_else(|| SubseekError::InvalidQuery("Invalid IMDb id format".into()))?;
            params.imdb_id = Some(id);
        }
        SearchMode::Filename => {
            let info = subseek_parse::parse(query.trim());
            params.query = Some(info.title);
            params.year = info.year;
        }
    }
    Ok(Some(params))
}

/// Stable sort, highest first. Missing values sort last.
pub fn sort_results(results: &mut [SubtitleCandidate], key: SortKey) {
    match key {
        SortKey::DownloadCount => {
            results.sort_by(|a, b| b.attributes.download_count.cmp(&a.attributes.download_count));
        }
        SortKey::Points => {
            results.sort_by(|a, b| b.attributes.points.cmp(&a.attributes.points));
        }
        SortKey::Ratings => {
            results.sort_by(|a, b| {
                b.attributes
                    .ratings
                    .partial_cmp(&a.attributes.ratings)
                    .unwrap_or(Ordering::Equal)
            });
        }
        SortKey::UploadDate => {
            results.sort_by_key(|c| std::cmp::Reverse(upload_date(c)));
        }
    }
}

fn upload_date(candidate: &SubtitleCandidate) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(candidate.attributes.upload_date.as_deref()?).ok()
}

/// Distinct languages present in `results`, sorted.
pub fn available_languages(results: &[SubtitleCandidate]) -> Vec<String> {
    let mut languages: Vec<String> = results
        .iter()
        .map(|c| c.attributes.language.clone())
        .filter(|l| !l.is_empty())
        .collect();
    languages.sort();
    languages.dedup();
    languages
}

/// Keep only hits in `language`.
pub fn retain_language(results: &mut Vec<SubtitleCandidate>, language: &str) {
    results.retain(|c| c.attributes.language == language);
}
