//! Presentation grouping of resolved files.
//!
//! [`organize`] is a pure function of the current file list and is meant to
//! be re-run on every change. Groups borrow from the input.

use std::collections::{BTreeMap, HashSet};

use crate::models::{EntityKind, UploadedFile};
use crate::normalize;

pub use crate::normalize::{looks_like_sequel, movie_series_key, sequel_number};

/// All files of one TV series, bucketed by season.
#[derive(Debug, Clone)]
pub struct SeriesGroup<'a> {
    pub key: String,
    /// Series title as reported for the first file of the group.
    pub title: String,
    /// Season number to episodes, each season sorted by episode number.
    pub seasons: BTreeMap<u32, Vec<&'a UploadedFile>>,
}

impl<'a> SeriesGroup<'a> {
    pub fn season_count(&self) -> usize {
        self.seasons.len()
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.values().map(Vec::len).sum()
    }

    pub fn files(&self) -> impl Iterator<Item = &'a UploadedFile> + '_ {
        self.seasons.values().flatten().copied()
    }
}

/// Movies sharing a franchise key.
#[derive(Debug, Clone)]
pub struct MovieGroup<'a> {
    pub key: String,
    pub display_title: String,
    pub is_sequel_series: bool,
    /// Sorted by sequel number, then year.
    pub files: Vec<&'a UploadedFile>,
}

#[derive(Debug, Clone, Default)]
pub struct Collections<'a> {
    pub series: BTreeMap<String, SeriesGroup<'a>>,
    pub movies: BTreeMap<String, MovieGroup<'a>>,
    /// Everything not in a retained group, in input order.
    pub ungrouped: Vec<&'a UploadedFile>,
}

/// Group files into series, movie franchises and the rest.
///
/// Groups with a single file are not kept; their file lands in `ungrouped`.
pub fn organize<'a>(files: impl IntoIterator<Item = &'a UploadedFile>) -> Collections<'a> {
    let files: Vec<&'a UploadedFile> = files.into_iter().collect();
    let mut series: BTreeMap<String, SeriesGroup<'a>> = BTreeMap::new();
    let mut movies: BTreeMap<String, MovieGroup<'a>> = BTreeMap::new();

    for &file in &files {
        let Some(meta) = &file.metadata else {
            continue;
        };
        match meta.kind() {
            EntityKind::Episode => {
                let Some(series_title) = meta
                    .identity
                    .series_title
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                else {
                    continue;
                };
                let key = series_key(series_title);
                let group = series.entry(key.clone()).or_insert_with(|| SeriesGroup {
                    key,
                    title: series_title.trim().to_string(),
                    seasons: BTreeMap::new(),
                });
                let season = meta.identity.season.unwrap_or(1);
                group.seasons.entry(season).or_default().push(file);
            }
            EntityKind::Movie => {
                let title = meta.title();
                let key = movie_series_key(title);
                if key.is_empty() {
                    continue;
                }
                let group = movies.entry(key.clone()).or_insert_with(|| MovieGroup {
                    key,
                    display_title: movie_display_title(title),
                    is_sequel_series: looks_like_sequel(title),
                    files: Vec::new(),
                });
                group.files.push(file);
            }
            _ => {}
        }
    }

    series.retain(|_, group| group.episode_count() > 1);
    for group in series.values_mut() {
        for episodes in group.seasons.values_mut() {
            episodes.sort_by_key(|f| episode_number(f));
        }
    }

    movies.retain(|_, group| group.files.len() > 1);
    for group in movies.values_mut() {
        group.is_sequel_series = true;
        group.files.sort_by_key(|f| {
            let meta = f.metadata.as_ref();
            let title = meta.map(|m| m.title()).unwrap_or_default();
            let year = meta.and_then(|m| m.year()).unwrap_or(u32::MAX);
            (sequel_number(title), year)
        });
    }

    let grouped: HashSet<&str> = series
        .values()
        .flat_map(|g| g.files())
        .chain(movies.values().flat_map(|g| g.files.iter().copied()))
        .map(|f| f.id.as_str())
        .collect();
    let ungrouped = files
        .into_iter()
        .filter(|f| !grouped.contains(f.id.as_str()))
        .collect();

    Collections {
        series,
        movies,
        ungrouped,
    }
}

/// Grouping key for a series title.
pub fn series_key(series_title: &str) -> String {
    series_title.trim().to_lowercase()
}

/// Heading for a movie franchise: the part before the first colon, or the
/// title without its sequel markers.
pub fn movie_display_title(title: &str) -> String {
    if let Some((head, _)) = title.split_once(':') {
        let head = head.trim();
        if !head.is_empty() {
            return head.to_string();
        }
    }
    let stripped = normalize::strip_sequel_markers(title);
    let stripped = stripped.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if stripped.is_empty() {
        title.trim().to_string()
    } else {
        stripped.to_string()
    }
}

fn episode_number(file: &UploadedFile) -> u32 {
    file.metadata
        .as_ref()
        .and_then(|m| m.identity.episode)
        .unwrap_or(0)
}

/// Ids of every file in a series group, for bulk removal.
pub fn series_group_ids<'a>(
    files: impl IntoIterator<Item = &'a UploadedFile>,
    key: &str,
) -> Vec<String> {
    organize(files)
        .series
        .get(key)
        .map(|g| g.files().map(|f| f.id.clone()).collect())
        .unwrap_or_default()
}

/// Ids of every file in a movie group, for bulk removal.
pub fn movie_group_ids<'a>(
    files: impl IntoIterator<Item = &'a UploadedFile>,
    key: &str,
) -> Vec<String> {
    organize(files)
        .movies
        .get(key)
        .map(|g| g.files.iter().map(|f| f.id.clone()).collect())
        .unwrap_or_default()
}
