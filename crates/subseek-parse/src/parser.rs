use std::sync::LazyLock;

use regex::Regex;

use crate::elements::MovieInfo;
use crate::keyword;

static RE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([A-Za-z0-9]{2,4})$").unwrap());

static RE_PAREN_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());

static RE_BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

static RE_BARE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:19|20)\d{2}$").unwrap());

/// `S01E02`, `s1e2`, `S01E02E03`.
static RE_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^s(\d{1,2})e(\d{1,3})(?:e\d{1,3})*$").unwrap());

/// `1x02`, `10x113`.
static RE_CROSS_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2})x(\d{2,3})$").unwrap());

/// `tt0133093`, optionally inside an IMDb title URL.
static RE_IMDB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:imdb\.com/title/)?tt(\d+)").unwrap());

static RE_QUERY_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// Parse a video filename into a best-guess title/year/season/episode.
///
/// Pure and deterministic. Re-parsing the returned title yields the same title.
///
/// # Example
/// ```
/// let info = subseek_parse::parse("The.Matrix.1999.1080p.BluRay.x264.mkv");
/// assert_eq!(info.title, "The Matrix");
/// assert_eq!(info.year, Some(1999));
/// ```
pub fn parse(filename: &str) -> MovieInfo {
    let mut info = MovieInfo {
        original: filename.to_string(),
        ..Default::default()
    };

    let mut working = strip_extension(filename).to_string();

    // A parenthesised year always wins over a bare one.
    if let Some(caps) = RE_PAREN_YEAR.captures(&working) {
        info.year = caps[1].parse().ok();
        working = RE_PAREN_YEAR.replace(&working, " ").into_owned();
    }
    working = RE_BRACKETED.replace_all(&working, " ").into_owned();

    // Scene names use `.` or `_` between words; a title never does.
    let scene_name = working.contains(['.', '_']);
    let tokens: Vec<&str> = working
        .split(|c: char| matches!(c, '.' | '_' | '-') || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let mut title_tokens: Vec<&str> = Vec::new();
    let mut title_done = false;
    for (i, &token) in tokens.iter().enumerate() {
        if let Some((season, episode)) = season_episode(token) {
            info.season = Some(season);
            info.episode = Some(episode);
            break;
        }
        if title_done {
            continue;
        }
        if info.year.is_none()
            && !title_tokens.is_empty()
            && RE_BARE_YEAR.is_match(token)
            && ends_title(tokens.get(i + 1).copied(), scene_name)
        {
            // Keep scanning: an episode marker may still follow.
            info.year = token.parse().ok();
            title_done = true;
            continue;
        }
        if keyword::is_noise(token, !title_tokens.is_empty()) {
            continue;
        }
        title_tokens.push(token);
    }

    info.title = title_tokens.join(" ");
    tracing::trace!(filename, title = %info.title, year = ?info.year, "Parsed filename");
    info
}

/// Whether a bare year followed by `next` closes the title. A year inside a
/// plain title ("Blade Runner 2049") is part of the name.
fn ends_title(next: Option<&str>, scene_name: bool) -> bool {
    match next {
        None => scene_name,
        Some(next) => keyword::lookup(next).is_some() || season_episode(next).is_some(),
    }
}

/// Remove a trailing `.ext` when it looks like a real extension
/// (2–4 alphanumerics, at least one letter).
fn strip_extension(filename: &str) -> &str {
    match RE_EXTENSION.captures(filename) {
        Some(caps) if caps[1].chars().any(|c| c.is_ascii_alphabetic()) => {
            &filename[..filename.len() - caps[0].len()]
        }
        _ => filename,
    }
}

fn season_episode(token: &str) -> Option<(u32, u32)> {
    let caps = RE_SEASON_EPISODE
        .captures(token)
        .or_else(|| RE_CROSS_EPISODE.captures(token))?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Normalize free text typed into a manual search box.
pub fn clean_search_query(query: &str) -> String {
    RE_QUERY_NOISE
        .replace_all(query.trim(), " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pull the numeric IMDb id out of `tt0133093` or an IMDb title URL.
pub fn extract_imdb_id(input: &str) -> Option<u64> {
    RE_IMDB_ID.captures(input)?[1].parse().ok()
}
