//! Identity resolution.
//!
//! A file's identity is decided by the top-ranked subtitle search hit: its
//! feature details say whether the file is a movie or an episode, and carry
//! the IMDb ids used for the metadata lookup. Filename data only fills gaps.
//!
//! Lookups run as an ordered list of strategies. The first one that succeeds
//! wins; failures are accumulated into one message. The identity is stamped
//! on the outcome either way, so the organizer can group a file even when
//! every lookup failed.

use subseek_api::opensubtitles::types::{ImdbRef, SearchParams, SubtitleCandidate};
use subseek_api::{MediaDetails, MediaKind, MetadataService, SubtitleService};
use subseek_parse::MovieInfo;

use crate::models::{EntityKind, FilePatch, Identity, ResolvedMetadata};

/// Canonical `tt` + seven-digit IMDb id.
///
/// Numbers are zero-padded, digit strings are zero-padded and prefixed, and
/// strings already starting with `tt` pass through. Zero, empty and
/// non-numeric values are not ids.
pub fn normalize_imdb_id(id: &ImdbRef) -> Option<String> {
    match id {
        ImdbRef::Number(0) => None,
        ImdbRef::Number(n) => Some(format!("tt{n:07}")),
        ImdbRef::Text(s) => {
            let s = s.trim();
            if s.starts_with("tt") && s.len() > 2 {
                Some(s.to_string())
            } else if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                Some(format!("tt{s:0>7}"))
            } else {
                None
            }
        }
    }
}

fn normalize_any<'a>(ids: impl IntoIterator<Item = Option<&'a ImdbRef>>) -> Option<String> {
    ids.into_iter().flatten().find_map(normalize_imdb_id)
}

// ── Identity derivation ──────────────────────────────────────────

/// Build the identity of a file from its top search hit, falling back to
/// the parsed filename for anything the hit leaves out.
pub fn derive_identity(info: &MovieInfo, top: &SubtitleCandidate) -> Identity {
    let attrs = &top.attributes;
    let feature = attrs.feature_details.clone().unwrap_or_default();

    let is_episode = feature
        .feature_type
        .as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("episode"));
    let year = feature.year.or(info.year);

    if is_episode {
        let series_title = non_empty(feature.parent_title.as_deref())
            .unwrap_or(&info.title)
            .to_string();
        let episode_name = feature
            .title
            .as_deref()
            .and_then(|raw| clean_episode_title(raw, &series_title));

        return Identity {
            kind: EntityKind::Episode,
            title: series_title.clone(),
            year,
            series_title: Some(series_title),
            season: feature
                .season_number
                .or(attrs.season_number)
                .or(info.season),
            episode: feature
                .episode_number
                .or(attrs.episode_number)
                .or(info.episode),
            episode_name,
            imdb_id: normalize_any([feature.imdb_id.as_ref()]),
            series_imdb_id: normalize_any([feature.parent_imdb_id.as_ref()]),
        };
    }

    let title = non_empty(feature.title.as_deref())
        .unwrap_or(&info.title)
        .to_string();
    let imdb_id = normalize_any([
        feature.imdb_id.as_ref(),
        feature.parent_imdb_id.as_ref(),
        attrs.imdb_id.as_ref(),
        attrs.imdbid.as_ref(),
        attrs.imdb.as_ref(),
        attrs.parent_id.as_ref(),
    ]);

    Identity {
        kind: EntityKind::from_feature_type(feature.feature_type.as_deref()),
        imdb_id,
        ..Identity::movie(title, year)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Episode titles come as `"Series" Name` or `Series - Name`; keep `Name`.
fn clean_episode_title(raw: &str, series_title: &str) -> Option<String> {
    let mut rest = raw.trim();
    if !series_title.is_empty() {
        let quoted = format!("\"{series_title}\"");
        if let Some(stripped) = strip_prefix_ignore_case(rest, &quoted)
            .or_else(|| strip_prefix_ignore_case(rest, series_title))
        {
            rest = stripped;
        }
    }
    let rest = rest
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '–'))
        .trim()
        .trim_matches('"')
        .trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

// ── Lookup plan ──────────────────────────────────────────────────

/// One way of fetching a metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStrategy {
    EpisodeDetail {
        series_imdb_id: String,
        season: u32,
        episode: u32,
    },
    ImdbId(String),
    TitleYear { title: String, year: Option<u32> },
}

impl LookupStrategy {
    fn label(&self) -> &'static str {
        match self {
            Self::EpisodeDetail { .. } => "episode lookup",
            Self::ImdbId(_) => "IMDb lookup",
            Self::TitleYear { .. } => "title lookup",
        }
    }
}

/// Strategies for an identity, most specific first.
///
/// Episodes with a series id and known numbers try the per-episode endpoint
/// when the provider has one. Any known IMDb id comes next (the series id for
/// episodes), then title and year as the last resort. Episodes are looked up
/// by series title without a year, since the episode's air year rarely
/// matches the series record.
pub fn plan(identity: &Identity, episode_lookup: bool) -> Vec<LookupStrategy> {
    let mut steps = Vec::new();
    let episode = identity.is_episode();

    if episode && episode_lookup {
        if let (Some(series_imdb_id), Some(season), Some(number)) = (
            identity.series_imdb_id.as_ref(),
            identity.season,
            identity.episode,
        ) {
            steps.push(LookupStrategy::EpisodeDetail {
                series_imdb_id: series_imdb_id.clone(),
                season,
                episode: number,
            });
        }
    }

    let lookup_id = if episode {
        identity.series_imdb_id.as_ref().or(identity.imdb_id.as_ref())
    } else {
        identity.imdb_id.as_ref()
    };
    if let Some(id) = lookup_id {
        steps.push(LookupStrategy::ImdbId(id.clone()));
    }

    let title = if episode {
        identity.series_title.as_deref().unwrap_or(&identity.title)
    } else {
        &identity.title
    };
    if !title.trim().is_empty() {
        steps.push(LookupStrategy::TitleYear {
            title: title.to_string(),
            year: if episode { None } else { identity.year },
        });
    }

    steps
}

// ── Resolver ─────────────────────────────────────────────────────

/// Runs search and metadata lookup for one file at a time.
///
/// The resolver never touches the file store; it returns a [`FilePatch`]
/// that the caller applies by id.
pub struct Resolver<'a, S, M> {
    subtitles: &'a S,
    metadata: &'a M,
    language: &'a str,
}

impl<'a, S: SubtitleService, M: MetadataService> Resolver<'a, S, M> {
    pub fn new(subtitles: &'a S, metadata: &'a M, language: &'a str) -> Self {
        Self {
            subtitles,
            metadata,
            language,
        }
    }

    /// Search subtitles for a parsed filename and resolve its metadata.
    ///
    /// The patch always replaces the results and the metadata record, so a
    /// re-resolution never leaves the previous outcome behind.
    #[tracing::instrument(skip_all, fields(file = %info.original))]
    pub async fn resolve(&self, info: &MovieInfo) -> FilePatch {
        // An empty title still searches; it just tends to find nothing.
        let params = SearchParams {
            query: Some(info.title.clone()),
            languages: (!self.language.is_empty()).then(|| self.language.to_string()),
            year: info.year,
            ..Default::default()
        };

        let results = match self.subtitles.search_subtitles(&params).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Subtitle search failed");
                return FilePatch {
                    search_results: Some(Vec::new()),
                    metadata: Some(None),
                    processed: Some(true),
                    error: Some(Some(e.to_string())),
                };
            }
        };

        let Some(top) = results.first() else {
            tracing::debug!("No subtitles found");
            return FilePatch {
                search_results: Some(results),
                metadata: Some(None),
                processed: Some(true),
                error: Some(None),
            };
        };

        let identity = derive_identity(info, top);
        tracing::debug!(
            kind = %identity.kind,
            title = %identity.title,
            imdb = ?identity.imdb_id,
            results = results.len(),
            "Identity derived from top result"
        );
        let metadata = self.lookup(identity).await;

        FilePatch {
            search_results: Some(results),
            metadata: Some(Some(metadata)),
            processed: Some(true),
            error: Some(None),
        }
    }

    /// Fetch the metadata record for an identity, trying each planned
    /// strategy in turn.
    pub async fn lookup(&self, mut identity: Identity) -> ResolvedMetadata {
        let steps = plan(&identity, self.metadata.supports_episode_lookup());
        if steps.is_empty() {
            return ResolvedMetadata::failed("No title or IMDb id to look up", identity);
        }

        let mut errors = Vec::new();
        for step in &steps {
            match self.run(step).await {
                Ok(details) => {
                    let details = annotate(details, &mut identity);
                    tracing::debug!(strategy = step.label(), title = %details.title, "Metadata resolved");
                    return ResolvedMetadata::found(details, identity);
                }
                Err(e) => {
                    tracing::warn!(strategy = step.label(), error = %e, "Metadata lookup failed");
                    errors.push(format!("{}: {e}", step.label()));
                }
            }
        }

        ResolvedMetadata::failed(errors.join("; "), identity)
    }

    async fn run(&self, step: &LookupStrategy) -> Result<MediaDetails, M::Error> {
        match step {
            LookupStrategy::EpisodeDetail {
                series_imdb_id,
                season,
                episode,
            } => self.metadata.episode(series_imdb_id, *season, *episode).await,
            LookupStrategy::ImdbId(id) => self.metadata.by_imdb_id(id).await,
            LookupStrategy::TitleYear { title, year } => self.metadata.by_title(title, *year).await,
        }
    }
}

/// Cross-fill episode records and the identity: the record gets the series
/// title, the identity gets the provider's episode name when it had none.
fn annotate(mut details: MediaDetails, identity: &mut Identity) -> MediaDetails {
    if let MediaKind::Episode {
        series_title,
        episode_name,
        ..
    } = &mut details.kind
    {
        if series_title.is_none() {
            series_title.clone_from(&identity.series_title);
        }
        if identity.episode_name.is_none() {
            identity.episode_name.clone_from(episode_name);
        }
    }
    details
}
