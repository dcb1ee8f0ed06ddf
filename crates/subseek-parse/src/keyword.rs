use bitflags::bitflags;
use phf::phf_map;

bitflags! {
    /// Flags controlling when a keyword is treated as noise.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeywordFlags: u8 {
        /// Only strip this keyword once a title word has been seen.
        /// Keeps short/common words ("TS", "WEB", "CAM") that open a title.
        const AMBIGUOUS = 0b0000_0001;
    }
}

/// The category a quality/source keyword belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Resolution,
    Source,
    VideoCodec,
    AudioCodec,
    VideoTerm,
    ReleaseInfo,
    Container,
}

/// A keyword entry with its kind and matching flags.
#[derive(Debug, Clone, Copy)]
pub struct KeywordEntry {
    pub kind: KeywordKind,
    pub flags: KeywordFlags,
}

impl KeywordEntry {
    const fn new(kind: KeywordKind) -> Self {
        Self {
            kind,
            flags: KeywordFlags::empty(),
        }
    }

    const fn ambiguous(kind: KeywordKind) -> Self {
        Self {
            kind,
            flags: KeywordFlags::AMBIGUOUS,
        }
    }
}

/// Compile-time table of quality/source tokens stripped from titles.
/// All keys are UPPERCASE for case-insensitive matching.
pub static KEYWORDS: phf::Map<&'static str, KeywordEntry> = phf_map! {
    // ── Resolution ───────────────────────────────────────────────
    "480P" => KeywordEntry::new(KeywordKind::Resolution),
    "576P" => KeywordEntry::new(KeywordKind::Resolution),
    "720P" => KeywordEntry::new(KeywordKind::Resolution),
    "1080P" => KeywordEntry::new(KeywordKind::Resolution),
    "1080I" => KeywordEntry::new(KeywordKind::Resolution),
    "2160P" => KeywordEntry::new(KeywordKind::Resolution),
    "4K" => KeywordEntry::new(KeywordKind::Resolution),
    "UHD" => KeywordEntry::new(KeywordKind::Resolution),
    "FHD" => KeywordEntry::new(KeywordKind::Resolution),

    // ── Source ────────────────────────────────────────────────────
    "BLURAY" => KeywordEntry::new(KeywordKind::Source),
    "BDRIP" => KeywordEntry::new(KeywordKind::Source),
    "BRRIP" => KeywordEntry::new(KeywordKind::Source),
    "BDREMUX" => KeywordEntry::new(KeywordKind::Source),
    "WEBRIP" => KeywordEntry::new(KeywordKind::Source),
    "WEBDL" => KeywordEntry::new(KeywordKind::Source),
    "WEB" => KeywordEntry::ambiguous(KeywordKind::Source),
    "DL" => KeywordEntry::ambiguous(KeywordKind::Source),
    "DVDRIP" => KeywordEntry::new(KeywordKind::Source),
    "DVDSCR" => KeywordEntry::new(KeywordKind::Source),
    "HDTV" => KeywordEntry::new(KeywordKind::Source),
    "PDTV" => KeywordEntry::new(KeywordKind::Source),
    "HDRIP" => KeywordEntry::new(KeywordKind::Source),
    "HDCAM" => KeywordEntry::new(KeywordKind::Source),
    "CAM" => KeywordEntry::ambiguous(KeywordKind::Source),
    "TS" => KeywordEntry::ambiguous(KeywordKind::Source),
    "AMZN" => KeywordEntry::new(KeywordKind::Source),
    "NF" => KeywordEntry::ambiguous(KeywordKind::Source),
    "DSNP" => KeywordEntry::new(KeywordKind::Source),
    "HMAX" => KeywordEntry::new(KeywordKind::Source),

    // ── Video codecs ─────────────────────────────────────────────
    "X264" => KeywordEntry::new(KeywordKind::VideoCodec),
    "X265" => KeywordEntry::new(KeywordKind::VideoCodec),
    "H264" => KeywordEntry::new(KeywordKind::VideoCodec),
    "H265" => KeywordEntry::new(KeywordKind::VideoCodec),
    "HEVC" => KeywordEntry::new(KeywordKind::VideoCodec),
    "AVC" => KeywordEntry::new(KeywordKind::VideoCodec),
    "AV1" => KeywordEntry::new(KeywordKind::VideoCodec),
    "XVID" => KeywordEntry::new(KeywordKind::VideoCodec),
    "DIVX" => KeywordEntry::new(KeywordKind::VideoCodec),

    // ── Audio codecs ─────────────────────────────────────────────
    "AAC" => KeywordEntry::new(KeywordKind::AudioCodec),
    "AC3" => KeywordEntry::new(KeywordKind::AudioCodec),
    "EAC3" => KeywordEntry::new(KeywordKind::AudioCodec),
    "DTS" => KeywordEntry::new(KeywordKind::AudioCodec),
    "DDP5" => KeywordEntry::new(KeywordKind::AudioCodec),
    "DD5" => KeywordEntry::new(KeywordKind::AudioCodec),
    "TRUEHD" => KeywordEntry::new(KeywordKind::AudioCodec),
    "ATMOS" => KeywordEntry::new(KeywordKind::AudioCodec),
    "FLAC" => KeywordEntry::new(KeywordKind::AudioCodec),

    // ── Video terms ──────────────────────────────────────────────
    "HDR" => KeywordEntry::new(KeywordKind::VideoTerm),
    "HDR10" => KeywordEntry::new(KeywordKind::VideoTerm),
    "10BIT" => KeywordEntry::new(KeywordKind::VideoTerm),
    "REMUX" => KeywordEntry::new(KeywordKind::VideoTerm),

    // ── Release info ─────────────────────────────────────────────
    "PROPER" => KeywordEntry::new(KeywordKind::ReleaseInfo),
    "REPACK" => KeywordEntry::new(KeywordKind::ReleaseInfo),
    "EXTENDED" => KeywordEntry::ambiguous(KeywordKind::ReleaseInfo),
    "UNRATED" => KeywordEntry::ambiguous(KeywordKind::ReleaseInfo),
    "REMASTERED" => KeywordEntry::ambiguous(KeywordKind::ReleaseInfo),
    "MULTI" => KeywordEntry::ambiguous(KeywordKind::ReleaseInfo),

    // ── Container hints ──────────────────────────────────────────
    "MKV" => KeywordEntry::new(KeywordKind::Container),
    "MP4" => KeywordEntry::new(KeywordKind::Container),
    "AVI" => KeywordEntry::new(KeywordKind::Container),
};

/// Video container extensions accepted on intake (lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "m4v", "webm", "ogv", "ts", "mts", "m2ts",
];

/// Look up a keyword (case-insensitive), ignoring flags.
pub fn lookup(s: &str) -> Option<KeywordKind> {
    KEYWORDS.get(s.to_uppercase().as_str()).map(|e| e.kind)
}

/// Whether `token` should be stripped from the title.
///
/// Ambiguous keywords only count once a title word has been collected.
pub fn is_noise(token: &str, title_started: bool) -> bool {
    match KEYWORDS.get(token.to_uppercase().as_str()) {
        Some(entry) => title_started || !entry.flags.contains(KeywordFlags::AMBIGUOUS),
        None => false,
    }
}

/// Whether a filename carries one of the accepted video extensions.
pub fn is_video_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
