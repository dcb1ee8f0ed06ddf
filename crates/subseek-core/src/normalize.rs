//! Title normalization for movie-franchise grouping.
//!
//! A title is folded (Unicode NFKC, lower case, common character
//! substitutions), stripped of sequel markers and punctuation, and
//! whitespace-collapsed. Titles of one franchise end up on the same key:
//! `"Alien 3"` and `"Alien"` both become `"alien"`.

use unicode_normalization::UnicodeNormalization;

/// Words that, followed by a number, mark an installment.
const SEQUEL_WORDS: &[&str] = &["part", "chapter", "volume", "episode", "movie"];

/// Words that mark an installment on their own in the sequel heuristic.
const INSTALLMENT_WORDS: &[&str] = &["part", "chapter", "volume"];

const ROMAN_NUMERALS: &[(&str, u32)] = &[
    ("i", 1),
    ("ii", 2),
    ("iii", 3),
    ("iv", 4),
    ("v", 5),
    ("vi", 6),
    ("vii", 7),
    ("viii", 8),
    ("ix", 9),
    ("x", 10),
];

/// Grouping key for a movie title.
///
/// Falls back to the folded title when stripping would leave nothing
/// (`"1917"`, `"300"`), so number-only titles never share an empty key.
pub fn movie_series_key(title: &str) -> String {
    let folded = fold(title);
    let key = collapse_whitespace(&erase_punctuation(&strip_sequel_markers(&folded)));
    if key.is_empty() {
        collapse_whitespace(&erase_punctuation(&folded))
    } else {
        key
    }
}

/// Installment number of a title, 0 when none is recognizable.
///
/// Checked in order: a sequel word followed by a number (`Part 2`,
/// `Chapter IV`), a standalone roman numeral II–X, the first integer
/// anywhere in the title.
pub fn sequel_number(title: &str) -> u32 {
    let folded = fold(title);
    let words: Vec<&str> = folded.split_whitespace().map(bare).collect();

    for (i, word) in words.iter().enumerate() {
        if SEQUEL_WORDS.contains(word) {
            if let Some(n) = words.get(i + 1).and_then(|next| number_or_roman(next)) {
                return n;
            }
        }
        if let Some(n) = glued_marker(word) {
            return n;
        }
    }

    if let Some(n) = words
        .iter()
        .filter_map(|w| roman_value(w))
        .find(|n| (2..=10).contains(n))
    {
        return n;
    }

    first_integer(&folded).unwrap_or(0)
}

/// Whether a title alone looks like part of a franchise: an installment
/// word, a roman numeral I–X, any digit, or a colon.
pub fn looks_like_sequel(title: &str) -> bool {
    if title.contains(':') || title.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    fold(title).split_whitespace().map(bare).any(|w| {
        INSTALLMENT_WORDS.contains(&w) || glued_marker(w).is_some() || roman_value(w).is_some()
    })
}

/// Drop sequel markers word by word, keeping the case of what remains.
pub fn strip_sequel_markers(s: &str) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let core = bare(words[i]).to_lowercase();

        if SEQUEL_WORDS.contains(&core.as_str()) {
            let next_is_number = words
                .get(i + 1)
                .is_some_and(|next| number_or_roman(&bare(next).to_lowercase()).is_some());
            if next_is_number {
                i += 2;
                continue;
            }
        }

        let is_marker = glued_marker(&core).is_some()
            || is_number(&core)
            || roman_value(&core).is_some_and(|n| n >= 2);
        if !is_marker {
            kept.push(words[i]);
        }
        i += 1;
    }

    kept.join(" ")
}

// ── Folding ──────────────────────────────────────────────────────────

/// NFKC, lower case, and the character substitutions release names use.
pub fn fold(s: &str) -> String {
    transliterate(&s.nfkc().collect::<String>().to_lowercase())
}

fn transliterate(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str(" and "),
            '\u{2019}' | '\u{2018}' | '\u{02BC}' => result.push('\''),
            '\u{201C}' | '\u{201D}' => result.push('"'),
            '\u{2013}' | '\u{2014}' => result.push('-'),
            '\u{00E6}' => result.push_str("ae"),
            '\u{0153}' => result.push_str("oe"),
            '\u{00DF}' => result.push_str("ss"),
            c => result.push(c),
        }
    }
    result
}

fn erase_punctuation(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Word helpers ─────────────────────────────────────────────────────

/// A word without leading/trailing ASCII punctuation (`"3:"` → `"3"`).
fn bare(word: &str) -> &str {
    word.trim_matches(|c: char| c.is_ascii_punctuation())
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

fn roman_value(word: &str) -> Option<u32> {
    ROMAN_NUMERALS
        .iter()
        .find(|(roman, _)| *roman == word)
        .map(|&(_, value)| value)
}

fn number_or_roman(word: &str) -> Option<u32> {
    if is_number(word) {
        word.parse().ok()
    } else {
        roman_value(word)
    }
}

/// `part2`, `chapter3`, `vol`-style markers glued to their number.
fn glued_marker(word: &str) -> Option<u32> {
    SEQUEL_WORDS.iter().find_map(|marker| {
        word.strip_prefix(marker)
            .filter(|rest| is_number(rest))
            .and_then(|rest| rest.parse().ok())
    })
}

fn first_integer(s: &str) -> Option<u32> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
