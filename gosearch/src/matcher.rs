use regex::Regex;

use crate::config::Config;
use crate::errors::SearchResult;

/// A `[start, end)` byte interval into a line where the pattern matched.
///
/// Offsets always refer to the original line, even under case folding,
/// and satisfy `start <= end <= line.len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRange {
    pub start: usize,
    pub end: usize,
}

/// Compiled match strategy shared read-only by all CPU workers.
///
/// Built once from the configuration before the pipeline starts. The
/// literal variant scans for a substring with optional ASCII case
/// folding and whole-word boundaries; the regex variant delegates to a
/// pre-compiled [`Regex`].
#[derive(Debug)]
pub enum MatchStrategy {
    Literal {
        needle: Vec<u8>,
        ignore_case: bool,
        whole_word: bool,
    },
    Regex(Regex),
}

impl MatchStrategy {
    /// Compiles the strategy selected by the configuration.
    pub fn from_config(cfg: &Config) -> SearchResult<Self> {
        if cfg.use_regex {
            Self::regex(&cfg.pattern, cfg.ignore_case, cfg.whole_word)
        } else {
            Ok(Self::literal(&cfg.pattern, cfg.ignore_case, cfg.whole_word))
        }
    }

    /// Builds a literal-substring strategy.
    ///
    /// Case folding is ASCII-only so folded offsets map byte-for-byte
    /// onto the original line.
    pub fn literal(pattern: &str, ignore_case: bool, whole_word: bool) -> Self {
        let needle = if ignore_case {
            pattern.bytes().map(|b| b.to_ascii_lowercase()).collect()
        } else {
            pattern.as_bytes().to_vec()
        };
        MatchStrategy::Literal {
            needle,
            ignore_case,
            whole_word,
        }
    }

    /// Compiles a regex strategy. Whole-word wraps the pattern in `\b`
    /// anchors; ignore-case prepends the `(?i)` flag. A pattern that
    /// fails to compile is a fatal setup error.
    pub fn regex(pattern: &str, ignore_case: bool, whole_word: bool) -> SearchResult<Self> {
        let mut source = if whole_word {
            format!(r"\b(?:{pattern})\b")
        } else {
            pattern.to_string()
        };
        if ignore_case {
            source = format!("(?i){source}");
        }
        Ok(MatchStrategy::Regex(Regex::new(&source)?))
    }

    /// Returns all accepted match ranges for `line`, in ascending start
    /// order and non-overlapping: an accepted match advances the search
    /// cursor past its end.
    pub fn find_ranges(&self, line: &str) -> Vec<MatchRange> {
        match self {
            MatchStrategy::Literal {
                needle,
                ignore_case,
                whole_word,
            } => find_literal_ranges(line, needle, *ignore_case, *whole_word),
            MatchStrategy::Regex(re) => re
                .find_iter(line)
                .map(|m| MatchRange {
                    start: m.start(),
                    end: m.end(),
                })
                .collect(),
        }
    }
}

fn find_literal_ranges(
    line: &str,
    needle: &[u8],
    ignore_case: bool,
    whole_word: bool,
) -> Vec<MatchRange> {
    if needle.is_empty() {
        return Vec::new();
    }

    let original = line.as_bytes();
    let folded;
    let haystack: &[u8] = if ignore_case {
        folded = original
            .iter()
            .map(|b| b.to_ascii_lowercase())
            .collect::<Vec<u8>>();
        &folded
    } else {
        original
    };

    let mut ranges = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = find_from(haystack, needle, search_from) {
        let start = offset;
        let end = start + needle.len();
        if !whole_word || is_whole_word_match(original, start, end) {
            ranges.push(MatchRange { start, end });
            search_from = end;
        } else {
            search_from = start + 1;
        }
    }

    ranges
}

// Byte-level scan: avoids slicing the str at non-boundary offsets when
// the rejection path advances the cursor by a single byte.
fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn is_whole_word_match(line: &[u8], start: usize, end: usize) -> bool {
    let left_boundary = start == 0 || !is_word_byte(line[start - 1]);
    let right_boundary = end == line.len() || !is_word_byte(line[end]);
    left_boundary && right_boundary
}

fn is_word_byte(value: u8) -> bool {
    value.is_ascii_alphanumeric() || value == b'_'
}
