use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::warn;

/// Ignore files consulted in each visited directory, in load order.
const IGNORE_FILE_NAMES: [&str; 2] = [".gitignore", ".gosearchignore"];

/// A single parsed ignore pattern, anchored to the directory of the
/// file where it was declared.
///
/// Rules are carried down by value into child directory frames, so a
/// directory's effective set is its ancestors' rules followed by its
/// own. Evaluation is last-match-wins: a later `!pattern` re-includes a
/// path excluded by an earlier rule.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    /// Directory containing the ignore file this rule came from.
    pub base_dir: PathBuf,
    /// Pattern text with `!` / trailing `/` markers stripped.
    pub pattern: String,
    /// Leading `!`: a match re-includes instead of excluding.
    pub negate: bool,
    /// Trailing `/`: the rule only applies to directories.
    pub dir_only: bool,
    /// Pattern contains `/`: matched against the path relative to
    /// `base_dir` rather than against individual name segments.
    pub has_path: bool,
}

/// Parses one ignore-file line into a rule, or `None` for blanks and
/// comments.
fn parse_rule_line(line: &str, base_dir: &Path) -> Option<IgnoreRule> {
    let mut text = line.trim();
    if text.is_empty() || text.starts_with('#') {
        return None;
    }

    let negate = text.starts_with('!');
    if negate {
        text = &text[1..];
    }

    let dir_only = text.ends_with('/');
    if dir_only {
        text = text.trim_end_matches('/');
    }

    if text.is_empty() {
        return None;
    }

    // `**` is collapsed to `*`; full globstar semantics are not
    // supported.
    let pattern = text.replace("**", "*");
    let has_path = pattern.contains('/');

    Some(IgnoreRule {
        base_dir: base_dir.to_path_buf(),
        pattern,
        negate,
        dir_only,
        has_path,
    })
}

/// Loads the ignore rules declared directly in `dir`.
///
/// Read failures are logged and yield an empty set; a broken ignore
/// file never aborts the run.
pub fn load_dir_rules(dir: &Path) -> Vec<IgnoreRule> {
    let mut rules = Vec::new();
    for name in IGNORE_FILE_NAMES {
        let file = dir.join(name);
        if !file.is_file() {
            continue;
        }
        match fs::read_to_string(&file) {
            Ok(contents) => {
                rules.extend(
                    contents
                        .lines()
                        .filter_map(|line| parse_rule_line(line, dir)),
                );
            }
            Err(err) => warn!("failed to read {}: {}", file.display(), err),
        }
    }
    rules
}

/// Decides whether `path` should be pruned.
///
/// Directories whose lowercased basename is in `ignored_dirs` are
/// excluded unconditionally, short-circuiting any negation further down
/// the rule list. Everything else folds over the rules in declaration
/// order and the last matching rule wins.
pub fn is_ignored(
    ignored_dirs: &HashSet<String>,
    rules: &[IgnoreRule],
    path: &Path,
    is_dir: bool,
) -> bool {
    if is_dir {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if ignored_dirs.contains(&name.to_lowercase()) {
                return true;
            }
        }
    }

    let mut ignored = false;
    for rule in rules {
        if rule.dir_only && !is_dir {
            continue;
        }
        let Some(rel) = relative_to(path, &rule.base_dir) else {
            continue;
        };
        if rel.is_empty() {
            continue;
        }
        if rule_match(rule, &rel) {
            ignored = !rule.negate;
        }
    }
    ignored
}

/// Path relative to `base` in forward-slash form, or `None` when the
/// path is not under `base`.
fn relative_to(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let text = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(text)
}

/// Matches a single rule against a relative path.
///
/// Path rules (`has_path`) match the whole relative path as a glob, or
/// any path beneath the pattern treated as a directory prefix.
/// Name-only rules match any slash-separated segment. Malformed glob
/// patterns never match.
pub fn rule_match(rule: &IgnoreRule, rel: &str) -> bool {
    if rule.has_path {
        if glob_matches(&rule.pattern, rel) {
            return true;
        }
        let prefix = rule.pattern.trim_end_matches('/');
        return rel.starts_with(&format!("{prefix}/"));
    }

    rel.split('/').any(|segment| glob_matches(&rule.pattern, segment))
}

fn glob_matches(pattern: &str, candidate: &str) -> bool {
    // Shell-style matching: `*` and `?` stop at path separators, so a
    // path rule matches one level unless its directory prefix applies.
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(candidate, OPTIONS),
        Err(_) => false,
    }
}
