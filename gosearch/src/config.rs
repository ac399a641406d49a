use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, File, FileFormat};
use serde::Deserialize;

use crate::errors::{SearchError, SearchResult};

/// Directory basenames pruned unconditionally, merged with the user's
/// exclude set.
pub const DEFAULT_IGNORED_DIRS: [&str; 3] = [".git", "node_modules", "vendor"];

/// Output mode for the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl OutputFormat {
    pub fn parse(text: &str) -> SearchResult<Self> {
        match text.trim().to_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            other => Err(SearchError::config_error(format!(
                "format must be plain or json, got {other:?}"
            ))),
        }
    }
}

/// Immutable search configuration shared by reference across all
/// pipeline stages.
///
/// Worker counts and the channel capacity may be left at `0` and are
/// derived from `workers` by [`Config::resolve`], which also validates
/// the numeric bounds and the root path. Nothing mutates a `Config`
/// after that point.
#[derive(Debug, Clone)]
pub struct Config {
    pub pattern: String,
    pub root_path: PathBuf,
    pub ignore_case: bool,
    pub show_line_numbers: bool,
    pub whole_word: bool,
    pub use_regex: bool,
    pub follow_symlinks: bool,
    pub count_only: bool,
    pub quiet: bool,
    pub color: bool,
    pub abs_paths: bool,
    /// Base worker count; the split counts derive from it.
    pub workers: usize,
    /// I/O worker count; 0 = `max(1, workers / 2)`.
    pub io_workers: usize,
    /// CPU worker count; 0 = `max(1, workers)`.
    pub cpu_workers: usize,
    /// Scaler ceiling; 0 = `cpu_workers * 2`, must end up >= `cpu_workers`.
    pub max_workers: usize,
    /// Channel capacity; 0 = `max(1, workers * 8)`.
    pub backpressure: usize,
    pub dynamic_workers: bool,
    /// Maximum file size in bytes; 0 = no limit.
    pub max_size_bytes: u64,
    /// Maximum traversal depth below the root; -1 = unlimited.
    pub max_depth: i64,
    /// Allowed extensions (lowercase, leading dot); empty = all files.
    pub extensions: HashSet<String>,
    /// Default-ignored directory basenames plus user exclusions.
    pub ignored_dirs: HashSet<String>,
    pub output_format: OutputFormat,
    /// Emit phase timings and worker counters at the end of the run.
    pub metrics: bool,
}

impl Config {
    /// A configuration with the original tool's defaults; callers set
    /// fields and then run [`Config::resolve`].
    pub fn new(pattern: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Config {
            pattern: pattern.into(),
            root_path: root_path.into(),
            ignore_case: false,
            show_line_numbers: true,
            whole_word: false,
            use_regex: false,
            follow_symlinks: false,
            count_only: false,
            quiet: false,
            color: false,
            abs_paths: false,
            workers: num_cpus::get(),
            io_workers: 0,
            cpu_workers: 0,
            max_workers: 0,
            backpressure: 0,
            dynamic_workers: false,
            max_size_bytes: 0,
            max_depth: -1,
            extensions: HashSet::new(),
            ignored_dirs: default_ignored_dirs(),
            output_format: OutputFormat::Plain,
            metrics: false,
        }
    }

    /// Validates the configuration and derives the worker counts that
    /// were left at their auto value.
    pub fn resolve(mut self) -> SearchResult<Self> {
        self.pattern = self.pattern.trim().to_string();
        if self.pattern.is_empty() {
            return Err(SearchError::config_error("pattern must be non-empty"));
        }
        if !self.root_path.is_dir() {
            return Err(SearchError::config_error(
                "path must be a readable directory",
            ));
        }
        if self.workers < 1 {
            return Err(SearchError::config_error("workers must be at least 1"));
        }
        if self.max_depth < -1 {
            return Err(SearchError::config_error("max-depth must be >= -1"));
        }

        if self.io_workers == 0 {
            self.io_workers = (self.workers / 2).max(1);
        }
        if self.cpu_workers == 0 {
            self.cpu_workers = self.workers.max(1);
        }
        if self.max_workers == 0 {
            self.max_workers = self.cpu_workers * 2;
        }
        if self.max_workers < self.cpu_workers {
            return Err(SearchError::config_error(
                "max-workers must be >= cpu-workers",
            ));
        }
        if self.backpressure == 0 {
            self.backpressure = (self.workers * 8).max(1);
        }

        Ok(self)
    }
}

fn default_ignored_dirs() -> HashSet<String> {
    DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect()
}

/// Parses a size with an optional `B`/`KB`/`MB`/`GB` suffix into bytes.
/// Empty input means no limit.
pub fn parse_size(input: &str) -> SearchResult<u64> {
    let mut text = input.trim().to_uppercase();
    if text.is_empty() {
        return Ok(0);
    }

    let mut multiplier: u64 = 1;
    for (token, scale) in [
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ] {
        if let Some(stripped) = text.strip_suffix(token) {
            text = stripped.trim().to_string();
            multiplier = scale;
            break;
        }
    }

    let value: u64 = text
        .parse()
        .map_err(|_| SearchError::config_error("invalid -max-size value"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| SearchError::config_error("invalid -max-size value"))
}

/// Splits a comma-separated extension list into a lowercase set with
/// leading dots (`go,.MD` becomes `{".go", ".md"}`).
pub fn parse_extension_set(input: &str) -> HashSet<String> {
    input
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .map(|item| {
            if item.starts_with('.') {
                item
            } else {
                format!(".{item}")
            }
        })
        .collect()
}

/// Splits a comma-separated directory-name list into a lowercase set.
pub fn parse_dir_set(input: &str) -> HashSet<String> {
    input
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Optional JSON config file with lowercase-snake keys mirroring the
/// flags. Values act as defaults; explicit flags always win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub ignore_case: Option<bool>,
    pub line_numbers: Option<bool>,
    pub whole_word: Option<bool>,
    pub regex: Option<bool>,
    pub workers: Option<usize>,
    pub io_workers: Option<usize>,
    pub cpu_workers: Option<usize>,
    pub max_workers: Option<usize>,
    pub backpressure: Option<usize>,
    pub dynamic_workers: Option<bool>,
    pub max_size: Option<String>,
    pub extensions: Option<String>,
    pub exclude_dirs: Option<String>,
    pub max_depth: Option<i64>,
    pub follow_symlinks: Option<bool>,
    pub count: Option<bool>,
    pub quiet: Option<bool>,
    pub color: Option<bool>,
    pub abs: Option<bool>,
    pub format: Option<String>,
    pub metrics: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> SearchResult<Self> {
        ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Json))
            .build()
            .map_err(|e| SearchError::config_error(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SearchError::config_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_size_accepts_suffixes() {
        assert_eq!(parse_size("").unwrap(), 0);
        assert_eq!(parse_size("1").unwrap(), 1);
        assert_eq!(parse_size("128KB").unwrap(), 128 * 1024);
        assert_eq!(parse_size("2MB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("3GB").unwrap(), 3 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("10 B").unwrap(), 10);
        assert_eq!(parse_size("128kb").unwrap(), 128 * 1024);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("-1").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("1.5MB").is_err());
    }

    #[test]
    fn test_extension_set_normalization() {
        let set = parse_extension_set(".Go, md ,,TXT");
        assert_eq!(set.len(), 3);
        assert!(set.contains(".go"));
        assert!(set.contains(".md"));
        assert!(set.contains(".txt"));
    }

    #[test]
    fn test_dir_set_lowercases_names() {
        let set = parse_dir_set("Vendor, target");
        assert!(set.contains("vendor"));
        assert!(set.contains("target"));
        assert!(!set.contains("Vendor"));
    }

    #[test]
    fn test_resolve_derives_worker_counts() {
        let dir = tempdir().unwrap();
        let mut cfg = Config::new("needle", dir.path());
        cfg.workers = 8;
        let cfg = cfg.resolve().unwrap();

        assert_eq!(cfg.io_workers, 4);
        assert_eq!(cfg.cpu_workers, 8);
        assert_eq!(cfg.max_workers, 16);
        assert_eq!(cfg.backpressure, 64);
    }

    #[test]
    fn test_resolve_keeps_explicit_counts() {
        let dir = tempdir().unwrap();
        let mut cfg = Config::new("needle", dir.path());
        cfg.workers = 4;
        cfg.io_workers = 1;
        cfg.cpu_workers = 2;
        cfg.max_workers = 3;
        cfg.backpressure = 5;
        let cfg = cfg.resolve().unwrap();

        assert_eq!(cfg.io_workers, 1);
        assert_eq!(cfg.cpu_workers, 2);
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.backpressure, 5);
    }

    #[test]
    fn test_resolve_rejects_bad_bounds() {
        let dir = tempdir().unwrap();

        let mut cfg = Config::new("needle", dir.path());
        cfg.workers = 0;
        assert!(cfg.resolve().is_err());

        let mut cfg = Config::new("needle", dir.path());
        cfg.cpu_workers = 8;
        cfg.max_workers = 2;
        assert!(cfg.resolve().is_err());

        let mut cfg = Config::new("needle", dir.path());
        cfg.max_depth = -2;
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn test_resolve_rejects_blank_pattern_and_bad_root() {
        let dir = tempdir().unwrap();
        assert!(Config::new("   ", dir.path()).resolve().is_err());
        assert!(Config::new("needle", dir.path().join("missing"))
            .resolve()
            .is_err());
    }

    #[test]
    fn test_default_ignored_dirs_merge_with_user_set() {
        let dir = tempdir().unwrap();
        let mut cfg = Config::new("needle", dir.path());
        cfg.ignored_dirs.extend(parse_dir_set("Dist,build"));
        let cfg = cfg.resolve().unwrap();

        for name in [".git", "node_modules", "vendor", "dist", "build"] {
            assert!(cfg.ignored_dirs.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::parse("plain").unwrap(), OutputFormat::Plain);
        assert_eq!(OutputFormat::parse(" JSON ").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("yaml").is_err());
    }

    #[test]
    fn test_file_config_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gosearch.json");
        fs::write(
            &path,
            r#"{
                "ignore_case": true,
                "workers": 4,
                "max_size": "1MB",
                "extensions": ".go,.md",
                "format": "json",
                "dynamic_workers": true
            }"#,
        )
        .unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.ignore_case, Some(true));
        assert_eq!(file.workers, Some(4));
        assert_eq!(file.max_size.as_deref(), Some("1MB"));
        assert_eq!(file.format.as_deref(), Some("json"));
        assert_eq!(file.dynamic_workers, Some(true));
        assert!(file.quiet.is_none());
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gosearch.json");
        fs::write(&path, r#"{"not_a_key": 1}"#).unwrap();
        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn test_file_config_missing_file_is_an_error() {
        assert!(FileConfig::load(Path::new("no-such-config.json")).is_err());
    }
}
