use std::io::Write;
use std::path::Path;

use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::{Config, OutputFormat};
use crate::matcher::MatchRange;
use crate::results::{PrintSummary, SearchMatch};

const HIGHLIGHT_START: &str = "\x1b[31m";
const HIGHLIGHT_END: &str = "\x1b[0m";

#[derive(Serialize)]
struct JsonLine<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    text: &'a str,
}

#[derive(Serialize)]
struct JsonCount {
    count: u64,
}

/// Sole consumer of the result channel and sole writer to `out`.
///
/// Drains until the channel closes, even after cancellation, so the
/// reported count covers every published result. In quiet mode the
/// first received match requests cancellation, once, and draining
/// continues. Write failures are deliberately ignored; the count is
/// still the authoritative outcome.
pub fn print_results<W: Write>(
    results: Receiver<SearchMatch>,
    out: &mut W,
    cfg: &Config,
    cancel: &CancelToken,
) -> PrintSummary {
    let mut count: u64 = 0;
    let mut cancel_requested = false;

    for result in results.iter() {
        count += 1;

        if cfg.quiet {
            if !cancel_requested {
                cancel_requested = true;
                cancel.cancel();
            }
            continue;
        }
        if cfg.count_only {
            continue;
        }

        let path = format_path(&result.path, cfg.abs_paths);
        match cfg.output_format {
            OutputFormat::Json => {
                let line = JsonLine {
                    path: &path,
                    line: cfg.show_line_numbers.then_some(result.line_number),
                    text: &result.text,
                };
                if let Ok(encoded) = serde_json::to_string(&line) {
                    let _ = writeln!(out, "{encoded}");
                }
            }
            OutputFormat::Plain => {
                let text = if cfg.color {
                    highlight_ranges(&result.text, &result.ranges)
                } else {
                    result.text.clone()
                };
                if cfg.show_line_numbers {
                    let _ = writeln!(out, "{path}:{}: {text}", result.line_number);
                } else {
                    let _ = writeln!(out, "{path}: {text}");
                }
            }
        }
    }

    if cfg.count_only && !cfg.quiet {
        match cfg.output_format {
            OutputFormat::Json => {
                if let Ok(encoded) = serde_json::to_string(&JsonCount { count }) {
                    let _ = writeln!(out, "{encoded}");
                }
            }
            OutputFormat::Plain => {
                let _ = writeln!(out, "{count}");
            }
        }
    }

    let _ = out.flush();
    PrintSummary { match_count: count }
}

fn format_path(path: &Path, absolute: bool) -> String {
    if absolute {
        if let Ok(abs) = path.canonicalize() {
            return abs.display().to_string();
        }
    }
    path.display().to_string()
}

/// Splices ANSI red around each valid range. Ranges that step backwards
/// or fall outside the line are skipped rather than corrupting output.
pub fn highlight_ranges(line: &str, ranges: &[MatchRange]) -> String {
    if ranges.is_empty() {
        return line.to_string();
    }

    let mut output = String::with_capacity(line.len() + ranges.len() * 9);
    let mut last = 0;
    for range in ranges {
        if range.start < last || range.end < range.start || range.end > line.len() {
            continue;
        }
        let (Some(prefix), Some(body)) =
            (line.get(last..range.start), line.get(range.start..range.end))
        else {
            continue;
        };
        output.push_str(prefix);
        output.push_str(HIGHLIGHT_START);
        output.push_str(body);
        output.push_str(HIGHLIGHT_END);
        last = range.end;
    }
    output.push_str(line.get(last..).unwrap_or(""));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_match(text: &str, ranges: Vec<MatchRange>) -> SearchMatch {
        SearchMatch {
            path: Arc::new(PathBuf::from("a.txt")),
            line_number: 3,
            text: text.to_string(),
            ranges,
        }
    }

    fn run_printer(cfg: &Config, matches: Vec<SearchMatch>) -> (String, PrintSummary) {
        let (tx, rx) = unbounded();
        for m in matches {
            tx.send(m).unwrap();
        }
        drop(tx);

        let cancel = CancelToken::new();
        let mut out = Vec::new();
        let summary = print_results(rx, &mut out, cfg, &cancel);
        (String::from_utf8(out).unwrap(), summary)
    }

    fn plain_config() -> Config {
        // The printer never touches the root, only the config fields.
        Config::new("needle", std::env::temp_dir()).resolve().unwrap()
    }

    #[test]
    fn test_plain_output_with_line_numbers() {
        let cfg = plain_config();
        let (out, summary) = run_printer(
            &cfg,
            vec![sample_match("a needle", vec![MatchRange { start: 2, end: 8 }])],
        );
        assert_eq!(out, "a.txt:3: a needle\n");
        assert_eq!(summary.match_count, 1);
    }

    #[test]
    fn test_plain_output_without_line_numbers() {
        let mut cfg = plain_config();
        cfg.show_line_numbers = false;
        let (out, _) = run_printer(&cfg, vec![sample_match("a needle", vec![])]);
        assert_eq!(out, "a.txt: a needle\n");
    }

    #[test]
    fn test_color_output_wraps_ranges() {
        let mut cfg = plain_config();
        cfg.color = true;
        let (out, _) = run_printer(
            &cfg,
            vec![sample_match("a needle", vec![MatchRange { start: 2, end: 8 }])],
        );
        assert!(out.contains("\x1b[31mneedle\x1b[0m"), "got: {out}");
    }

    #[test]
    fn test_json_output_shape() {
        let mut cfg = plain_config();
        cfg.output_format = OutputFormat::Json;
        let (out, _) = run_printer(
            &cfg,
            vec![sample_match("a needle", vec![MatchRange { start: 2, end: 8 }])],
        );
        assert_eq!(out, "{\"path\":\"a.txt\",\"line\":3,\"text\":\"a needle\"}\n");
    }

    #[test]
    fn test_json_output_omits_line_when_disabled() {
        let mut cfg = plain_config();
        cfg.output_format = OutputFormat::Json;
        cfg.show_line_numbers = false;
        let (out, _) = run_printer(&cfg, vec![sample_match("x", vec![])]);
        assert_eq!(out, "{\"path\":\"a.txt\",\"text\":\"x\"}\n");
    }

    #[test]
    fn test_count_only_plain_and_json() {
        let mut cfg = plain_config();
        cfg.count_only = true;
        let matches = vec![sample_match("one", vec![]), sample_match("two", vec![])];
        let (out, summary) = run_printer(&cfg, matches.clone());
        assert_eq!(out, "2\n");
        assert_eq!(summary.match_count, 2);

        cfg.output_format = OutputFormat::Json;
        let (out, _) = run_printer(&cfg, matches);
        assert_eq!(out, "{\"count\":2}\n");
    }

    #[test]
    fn test_quiet_suppresses_output_and_cancels_once() {
        let mut cfg = plain_config();
        cfg.quiet = true;

        let (tx, rx) = unbounded();
        tx.send(sample_match("one", vec![])).unwrap();
        tx.send(sample_match("two", vec![])).unwrap();
        drop(tx);

        let cancel = CancelToken::new();
        let mut out = Vec::new();
        let summary = print_results(rx, &mut out, &cfg, &cancel);

        assert!(out.is_empty());
        assert!(cancel.is_cancelled());
        // Draining continued past the cancellation decision.
        assert_eq!(summary.match_count, 2);
    }

    #[test]
    fn test_highlight_skips_invalid_ranges() {
        let line = "abcdef";
        let highlighted = highlight_ranges(
            line,
            &[
                MatchRange { start: 0, end: 2 },
                // Retrograde: starts before the previous range ended.
                MatchRange { start: 1, end: 3 },
                MatchRange { start: 4, end: 6 },
                // Out of bounds.
                MatchRange { start: 5, end: 99 },
            ],
        );
        assert_eq!(
            highlighted,
            "\x1b[31mab\x1b[0mcd\x1b[31mef\x1b[0m"
        );
    }

    #[test]
    fn test_highlight_empty_ranges_returns_line() {
        assert_eq!(highlight_ranges("abc", &[]), "abc");
    }

    #[test]
    fn test_format_path_falls_back_on_failure() {
        let formatted = format_path(Path::new("definitely/not/here.txt"), true);
        assert_eq!(formatted, "definitely/not/here.txt");
    }

    #[test]
    fn test_format_path_absolute() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let formatted = format_path(&file, true);
        assert!(Path::new(&formatted).is_absolute());
    }
}
