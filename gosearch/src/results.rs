use std::path::PathBuf;
use std::sync::Arc;

use crate::matcher::MatchRange;
use crate::metrics::{PhaseTimings, WorkerStats};

/// One text line lifted out of a file by an I/O worker, waiting for a
/// CPU worker to evaluate it. The path is shared across all lines of
/// the same file.
#[derive(Debug, Clone)]
pub struct LineItem {
    pub path: Arc<PathBuf>,
    /// 1-based line number.
    pub line_number: usize,
    pub text: String,
}

/// A matching line, with the byte ranges that matched.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: Arc<PathBuf>,
    pub line_number: usize,
    pub text: String,
    pub ranges: Vec<MatchRange>,
}

/// Final report from the printer: the number of matches it received.
/// The exit verdict derives from this count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintSummary {
    pub match_count: u64,
}

/// Everything a finished run reports back to the caller.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub match_count: u64,
    pub timings: PhaseTimings,
    pub worker_stats: WorkerStats,
    /// True when the run stopped early via SIGINT or quiet-mode
    /// cancellation; counts still reflect every drained result.
    pub cancelled: bool,
}

impl SearchReport {
    pub fn found_matches(&self) -> bool {
        self.match_count > 0
    }
}
