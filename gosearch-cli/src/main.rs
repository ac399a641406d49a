use std::io;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gosearch::config::{parse_dir_set, parse_extension_set, parse_size};
use gosearch::{CancelToken, Config, FileConfig, OutputFormat, SearchResult};

const USAGE_BANNER: &str = "Usage: gosearch [flags] <pattern> <path>";

/// Recursive text search with a concurrent worker pipeline.
#[derive(Parser, Debug)]
#[command(name = "gosearch", version, about)]
struct Cli {
    /// Pattern to search for
    pattern: String,

    /// Root directory to search
    path: PathBuf,

    /// Case-insensitive search
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,

    /// Show line numbers (pass `-n=false` to suppress)
    #[arg(
        short = 'n',
        long = "line-numbers",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    line_numbers: Option<bool>,

    /// Whole-word matching
    #[arg(short = 'w', long = "word")]
    whole_word: bool,

    /// Treat the pattern as a regular expression
    #[arg(short = 'r', long = "regex")]
    regex: bool,

    /// Base worker count (defaults to the CPU count)
    #[arg(long = "workers")]
    workers: Option<usize>,

    /// I/O worker count (0 = half the base count)
    #[arg(long = "io-workers")]
    io_workers: Option<usize>,

    /// CPU worker count (0 = the base count)
    #[arg(long = "cpu-workers")]
    cpu_workers: Option<usize>,

    /// Ceiling for dynamically added CPU workers (0 = twice the CPU count)
    #[arg(long = "max-workers")]
    max_workers: Option<usize>,

    /// Channel capacity (0 = eight per base worker)
    #[arg(long = "backpressure")]
    backpressure: Option<usize>,

    /// Grow the CPU worker group under queue pressure
    #[arg(long = "dynamic-workers")]
    dynamic_workers: bool,

    /// Maximum file size with optional B/KB/MB/GB suffix (empty = no limit)
    #[arg(long = "max-size")]
    max_size: Option<String>,

    /// Comma-separated extensions to include, e.g. .go,.md
    #[arg(short = 'x', long = "extensions")]
    extensions: Option<String>,

    /// Comma-separated directory names to skip, merged with the defaults
    #[arg(long = "exclude-dir")]
    exclude_dir: Option<String>,

    /// Maximum traversal depth below the root (-1 = unlimited)
    #[arg(long = "max-depth", allow_hyphen_values = true)]
    max_depth: Option<i64>,

    /// Follow symlinks, with resolved-path loop prevention
    #[arg(long = "follow-symlinks")]
    follow_symlinks: bool,

    /// Print only the total match count
    #[arg(short = 'c', long = "count")]
    count: bool,

    /// Suppress output; report through the exit code only
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Highlight matches with ANSI color
    #[arg(long = "color")]
    color: bool,

    /// Print absolute paths
    #[arg(long = "abs")]
    abs: bool,

    /// Output format: plain or json
    #[arg(long = "format")]
    format: Option<String>,

    /// Print phase timings and worker counters to stderr
    #[arg(long = "metrics")]
    metrics: bool,

    /// Enable debug logging
    #[arg(long = "debug")]
    debug: bool,

    /// Enable trace logging
    #[arg(long = "trace")]
    trace: bool,

    /// Path to a JSON config file; flags override its values
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = err.print();
                return 0;
            }
            eprintln!("{USAGE_BANNER}");
            eprintln!("{err}");
            return 2;
        }
    };

    init_logging(cli.debug, cli.trace);

    let metrics_enabled = cli.metrics;
    let cfg = match build_config(cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{USAGE_BANNER}");
            eprintln!("{err}");
            return 2;
        }
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
            warn!("failed to install interrupt handler: {err}");
        }
    }

    let mut out = io::stdout();
    match gosearch::search_with_cancel(&cfg, cancel, &mut out) {
        Ok(report) => {
            if metrics_enabled {
                eprintln!("{}", report.timings);
                let stats = report.worker_stats;
                eprintln!(
                    "workers io={} (peak {}) cpu={} (peak {}) scale_ups={} \
                     files={}/{} lines={}/{} matches={}",
                    stats.io_started,
                    stats.io_max_active,
                    stats.cpu_started,
                    stats.cpu_max_active,
                    stats.scale_ups,
                    stats.files_enqueued,
                    stats.files_scanned,
                    stats.lines_enqueued,
                    stats.lines_processed,
                    stats.matches_produced,
                );
            }
            if report.found_matches() {
                0
            } else {
                1
            }
        }
        Err(err) => {
            eprintln!("{err}");
            2
        }
    }
}

fn init_logging(debug: bool, trace: bool) {
    let default_level = if trace {
        "trace"
    } else if debug {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

/// Folds the optional config file under the flags: a value from the
/// file only applies where the corresponding flag was not given.
fn build_config(cli: Cli) -> SearchResult<Config> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut cfg = Config::new(cli.pattern, cli.path);
    cfg.ignore_case = cli.ignore_case || file.ignore_case.unwrap_or(false);
    cfg.show_line_numbers = cli.line_numbers.or(file.line_numbers).unwrap_or(true);
    cfg.whole_word = cli.whole_word || file.whole_word.unwrap_or(false);
    cfg.use_regex = cli.regex || file.regex.unwrap_or(false);
    if let Some(workers) = cli.workers.or(file.workers) {
        cfg.workers = workers;
    }
    cfg.io_workers = cli.io_workers.or(file.io_workers).unwrap_or(0);
    cfg.cpu_workers = cli.cpu_workers.or(file.cpu_workers).unwrap_or(0);
    cfg.max_workers = cli.max_workers.or(file.max_workers).unwrap_or(0);
    cfg.backpressure = cli.backpressure.or(file.backpressure).unwrap_or(0);
    cfg.dynamic_workers = cli.dynamic_workers || file.dynamic_workers.unwrap_or(false);
    if let Some(text) = cli.max_size.as_deref().or(file.max_size.as_deref()) {
        cfg.max_size_bytes = parse_size(text)?;
    }
    if let Some(extensions) = cli.extensions.as_deref().or(file.extensions.as_deref()) {
        cfg.extensions = parse_extension_set(extensions);
    }
    if let Some(dirs) = cli.exclude_dir.as_deref().or(file.exclude_dirs.as_deref()) {
        cfg.ignored_dirs.extend(parse_dir_set(dirs));
    }
    if let Some(depth) = cli.max_depth.or(file.max_depth) {
        cfg.max_depth = depth;
    }
    cfg.follow_symlinks = cli.follow_symlinks || file.follow_symlinks.unwrap_or(false);
    cfg.count_only = cli.count || file.count.unwrap_or(false);
    cfg.quiet = cli.quiet || file.quiet.unwrap_or(false);
    cfg.color = cli.color || file.color.unwrap_or(false);
    cfg.abs_paths = cli.abs || file.abs.unwrap_or(false);
    if let Some(format) = cli.format.as_deref().or(file.format.as_deref()) {
        cfg.output_format = OutputFormat::parse(format)?;
    }
    cfg.metrics = cli.metrics || file.metrics.unwrap_or(false);

    cfg.resolve()
}
