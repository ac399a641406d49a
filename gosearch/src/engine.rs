use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::errors::SearchResult;
use crate::matcher::MatchStrategy;
use crate::metrics::{PhaseTimings, WorkerMetrics};
use crate::pipeline::{io_worker, scaler_loop, spawn_cpu_worker};
use crate::printer::print_results;
use crate::results::SearchReport;
use crate::walker;

/// Runs a complete search with a fresh cancellation token.
pub fn search<W: Write + Send>(cfg: &Config, out: &mut W) -> SearchResult<SearchReport> {
    search_with_cancel(cfg, CancelToken::new(), out)
}

/// Runs a complete search: traversal, I/O and CPU worker groups, the
/// optional scaler, and the printer, wired through bounded channels.
///
/// Shutdown is deterministic regardless of cancellation: the path
/// sender closes when traversal ends, the line sender when the I/O
/// workers have drained, the result sender when the CPU workers have,
/// and the printer reports its summary last. Fatal setup errors (a bad
/// regex) surface before any thread starts.
pub fn search_with_cancel<W: Write + Send>(
    cfg: &Config,
    cancel: CancelToken,
    out: &mut W,
) -> SearchResult<SearchReport> {
    let strategy = MatchStrategy::from_config(cfg)?;
    let metrics = WorkerMetrics::new();
    let start = Instant::now();
    let mut timings = PhaseTimings::default();

    debug!(
        "starting search for {:?} under {} ({} io / {} cpu workers, backpressure {})",
        cfg.pattern,
        cfg.root_path.display(),
        cfg.io_workers,
        cfg.cpu_workers,
        cfg.backpressure,
    );

    let (path_tx, path_rx) = bounded(cfg.backpressure);
    let (line_tx, line_rx) = bounded(cfg.backpressure);
    let (result_tx, result_rx) = bounded(cfg.backpressure);
    let scaler_stop = AtomicBool::new(false);

    let strategy_ref = &strategy;
    let metrics_ref = &metrics;
    let cancel_ref = &cancel;
    let stop_ref = &scaler_stop;

    let summary = thread::scope(|s| {
        let printer_handle = s.spawn(move || print_results(result_rx, out, cfg, cancel_ref));

        let mut io_handles = Vec::with_capacity(cfg.io_workers);
        for _ in 0..cfg.io_workers {
            let paths = path_rx.clone();
            let lines = line_tx.clone();
            io_handles.push(s.spawn(move || io_worker(cfg, cancel_ref, metrics_ref, paths, lines)));
        }

        let mut cpu_handles = Vec::with_capacity(cfg.cpu_workers);
        for _ in 0..cfg.cpu_workers {
            cpu_handles.push(spawn_cpu_worker(
                s,
                strategy_ref,
                cancel_ref,
                metrics_ref,
                line_rx.clone(),
                result_tx.clone(),
            ));
        }

        let scaler_handle = cfg.dynamic_workers.then(|| {
            let lines = line_rx.clone();
            let results = result_tx.clone();
            s.spawn(move || {
                scaler_loop(
                    s,
                    cfg,
                    strategy_ref,
                    cancel_ref,
                    metrics_ref,
                    stop_ref,
                    lines,
                    results,
                )
            })
        });

        // The coordinator thread is the traversal producer. A
        // cancelled walk is not a failure; the drain below still runs.
        let _ = walker::walk(cfg, cancel_ref, &path_tx, metrics_ref);
        drop(path_tx);
        timings.walk = start.elapsed();

        for handle in io_handles {
            let _ = handle.join();
        }
        drop(line_tx);

        scaler_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = scaler_handle {
            let _ = handle.join();
        }
        for handle in cpu_handles {
            let _ = handle.join();
        }
        timings.scan = start.elapsed().saturating_sub(timings.walk);
        drop(result_tx);

        match printer_handle.join() {
            Ok(summary) => summary,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    });

    timings.print = start
        .elapsed()
        .saturating_sub(timings.walk + timings.scan);
    timings.total = start.elapsed();
    metrics.log_stats();

    let report = SearchReport {
        match_count: summary.match_count,
        timings,
        worker_stats: metrics.get_stats(),
        cancelled: cancel.is_cancelled(),
    };
    info!(
        "search complete: {} matches in {:?}",
        report.match_count, report.timings.total
    );
    Ok(report)
}
