use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::errors::{SearchError, SearchResult};
use crate::matcher::MatchStrategy;
use crate::metrics::WorkerMetrics;
use crate::results::{LineItem, SearchMatch};

/// How long a blocked channel operation waits before re-checking the
/// cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Interval between scaler inspections of line-channel pressure.
const SCALER_TICK: Duration = Duration::from_millis(200);

/// Bytes sniffed from the head of each file for binary detection.
const BINARY_SNIFF_LEN: usize = 512;

const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Blocking, cancellation-aware send. Returns false when the token was
/// set or the receiving side is gone; the caller stops publishing.
pub(crate) fn send_cancellable<T>(tx: &Sender<T>, item: T, cancel: &CancelToken) -> bool {
    let mut item = item;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        match tx.send_timeout(item, CANCEL_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => item = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// I/O worker: receives paths, splits files into line records.
///
/// Exits on channel close or cancellation. A file that fails to stat,
/// open, or read is logged and skipped; the worker moves on to the
/// next path.
pub(crate) fn io_worker(
    cfg: &Config,
    cancel: &CancelToken,
    metrics: &WorkerMetrics,
    paths: Receiver<PathBuf>,
    lines: Sender<LineItem>,
) {
    metrics.record_io_started();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let path = match paths.recv_timeout(CANCEL_POLL) {
            Ok(path) => path,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match scan_file(cfg, cancel, metrics, path, &lines) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => warn!("{err}"),
        }
    }
    metrics.record_io_stopped();
}

/// Reads one file and publishes its lines. Returns `Ok(false)` when
/// cancellation interrupted the file mid-way.
fn scan_file(
    cfg: &Config,
    cancel: &CancelToken,
    metrics: &WorkerMetrics,
    path: PathBuf,
    lines: &Sender<LineItem>,
) -> SearchResult<bool> {
    // Re-check the size bound; the file may have grown since it was
    // enqueued.
    if cfg.max_size_bytes > 0 {
        let metadata = fs_metadata(&path)?;
        if metadata.len() > cfg.max_size_bytes {
            return Ok(true);
        }
    }

    let mut file = File::open(&path).map_err(|e| SearchError::file_error(&path, e))?;
    if sniff_binary(&mut file).map_err(|e| SearchError::file_error(&path, e))? {
        trace!("skipping binary file {}", path.display());
        return Ok(true);
    }
    file.seek(SeekFrom::Start(0))
        .map_err(|e| SearchError::file_error(&path, e))?;

    let shared_path = Arc::new(path);
    let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, file);
    let mut buf = Vec::new();
    let mut line_number = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| SearchError::file_error(shared_path.as_ref(), e))?;
        if read == 0 {
            break;
        }
        line_number += 1;
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        let item = LineItem {
            path: Arc::clone(&shared_path),
            line_number,
            text: String::from_utf8_lossy(&buf).into_owned(),
        };
        metrics.record_line_enqueued();
        if !send_cancellable(lines, item, cancel) {
            return Ok(false);
        }
    }

    metrics.record_file_scanned();
    Ok(true)
}

fn fs_metadata(path: &Path) -> SearchResult<std::fs::Metadata> {
    std::fs::metadata(path).map_err(|e| SearchError::file_error(path, e))
}

/// A file is treated as binary when its first 512 bytes contain a NUL.
fn sniff_binary(file: &mut File) -> io::Result<bool> {
    let mut buffer = [0u8; BINARY_SNIFF_LEN];
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(buffer[..filled].contains(&0))
}

/// CPU worker: evaluates the match strategy against line records and
/// publishes the ones with at least one range.
pub(crate) fn cpu_worker(
    strategy: &MatchStrategy,
    cancel: &CancelToken,
    metrics: &WorkerMetrics,
    lines: Receiver<LineItem>,
    results: Sender<SearchMatch>,
) {
    metrics.record_cpu_started();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let item = match lines.recv_timeout(CANCEL_POLL) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let ranges = strategy.find_ranges(&item.text);
        metrics.record_line_processed();
        if ranges.is_empty() {
            continue;
        }
        metrics.record_match_produced();
        let result = SearchMatch {
            path: item.path,
            line_number: item.line_number,
            text: item.text,
            ranges,
        };
        if !send_cancellable(&results, result, cancel) {
            break;
        }
    }
    metrics.record_cpu_stopped();
}

pub(crate) fn spawn_cpu_worker<'scope, 'env>(
    scope: &'scope thread::Scope<'scope, 'env>,
    strategy: &'scope MatchStrategy,
    cancel: &'scope CancelToken,
    metrics: &'scope WorkerMetrics,
    lines: Receiver<LineItem>,
    results: Sender<SearchMatch>,
) -> thread::ScopedJoinHandle<'scope, ()> {
    scope.spawn(move || cpu_worker(strategy, cancel, metrics, lines, results))
}

/// Dynamic scaler: adds CPU workers while the line channel is backed
/// up. Grows only; extra workers exit naturally when the line channel
/// closes, and the scaler joins them before returning.
#[allow(clippy::too_many_arguments)]
pub(crate) fn scaler_loop<'scope, 'env>(
    scope: &'scope thread::Scope<'scope, 'env>,
    cfg: &'scope Config,
    strategy: &'scope MatchStrategy,
    cancel: &'scope CancelToken,
    metrics: &'scope WorkerMetrics,
    stop: &'scope AtomicBool,
    lines: Receiver<LineItem>,
    results: Sender<SearchMatch>,
) {
    let mut spawned = Vec::new();
    while !stop.load(Ordering::Relaxed) && !cancel.is_cancelled() {
        thread::sleep(SCALER_TICK);
        if stop.load(Ordering::Relaxed) || cancel.is_cancelled() {
            break;
        }
        let pending = lines.len() as u64;
        let live = metrics.cpu_active();
        if pending > live * 2 && live < cfg.max_workers as u64 {
            trace!("scaling up: {pending} pending lines, {live} live cpu workers");
            metrics.record_scale_up();
            spawned.push(spawn_cpu_worker(
                scope,
                strategy,
                cancel,
                metrics,
                lines.clone(),
                results.clone(),
            ));
        }
    }
    drop(results);
    for handle in spawned {
        let _ = handle.join();
    }
}
