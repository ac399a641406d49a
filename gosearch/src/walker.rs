use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::errors::{SearchError, SearchResult};
use crate::ignore::{self, IgnoreRule};
use crate::metrics::WorkerMetrics;
use crate::pipeline::send_cancellable;

/// Single traversal producer: walks the tree under the configured root
/// and publishes surviving file paths into the path channel.
///
/// Every published path has already passed the ignore rules, the
/// extension and max-size filters, the depth bound, and the symlink
/// policy. Filesystem errors below the root are logged and skipped;
/// only cancellation stops the walk early, reported as
/// [`SearchError::Cancelled`]. The channel is left open for the
/// coordinator to close.
pub fn walk(
    cfg: &Config,
    cancel: &CancelToken,
    paths: &Sender<PathBuf>,
    metrics: &WorkerMetrics,
) -> SearchResult<()> {
    let mut visited = HashSet::new();
    if cfg.follow_symlinks {
        match fs::canonicalize(&cfg.root_path) {
            Ok(canonical) => {
                visited.insert(canonical);
            }
            Err(err) => warn!("failed to resolve {}: {}", cfg.root_path.display(), err),
        }
    }

    walk_dir(
        cfg,
        cancel,
        &cfg.root_path,
        0,
        Vec::new(),
        &mut visited,
        paths,
        metrics,
    )
}

#[allow(clippy::too_many_arguments)]
fn walk_dir(
    cfg: &Config,
    cancel: &CancelToken,
    dir: &Path,
    depth: i64,
    inherited: Vec<IgnoreRule>,
    visited: &mut HashSet<PathBuf>,
    paths: &Sender<PathBuf>,
    metrics: &WorkerMetrics,
) -> SearchResult<()> {
    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }
    if cfg.max_depth >= 0 && depth > cfg.max_depth {
        return Ok(());
    }

    // The effective rule set is the ancestors' rules followed by the
    // ones declared here; children receive their own copy.
    let mut rules = inherited;
    rules.extend(ignore::load_dir_rules(dir));

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("failed to read directory {}: {}", dir.display(), err);
            return Ok(());
        }
    };

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("failed to read entry in {}: {}", dir.display(), err);
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!("failed to stat {}: {}", path.display(), err);
                continue;
            }
        };

        let mut is_dir = file_type.is_dir();
        if ignore::is_ignored(&cfg.ignored_dirs, &rules, &path, is_dir) {
            continue;
        }

        if file_type.is_symlink() {
            if !cfg.follow_symlinks {
                continue;
            }
            // Stat the target; it may turn the entry into a directory.
            let target = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!("failed to stat symlink target {}: {}", path.display(), err);
                    continue;
                }
            };
            is_dir = target.is_dir();
            if ignore::is_ignored(&cfg.ignored_dirs, &rules, &path, is_dir) {
                continue;
            }
        }

        if is_dir {
            if cfg.follow_symlinks {
                // Resolved-path loop prevention: a directory reachable
                // twice through links is entered once.
                let canonical = match fs::canonicalize(&path) {
                    Ok(canonical) => canonical,
                    Err(err) => {
                        warn!("failed to resolve {}: {}", path.display(), err);
                        continue;
                    }
                };
                if !visited.insert(canonical) {
                    debug!("skipping already-visited directory {}", path.display());
                    continue;
                }
            }
            walk_dir(
                cfg,
                cancel,
                &path,
                depth + 1,
                rules.clone(),
                visited,
                paths,
                metrics,
            )?;
            continue;
        }

        if !passes_extension_filter(cfg, &path) {
            continue;
        }
        if cfg.max_size_bytes > 0 {
            match fs::metadata(&path) {
                Ok(metadata) => {
                    if metadata.len() > cfg.max_size_bytes {
                        continue;
                    }
                }
                Err(err) => {
                    warn!("failed to stat {}: {}", path.display(), err);
                    continue;
                }
            }
        }

        metrics.record_file_enqueued();
        if !send_cancellable(paths, path, cancel) {
            return Err(SearchError::Cancelled);
        }
    }

    Ok(())
}

fn passes_extension_filter(cfg: &Config, path: &Path) -> bool {
    if cfg.extensions.is_empty() {
        return true;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => cfg.extensions.contains(&format!(".{}", ext.to_lowercase())),
        None => false,
    }
}
