use std::io;
use std::path::{Path, PathBuf};

/// Errors produced while configuring or running a search.
///
/// Only configuration and setup failures abort a run; per-file and
/// per-directory errors are logged at the point of failure and the
/// pipeline continues with the remaining work.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        SearchError::Config(msg.into())
    }

    /// Wraps an IO error with the path it occurred on.
    pub fn file_error(path: impl AsRef<Path>, source: io::Error) -> Self {
        SearchError::File {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for the cooperative-cancellation marker, which is not a
    /// failure: the run still reports its match count and exits by
    /// match outcome.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SearchError::Cancelled)
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
