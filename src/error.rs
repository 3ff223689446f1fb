//! Errors surfaced by the search engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("no target network selected")]
    NoTargetSelected,

    #[error("a search is already running")]
    AlreadyRunning,

    #[error("candidate source unavailable: {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("search worker failed: {0}")]
    Worker(String),
}

impl SearchError {
    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::SourceUnavailable {
            path: path.into(),
            source,
        }
    }
}
