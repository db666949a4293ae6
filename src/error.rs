use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SortError>;

/// Errors surfaced by the sort engine.
///
/// Every variant is returned only after the spill files created by the failing call were
/// deleted.
#[derive(Debug, Error)]
pub enum SortError {
    /// Rejected before any I/O took place.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read input: {0}")]
    Input(#[source] io::Error),
    #[error("failed to write spill file: {0}")]
    Spill(#[source] io::Error),
    #[error("failed to read sorted run {}: {source}", path.display())]
    MergeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete spill file {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("sort cancelled")]
    Cancelled,
    #[error("{0}")]
    Message(String),
}

impl SortError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
