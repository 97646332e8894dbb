//! Error types for the drover daemon.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Daemon error type.
///
/// Only `Config` is fatal; everything else is logged and skipped by the
/// owning job or entry.
#[derive(Error, Debug)]
pub enum DroverError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("directory {} is still being written, skipping", .0.display())]
    StillWriting(PathBuf),

    #[error("file name {0:?} does not match the record naming pattern")]
    BadRecordName(String),

    #[error("no branch marker above {}", .0.display())]
    NoBranchRoot(PathBuf),

    #[error("copy of {} failed: {}", .src.display(), .source)]
    Copy {
        src: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DroverError>;
