//! Error types for robot-log

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating or reading Robot Framework result files.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid timestamp '{value}' in {path}")]
    InvalidTimestamp { path: PathBuf, value: String },

    /// Directory exists but holds no `*.xml` files.
    #[error("no result files found in {0}")]
    NoResultFiles(PathBuf),

    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    /// File parsed but contains no test suite.
    #[error("no test suite found in {0}")]
    Empty(PathBuf),
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
