//! Error types shared by the record source, the segmenter and the sinks.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, segmenting or exporting GPS data.
#[derive(Error, Debug)]
pub enum Error {
    /// A raw log line could not be turned into a [`GeoPoint`](crate::GeoPoint).
    #[error("malformed record at {}:{line}: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        /// 1-based line number within the source file
        line: usize,
        reason: String,
    },

    /// A point arrived with a timestamp earlier than its predecessor.
    #[error("out-of-order input: {current} precedes previous point at {previous}")]
    OutOfOrderInput {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "json")]
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
