use std::path::PathBuf;

use deid_common::FsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// A row could not be encoded.
    #[error("failed to encode {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to buffer {path}: {source}")]
    Buffer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize run journal: {0}")]
    Journal(#[source] serde_json::Error),

    #[error(transparent)]
    Fs(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, ReportError>;
