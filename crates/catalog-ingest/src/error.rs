use catalog_core::{AppError, JobError};
use catalog_storage::StorageError;
use thiserror::Error;

/// Failures that abort a whole ingest run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The stored file is missing or cannot be opened.
    #[error("File access error: {0}")]
    FileAccess(#[from] StorageError),

    #[error("Unable to read header row: {0}")]
    HeaderUnreadable(String),

    /// The file became unreadable part way through. Rows before `row_number` stay committed.
    #[error("Read error at row {row_number}: {source}")]
    Read {
        row_number: u64,
        #[source]
        source: csv_async::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures confined to a single data row. The row is counted as skipped.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Invalid piece price {0:?}")]
    InvalidPrice(String),

    #[error("Catalog store error: {0}")]
    Store(#[from] AppError),
}

/// A bad storage key will never open. Everything else about a file may be transient.
impl From<IngestError> for JobError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::FileAccess(StorageError::InvalidKey(_)) => JobError::unrecoverable(err),
            _ => JobError::recoverable(err),
        }
    }
}
