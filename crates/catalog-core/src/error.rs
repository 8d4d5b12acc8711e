//! Error types module
//!
//! `AppError` is the error returned by the persistence layer and the services built on
//! top of it. Component-specific errors (storage, ingestion, broadcast, intake) live in
//! their own crates and convert into `anyhow::Error` at orchestration seams.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::UploadStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition for upload {upload_id}: {from} -> {to}")]
    InvalidTransition {
        upload_id: uuid::Uuid,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// True when retrying the same operation cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::InvalidTransition { .. } | AppError::InvalidInput(_)
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_transition_errors_are_permanent() {
        assert!(AppError::NotFound("upload".into()).is_permanent());
        assert!(AppError::InvalidTransition {
            upload_id: uuid::Uuid::new_v4(),
            from: UploadStatus::Completed,
            to: UploadStatus::Processing,
        }
        .is_permanent());
        assert!(!AppError::Internal("pool timed out".into()).is_permanent());
    }

    #[test]
    fn transition_error_message_names_both_states() {
        let err = AppError::InvalidTransition {
            upload_id: uuid::Uuid::nil(),
            from: UploadStatus::Failed,
            to: UploadStatus::Completed,
        };
        let msg = err.to_string();
        assert!(msg.contains("failed -> completed"), "got: {msg}");
    }
}
