//! Outcome of a failed chain step, as seen by the job queue.
//!
//! The queue retries a recoverable [`JobError`] within the step's budget and ends the
//! chain on an unrecoverable one.

use std::fmt;

use crate::error::AppError;

#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// Another attempt of the same step cannot succeed, e.g. the upload record is gone.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Worth retrying, e.g. the stored file could not be read or the pool timed out.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Store errors retry unless they are permanent (missing record, forbidden transition).
impl From<AppError> for JobError {
    fn from(err: AppError) -> Self {
        if err.is_permanent() {
            Self::unrecoverable(err)
        } else {
            Self::recoverable(err)
        }
    }
}
