//! Catalog Core Library
//!
//! Domain models, error types and configuration shared by every catalog ingest
//! component: the stores, the ingestion engine, the broadcaster and the worker.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;

// Re-export commonly used types
pub use config::{BroadcastBackend, Config};
pub use error::AppError;
pub use job_error::JobError;
