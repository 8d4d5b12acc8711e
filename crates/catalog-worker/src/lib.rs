//! Upload processing
//!
//! Intake stores the file, creates the upload record and enqueues a two-step job
//! chain (mark processing, then ingest). The queue runs chains on a bounded worker
//! pool with per-step retries and a per-attempt timeout.

pub mod app;
pub mod intake;
pub mod pipeline;
pub mod queue;

pub use app::CatalogApp;
pub use intake::{IntakeError, UploadService};
pub use pipeline::{ChainHandler, UploadPipeline};
pub use queue::{ChainOutcome, ChainStep, JobQueue, JobQueueConfig, JobTicket, QueueError, RetryPolicy};
