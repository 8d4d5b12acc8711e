//! Data models for the catalog ingest pipeline
//!
//! Each sub-module covers one feature area; everything is re-exported here.

mod broadcast;
mod catalog;
mod upload;

pub use broadcast::*;
pub use catalog::*;
pub use upload::*;
