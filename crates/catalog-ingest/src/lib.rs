//! CSV catalog ingestion
//!
//! Streams a delimited file row by row, cleans and normalizes every cell, drops
//! in-file duplicates and upserts the rest into a [`catalog_db::CatalogStore`].

pub mod cleaning;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod header;

pub use cleaning::clean_cell;
pub use engine::{IngestEngine, IngestStats};
pub use error::{IngestError, RowError};
pub use fingerprint::{fingerprint_file, fingerprint_reader};
pub use header::{normalize_header, CatalogColumn, HeaderLayout, FIELD_MAP};
