//! Persistence for uploads and catalog records
//!
//! Each table has a store trait (`UploadStore`, `CatalogStore`) with a PostgreSQL
//! repository and an in-memory implementation in [`memory`]. The worker and services
//! only ever see the traits.

pub mod catalog;
pub mod memory;
pub mod setup;
pub mod store;
pub mod upload;

pub use catalog::CatalogRepository;
pub use memory::{MemoryCatalogStore, MemoryUploadStore};
pub use setup::setup_database;
pub use store::{CatalogStore, UploadStore};
pub use upload::UploadRepository;
