//! Catalog Storage Library
//!
//! Byte storage for uploaded files behind the [`FileStorage`] trait, with a local
//! filesystem backend.
//!
//! # Storage key format
//!
//! Uploaded files live under `uploads/{filename}`. Keys must not contain `..` or a
//! leading `/`. Key generation is centralized in the `keys` module.

pub mod factory;
pub mod keys;
pub mod local;
pub mod traits;

pub use factory::create_storage;
pub use keys::upload_key;
pub use local::LocalStorage;
pub use traits::{FileReader, FileStorage, StorageError, StorageResult};
