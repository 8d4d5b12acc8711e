use crate::{FileStorage, LocalStorage, StorageResult};
use catalog_core::Config;
use std::sync::Arc;

/// Create the file storage backend from configuration.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn FileStorage>> {
    let storage = LocalStorage::new(config.storage_path.clone()).await?;
    tracing::info!(path = %storage.base_path().display(), "Local file storage ready");
    Ok(Arc::new(storage))
}
