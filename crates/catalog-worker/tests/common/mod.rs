#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::models::{
    BroadcastMessage, CatalogFields, CatalogListQuery, CatalogPage, CatalogRecord, UpsertOutcome,
};
use catalog_core::AppError;
use catalog_db::{CatalogStore, MemoryCatalogStore, MemoryUploadStore};
use catalog_infra::TopicBroadcaster;
use catalog_storage::{FileStorage, LocalStorage};
use catalog_worker::{CatalogApp, JobQueueConfig, RetryPolicy};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

pub const HEADER: &str = "UNIQUE_KEY,PRODUCT_TITLE,STYLE#,PIECE_PRICE\n";

pub fn fast_queue_config() -> JobQueueConfig {
    JobQueueConfig {
        max_workers: 2,
        queue_size: 16,
        retry: RetryPolicy {
            tries: 3,
            max_exceptions: 3,
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1),
        },
    }
}

pub struct Harness {
    pub app: CatalogApp,
    pub uploads: Arc<MemoryUploadStore>,
    pub catalog: Arc<MemoryCatalogStore>,
    pub storage: Arc<LocalStorage>,
    pub topic: Arc<TopicBroadcaster>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let catalog = Arc::new(MemoryCatalogStore::new());
        Self::with_catalog(catalog.clone(), catalog).await
    }

    /// Use `store` for ingestion while `catalog` stays inspectable.
    pub async fn with_catalog(
        catalog: Arc<MemoryCatalogStore>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let uploads = Arc::new(MemoryUploadStore::new());
        let topic = Arc::new(TopicBroadcaster::new(64));

        let app = CatalogApp::assemble(
            uploads.clone(),
            store,
            storage.clone() as Arc<dyn FileStorage>,
            topic.clone(),
            Some(topic.clone()),
            fast_queue_config(),
        );

        Self {
            app,
            uploads,
            catalog,
            storage,
            topic,
            _dir: dir,
        }
    }

    pub fn subscribe(&self) -> Receiver<BroadcastMessage> {
        self.topic.subscribe()
    }
}

/// Every message currently buffered for `rx`.
pub fn drain(rx: &mut Receiver<BroadcastMessage>) -> Vec<BroadcastMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Catalog store that rejects one key.
pub struct PoisonedCatalog {
    pub inner: Arc<MemoryCatalogStore>,
    pub poisoned_key: &'static str,
}

#[async_trait]
impl CatalogStore for PoisonedCatalog {
    async fn get_by_key(&self, unique_key: &str) -> Result<Option<CatalogRecord>, AppError> {
        self.inner.get_by_key(unique_key).await
    }

    async fn upsert(
        &self,
        unique_key: &str,
        fields: &CatalogFields,
        upload_id: Uuid,
    ) -> Result<UpsertOutcome, AppError> {
        if unique_key == self.poisoned_key {
            return Err(AppError::Internal("deadlock detected".to_string()));
        }
        self.inner.upsert(unique_key, fields, upload_id).await
    }

    async fn count_by_upload(&self, upload_id: Uuid) -> Result<i64, AppError> {
        self.inner.count_by_upload(upload_id).await
    }

    async fn count_by_uploads(&self, upload_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError> {
        self.inner.count_by_uploads(upload_ids).await
    }

    async fn search(&self, query: &CatalogListQuery) -> Result<CatalogPage, AppError> {
        self.inner.search(query).await
    }
}
