//! Wiring of stores, storage, broadcaster, queue and intake into one handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use catalog_core::Config;
use catalog_db::{
    setup_database, CatalogRepository, CatalogStore, UploadRepository, UploadStore,
};
use catalog_infra::{create_broadcaster, Broadcaster, TopicBroadcaster, UploadNotifier};
use catalog_ingest::IngestEngine;
use catalog_storage::{create_storage, FileStorage};
use tokio::time::MissedTickBehavior;

use crate::intake::UploadService;
use crate::pipeline::UploadPipeline;
use crate::queue::{JobQueue, JobQueueConfig};

#[derive(Clone)]
pub struct CatalogApp {
    pub uploads: Arc<dyn UploadStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub storage: Arc<dyn FileStorage>,
    pub notifier: UploadNotifier,
    pub queue: JobQueue,
    pub service: UploadService,
    /// Present when broadcasting in process; subscribe here to watch lifecycle events.
    pub topic: Option<Arc<TopicBroadcaster>>,
}

impl CatalogApp {
    /// Connect to PostgreSQL, open storage and start the worker pool.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = setup_database(config).await?;
        let uploads: Arc<dyn UploadStore> = Arc::new(UploadRepository::new(pool.clone()));
        let catalog: Arc<dyn CatalogStore> = Arc::new(CatalogRepository::new(pool));

        let storage = create_storage(config)
            .await
            .context("Failed to initialize file storage")?;
        let (broadcaster, topic) =
            create_broadcaster(config).context("Failed to initialize broadcaster")?;

        Ok(Self::assemble(
            uploads,
            catalog,
            storage,
            broadcaster,
            topic,
            JobQueueConfig::from_config(config),
        ))
    }

    /// Build from already constructed components. Must be called inside a tokio runtime.
    pub fn assemble(
        uploads: Arc<dyn UploadStore>,
        catalog: Arc<dyn CatalogStore>,
        storage: Arc<dyn FileStorage>,
        broadcaster: Arc<dyn Broadcaster>,
        topic: Option<Arc<TopicBroadcaster>>,
        queue_config: JobQueueConfig,
    ) -> Self {
        let notifier = UploadNotifier::new(broadcaster, uploads.clone(), catalog.clone());
        let pipeline = UploadPipeline::new(
            uploads.clone(),
            storage.clone(),
            IngestEngine::new(catalog.clone()),
            notifier.clone(),
        );
        let queue = JobQueue::start(Arc::new(pipeline), queue_config);
        let service = UploadService::new(
            uploads.clone(),
            catalog.clone(),
            storage.clone(),
            notifier.clone(),
            queue.clone(),
        );

        Self {
            uploads,
            catalog,
            storage,
            notifier,
            queue,
            service,
            topic,
        }
    }

    /// Work through unfinished uploads until `shutdown` resolves, checking for new ones
    /// every `poll_interval`. The first check happens immediately.
    pub async fn run_until<F>(&self, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Catalog worker running"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.service.resume_unfinished().await {
                        tracing::warn!(error = %e, "Failed to pick up unfinished uploads");
                    }
                }
            }
        }

        tracing::info!("Catalog worker stopping");
        self.shutdown().await;
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
