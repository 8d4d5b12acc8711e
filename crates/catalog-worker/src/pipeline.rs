//! The two steps of an upload chain and the failure hook the queue calls.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::models::{UploadRecord, UploadStatus};
use catalog_core::JobError;
use catalog_db::UploadStore;
use catalog_infra::UploadNotifier;
use catalog_ingest::{fingerprint_file, IngestEngine, IngestStats};
use catalog_storage::FileStorage;
use uuid::Uuid;

pub(crate) const STARTED_MESSAGE: &str = "File processing started";
pub(crate) const COMPLETED_MESSAGE: &str = "File processing completed successfully";

/// Work the queue runs for one upload. Steps run in order; `fail` is called once when
/// a step gives up.
#[async_trait]
pub trait ChainHandler: Send + Sync {
    async fn mark_processing(&self, upload_id: Uuid) -> Result<(), JobError>;

    async fn ingest(&self, upload_id: Uuid) -> Result<IngestStats, JobError>;

    /// Record the final failure. Must not return an error.
    async fn fail(&self, upload_id: Uuid, message: String);
}

/// Upload chain backed by the stores, file storage and the ingestion engine.
#[derive(Clone)]
pub struct UploadPipeline {
    uploads: Arc<dyn UploadStore>,
    storage: Arc<dyn FileStorage>,
    engine: IngestEngine,
    notifier: UploadNotifier,
}

impl UploadPipeline {
    pub fn new(
        uploads: Arc<dyn UploadStore>,
        storage: Arc<dyn FileStorage>,
        engine: IngestEngine,
        notifier: UploadNotifier,
    ) -> Self {
        Self {
            uploads,
            storage,
            engine,
            notifier,
        }
    }

    async fn load(&self, upload_id: Uuid) -> Result<UploadRecord, JobError> {
        let upload = self
            .uploads
            .get(upload_id)
            .await?
            .ok_or_else(|| {
                JobError::unrecoverable(anyhow::anyhow!("Upload {} not found", upload_id))
            })?;

        if upload.status.is_terminal() {
            return Err(JobError::unrecoverable(anyhow::anyhow!(
                "Upload {} is already {}",
                upload_id,
                upload.status
            )));
        }
        Ok(upload)
    }

    async fn enter_processing(&self, upload_id: Uuid) -> Result<UploadRecord, JobError> {
        self.load(upload_id).await?;
        let upload = self
            .uploads
            .transition(upload_id, UploadStatus::Processing, None)
            .await?;
        self.notifier
            .announce(&upload, None, Some(STARTED_MESSAGE.to_string()))
            .await;
        Ok(upload)
    }

    async fn record_fingerprint(&self, upload: &UploadRecord) {
        match fingerprint_file(self.storage.as_ref(), &upload.file_path).await {
            Ok(hash) => {
                if let Err(e) = self.uploads.set_file_hash(upload.id, &hash).await {
                    tracing::warn!(upload_id = %upload.id, error = %e, "Failed to store file hash");
                }
            }
            Err(e) => {
                tracing::warn!(upload_id = %upload.id, error = %e, "Failed to fingerprint upload")
            }
        }
    }
}

#[async_trait]
impl ChainHandler for UploadPipeline {
    #[tracing::instrument(skip(self))]
    async fn mark_processing(&self, upload_id: Uuid) -> Result<(), JobError> {
        self.enter_processing(upload_id).await?;
        tracing::info!(upload_id = %upload_id, "Upload marked processing");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn ingest(&self, upload_id: Uuid) -> Result<IngestStats, JobError> {
        let upload = self.enter_processing(upload_id).await?;

        self.record_fingerprint(&upload).await;

        let stats = self
            .engine
            .ingest_file(self.storage.as_ref(), &upload.file_path, upload_id)
            .await?;

        let upload = self.uploads.mark_processed(upload_id).await?;
        self.notifier
            .announce(&upload, Some(100), Some(stats.summary()))
            .await;

        let upload = self
            .uploads
            .transition(upload_id, UploadStatus::Completed, None)
            .await?;
        self.notifier
            .announce(&upload, None, Some(COMPLETED_MESSAGE.to_string()))
            .await;

        tracing::info!(
            upload_id = %upload_id,
            rows_seen = stats.rows_seen,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            duplicate_in_file = stats.duplicate_in_file,
            "Upload ingested"
        );
        Ok(stats)
    }

    #[tracing::instrument(skip(self, message))]
    async fn fail(&self, upload_id: Uuid, message: String) {
        let result = self
            .uploads
            .transition(upload_id, UploadStatus::Failed, Some(message.clone()))
            .await;
        match result {
            Ok(upload) => self.notifier.announce(&upload, None, Some(message)).await,
            Err(e) => tracing::error!(
                upload_id = %upload_id,
                error = %e,
                "Failed to mark upload failed"
            ),
        }
        self.notifier.forget(upload_id);
    }
}
