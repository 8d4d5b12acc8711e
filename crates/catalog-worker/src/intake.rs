//! Upload intake: validate, store, record, announce and enqueue.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use catalog_core::models::{NewUpload, UploadRecord, UploadStatus, UploadSummary};
use catalog_core::AppError;
use catalog_db::{CatalogStore, UploadStore};
use catalog_infra::UploadNotifier;
use catalog_storage::{upload_key, FileReader, FileStorage, StorageError};
use thiserror::Error;
use uuid::Uuid;

use crate::queue::{JobQueue, JobTicket, QueueError};

const ALLOWED_EXTENSIONS: &[&str] = &["csv", "txt"];
const QUEUED_MESSAGE: &str = "File queued for processing";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Unsupported file type {0:?}: only csv and txt files are accepted")]
    UnsupportedFileType(String),

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] AppError),

    #[error("Unable to enqueue upload: {0}")]
    Queue(#[from] QueueError),
}

/// Lower-case ASCII slug: alphanumeric runs joined by single dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("file");
    }
    slug
}

/// Split the client's file name and check the extension. Returns `(stem, extension)`.
fn validate_name(original_name: &str) -> Result<(String, String), IntakeError> {
    let path = Path::new(original_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(IntakeError::UnsupportedFileType(original_name.to_string()));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok((stem, extension))
}

/// Entry point for new uploads and the upload listing/maintenance operations.
#[derive(Clone)]
pub struct UploadService {
    uploads: Arc<dyn UploadStore>,
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn FileStorage>,
    notifier: UploadNotifier,
    queue: JobQueue,
}

impl UploadService {
    pub fn new(
        uploads: Arc<dyn UploadStore>,
        catalog: Arc<dyn CatalogStore>,
        storage: Arc<dyn FileStorage>,
        notifier: UploadNotifier,
        queue: JobQueue,
    ) -> Self {
        Self {
            uploads,
            catalog,
            storage,
            notifier,
            queue,
        }
    }

    /// `{unix_ts}_{slug}.{ext}`, with a numeric suffix if that name is taken.
    async fn stored_filename(&self, stem: &str, extension: &str) -> Result<String, IntakeError> {
        let base = format!("{}_{}", chrono::Utc::now().timestamp(), slugify(stem));
        let mut filename = format!("{}.{}", base, extension);
        let mut n = 1;
        while self.storage.exists(&upload_key(&filename)).await? {
            n += 1;
            filename = format!("{}-{}.{}", base, n, extension);
        }
        Ok(filename)
    }

    /// Accept a file for ingestion and return as soon as its chain is queued.
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn submit(
        &self,
        user_id: Uuid,
        original_name: &str,
        data: Bytes,
    ) -> Result<(UploadRecord, JobTicket), IntakeError> {
        let (stem, extension) = validate_name(original_name)?;
        if data.is_empty() {
            return Err(IntakeError::EmptyFile);
        }

        let filename = self.stored_filename(&stem, &extension).await?;
        let file_path = upload_key(&filename);
        self.storage.store(&file_path, data).await?;

        self.register(user_id, original_name, filename, file_path).await
    }

    /// Like [`UploadService::submit`], but copies the bytes into storage as they are read.
    #[tracing::instrument(skip(self, reader))]
    pub async fn submit_reader(
        &self,
        user_id: Uuid,
        original_name: &str,
        reader: FileReader,
    ) -> Result<(UploadRecord, JobTicket), IntakeError> {
        let (stem, extension) = validate_name(original_name)?;

        let filename = self.stored_filename(&stem, &extension).await?;
        let file_path = upload_key(&filename);
        let written = self.storage.store_stream(&file_path, reader).await?;
        if written == 0 {
            self.storage.delete(&file_path).await?;
            return Err(IntakeError::EmptyFile);
        }

        self.register(user_id, original_name, filename, file_path).await
    }

    /// Create the pending record for a stored file, announce it and queue its chain.
    async fn register(
        &self,
        user_id: Uuid,
        original_name: &str,
        filename: String,
        file_path: String,
    ) -> Result<(UploadRecord, JobTicket), IntakeError> {
        let upload = self
            .uploads
            .create(NewUpload {
                user_id,
                filename,
                original_name: original_name.to_string(),
                file_path,
            })
            .await?;
        self.notifier
            .announce(&upload, None, Some(QUEUED_MESSAGE.to_string()))
            .await;

        match self.queue.enqueue(upload.id) {
            Ok(ticket) => {
                tracing::info!(
                    upload_id = %upload.id,
                    filename = %upload.filename,
                    "Upload accepted"
                );
                Ok((upload, ticket))
            }
            Err(e) => {
                let message = format!("Job failed: {}", e);
                match self
                    .uploads
                    .transition(upload.id, UploadStatus::Failed, Some(message.clone()))
                    .await
                {
                    Ok(failed) => self.notifier.announce(&failed, None, Some(message)).await,
                    Err(err) => tracing::error!(
                        upload_id = %upload.id,
                        error = %err,
                        "Failed to mark unqueued upload failed"
                    ),
                }
                Err(e.into())
            }
        }
    }

    /// Enqueue every upload left in `pending` or `processing` that this process is not
    /// already working on.
    #[tracing::instrument(skip(self))]
    pub async fn resume_unfinished(&self) -> Result<Vec<JobTicket>, IntakeError> {
        let unfinished = self.uploads.list_unfinished().await?;
        let mut tickets = Vec::with_capacity(unfinished.len());
        for upload in unfinished {
            match self.queue.enqueue(upload.id) {
                Ok(ticket) => tickets.push(ticket),
                Err(QueueError::AlreadyQueued(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !tickets.is_empty() {
            tracing::info!(count = tickets.len(), "Resumed unfinished uploads");
        }
        Ok(tickets)
    }

    /// Uploads newest first, each with the number of catalog records it last wrote.
    pub async fn list_uploads(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UploadSummary>, IntakeError> {
        let uploads = self.uploads.list(limit, offset).await?;
        let ids: Vec<Uuid> = uploads.iter().map(|u| u.id).collect();
        let counts = self.catalog.count_by_uploads(&ids).await?;

        Ok(uploads
            .into_iter()
            .map(|upload| {
                let products_count = counts.get(&upload.id).copied().unwrap_or(0);
                UploadSummary {
                    upload,
                    products_count,
                }
            })
            .collect())
    }

    /// Remove the stored file and the record. Catalog records are left alone.
    #[tracing::instrument(skip(self))]
    pub async fn delete_upload(&self, upload_id: Uuid) -> Result<(), IntakeError> {
        let upload = self
            .uploads
            .get(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {}", upload_id)))?;

        self.storage.delete(&upload.file_path).await?;
        self.uploads.delete(upload_id).await?;

        tracing::info!(upload_id = %upload_id, "Upload deleted");
        Ok(())
    }
}
