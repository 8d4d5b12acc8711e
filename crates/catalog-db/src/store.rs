use std::collections::HashMap;

use async_trait::async_trait;
use catalog_core::models::{
    CatalogFields, CatalogListQuery, CatalogPage, CatalogRecord, NewUpload, UploadOwner,
    UploadRecord, UploadStatus, UpsertOutcome,
};
use catalog_core::AppError;
use uuid::Uuid;

/// Storage of upload lifecycle records.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Insert a new record in `pending`.
    async fn create(&self, upload: NewUpload) -> Result<UploadRecord, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>, AppError>;

    /// Move the record to `next`, but only from one of the states allowed to precede it.
    ///
    /// The check and the write happen in one statement. Returns `NotFound` when the
    /// record is gone and `InvalidTransition` when its current status forbids the move.
    /// `error_message`, when given, replaces the stored one.
    async fn transition(
        &self,
        id: Uuid,
        next: UploadStatus,
        error_message: Option<String>,
    ) -> Result<UploadRecord, AppError>;

    async fn set_file_hash(&self, id: Uuid, file_hash: &str) -> Result<(), AppError>;

    /// Stamp `processed_at` with the current time.
    async fn mark_processed(&self, id: Uuid) -> Result<UploadRecord, AppError>;

    async fn find_owner(&self, user_id: Uuid) -> Result<Option<UploadOwner>, AppError>;

    /// Newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UploadRecord>, AppError>;

    /// Records still in `pending` or `processing`, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<UploadRecord>, AppError>;

    /// Remove the record. Catalog records keep their (now stale) back-reference.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Keyed storage of catalog records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_by_key(&self, unique_key: &str) -> Result<Option<CatalogRecord>, AppError>;

    /// Insert or update the record for `unique_key` as one atomic operation.
    ///
    /// The back-reference and `updated_at` are always rewritten; the outcome reports
    /// whether any descriptive field actually differed.
    async fn upsert(
        &self,
        unique_key: &str,
        fields: &CatalogFields,
        upload_id: Uuid,
    ) -> Result<UpsertOutcome, AppError>;

    /// Number of records whose back-reference points at `upload_id`.
    async fn count_by_upload(&self, upload_id: Uuid) -> Result<i64, AppError>;

    async fn count_by_uploads(&self, upload_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError>;

    async fn search(&self, query: &CatalogListQuery) -> Result<CatalogPage, AppError>;
}
