//! Upload repository: lifecycle rows in the `file_uploads` table.

use async_trait::async_trait;
use catalog_core::models::{NewUpload, UploadOwner, UploadRecord, UploadStatus};
use catalog_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::store::UploadStore;

const UPLOAD_COLUMNS: &str = "id, user_id, filename, original_name, file_path, file_hash, \
     status, error_message, processed_at, created_at, updated_at";

#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition_error(&self, id: Uuid, next: UploadStatus) -> AppError {
        match self.get(id).await {
            Ok(Some(current)) => AppError::InvalidTransition {
                upload_id: id,
                from: current.status,
                to: next,
            },
            Ok(None) => AppError::NotFound(format!("Upload {} not found", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl UploadStore for UploadRepository {
    #[tracing::instrument(skip(self, upload), fields(db.table = "file_uploads"))]
    async fn create(&self, upload: NewUpload) -> Result<UploadRecord, AppError> {
        let query = format!(
            r#"
            INSERT INTO file_uploads (user_id, filename, original_name, file_path, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {UPLOAD_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<Postgres, UploadRecord>(&query)
            .bind(upload.user_id)
            .bind(&upload.filename)
            .bind(&upload.original_name)
            .bind(&upload.file_path)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_uploads", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>, AppError> {
        let query = format!("SELECT {UPLOAD_COLUMNS} FROM file_uploads WHERE id = $1");
        let record = sqlx::query_as::<Postgres, UploadRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, error_message), fields(db.table = "file_uploads", db.record_id = %id, status = %next))]
    async fn transition(
        &self,
        id: Uuid,
        next: UploadStatus,
        error_message: Option<String>,
    ) -> Result<UploadRecord, AppError> {
        let allowed: Vec<&'static str> = UploadStatus::predecessors_of(next)
            .iter()
            .map(UploadStatus::as_str)
            .collect();

        let query = format!(
            r#"
            UPDATE file_uploads
            SET status = $2,
                error_message = COALESCE($3, error_message),
                updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($4)
            RETURNING {UPLOAD_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<Postgres, UploadRecord>(&query)
            .bind(id)
            .bind(next)
            .bind(error_message)
            .bind(&allowed)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => Ok(record),
            None => Err(self.transition_error(id, next).await),
        }
    }

    #[tracing::instrument(skip(self, file_hash), fields(db.table = "file_uploads", db.record_id = %id))]
    async fn set_file_hash(&self, id: Uuid, file_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE file_uploads SET file_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(file_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Upload {} not found", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_uploads", db.record_id = %id))]
    async fn mark_processed(&self, id: Uuid) -> Result<UploadRecord, AppError> {
        let query = format!(
            r#"
            UPDATE file_uploads
            SET processed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {UPLOAD_COLUMNS}
            "#
        );
        sqlx::query_as::<Postgres, UploadRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "users"))]
    async fn find_owner(&self, user_id: Uuid) -> Result<Option<UploadOwner>, AppError> {
        let owner = sqlx::query_as::<Postgres, UploadOwner>(
            "SELECT id, name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_uploads"))]
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UploadRecord>, AppError> {
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM file_uploads \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let records = sqlx::query_as::<Postgres, UploadRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_uploads"))]
    async fn list_unfinished(&self) -> Result<Vec<UploadRecord>, AppError> {
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM file_uploads \
             WHERE status IN ('pending', 'processing') ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<Postgres, UploadRecord>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_uploads", db.record_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM file_uploads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
