use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{UploadOwner, UploadRecord, UploadStatus};

/// Topic every upload lifecycle message is published on.
pub const UPLOAD_TOPIC: &str = "file-uploads";

/// Event name carried by every upload lifecycle message.
pub const UPLOAD_STATUS_EVENT: &str = "file-upload.status-changed";

/// Point-in-time view of an upload as seen by live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSnapshot {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Catalog records whose back-reference points at this upload, counted at publish time.
    pub products_count: i64,
    pub user: Option<UploadOwner>,
}

impl UploadSnapshot {
    pub fn new(record: &UploadRecord, products_count: i64, user: Option<UploadOwner>) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            original_name: record.original_name.clone(),
            status: record.status,
            error_message: record.error_message.clone(),
            processed_at: record.processed_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            products_count,
            user,
        }
    }
}

/// Wire shape: `{event, upload: {...}, progress?, message?, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastMessage {
    pub event: String,
    pub upload: UploadSnapshot,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    pub fn status_changed(
        upload: UploadSnapshot,
        progress: Option<u8>,
        message: Option<String>,
    ) -> Self {
        Self {
            event: UPLOAD_STATUS_EVENT.to_string(),
            upload,
            progress: progress.map(|p| p.min(100)),
            message,
            timestamp: Utc::now(),
        }
    }
}
