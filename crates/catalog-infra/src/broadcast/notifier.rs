use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use catalog_core::models::{BroadcastMessage, UploadRecord, UploadSnapshot, UploadStatus};
use catalog_db::{CatalogStore, UploadStore};
use uuid::Uuid;

use super::Broadcaster;

/// Turns upload records into lifecycle broadcasts.
///
/// Builds the snapshot (fresh catalog count and owner), publishes it and never
/// returns an error. Repeating the last `(status, progress)` announced for an upload
/// is suppressed, so a retried step that re-announces itself is observed once.
#[derive(Clone)]
pub struct UploadNotifier {
    broadcaster: Arc<dyn Broadcaster>,
    uploads: Arc<dyn UploadStore>,
    catalog: Arc<dyn CatalogStore>,
    last_announced: Arc<Mutex<HashMap<Uuid, (UploadStatus, Option<u8>)>>>,
}

impl UploadNotifier {
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        uploads: Arc<dyn UploadStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            broadcaster,
            uploads,
            catalog,
            last_announced: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` when this announcement repeats the previous one for the upload.
    fn is_repeat(&self, upload: &UploadRecord, progress: Option<u8>) -> bool {
        let Ok(mut last) = self.last_announced.lock() else {
            return false;
        };
        let key = (upload.status, progress);
        if last.get(&upload.id) == Some(&key) {
            return true;
        }
        if upload.status.is_terminal() {
            last.remove(&upload.id);
        } else {
            last.insert(upload.id, key);
        }
        false
    }

    /// Drop the repeat-suppression entry for an upload that will not be announced again.
    pub fn forget(&self, upload_id: Uuid) {
        if let Ok(mut last) = self.last_announced.lock() {
            last.remove(&upload_id);
        }
    }

    async fn snapshot(&self, upload: &UploadRecord) -> UploadSnapshot {
        let products_count = match self.catalog.count_by_upload(upload.id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(upload_id = %upload.id, error = %e, "Failed to count catalog records for broadcast");
                0
            }
        };
        let owner = match self.uploads.find_owner(upload.user_id).await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(upload_id = %upload.id, error = %e, "Failed to load upload owner for broadcast");
                None
            }
        };
        UploadSnapshot::new(upload, products_count, owner)
    }

    /// Publish the current state of `upload`. Failures are logged, not returned.
    pub async fn announce(&self, upload: &UploadRecord, progress: Option<u8>, message: Option<String>) {
        if self.is_repeat(upload, progress) {
            tracing::debug!(
                upload_id = %upload.id,
                status = %upload.status,
                "Skipping repeated status announcement"
            );
            return;
        }

        let snapshot = self.snapshot(upload).await;
        let broadcast = BroadcastMessage::status_changed(snapshot, progress, message);

        match self.broadcaster.publish(&broadcast).await {
            Ok(()) => tracing::debug!(
                upload_id = %upload.id,
                status = %upload.status,
                progress = ?broadcast.progress,
                topic = self.broadcaster.topic(),
                "Upload status broadcast"
            ),
            Err(e) => tracing::warn!(
                upload_id = %upload.id,
                status = %upload.status,
                error = %e,
                "Failed to broadcast upload status"
            ),
        }
    }
}
