//! In-memory stores
//!
//! Same semantics as the PostgreSQL repositories, each operation atomic under a
//! single mutex. Used by tests and by dry runs of the CLI.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use catalog_core::models::{
    CatalogFields, CatalogListQuery, CatalogPage, CatalogRecord, CatalogSortField, NewUpload,
    SortDirection, UploadOwner, UploadRecord, UploadStatus, UpsertOutcome,
};
use catalog_core::AppError;
use chrono::Utc;
use uuid::Uuid;

use crate::store::{CatalogStore, UploadStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("In-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct MemoryUploadStore {
    uploads: Arc<Mutex<HashMap<Uuid, UploadRecord>>>,
    owners: Arc<Mutex<HashMap<Uuid, UploadOwner>>>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user so broadcasts can carry owner info.
    pub fn add_owner(&self, owner: UploadOwner) -> Result<(), AppError> {
        lock(&self.owners)?.insert(owner.id, owner);
        Ok(())
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn create(&self, upload: NewUpload) -> Result<UploadRecord, AppError> {
        let now = Utc::now();
        let record = UploadRecord {
            id: Uuid::new_v4(),
            user_id: upload.user_id,
            filename: upload.filename,
            original_name: upload.original_name,
            file_path: upload.file_path,
            file_hash: None,
            status: UploadStatus::Pending,
            error_message: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        lock(&self.uploads)?.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>, AppError> {
        Ok(lock(&self.uploads)?.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        next: UploadStatus,
        error_message: Option<String>,
    ) -> Result<UploadRecord, AppError> {
        let mut uploads = lock(&self.uploads)?;
        let record = uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))?;

        if !record.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                upload_id: id,
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        if error_message.is_some() {
            record.error_message = error_message;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_file_hash(&self, id: Uuid, file_hash: &str) -> Result<(), AppError> {
        let mut uploads = lock(&self.uploads)?;
        let record = uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))?;
        record.file_hash = Some(file_hash.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid) -> Result<UploadRecord, AppError> {
        let mut uploads = lock(&self.uploads)?;
        let record = uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))?;
        let now = Utc::now();
        record.processed_at = Some(now);
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn find_owner(&self, user_id: Uuid) -> Result<Option<UploadOwner>, AppError> {
        Ok(lock(&self.owners)?.get(&user_id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UploadRecord>, AppError> {
        let mut records: Vec<UploadRecord> = lock(&self.uploads)?.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_unfinished(&self) -> Result<Vec<UploadRecord>, AppError> {
        let mut records: Vec<UploadRecord> = lock(&self.uploads)?
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(lock(&self.uploads)?.remove(&id).is_some())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCatalogStore {
    records: Arc<Mutex<HashMap<String, CatalogRecord>>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_search(record: &CatalogRecord, needle: &str) -> bool {
    let haystacks = [
        Some(record.unique_key.as_str()),
        record.product_title.as_deref(),
        record.product_description.as_deref(),
        record.style_number.as_deref(),
        record.color_name.as_deref(),
        record.mainframe_color.as_deref(),
        record.size.as_deref(),
    ];
    haystacks
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(needle))
}

/// Orders like PostgreSQL: NULLs sort last ascending and first descending.
fn compare_nullable<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    let ascending = match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    };
    match direction {
        SortDirection::Asc => ascending,
        SortDirection::Desc => ascending.reverse(),
    }
}

fn compare_records(a: &CatalogRecord, b: &CatalogRecord, query: &CatalogListQuery) -> Ordering {
    let direction = query.direction;
    let primary = match query.sort {
        CatalogSortField::UniqueKey => {
            compare_nullable(Some(&a.unique_key), Some(&b.unique_key), direction)
        }
        CatalogSortField::ProductTitle => {
            compare_nullable(a.product_title.as_ref(), b.product_title.as_ref(), direction)
        }
        CatalogSortField::StyleNumber => {
            compare_nullable(a.style_number.as_ref(), b.style_number.as_ref(), direction)
        }
        CatalogSortField::PiecePrice => compare_nullable(a.piece_price, b.piece_price, direction),
        CatalogSortField::CreatedAt => {
            compare_nullable(Some(a.created_at), Some(b.created_at), direction)
        }
        CatalogSortField::UpdatedAt => {
            compare_nullable(Some(a.updated_at), Some(b.updated_at), direction)
        }
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get_by_key(&self, unique_key: &str) -> Result<Option<CatalogRecord>, AppError> {
        Ok(lock(&self.records)?.get(unique_key).cloned())
    }

    async fn upsert(
        &self,
        unique_key: &str,
        fields: &CatalogFields,
        upload_id: Uuid,
    ) -> Result<UpsertOutcome, AppError> {
        let mut records = lock(&self.records)?;
        let now = Utc::now();

        match records.get_mut(unique_key) {
            Some(existing) => {
                let changed = existing.fields() != *fields;
                if changed {
                    existing.product_title = fields.product_title.clone();
                    existing.product_description = fields.product_description.clone();
                    existing.style_number = fields.style_number.clone();
                    existing.mainframe_color = fields.mainframe_color.clone();
                    existing.size = fields.size.clone();
                    existing.color_name = fields.color_name.clone();
                    existing.piece_price = fields.piece_price;
                }
                existing.updated_by_upload_id = Some(upload_id);
                existing.updated_at = now;

                Ok(if changed {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                })
            }
            None => {
                let record = CatalogRecord {
                    id: Uuid::new_v4(),
                    unique_key: unique_key.to_string(),
                    product_title: fields.product_title.clone(),
                    product_description: fields.product_description.clone(),
                    style_number: fields.style_number.clone(),
                    mainframe_color: fields.mainframe_color.clone(),
                    size: fields.size.clone(),
                    color_name: fields.color_name.clone(),
                    piece_price: fields.piece_price,
                    updated_by_upload_id: Some(upload_id),
                    created_at: now,
                    updated_at: now,
                };
                records.insert(record.unique_key.clone(), record);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn count_by_upload(&self, upload_id: Uuid) -> Result<i64, AppError> {
        let count = lock(&self.records)?
            .values()
            .filter(|r| r.updated_by_upload_id == Some(upload_id))
            .count();
        Ok(count as i64)
    }

    async fn count_by_uploads(&self, upload_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError> {
        let mut counts = HashMap::new();
        for record in lock(&self.records)?.values() {
            if let Some(id) = record.updated_by_upload_id {
                if upload_ids.contains(&id) {
                    *counts.entry(id).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn search(&self, query: &CatalogListQuery) -> Result<CatalogPage, AppError> {
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut matching: Vec<CatalogRecord> = lock(&self.records)?
            .values()
            .filter(|r| needle.as_deref().map_or(true, |n| matches_search(r, n)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| compare_records(a, b, query));

        let total = matching.len() as i64;
        let records = matching
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.per_page.max(0) as usize)
            .collect();

        Ok(CatalogPage {
            records,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }
}
