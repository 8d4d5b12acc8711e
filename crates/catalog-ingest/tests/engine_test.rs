use std::collections::HashMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use catalog_core::models::{
    CatalogFields, CatalogListQuery, CatalogPage, CatalogRecord, UpsertOutcome,
};
use catalog_core::AppError;
use catalog_db::{CatalogStore, MemoryCatalogStore};
use catalog_ingest::{IngestEngine, IngestError, IngestStats};
use catalog_storage::{FileStorage, LocalStorage};
use rust_decimal::Decimal;
use tokio::io::{AsyncRead, ReadBuf};
use uuid::Uuid;

const HEADER: &str = "UNIQUE_KEY,PRODUCT_TITLE,PRODUCT_DESCRIPTION,STYLE#,SANMAR_MAINFRAME_COLOR,SIZE,COLOR_NAME,PIECE_PRICE\n";

async fn ingest(engine: &IngestEngine, csv: &str) -> Result<IngestStats, IngestError> {
    engine
        .ingest_reader(Cursor::new(csv.as_bytes().to_vec()), Uuid::new_v4())
        .await
}

fn catalog_with_engine() -> (Arc<MemoryCatalogStore>, IngestEngine) {
    let catalog = Arc::new(MemoryCatalogStore::new());
    let engine = IngestEngine::new(catalog.clone());
    (catalog, engine)
}

#[tokio::test]
async fn unchanged_file_is_idempotent() {
    let (catalog, engine) = catalog_with_engine();
    let csv = format!(
        "{HEADER}K1,Tee,Soft tee,PC54,Navy,L,Navy Blue,4.50\nK2,Polo,Pique,K500,Red,M,Red,12.00\n"
    );

    let first = ingest(&engine, &csv).await.unwrap();
    assert_eq!(first.created, 2);
    assert_eq!(first.updated, 0);

    let second = ingest(&engine, &csv).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(catalog.len(), 2);
}

#[tokio::test]
async fn first_duplicate_in_file_wins() {
    let (catalog, engine) = catalog_with_engine();
    let csv = format!("{HEADER}K1,First,,,,,,1\nK1,Second,,,,,,2\n");

    let stats = ingest(&engine, &csv).await.unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.duplicate_in_file, 1);

    let record = catalog.get_by_key("K1").await.unwrap().unwrap();
    assert_eq!(record.product_title.as_deref(), Some("First"));
    assert_eq!(record.piece_price, Some(Decimal::new(1, 0)));
}

#[tokio::test]
async fn rows_without_key_are_skipped() {
    let (catalog, engine) = catalog_with_engine();
    let csv = format!("{HEADER} ,Keyless,,,,,,\n&#32;,Entity blank,,,,,,\nK1,Kept,,,,,,\n");

    let stats = ingest(&engine, &csv).await.unwrap();
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.created, 1);
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn short_rows_are_ignored_and_long_rows_truncated() {
    let (catalog, engine) = catalog_with_engine();
    let csv = "unique_key,product_title\nK1\nK2,Tee,extra,cells\n";

    let stats = ingest(&engine, csv).await.unwrap();
    assert_eq!(stats.rows_seen, 2);
    assert_eq!(stats.short_rows, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.created, 1);
    assert!(catalog.get_by_key("K1").await.unwrap().is_none());
    assert_eq!(
        catalog.get_by_key("K2").await.unwrap().unwrap().product_title.as_deref(),
        Some("Tee")
    );
}

#[tokio::test]
async fn header_synonyms_and_cleaning_apply() {
    let (catalog, engine) = catalog_with_engine();
    let csv = "\u{FEFF}Unique Key, Style ,Mainframe Color,Product Title\n K1 ,PC54,Navy,Tom &amp; Jerry\u{7}\n";

    ingest(&engine, csv).await.unwrap();

    let record = catalog.get_by_key("K1").await.unwrap().unwrap();
    assert_eq!(record.style_number.as_deref(), Some("PC54"));
    assert_eq!(record.mainframe_color.as_deref(), Some("Navy"));
    assert_eq!(record.product_title.as_deref(), Some("Tom & Jerry"));
}

#[tokio::test]
async fn changed_row_counts_as_updated() {
    let (catalog, engine) = catalog_with_engine();
    ingest(&engine, "unique_key,piece_price\nK1,4.50\n").await.unwrap();

    let stats = ingest(&engine, "unique_key,piece_price\nK1,5.00\n").await.unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(
        catalog.get_by_key("K1").await.unwrap().unwrap().piece_price,
        Some(Decimal::new(500, 2))
    );
}

#[tokio::test]
async fn unparseable_price_skips_only_that_row() {
    let (catalog, engine) = catalog_with_engine();
    let csv = "unique_key,piece_price\nK1,cheap\nK2,3.25\n";

    let stats = ingest(&engine, csv).await.unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.created, 1);
    assert!(catalog.get_by_key("K1").await.unwrap().is_none());
}

#[tokio::test]
async fn quoted_cells_with_commas_and_newlines() {
    let (catalog, engine) = catalog_with_engine();
    let csv = "unique_key,product_description\nK1,\"Soft, warm\nand cozy\"\n";

    ingest(&engine, csv).await.unwrap();
    assert_eq!(
        catalog
            .get_by_key("K1")
            .await
            .unwrap()
            .unwrap()
            .product_description
            .as_deref(),
        Some("Soft, warm\nand cozy")
    );
}

#[tokio::test]
async fn empty_file_has_unreadable_header() {
    let (_, engine) = catalog_with_engine();
    let err = ingest(&engine, "").await.unwrap_err();
    assert!(matches!(err, IngestError::HeaderUnreadable(_)));
}

#[tokio::test]
async fn header_only_file_processes_nothing() {
    let (catalog, engine) = catalog_with_engine();
    let stats = ingest(&engine, HEADER).await.unwrap();
    assert_eq!(stats, IngestStats::default());
    assert!(catalog.is_empty());
}

#[tokio::test]
async fn missing_file_is_a_file_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path()).await.unwrap();
    let (_, engine) = catalog_with_engine();

    let err = engine
        .ingest_file(&storage, "uploads/missing.csv", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::FileAccess(_)));
}

#[tokio::test]
async fn ingests_from_local_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path()).await.unwrap();
    storage
        .store(
            "uploads/1700000000_catalog.csv",
            Bytes::from_static(b"unique_key,size\nK1,XL\nK2,S\n"),
        )
        .await
        .unwrap();
    let (catalog, engine) = catalog_with_engine();
    let upload_id = Uuid::new_v4();

    let stats = engine
        .ingest_file(&storage, "uploads/1700000000_catalog.csv", upload_id)
        .await
        .unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(catalog.count_by_upload(upload_id).await.unwrap(), 2);
}

/// Serves `data`, then fails every later read.
struct TruncatedReader {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for TruncatedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos >= this.data.len() {
            return Poll::Ready(Err(io::Error::other("disk gone")));
        }
        let n = buf.remaining().min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn read_failure_keeps_earlier_rows_and_rerun_finishes_the_file() {
    let (catalog, engine) = catalog_with_engine();
    let header = "unique_key,product_title\n";
    let reader = TruncatedReader {
        data: format!("{header}K1,A\nK2,B\n").into_bytes(),
        pos: 0,
    };

    let err = engine
        .ingest_reader(reader, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Read { row_number: 4, .. }));
    assert!(err.to_string().starts_with("Read error at row 4"));
    assert!(err.to_string().contains("disk gone"));
    assert_eq!(catalog.len(), 2);

    let stats = ingest(&engine, &format!("{header}K1,A\nK2,B\nK3,C\n"))
        .await
        .unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(catalog.len(), 3);
}

/// Fails every upsert for one key and delegates the rest.
struct FailingCatalog {
    inner: MemoryCatalogStore,
    poisoned_key: &'static str,
}

#[async_trait]
impl CatalogStore for FailingCatalog {
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
            return Err(AppError::Internal("constraint violation".to_string()));
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

#[tokio::test]
async fn failing_row_is_isolated() {
    let inner = MemoryCatalogStore::new();
    let engine = IngestEngine::new(Arc::new(FailingCatalog {
        inner: inner.clone(),
        poisoned_key: "K2",
    }));

    let stats = ingest(&engine, "unique_key\nK1\nK2\nK3\n").await.unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.skipped, 1);
    assert!(inner.get_by_key("K3").await.unwrap().is_some());
}
