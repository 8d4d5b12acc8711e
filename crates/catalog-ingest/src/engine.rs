//! Row-by-row ingest of a catalog file into a [`CatalogStore`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use catalog_core::models::{CatalogFields, UpsertOutcome};
use catalog_db::CatalogStore;
use catalog_storage::FileStorage;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use rust_decimal::Decimal;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::cleaning::clean_cell;
use crate::error::{IngestError, RowError};
use crate::header::{CatalogColumn, HeaderLayout};

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Data rows read after the header, including ones later ignored.
    pub rows_seen: u64,
    pub created: u64,
    pub updated: u64,
    /// Existing records whose fields already matched.
    pub unchanged: u64,
    /// Rows without a key, or whose upsert failed.
    pub skipped: u64,
    pub duplicate_in_file: u64,
    /// Rows with fewer cells than the header. Not reported in the summary.
    pub short_rows: u64,
}

impl IngestStats {
    pub fn summary(&self) -> String {
        format!(
            "Processing complete. Created: {}, Updated: {}, Skipped: {}",
            self.created, self.updated, self.skipped
        )
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Cleaned cells of one accepted row, keyed by catalog column.
#[derive(Debug, Default)]
struct RowValues {
    unique_key: Option<String>,
    product_title: Option<String>,
    product_description: Option<String>,
    style_number: Option<String>,
    mainframe_color: Option<String>,
    size: Option<String>,
    color_name: Option<String>,
    piece_price: Option<String>,
}

impl RowValues {
    fn from_record(layout: &HeaderLayout, record: &ByteRecord) -> Self {
        let mut values = RowValues::default();

        // Later columns win when a header name repeats.
        for (index, raw) in record.iter().take(layout.len()).enumerate() {
            let Some(column) = layout.column_at(index) else {
                continue;
            };
            let cell = clean_cell(&String::from_utf8_lossy(raw));
            let slot = match column {
                CatalogColumn::UniqueKey => &mut values.unique_key,
                CatalogColumn::ProductTitle => &mut values.product_title,
                CatalogColumn::ProductDescription => &mut values.product_description,
                CatalogColumn::StyleNumber => &mut values.style_number,
                CatalogColumn::MainframeColor => &mut values.mainframe_color,
                CatalogColumn::Size => &mut values.size,
                CatalogColumn::ColorName => &mut values.color_name,
                CatalogColumn::PiecePrice => &mut values.piece_price,
            };
            *slot = cell;
        }

        values
    }

    fn into_fields(self) -> Result<CatalogFields, RowError> {
        let piece_price = self
            .piece_price
            .map(|raw| parse_price(&raw).ok_or(RowError::InvalidPrice(raw)))
            .transpose()?;

        Ok(CatalogFields {
            product_title: self.product_title,
            product_description: self.product_description,
            style_number: self.style_number,
            mainframe_color: self.mainframe_color,
            size: self.size,
            color_name: self.color_name,
            piece_price,
        })
    }
}

fn parse_price(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Streams catalog files into a catalog store.
#[derive(Clone)]
pub struct IngestEngine {
    catalog: Arc<dyn CatalogStore>,
}

impl IngestEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Open `storage_key` and ingest it on behalf of `upload_id`.
    pub async fn ingest_file(
        &self,
        storage: &dyn FileStorage,
        storage_key: &str,
        upload_id: Uuid,
    ) -> Result<IngestStats, IngestError> {
        let reader = storage.open(storage_key).await?;
        self.ingest_reader(reader, upload_id).await
    }

    /// Ingest every row `reader` yields. The first row is the header.
    ///
    /// There is no surrounding transaction: if reading fails part way, rows already
    /// upserted remain.
    #[tracing::instrument(skip(self, reader), fields(upload_id = %upload_id))]
    pub async fn ingest_reader<R>(&self, reader: R, upload_id: Uuid) -> Result<IngestStats, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        let mut csv = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .create_reader(reader);

        let mut record = ByteRecord::new();
        let has_header = csv
            .read_byte_record(&mut record)
            .await
            .map_err(|e| IngestError::HeaderUnreadable(e.to_string()))?;
        if !has_header {
            return Err(IngestError::HeaderUnreadable("file is empty".to_string()));
        }

        let header_cells: Vec<String> = record
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect();
        let layout = HeaderLayout::from_raw(header_cells.iter().map(String::as_str));
        tracing::debug!(headers = ?layout.names(), "Header row normalized");
        if !layout.has_column(CatalogColumn::UniqueKey) {
            tracing::warn!(
                headers = ?layout.names(),
                "Header has no unique_key column; every row will be skipped"
            );
        }

        let mut stats = IngestStats::default();
        let mut seen_keys: HashSet<String> = HashSet::new();
        // Header is row 1.
        let mut row_number: u64 = 1;

        loop {
            row_number += 1;
            match csv.read_byte_record(&mut record).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => {
                    tracing::error!(
                        row_number,
                        created = stats.created,
                        updated = stats.updated,
                        skipped = stats.skipped,
                        error = %source,
                        "Catalog file became unreadable; earlier rows stay committed"
                    );
                    return Err(IngestError::Read { row_number, source });
                }
            }

            stats.rows_seen += 1;
            self.process_row(&layout, &record, row_number, upload_id, &mut seen_keys, &mut stats)
                .await;
        }

        tracing::info!(
            rows_seen = stats.rows_seen,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            duplicate_in_file = stats.duplicate_in_file,
            short_rows = stats.short_rows,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Catalog file ingested"
        );

        Ok(stats)
    }

    async fn process_row(
        &self,
        layout: &HeaderLayout,
        record: &ByteRecord,
        row_number: u64,
        upload_id: Uuid,
        seen_keys: &mut HashSet<String>,
        stats: &mut IngestStats,
    ) {
        if record.len() < layout.len() {
            tracing::debug!(
                row_number,
                cells = record.len(),
                expected = layout.len(),
                "Ignoring short row"
            );
            stats.short_rows += 1;
            return;
        }

        let mut values = RowValues::from_record(layout, record);
        let Some(unique_key) = values.unique_key.take() else {
            tracing::debug!(row_number, "Skipping row without unique_key");
            stats.skipped += 1;
            return;
        };

        if !seen_keys.insert(unique_key.clone()) {
            tracing::debug!(row_number, unique_key = %unique_key, "Duplicate key in file");
            stats.duplicate_in_file += 1;
            return;
        }

        match self.upsert_row(&unique_key, values, upload_id).await {
            Ok(UpsertOutcome::Created) => stats.created += 1,
            Ok(UpsertOutcome::Updated) => stats.updated += 1,
            Ok(UpsertOutcome::Unchanged) => stats.unchanged += 1,
            Err(error) => {
                tracing::warn!(
                    row_number,
                    unique_key = %unique_key,
                    error = %error,
                    "Failed to upsert catalog row"
                );
                stats.skipped += 1;
            }
        }
    }

    async fn upsert_row(
        &self,
        unique_key: &str,
        values: RowValues,
        upload_id: Uuid,
    ) -> Result<UpsertOutcome, RowError> {
        let fields = values.into_fields()?;
        Ok(self.catalog.upsert(unique_key, &fields, upload_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_matches_wire_format() {
        let stats = IngestStats {
            created: 2,
            updated: 1,
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(
            stats.summary(),
            "Processing complete. Created: 2, Updated: 1, Skipped: 3"
        );
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("12.50"), Some(Decimal::new(1250, 2)));
        assert_eq!(parse_price("1e2"), Some(Decimal::new(100, 0)));
        assert_eq!(parse_price("twelve"), None);
    }
}
