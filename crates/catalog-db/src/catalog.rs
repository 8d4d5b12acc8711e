//! Catalog repository: product rows in the `catalog_records` table, keyed by
//! `unique_key`.

use std::collections::HashMap;

use async_trait::async_trait;
use catalog_core::models::{
    CatalogFields, CatalogListQuery, CatalogPage, CatalogRecord, UpsertOutcome,
};
use catalog_core::AppError;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::store::CatalogStore;

const CATALOG_COLUMNS: &str = "id, unique_key, product_title, product_description, \
     style_number, mainframe_color, size, color_name, piece_price, updated_by_upload_id, \
     created_at, updated_at";

/// Columns matched by a free-text search.
const SEARCH_COLUMNS: &[&str] = &[
    "unique_key",
    "product_title",
    "product_description",
    "style_number",
    "color_name",
    "mainframe_color",
    "size",
];

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_search_filter(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    let Some(term) = search else {
        return;
    };
    let pattern = format!("%{}%", escape_like(term));

    builder.push(" WHERE (");
    for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder
            .push(*column)
            .push(" ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    builder.push(")");
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    #[tracing::instrument(skip(self), fields(db.table = "catalog_records"))]
    async fn get_by_key(&self, unique_key: &str) -> Result<Option<CatalogRecord>, AppError> {
        let query = format!("SELECT {CATALOG_COLUMNS} FROM catalog_records WHERE unique_key = $1");
        let record = sqlx::query_as::<Postgres, CatalogRecord>(&query)
            .bind(unique_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Single `INSERT ... ON CONFLICT DO UPDATE`. `xmax = 0` identifies a fresh insert;
    /// `last_write_changed` is computed against the pre-update row inside the same
    /// statement, so concurrent writers for one key never interleave a read and a write.
    #[tracing::instrument(skip(self, fields), fields(db.table = "catalog_records", upload_id = %upload_id))]
    async fn upsert(
        &self,
        unique_key: &str,
        fields: &CatalogFields,
        upload_id: Uuid,
    ) -> Result<UpsertOutcome, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO catalog_records (
                unique_key, product_title, product_description, style_number,
                mainframe_color, size, color_name, piece_price, updated_by_upload_id,
                last_write_changed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE)
            ON CONFLICT (unique_key) DO UPDATE SET
                product_title = EXCLUDED.product_title,
                product_description = EXCLUDED.product_description,
                style_number = EXCLUDED.style_number,
                mainframe_color = EXCLUDED.mainframe_color,
                size = EXCLUDED.size,
                color_name = EXCLUDED.color_name,
                piece_price = EXCLUDED.piece_price,
                updated_by_upload_id = EXCLUDED.updated_by_upload_id,
                updated_at = NOW(),
                last_write_changed = (
                    catalog_records.product_title,
                    catalog_records.product_description,
                    catalog_records.style_number,
                    catalog_records.mainframe_color,
                    catalog_records.size,
                    catalog_records.color_name,
                    catalog_records.piece_price
                ) IS DISTINCT FROM (
                    EXCLUDED.product_title,
                    EXCLUDED.product_description,
                    EXCLUDED.style_number,
                    EXCLUDED.mainframe_color,
                    EXCLUDED.size,
                    EXCLUDED.color_name,
                    EXCLUDED.piece_price
                )
            RETURNING (xmax = 0) AS inserted, last_write_changed
            "#,
        )
        .bind(unique_key)
        .bind(&fields.product_title)
        .bind(&fields.product_description)
        .bind(&fields.style_number)
        .bind(&fields.mainframe_color)
        .bind(&fields.size)
        .bind(&fields.color_name)
        .bind(fields.piece_price)
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        let changed: bool = row.try_get("last_write_changed")?;

        Ok(match (inserted, changed) {
            (true, _) => UpsertOutcome::Created,
            (false, true) => UpsertOutcome::Updated,
            (false, false) => UpsertOutcome::Unchanged,
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "catalog_records", upload_id = %upload_id))]
    async fn count_by_upload(&self, upload_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM catalog_records WHERE updated_by_upload_id = $1",
        )
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self, upload_ids), fields(db.table = "catalog_records", count = upload_ids.len()))]
    async fn count_by_uploads(&self, upload_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError> {
        if upload_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT updated_by_upload_id, COUNT(*)
            FROM catalog_records
            WHERE updated_by_upload_id = ANY($1)
            GROUP BY updated_by_upload_id
            "#,
        )
        .bind(upload_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "catalog_records", page = query.page))]
    async fn search(&self, query: &CatalogListQuery) -> Result<CatalogPage, AppError> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM catalog_records");
        push_search_filter(&mut count_builder, query.search.as_deref());
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {CATALOG_COLUMNS} FROM catalog_records"));
        push_search_filter(&mut builder, query.search.as_deref());
        // Sort column and direction come from closed enums, never from raw input.
        builder
            .push(" ORDER BY ")
            .push(query.sort.column())
            .push(" ")
            .push(query.direction.as_sql())
            .push(", id ASC LIMIT ")
            .push_bind(query.per_page)
            .push(" OFFSET ")
            .push_bind(query.offset());

        let records = builder
            .build_query_as::<CatalogRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(CatalogPage {
            records,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }
}
