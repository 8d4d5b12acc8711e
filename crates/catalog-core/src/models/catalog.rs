use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Default page size for catalog listings.
pub const CATALOG_PAGE_SIZE: i64 = 50;

/// One product row, keyed by `unique_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogRecord {
    pub id: Uuid,
    pub unique_key: String,
    pub product_title: Option<String>,
    pub product_description: Option<String>,
    pub style_number: Option<String>,
    pub mainframe_color: Option<String>,
    pub size: Option<String>,
    pub color_name: Option<String>,
    pub piece_price: Option<Decimal>,
    /// Upload that last wrote this record. May point at a deleted upload.
    pub updated_by_upload_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogRecord {
    pub fn fields(&self) -> CatalogFields {
        CatalogFields {
            product_title: self.product_title.clone(),
            product_description: self.product_description.clone(),
            style_number: self.style_number.clone(),
            mainframe_color: self.mainframe_color.clone(),
            size: self.size.clone(),
            color_name: self.color_name.clone(),
            piece_price: self.piece_price,
        }
    }
}

/// The descriptive, non-bookkeeping fields an ingest row maps onto.
///
/// Equality on this struct is the "did anything change" test used by upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFields {
    pub product_title: Option<String>,
    pub product_description: Option<String>,
    pub style_number: Option<String>,
    pub mainframe_color: Option<String>,
    pub size: Option<String>,
    pub color_name: Option<String>,
    pub piece_price: Option<Decimal>,
}

/// How an upsert affected the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No record existed for the key.
    Created,
    /// At least one descriptive field differed and was overwritten.
    Updated,
    /// Only the back-reference and `updated_at` were touched.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSortField {
    UniqueKey,
    ProductTitle,
    StyleNumber,
    PiecePrice,
    CreatedAt,
    UpdatedAt,
}

impl CatalogSortField {
    pub fn column(&self) -> &'static str {
        match self {
            CatalogSortField::UniqueKey => "unique_key",
            CatalogSortField::ProductTitle => "product_title",
            CatalogSortField::StyleNumber => "style_number",
            CatalogSortField::PiecePrice => "piece_price",
            CatalogSortField::CreatedAt => "created_at",
            CatalogSortField::UpdatedAt => "updated_at",
        }
    }
}

impl Display for CatalogSortField {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.column())
    }
}

impl FromStr for CatalogSortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unique_key" => Ok(CatalogSortField::UniqueKey),
            "product_title" => Ok(CatalogSortField::ProductTitle),
            "style_number" => Ok(CatalogSortField::StyleNumber),
            "piece_price" => Ok(CatalogSortField::PiecePrice),
            "created_at" => Ok(CatalogSortField::CreatedAt),
            "updated_at" => Ok(CatalogSortField::UpdatedAt),
            _ => Err(anyhow::anyhow!("Invalid sort field: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(anyhow::anyhow!("Invalid sort direction: {}", s)),
        }
    }
}

/// Catalog listing parameters. Unknown sort fields fall back to `updated_at desc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogListQuery {
    pub search: Option<String>,
    pub sort: CatalogSortField,
    pub direction: SortDirection,
    /// 1-based page number.
    pub page: i64,
    pub per_page: i64,
}

impl Default for CatalogListQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: CatalogSortField::UpdatedAt,
            direction: SortDirection::Desc,
            page: 1,
            per_page: CATALOG_PAGE_SIZE,
        }
    }
}

impl CatalogListQuery {
    /// Build a query from loosely typed parameters, dropping anything not whitelisted.
    pub fn from_params(
        search: Option<&str>,
        sort: Option<&str>,
        direction: Option<&str>,
        page: Option<i64>,
    ) -> Self {
        let sort_field = sort.and_then(|s| s.parse::<CatalogSortField>().ok());
        let (sort, direction) = match sort_field {
            Some(field) => (
                field,
                direction
                    .and_then(|d| d.parse::<SortDirection>().ok())
                    .unwrap_or_default(),
            ),
            None => (CatalogSortField::UpdatedAt, SortDirection::Desc),
        };

        Self {
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort,
            direction,
            page: page.unwrap_or(1).max(1),
            per_page: CATALOG_PAGE_SIZE,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// One page of catalog records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub records: Vec<CatalogRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl CatalogPage {
    pub fn last_page(&self) -> i64 {
        if self.total == 0 {
            1
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }
}
