//! Header normalization and the field mapping table.

use std::sync::LazyLock;

use regex::Regex;

use crate::cleaning::clean_cell;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern is valid"));

/// Catalog columns an ingest row can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogColumn {
    UniqueKey,
    ProductTitle,
    ProductDescription,
    StyleNumber,
    MainframeColor,
    Size,
    ColorName,
    PiecePrice,
}

/// One entry of the header mapping table.
#[derive(Debug)]
pub struct FieldMapping {
    /// Normalized header names that map onto this entry.
    pub synonyms: &'static [&'static str],
    /// Name the header is rewritten to.
    pub canonical: &'static str,
    pub column: CatalogColumn,
}

/// Ordered header mapping table; the first entry listing a synonym wins.
pub static FIELD_MAP: &[FieldMapping] = &[
    FieldMapping {
        synonyms: &["unique_key"],
        canonical: "unique_key",
        column: CatalogColumn::UniqueKey,
    },
    FieldMapping {
        synonyms: &["product_title"],
        canonical: "product_title",
        column: CatalogColumn::ProductTitle,
    },
    FieldMapping {
        synonyms: &["product_description"],
        canonical: "product_description",
        column: CatalogColumn::ProductDescription,
    },
    FieldMapping {
        synonyms: &["style", "style_number"],
        canonical: "style_number",
        column: CatalogColumn::StyleNumber,
    },
    FieldMapping {
        synonyms: &["sanmar_mainframe_color", "mainframe_color"],
        canonical: "sanmar_mainframe_color",
        column: CatalogColumn::MainframeColor,
    },
    FieldMapping {
        synonyms: &["size"],
        canonical: "size",
        column: CatalogColumn::Size,
    },
    FieldMapping {
        synonyms: &["color_name"],
        canonical: "color_name",
        column: CatalogColumn::ColorName,
    },
    FieldMapping {
        synonyms: &["piece_price"],
        canonical: "piece_price",
        column: CatalogColumn::PiecePrice,
    },
];

fn lookup(normalized: &str) -> Option<&'static FieldMapping> {
    FIELD_MAP
        .iter()
        .find(|mapping| mapping.synonyms.contains(&normalized))
}

/// Normalize an already cleaned header cell.
///
/// Lowercases, collapses runs of non-alphanumerics into one underscore, trims
/// boundary underscores and maps the result through [`FIELD_MAP`]. Unmapped names
/// come back normalized but otherwise unchanged.
pub fn normalize_header(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = NON_ALPHANUMERIC.replace_all(&lowered, "_");
    let normalized = collapsed.trim_matches('_');

    match lookup(normalized) {
        Some(mapping) => mapping.canonical.to_string(),
        None => normalized.to_string(),
    }
}

/// Column layout derived from a file's header row.
#[derive(Debug, Clone)]
pub struct HeaderLayout {
    names: Vec<String>,
    columns: Vec<Option<CatalogColumn>>,
}

impl HeaderLayout {
    /// Build the layout from raw header cells, cleaning and normalizing each.
    pub fn from_raw<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<String> = cells
            .into_iter()
            .map(|cell| clean_cell(cell).map(|c| normalize_header(&c)).unwrap_or_default())
            .collect();
        let columns = names
            .iter()
            .map(|name| {
                FIELD_MAP
                    .iter()
                    .find(|mapping| mapping.canonical == name.as_str())
                    .map(|mapping| mapping.column)
            })
            .collect();

        Self { names, columns }
    }

    /// Number of header cells. Data rows narrower than this are ignored.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column_at(&self, index: usize) -> Option<CatalogColumn> {
        self.columns.get(index).copied().flatten()
    }

    pub fn has_column(&self, column: CatalogColumn) -> bool {
        self.columns.contains(&Some(column))
    }
}
