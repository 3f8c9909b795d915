use super::*;
use crate::batch::Batch;
use crate::schema::{ColumnDef, ColumnType};
use crate::value::Value;
use tempfile::TempDir;

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn gene_schema() -> Schema {
    Schema::new(vec![
        ColumnDef::new("name", ColumnType::Utf8),
        ColumnDef::new("expression", ColumnType::Float64),
        ColumnDef::new("category", ColumnType::Utf8),
    ])
    .expect("valid schema")
}

/// Gene schema over a full domain with tiny tiles so tests span several.
pub(crate) fn gene_meta(mode: ArrayMode) -> ArrayMeta {
    ArrayMeta::new(gene_schema(), Domain::full(), mode).with_tile_capacity(4)
}

pub(crate) async fn gene_array(tmp: &TempDir, mode: ArrayMode) -> Result<TileArray, ArrayError> {
    TileArray::create(ArrayLocation::local(tmp.path()), gene_meta(mode)).await
}

/// Rows 0-3 of the README example.
pub(crate) fn gene_batch() -> Batch {
    Batch::builder()
        .row(0, gene_row("GeneA", 12.5, "coding"))
        .row(1, gene_row("GeneB", 0.0, "noncoding"))
        .row(2, gene_row("GeneC", 5.2, "coding"))
        .row(3, gene_row("GeneD", 8.1, "pseudogene"))
        .build()
}

pub(crate) fn gene_row(name: &str, expression: f64, category: &str) -> [(&'static str, Value); 3] {
    [
        ("name", Value::from(name)),
        ("expression", Value::from(expression)),
        ("category", Value::from(category)),
    ]
}
