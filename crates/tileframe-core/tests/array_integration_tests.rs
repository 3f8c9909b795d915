//! Integration tests for tile arrays.
//!
//! These tests exercise the public API end to end:
//! - write-then-read round trips for dense and sparse arrays across tiles,
//! - predicate reads agreeing with filtering a full read,
//! - all-or-nothing tile visibility under concurrent reads and writes,
//! - detection of damaged tile files and Arrow import/export.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use arrow::array::{Array, AsArray, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Float64Type, Schema as ArrowSchema, UInt64Type};
use arrow::record_batch::RecordBatch;
use tempfile::TempDir;
use tileframe_core::storage::layout;
use tileframe_core::{
    ArrayLocation, ArrayMeta, ArrayMode, Batch, ColumnDef, ColumnType, Domain, ErrorKind,
    IoOptions, Predicate, ReadRequest, RowRange, Schema, Table, TileArray, Value,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

// =============================================================================
// Test Helpers
// =============================================================================

fn mixed_schema() -> Schema {
    Schema::new(vec![
        ColumnDef::required("id", ColumnType::Int64),
        ColumnDef::new("score", ColumnType::Float64),
        ColumnDef::new("label", ColumnType::Utf8),
        ColumnDef::new("flag", ColumnType::Bool),
    ])
    .expect("valid schema")
}

fn mixed_meta(mode: ArrayMode) -> ArrayMeta {
    ArrayMeta::new(mixed_schema(), Domain::full(), mode).with_tile_capacity(8)
}

fn mixed_row(i: u64) -> Vec<(&'static str, Value)> {
    let score = if i % 5 == 0 {
        Value::Null
    } else {
        Value::from(i as f64 * 1.5)
    };
    vec![
        ("id", Value::from(i as i64 * 10)),
        ("score", score),
        ("label", Value::from(format!("item-{i}"))),
        ("flag", Value::from(i % 2 == 0)),
    ]
}

fn mixed_batch(rows: impl IntoIterator<Item = u64>) -> Batch {
    rows.into_iter()
        .fold(Batch::builder(), |b, i| b.row(i, mixed_row(i)))
        .build()
}

/// Rows of `table` that satisfy `keep`, in order, restricted to `columns`.
fn filter_table(table: &Table, columns: &[&str], keep: impl Fn(u64) -> bool) -> Vec<Vec<Value>> {
    table
        .row_indices()
        .iter()
        .filter(|&&row| keep(row))
        .map(|&row| {
            columns
                .iter()
                .map(|c| table.get(row, c).cloned().unwrap())
                .collect()
        })
        .collect()
}

fn table_rows(table: &Table) -> Vec<Vec<Value>> {
    table
        .row_indices()
        .iter()
        .map(|&row| table.row(row).unwrap().into_iter().cloned().collect())
        .collect()
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn dense_round_trip_across_tiles() -> TestResult {
    let tmp = TempDir::new()?;
    let location = ArrayLocation::local(tmp.path());
    let mut array = TileArray::create(location.clone(), mixed_meta(ArrayMode::Dense)).await?;

    let batch = mixed_batch(0..30);
    array.write_batch(&batch).await?;

    let reopened = TileArray::open(location).await?;
    assert_eq!(reopened.shape(), (30, 4));
    let table = reopened.read(RowRange::new(0, 30), None, None).await?;
    assert_eq!(table.num_rows(), 30);
    for row in batch.rows() {
        for (name, value) in row.cells() {
            assert_eq!(table.get(row.index(), name), Some(value), "row {}", row.index());
        }
    }
    Ok(())
}

#[tokio::test]
async fn sparse_round_trip_with_gaps_and_subsets() -> TestResult {
    let tmp = TempDir::new()?;
    let mut array = TileArray::create(
        ArrayLocation::local(tmp.path()),
        ArrayMeta::new(mixed_schema(), Domain::full(), ArrayMode::Sparse),
    )
    .await?;

    let batch = Batch::builder()
        .row(1_000_000, [("id", Value::from(1_i64))])
        .row(3, [("label", Value::from("three")), ("flag", Value::from(true))])
        .row(70_000, [("score", Value::from(-0.25))])
        .build();
    array.write_batch(&batch).await?;

    let table = array.read(.., None, None).await?;
    assert_eq!(table.row_indices(), &[3, 70_000, 1_000_000]);
    assert_eq!(table.get(3, "label"), Some(&Value::from("three")));
    assert_eq!(table.get(3, "id"), Some(&Value::Null));
    assert_eq!(table.get(70_000, "score"), Some(&Value::from(-0.25)));
    assert_eq!(table.get(1_000_000, "flag"), Some(&Value::Null));
    assert_eq!(array.shape(), (1_000_001, 4));
    assert_eq!(array.row_count().await?, 3);
    Ok(())
}

// =============================================================================
// Predicates
// =============================================================================

#[tokio::test]
async fn predicate_reads_match_filtered_full_reads() -> TestResult {
    let tmp = TempDir::new()?;
    let mut array = TileArray::create(
        ArrayLocation::local(tmp.path()),
        mixed_meta(ArrayMode::Sparse),
    )
    .await?
    .with_io_options(IoOptions::with_tile_concurrency(3));
    array.write_batch(&mixed_batch(0..50)).await?;

    let full = array.read(.., None, None).await?;
    let cases: Vec<(&str, Box<dyn Fn(u64) -> bool>)> = vec![
        ("score > 30", Box::new(|i: u64| i % 5 != 0 && i as f64 * 1.5 > 30.0)),
        ("score == null", Box::new(|i: u64| i % 5 == 0)),
        ("not (score < 10)", Box::new(|i: u64| i % 5 != 0 && i as f64 * 1.5 >= 10.0)),
        ("flag == true and id >= 200", Box::new(|i: u64| i % 2 == 0 && i >= 20)),
        ("label == 'item-7' or id < 30", Box::new(|i: u64| i == 7 || i < 3)),
        ("40 <= id & label != \"item-4\"", Box::new(|i: u64| i >= 4 && i != 4)),
    ];

    for (text, keep) in cases {
        let predicate = Predicate::parse(text)?;
        for columns in [vec!["id"], vec!["label", "score"], vec!["flag", "id", "label", "score"]] {
            let request = ReadRequest::new(RowRange::new(5, 45))
                .with_predicate(predicate.clone())
                .with_columns(columns.clone());
            let got = array.query(&request).await?;
            let expected = filter_table(&full, &columns, |i| (5..45).contains(&i) && keep(i));
            assert_eq!(table_rows(&got), expected, "{text} {columns:?}");
            assert!(got.row_indices().windows(2).all(|w| w[0] < w[1]));
        }
    }
    Ok(())
}

#[test]
fn malformed_predicates_are_syntax_errors() {
    for text in ["score >", "(id == 1", "id == 1 and", "id ~ 1", "'a' == 'b'"] {
        let err = tileframe_core::ArrayError::from(Predicate::parse(text).unwrap_err());
        assert_eq!(err.kind(), ErrorKind::PredicateSyntax, "{text}");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_see_whole_tiles_only() -> TestResult {
    let tmp = TempDir::new()?;
    let location = ArrayLocation::local(tmp.path());
    let schema = Schema::new(vec![
        ColumnDef::new("generation", ColumnType::Int64),
        ColumnDef::new("tag", ColumnType::Utf8),
    ])?;
    let meta = ArrayMeta::new(schema, Domain::full(), ArrayMode::Sparse).with_tile_capacity(64);
    let mut writer = TileArray::create(location.clone(), meta).await?;

    // Generation `g` rewrites rows 0..16 and appends up to row 15 + g, all
    // inside tile 0.
    let generation_batch = |g: i64| {
        (0..16 + g as u64)
            .fold(Batch::builder(), |b, row| {
                b.row(
                    row,
                    [
                        ("generation", Value::from(g)),
                        ("tag", Value::from(format!("g{g}-r{row}"))),
                    ],
                )
            })
            .build()
    };
    writer.write_batch(&generation_batch(0)).await?;

    // Opened before any append, so its cached extent stops at row 15.
    let reader = Arc::new(TileArray::open(location).await?);
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..3 {
        let reader = Arc::clone(&reader);
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut observed = 0_u32;
            while !done.load(std::sync::atomic::Ordering::Acquire) || observed == 0 {
                let open = reader.read(.., None, None).await.expect("read");
                let explicit = reader.read(0_u64..64, None, None).await.expect("read");
                for table in [open, explicit] {
                    let generations = table.column("generation").expect("generation");
                    let first = generations[0].as_i64().expect("int");
                    assert_eq!(table.num_rows() as i64, 16 + first);
                    assert!(generations.iter().all(|v| v.as_i64() == Some(first)));
                    for (i, tag) in table.column("tag").expect("tag").iter().enumerate() {
                        assert_eq!(tag.as_str(), Some(format!("g{first}-r{i}").as_str()));
                    }
                }
                observed += 1;
            }
            observed
        }));
    }

    for g in 1..=40 {
        writer.write_batch(&generation_batch(g)).await?;
    }
    done.store(true, std::sync::atomic::Ordering::Release);

    for handle in readers {
        assert!(handle.await? > 0);
    }

    let last = writer.read(RowRange::single(55), None, Some(&["generation"])).await?;
    assert_eq!(last.get(55, "generation"), Some(&Value::from(40_i64)));
    assert_eq!(reader.extent().map(|e| e.max), Some(15));
    Ok(())
}

// =============================================================================
// Damage and interop
// =============================================================================

#[tokio::test]
async fn truncated_tile_is_corrupt_data() -> TestResult {
    let tmp = TempDir::new()?;
    let mut array = TileArray::create(
        ArrayLocation::local(tmp.path()),
        mixed_meta(ArrayMode::Dense),
    )
    .await?;
    array.write_batch(&mixed_batch(0..4)).await?;

    let path = tmp.path().join(layout::tile_version_rel_path(0, 1));
    let bytes = std::fs::read(&path)?;
    std::fs::write(&path, &bytes[..12])?;

    let err = array.read(.., None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
    Ok(())
}

#[tokio::test]
async fn arrow_batches_import_and_export() -> TestResult {
    let tmp = TempDir::new()?;
    let schema = Schema::new(vec![
        ColumnDef::new("name", ColumnType::Utf8),
        ColumnDef::new("expression", ColumnType::Float64),
    ])?;
    let mut array = TileArray::create(
        ArrayLocation::local(tmp.path()),
        ArrayMeta::new(schema, Domain::full(), ArrayMode::Sparse),
    )
    .await?;

    let arrow_schema = Arc::new(ArrowSchema::new(vec![
        Field::new("row", DataType::UInt64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("expression", DataType::Float64, true),
    ]));
    let input = RecordBatch::try_new(
        arrow_schema,
        vec![
            Arc::new(UInt64Array::from(vec![10, 2, 7])),
            Arc::new(StringArray::from(vec![Some("j"), Some("b"), None])),
            Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.5)])),
        ],
    )?;
    array
        .write_batch(&Batch::from_record_batch(&input, Some("row"), 0)?)
        .await?;

    let output = array.read(.., None, None).await?.to_record_batch(Some("row"))?;
    assert_eq!(output.num_rows(), 3);
    let rows = output.column(0).as_primitive::<UInt64Type>();
    assert_eq!(rows.values().to_vec(), vec![2, 7, 10]);
    let names = output.column(1).as_string::<i32>();
    assert_eq!(names.value(0), "b");
    assert!(names.is_null(1));
    let expression = output.column(2).as_primitive::<Float64Type>();
    assert!(expression.is_null(0));
    assert_eq!(expression.value(1), 3.5);
    Ok(())
}
