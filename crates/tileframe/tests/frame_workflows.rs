//! End-to-end frame workflows: create, append, slice and query through the
//! facade, for both sparse and dense frames.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use tempfile::TempDir;
use tileframe::prelude::*;
use tileframe_core::ReadRequest;

type TestResult = Result<(), Box<dyn std::error::Error>>;

// =============================================================================
// Test Helpers
// =============================================================================

fn frame_uri(tmp: &TempDir, name: &str) -> String {
    tmp.path().join(name).display().to_string()
}

fn gene_schema() -> Schema {
    Schema::new(vec![
        ColumnDef::new("name", ColumnType::Utf8),
        ColumnDef::new("expression", ColumnType::Float64),
        ColumnDef::new("category", ColumnType::Utf8),
    ])
    .expect("valid schema")
}

fn gene(name: &str, expression: f64, category: &str) -> [(&'static str, Value); 3] {
    [
        ("name", Value::from(name)),
        ("expression", Value::from(expression)),
        ("category", Value::from(category)),
    ]
}

async fn gene_frame(tmp: &TempDir) -> Result<Frame, ArrayError> {
    let mut frame = Frame::create(
        &frame_uri(tmp, "genes"),
        gene_schema(),
        Domain::full(),
        ArrayMode::Sparse,
    )
    .await?;
    let batch = Batch::builder()
        .row(0, gene("GeneA", 12.5, "coding"))
        .row(1, gene("GeneB", 0.0, "noncoding"))
        .row(2, gene("GeneC", 5.2, "coding"))
        .row(3, gene("GeneD", 8.1, "pseudogene"))
        .build();
    frame.write_batch(&batch).await?;
    Ok(frame)
}

fn int_column_frame_batch(name: &str, values: Vec<i64>) -> RecordBatch {
    RecordBatch::try_new(
        Arc::new(ArrowSchema::new(vec![Field::new(name, DataType::Int64, false)])),
        vec![Arc::new(Int64Array::from(values))],
    )
    .expect("valid record batch")
}

fn names(table: &Table) -> Vec<&str> {
    table
        .column("name")
        .expect("name column")
        .iter()
        .map(|v| v.as_str().expect("utf8"))
        .collect()
}

// =============================================================================
// Sparse frames
// =============================================================================

#[tokio::test]
async fn readme_gene_example() -> TestResult {
    let tmp = TempDir::new()?;
    let mut frame = gene_frame(&tmp).await?;
    assert_eq!(frame.shape(), (4, 3));

    let first_two = frame.slice(0_u64..2).await?;
    assert_eq!(first_two.row_indices(), &[0, 1]);
    assert_eq!(first_two.num_columns(), 3);
    assert_eq!(names(&first_two), vec!["GeneA", "GeneB"]);

    let high = frame.query("expression > 5.0").await?;
    assert_eq!(high.row_indices(), &[0, 2, 3]);
    assert_eq!(
        high.column("expression").unwrap(),
        &[Value::from(12.5), Value::from(5.2), Value::from(8.1)]
    );

    let coding = frame
        .query_columns("category == 'coding'", &["name"])
        .await?;
    assert_eq!(coding.column_names(), vec!["name"]);
    assert_eq!(names(&coding), vec!["GeneA", "GeneC"]);

    frame
        .write_batch(
            &Batch::builder()
                .row(4, gene("GeneE", 99.9, "coding"))
                .build(),
        )
        .await?;
    assert_eq!(frame.shape(), (5, 3));
    let e = frame.query("name == 'GeneE'").await?;
    assert_eq!(e.row_indices(), &[4]);
    assert_eq!(e.get(4, "expression"), Some(&Value::from(99.9)));
    Ok(())
}

#[tokio::test]
async fn reopened_frame_sees_the_same_data() -> TestResult {
    let tmp = TempDir::new()?;
    let frame = gene_frame(&tmp).await?;
    let reopened = Frame::open(&frame_uri(&tmp, "genes")).await?;

    assert_eq!(reopened.shape(), frame.shape());
    assert_eq!(reopened.column_names(), vec!["name", "expression", "category"]);
    assert_eq!(reopened.index().await?, vec![0, 1, 2, 3]);
    assert_eq!(reopened.slice(..).await?, frame.slice(..).await?);
    Ok(())
}

#[tokio::test]
async fn sparse_appends_may_skip_rows_and_columns() -> TestResult {
    let tmp = TempDir::new()?;
    let mut frame = gene_frame(&tmp).await?;

    frame
        .write_batch(
            &Batch::builder()
                .row(100, [("name", "GeneZ")])
                .build(),
        )
        .await?;
    assert_eq!(frame.shape(), (101, 3));
    assert_eq!(frame.index().await?, vec![0, 1, 2, 3, 100]);

    let z = frame.row(100).await?;
    assert_eq!(z.get(100, "expression"), Some(&Value::Null));
    assert!(frame.row(50).await?.is_empty());

    let missing = frame.query("expression == null").await?;
    assert_eq!(missing.row_indices(), &[100]);
    Ok(())
}

#[tokio::test]
async fn handles_refresh_to_see_other_writers() -> TestResult {
    let tmp = TempDir::new()?;
    let mut writer = gene_frame(&tmp).await?;
    let mut reader = Frame::open(&frame_uri(&tmp, "genes")).await?;

    writer
        .write_batch(
            &Batch::builder()
                .row(9, gene("GeneJ", 1.0, "coding"))
                .build(),
        )
        .await?;
    assert_eq!(reader.shape().0, 4);
    reader.refresh().await?;
    assert_eq!(reader.shape().0, 10);
    Ok(())
}

#[tokio::test]
async fn frame_errors_carry_distinct_kinds() -> TestResult {
    let tmp = TempDir::new()?;
    let frame = gene_frame(&tmp).await?;

    let err = frame.query("expression >").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PredicateSyntax);

    let err = frame.slice_columns(.., &["weight"]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ColumnNotFound);

    let err = Frame::open(&frame_uri(&tmp, "missing")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = Frame::create(
        &frame_uri(&tmp, "genes"),
        gene_schema(),
        Domain::full(),
        ArrayMode::Sparse,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    Ok(())
}

// =============================================================================
// Dense frames
// =============================================================================

#[tokio::test]
async fn dense_query_and_positional_slices() -> TestResult {
    let tmp = TempDir::new()?;
    let uri = frame_uri(&tmp, "dense");
    let frame = Frame::create_from_record_batch(
        &uri,
        &int_column_frame_batch("val", vec![10, 20, 30, 40, 50]),
        None,
        ArrayMode::Dense,
    )
    .await?;
    assert_eq!(frame.shape(), (5, 1));

    let three = frame.query("val == 30").await?;
    assert_eq!(three.row_indices(), &[2]);

    let first_two = frame.slice(0_u64..2).await?;
    assert_eq!(first_two.row_indices(), &[0, 1]);
    assert_eq!(
        first_two.column("val").unwrap(),
        &[Value::from(10_i64), Value::from(20_i64)]
    );

    let one = frame.row(1).await?;
    assert_eq!(one.num_rows(), 1);
    assert_eq!(one.get(1, "val"), Some(&Value::from(20_i64)));
    Ok(())
}

#[tokio::test]
async fn dense_columns_by_position_and_name() -> TestResult {
    let tmp = TempDir::new()?;
    let uri = frame_uri(&tmp, "dense_ab");
    let batch = RecordBatch::try_new(
        Arc::new(ArrowSchema::new(vec![
            Field::new("A", DataType::Int64, false),
            Field::new("B", DataType::Utf8, false),
        ])),
        vec![
            Arc::new(Int64Array::from((0..10).collect::<Vec<i64>>())),
            Arc::new(StringArray::from(
                (0..10).map(|i| format!("val_{i}")).collect::<Vec<_>>(),
            )),
        ],
    )?;
    let frame = Frame::create_from_record_batch(&uri, &batch, None, ArrayMode::Dense).await?;

    assert_eq!(frame.shape(), (10, 2));
    assert_eq!(frame.column_names(), vec!["A", "B"]);
    assert_eq!(frame.index().await?, (0..10).collect::<Vec<u64>>());

    let subset = frame.slice(2_u64..5).await?;
    assert_eq!(subset.num_rows(), 3);
    assert_eq!(subset.get(2, "A"), Some(&Value::from(2_i64)));

    let col_a = frame.slice_columns(.., &["A"]).await?;
    assert_eq!(col_a.shape(), (10, 1));

    let b2 = frame.select().row(2).column_positions([1]).execute().await?;
    assert_eq!(b2.get(2, "B"), Some(&Value::from("val_2")));
    Ok(())
}

#[tokio::test]
async fn dense_rewrites_are_rejected_by_default() -> TestResult {
    let tmp = TempDir::new()?;
    let uri = frame_uri(&tmp, "dense_dup");
    let mut frame = Frame::create_from_record_batch(
        &uri,
        &int_column_frame_batch("val", vec![1, 2, 3]),
        None,
        ArrayMode::Dense,
    )
    .await?;

    let again = Batch::builder().row(1, [("val", 99_i64)]).build();
    let err = frame.write_batch(&again).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DomainViolation);
    assert_eq!(frame.row(1).await?.get(1, "val"), Some(&Value::from(2_i64)));

    // Appending past the end is fine.
    frame
        .write_record_batch(&int_column_frame_batch("val", vec![4]), None)
        .await?;
    assert_eq!(frame.shape(), (4, 1));
    Ok(())
}

#[tokio::test]
async fn dense_overwrite_policy_replaces_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let schema = Schema::new(vec![ColumnDef::new("val", ColumnType::Int64)])?;
    let meta = ArrayMeta::new(schema, Domain::bounded(99), ArrayMode::Dense)
        .with_duplicate_rows(DuplicateRowPolicy::Overwrite);
    let mut frame = Frame::create_with_meta(&frame_uri(&tmp, "dense_ow"), meta).await?;

    frame
        .write_batch(&Batch::builder().row(5, [("val", 1_i64)]).build())
        .await?;
    frame
        .write_batch(&Batch::builder().row(5, [("val", 2_i64)]).build())
        .await?;
    assert_eq!(frame.row(5).await?.get(5, "val"), Some(&Value::from(2_i64)));

    let report = frame.vacuum().await?;
    assert_eq!(report.removed_versions, 1);

    let err = frame
        .write_batch(&Batch::builder().row(100, [("val", 3_i64)]).build())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DomainViolation);
    Ok(())
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn scans_stream_one_chunk_per_tile() -> TestResult {
    let tmp = TempDir::new()?;
    let schema = Schema::new(vec![ColumnDef::new("val", ColumnType::Int64)])?;
    let meta =
        ArrayMeta::new(schema, Domain::full(), ArrayMode::Sparse).with_tile_capacity(10);
    let mut frame = Frame::create_with_meta(&frame_uri(&tmp, "chunks"), meta).await?;
    let batch = (0..35_u64)
        .fold(Batch::builder(), |b, i| b.row(i, [("val", i as i64)]))
        .build();
    frame.write_batch(&batch).await?;

    let request = ReadRequest::new(5_u64..32).with_predicate(Predicate::parse("val != 20")?);
    let chunks: Vec<Table> = frame.array().scan(request).await?.try_collect().await?;
    let sizes: Vec<usize> = chunks.iter().map(Table::num_rows).collect();
    assert_eq!(sizes, vec![5, 10, 9, 2]);
    assert_eq!(chunks[1].row_indices().first(), Some(&10));

    let whole = frame.select().rows(5_u64..32).filter("val != 20").execute().await?;
    assert_eq!(whole.num_rows(), sizes.iter().sum::<usize>());
    Ok(())
}
