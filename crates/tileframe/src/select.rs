//! Fluent selection builder for [`Frame`].
//!
//! ```no_run
//! # async fn demo(frame: &tileframe::Frame) -> Result<(), tileframe::ArrayError> {
//! let table = frame
//!     .select()
//!     .rows(0_u64..100)
//!     .columns(["name", "expression"])
//!     .filter("expression > 5.0")
//!     .execute()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use tileframe_core::{ArrayError, Predicate, ReadRequest, RowRange, Table};

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnSelector {
    Name(String),
    Position(usize),
}

/// A pending read against a [`Frame`]. Nothing is read until
/// [`Selection::execute`].
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    frame: &'a Frame,
    rows: RowRange,
    columns: Option<Vec<ColumnSelector>>,
    filter: Option<String>,
}

impl<'a> Selection<'a> {
    pub(crate) fn new(frame: &'a Frame) -> Self {
        Selection {
            frame,
            rows: RowRange::all(),
            columns: None,
            filter: None,
        }
    }

    /// Restrict to `rows` (half-open; open ends follow the written rows).
    pub fn rows(mut self, rows: impl Into<RowRange>) -> Self {
        self.rows = rows.into();
        self
    }

    /// Restrict to the single row `index`.
    pub fn row(self, index: u64) -> Self {
        self.rows(RowRange::single(index))
    }

    /// Project to the named columns, in this order.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(
            names
                .into_iter()
                .map(|n| ColumnSelector::Name(n.into()))
                .collect(),
        );
        self
    }

    /// Add one named column to the projection.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns
            .get_or_insert_with(Vec::new)
            .push(ColumnSelector::Name(name.into()));
        self
    }

    /// Project to columns by schema position, in this order.
    pub fn column_positions(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.columns = Some(
            positions
                .into_iter()
                .map(ColumnSelector::Position)
                .collect(),
        );
        self
    }

    /// Keep only rows matching `condition`.
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filter = Some(condition.into());
        self
    }

    /// Run the selection.
    pub async fn execute(self) -> Result<Table, ArrayError> {
        let mut request = ReadRequest::new(self.rows);
        if let Some(condition) = &self.filter {
            request = request.with_predicate(Predicate::parse(condition)?);
        }
        if let Some(selectors) = &self.columns {
            let schema = self.frame.array().schema();
            let names = selectors
                .iter()
                .map(|selector| match selector {
                    ColumnSelector::Name(name) => Ok(name.clone()),
                    ColumnSelector::Position(p) => schema
                        .columns()
                        .get(*p)
                        .map(|c| c.name.clone())
                        .ok_or_else(|| ArrayError::ColumnNotFound {
                            column: format!("#{p}"),
                        }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            request = request.with_columns(names);
        }
        self.frame.array().query(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tileframe_core::{
        ArrayMode, Batch, ColumnDef, ColumnType, Domain, ErrorKind, Schema, Value,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn sample(tmp: &TempDir) -> Result<Frame, ArrayError> {
        let schema = Schema::new(vec![
            ColumnDef::new("name", ColumnType::Utf8),
            ColumnDef::new("value", ColumnType::Int64),
            ColumnDef::new("group", ColumnType::Utf8),
        ])
        .map_err(|source| ArrayError::InvalidSchema { source })?;
        let uri = tmp.path().display().to_string();
        let mut frame = Frame::create(&uri, schema, Domain::full(), ArrayMode::Sparse).await?;
        let batch = [("A", 1, "x"), ("B", 2, "x"), ("C", 3, "y"), ("D", 4, "y")]
            .into_iter()
            .zip(0_u64..)
            .fold(Batch::builder(), |b, ((name, value, group), row)| {
                b.row(
                    row,
                    [
                        ("name", Value::from(name)),
                        ("value", Value::from(value as i64)),
                        ("group", Value::from(group)),
                    ],
                )
            })
            .build();
        frame.write_batch(&batch).await?;
        Ok(frame)
    }

    #[tokio::test]
    async fn positions_and_names_project_in_order() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = sample(&tmp).await?;

        let table = frame
            .select()
            .rows(1_u64..)
            .column_positions([2, 0])
            .execute()
            .await?;
        assert_eq!(table.column_names(), vec!["group", "name"]);
        assert_eq!(table.row_indices(), &[1, 2, 3]);

        let table = frame.select().column("value").column("name").execute().await?;
        assert_eq!(table.column_names(), vec!["value", "name"]);
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_position_is_column_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = sample(&tmp).await?;

        let err = frame
            .select()
            .column_positions([7])
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert!(err.to_string().contains("#7"));
        Ok(())
    }

    #[tokio::test]
    async fn filter_combines_with_rows_and_columns() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = sample(&tmp).await?;

        let table = frame
            .select()
            .rows(0_u64..3)
            .filter("group == 'y' or value == 1")
            .columns(["name"])
            .execute()
            .await?;
        assert_eq!(table.row_indices(), &[0, 2]);
        assert_eq!(
            table.column("name").unwrap(),
            &[Value::from("A"), Value::from("C")]
        );

        let single = frame.select().row(3).execute().await?;
        assert_eq!(single.get(3, "group"), Some(&Value::from("y")));
        Ok(())
    }
}
