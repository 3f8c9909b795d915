//! Row predicates: parsing, binding and three-valued evaluation.
//!
//! A predicate string is parsed once into a [`Predicate`] tree, then bound to
//! a [`Schema`] to produce a [`BoundPredicate`] that refers to columns by
//! position and carries literals already coerced to the column type.
//!
//! Evaluation follows SQL's three-valued logic: a comparison against a null
//! cell is unknown (`None`), `not unknown` is unknown, and a row is kept only
//! when the whole predicate is `Some(true)`. `col == null` and `col != null`
//! test for null and are never unknown.

mod parser;

use std::{cmp::Ordering, fmt, str::FromStr};

use snafu::prelude::*;

use crate::{
    schema::{ColumnType, Schema},
    value::Value,
};

/// Errors raised while parsing or binding a predicate.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum PredicateError {
    /// The predicate text is malformed.
    #[snafu(display("Predicate syntax error at byte {position}: {message}"))]
    Syntax {
        /// Byte offset of the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// The predicate references a column the schema does not declare.
    #[snafu(display("Predicate references unknown column {column}"))]
    UnknownColumn {
        /// The unknown column name.
        column: String,
    },

    /// A literal cannot be compared with the column's type.
    #[snafu(display("Cannot compare {column_type} column {column} {op} {literal}"))]
    IncompatibleLiteral {
        /// Column name.
        column: String,
        /// Declared column type.
        column_type: ColumnType,
        /// Comparison operator.
        op: CompareOp,
        /// Rendering of the literal.
        literal: String,
    },
}

impl PredicateError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        PredicateError::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// The operator with its operands swapped: `a < b` iff `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }

    fn holds(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            // Unordered (NaN) only satisfies `!=`.
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// Unbound predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op literal`.
    Comparison {
        /// Column name.
        column: String,
        /// Operator, with the column on the left.
        op: CompareOp,
        /// Literal operand; `Null` only with `==` / `!=`.
        literal: Value,
    },
    /// Both sides hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either side holds.
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse predicate text such as `expression > 5.0 and category == 'coding'`.
    pub fn parse(text: &str) -> Result<Self, PredicateError> {
        parser::parse(text)
    }

    /// `column op literal`.
    pub fn compare(column: impl Into<String>, op: CompareOp, literal: impl Into<Value>) -> Self {
        Predicate::Comparison {
            column: column.into(),
            op,
            literal: literal.into(),
        }
    }

    /// `self and other`.
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// `self or other`.
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// `not self`.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Column names referenced, in first-appearance order without repeats.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Comparison { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Resolve column names against `schema` and type-check literals.
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate, PredicateError> {
        let mut columns = Vec::new();
        let expr = self.bind_expr(schema, &mut columns)?;
        Ok(BoundPredicate { expr, columns })
    }

    fn bind_expr(
        &self,
        schema: &Schema,
        columns: &mut Vec<usize>,
    ) -> Result<BoundExpr, PredicateError> {
        Ok(match self {
            Predicate::Comparison {
                column,
                op,
                literal,
            } => {
                let position = schema.index_of(column).context(UnknownColumnSnafu {
                    column: column.clone(),
                })?;
                let column_type = schema.columns()[position].column_type;
                let slot = match columns.iter().position(|p| *p == position) {
                    Some(slot) => slot,
                    None => {
                        columns.push(position);
                        columns.len() - 1
                    }
                };
                let incompatible = || {
                    IncompatibleLiteralSnafu {
                        column: column.clone(),
                        column_type,
                        op: *op,
                        literal: literal.to_string(),
                    }
                    .build()
                };

                let literal = match (column_type, literal) {
                    (_, Value::Null) => {
                        return match op {
                            CompareOp::Eq => Ok(BoundExpr::IsNull { slot, negated: false }),
                            CompareOp::Ne => Ok(BoundExpr::IsNull { slot, negated: true }),
                            _ => Err(incompatible()),
                        };
                    }
                    (ColumnType::Int64, Value::Int64(v)) => Literal::Int(*v),
                    (ColumnType::Int64, Value::Float64(v)) => Literal::Float(*v),
                    (ColumnType::Float64, Value::Float64(v)) => Literal::Float(*v),
                    (ColumnType::Float64, Value::Int64(v)) => Literal::Float(*v as f64),
                    (ColumnType::Utf8, Value::Utf8(s)) => Literal::Str(s.clone()),
                    (ColumnType::Bool, Value::Bool(b)) => Literal::Bool(*b),
                    _ => return Err(incompatible()),
                };
                BoundExpr::Compare {
                    slot,
                    op: *op,
                    literal,
                }
            }
            Predicate::And(l, r) => BoundExpr::And(
                Box::new(l.bind_expr(schema, columns)?),
                Box::new(r.bind_expr(schema, columns)?),
            ),
            Predicate::Or(l, r) => BoundExpr::Or(
                Box::new(l.bind_expr(schema, columns)?),
                Box::new(r.bind_expr(schema, columns)?),
            ),
            Predicate::Not(inner) => BoundExpr::Not(Box::new(inner.bind_expr(schema, columns)?)),
        })
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Comparison {
                column,
                op,
                literal,
            } => {
                let quoted = column.replace('`', "``");
                match literal {
                    Value::Utf8(s) => write!(f, "`{quoted}` {op} '{}'", s.replace('\'', "''")),
                    Value::Float64(v) => write!(f, "`{quoted}` {op} {v:?}"),
                    other => write!(f, "`{quoted}` {op} {other}"),
                }
            }
            Predicate::And(l, r) => write!(f, "({l} and {r})"),
            Predicate::Or(l, r) => write!(f, "({l} or {r})"),
            Predicate::Not(inner) => write!(f, "not {inner}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum BoundExpr {
    Compare {
        slot: usize,
        op: CompareOp,
        literal: Literal,
    },
    IsNull {
        slot: usize,
        negated: bool,
    },
    And(Box<BoundExpr>, Box<BoundExpr>),
    Or(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
}

impl BoundExpr {
    fn eval<'v>(&self, cell: &dyn Fn(usize) -> Option<&'v Value>) -> Option<bool> {
        match self {
            BoundExpr::Compare { slot, op, literal } => {
                let value = cell(*slot)?;
                let ord = match (value, literal) {
                    (Value::Null, _) => return None,
                    (Value::Int64(v), Literal::Int(l)) => Some(v.cmp(l)),
                    (Value::Int64(v), Literal::Float(l)) => (*v as f64).partial_cmp(l),
                    (Value::Float64(v), Literal::Float(l)) => v.partial_cmp(l),
                    (Value::Utf8(v), Literal::Str(l)) => Some(v.as_str().cmp(l.as_str())),
                    (Value::Bool(v), Literal::Bool(l)) => Some(v.cmp(l)),
                    // Binding rules out other pairs for well-typed cells.
                    _ => return None,
                };
                Some(op.holds(ord))
            }
            BoundExpr::IsNull { slot, negated } => {
                let is_null = cell(*slot).is_none_or(Value::is_null);
                Some(is_null != *negated)
            }
            BoundExpr::And(l, r) => match (l.eval(cell), r.eval(cell)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            BoundExpr::Or(l, r) => match (l.eval(cell), r.eval(cell)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            BoundExpr::Not(inner) => inner.eval(cell).map(|b| !b),
        }
    }
}

/// A predicate bound to a schema.
///
/// [`BoundPredicate::columns`] lists the schema positions the predicate
/// reads; evaluation takes one value vector per listed column, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    expr: BoundExpr,
    columns: Vec<usize>,
}

impl BoundPredicate {
    /// Schema positions of the referenced columns, in slot order.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Three-valued result for row `row` of the decoded `values`, where
    /// `values[slot]` holds the column at `self.columns()[slot]`.
    pub fn evaluate(&self, values: &[Vec<Value>], row: usize) -> Option<bool> {
        self.expr
            .eval(&|slot| values.get(slot).and_then(|column| column.get(row)))
    }

    /// Whether row `row` is kept (evaluates to true).
    pub fn matches(&self, values: &[Vec<Value>], row: usize) -> bool {
        self.evaluate(values, row) == Some(true)
    }
}
