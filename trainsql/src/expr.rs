//! The expression tree shared by WHERE/HAVING/ON predicates, SELECT-list
//! entries, and SET clauses. Arithmetic is never represented here: `+ - * /`
//! are folded to a constant at parse time (see `sql::parser`), so the only
//! shapes that survive into planning and execution are column references,
//! constants, binary comparisons, and aggregate-function applications.

use crate::error::{CResult, Error};
use crate::value::Value;

/// A comparison operator between two sub-expressions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    GreaterThan,
    LessThan,
}

/// An aggregate function application, e.g. `count(a)`. Never evaluated by
/// `Expression::evaluate` directly — only the `Aggregate` executor dispatches
/// on `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCall {
    pub name: String,
    pub column: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Column(String),
    Const(Value),
    Binary { op: CompareOp, left: Box<Expression>, right: Box<Expression> },
    Aggregate(AggregateCall),
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate(_))
    }

    /// If this expression is a plain column reference, returns its name.
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expression::Column(name) => Some(name),
            _ => None,
        }
    }

    /// Evaluates this expression against a row given both sides of a join
    /// (or the same columns/row twice, for single-table evaluation).
    pub fn evaluate(
        &self,
        left_cols: &[String],
        left_row: &[Value],
        right_cols: &[String],
        right_row: &[Value],
    ) -> CResult<Value> {
        match self {
            Expression::Column(name) => resolve_column(name, left_cols, left_row)
                .or_else(|| resolve_column(name, right_cols, right_row))
                .ok_or_else(|| Error::Evaluation(format!("unknown column '{}'", name))),
            Expression::Const(value) => Ok(value.clone()),
            Expression::Binary { op, left, right } => {
                let l = left.evaluate(left_cols, left_row, right_cols, right_row)?;
                let r = right.evaluate(left_cols, left_row, right_cols, right_row)?;
                let ordering = l.partial_compare(&r).ok_or_else(|| {
                    Error::Evaluation(format!("cannot compare {:?} and {:?}", l, r))
                })?;
                let truth = match op {
                    CompareOp::Equal => ordering == std::cmp::Ordering::Equal,
                    CompareOp::GreaterThan => ordering == std::cmp::Ordering::Greater,
                    CompareOp::LessThan => ordering == std::cmp::Ordering::Less,
                };
                Ok(Value::Bool(truth))
            }
            Expression::Aggregate(call) => Err(Error::Evaluation(format!(
                "aggregate '{}({})' can only be evaluated by the Aggregate operator",
                call.name, call.column
            ))),
        }
    }
}

fn resolve_column(name: &str, columns: &[String], row: &[Value]) -> Option<Value> {
    columns.iter().position(|c| c == name).map(|i| row[i].clone())
}
