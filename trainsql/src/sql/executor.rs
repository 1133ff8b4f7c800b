//! The operator tree that interprets a [`PlanNode`] against a
//! [`TableService`]. Every operator is batch-materialising: `execute`
//! produces its entire output before returning, so the tree is Volcano-
//! shaped but not streaming. Operators share one capability,
//! `execute(service) -> ResultSet`, implemented as a trait-object tree
//! rather than an enum match, per the planner's own shape.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{CResult, Error};
use crate::expr::{AggregateCall, Expression};
use crate::sql::ast::OrderDirection;
use crate::sql::plan::{default_alias, PlanNode};
use crate::storage::engine::Engine;
use crate::table::TableService;
use crate::value::{DataType, Value};
use crate::result::ResultSet;

/// The shared capability of every physical operator. `execute` consumes
/// the boxed operator (and, transitively, its children) since a plan tree
/// is interpreted exactly once.
pub trait Executor<E: Engine> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet>;
}

/// Lowers a [`PlanNode`] into its executable operator tree.
pub fn build_executor<E: Engine + 'static>(node: PlanNode) -> Box<dyn Executor<E>> {
    match node {
        PlanNode::CreateTable { table } => Box::new(CreateTableExec { table }),
        PlanNode::DropTable { name } => Box::new(DropTableExec { name }),
        PlanNode::Insert { table, columns, values } => {
            Box::new(InsertExec { table, columns, values })
        }
        PlanNode::Update { source, table, assignments } => {
            Box::new(UpdateExec { source: build_executor(*source), table, assignments })
        }
        PlanNode::Delete { source, table } => {
            Box::new(DeleteExec { source: build_executor(*source), table })
        }
        PlanNode::Scan { table, filter } => Box::new(ScanExec { table, filter }),
        PlanNode::PrimaryKeyScan { table, value } => Box::new(PrimaryKeyScanExec { table, value }),
        PlanNode::IndexScan { table, column, value } => {
            Box::new(IndexScanExec { table, column, value })
        }
        PlanNode::Filter { source, predicate } => {
            Box::new(FilterExec { source: build_executor(*source), predicate })
        }
        PlanNode::Project { source, columns } => {
            Box::new(ProjectExec { source: build_executor(*source), columns })
        }
        PlanNode::Aggregate { source, select, group_by } => {
            Box::new(AggregateExec { source: build_executor(*source), select, group_by })
        }
        PlanNode::Order { source, terms } => Box::new(OrderExec { source: build_executor(*source), terms }),
        PlanNode::Limit { source, limit } => Box::new(LimitExec { source: build_executor(*source), limit }),
        PlanNode::Offset { source, offset } => {
            Box::new(OffsetExec { source: build_executor(*source), offset })
        }
        PlanNode::NestedLoopJoin { left, right, predicate, outer } => Box::new(NestedLoopJoinExec {
            left: build_executor(*left),
            right: build_executor(*right),
            predicate,
            outer,
        }),
        PlanNode::HashJoin { left, right, left_field, right_field, outer } => Box::new(HashJoinExec {
            left: build_executor(*left),
            right: build_executor(*right),
            left_field,
            right_field,
            outer,
        }),
    }
}

/// Every operator's output is materialised as a `ResultSet::Scan`; this
/// unwraps it, which is always safe since no operator in this tree emits
/// any other variant as an intermediate result.
fn as_scan(result: ResultSet) -> CResult<(Vec<String>, Vec<Vec<Value>>)> {
    match result {
        ResultSet::Scan { cols, rows } => Ok((cols, rows)),
        other => Err(Error::Internal(format!("expected an intermediate row set, got {:?}", other))),
    }
}

// --- access paths ---------------------------------------------------------

struct ScanExec {
    table: String,
    filter: Option<Expression>,
}

impl<E: Engine> Executor<E> for ScanExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let rows = service.scan_table(&schema, self.filter.as_ref())?;
        Ok(ResultSet::Scan { cols: schema.column_names(), rows })
    }
}

struct PrimaryKeyScanExec {
    table: String,
    value: Value,
}

impl<E: Engine> Executor<E> for PrimaryKeyScanExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let pk_col = schema.primary_key_column()?;
        // SQL numeric literals fold to Float at parse time; coerce back to
        // Int when the primary key column is itself integer-typed so the
        // point lookup's byte encoding matches what's on disk.
        let key = match (&self.value, pk_col.data_type) {
            (Value::Float(f), DataType::Integer) if f.fract() == 0.0 => Value::Int(*f as i64),
            (other, _) => other.clone(),
        };
        let rows = service.read_by_id(&schema, &key)?.into_iter().collect();
        Ok(ResultSet::Scan { cols: schema.column_names(), rows })
    }
}

struct IndexScanExec {
    table: String,
    column: String,
    value: Value,
}

impl<E: Engine> Executor<E> for IndexScanExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let mut pks = service.load_index(&schema, &self.column, &self.value)?;
        // Ascending by primary key; incomparable pairs keep their relative
        // order rather than being treated as a tie-break failure.
        pks.sort_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal));
        let mut rows = Vec::with_capacity(pks.len());
        for pk in &pks {
            if let Some(row) = service.read_by_id(&schema, pk)? {
                rows.push(row);
            }
        }
        Ok(ResultSet::Scan { cols: schema.column_names(), rows })
    }
}

// --- row transforms ---------------------------------------------------------

struct FilterExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    predicate: Expression,
}

impl<E: Engine> Executor<E> for FilterExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, rows) = as_scan(self.source.execute(service)?)?;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            match self.predicate.evaluate(&cols, &row, &cols, &row)? {
                Value::Bool(true) => kept.push(row),
                Value::Bool(false) | Value::Null => {}
                other => {
                    return Err(Error::Evaluation(format!(
                        "filter did not evaluate to a boolean: {:?}",
                        other
                    )))
                }
            }
        }
        Ok(ResultSet::Scan { cols, rows: kept })
    }
}

struct ProjectExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    columns: Vec<(Expression, String)>,
}

impl<E: Engine> Executor<E> for ProjectExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, rows) = as_scan(self.source.execute(service)?)?;
        let out_cols: Vec<String> = self.columns.iter().map(|(_, alias)| alias.clone()).collect();
        let mut out_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut out_row = Vec::with_capacity(self.columns.len());
            for (expr, _) in &self.columns {
                out_row.push(expr.evaluate(&cols, row, &cols, row)?);
            }
            out_rows.push(out_row);
        }
        Ok(ResultSet::Scan { cols: out_cols, rows: out_rows })
    }
}

struct AggregateExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    select: Vec<(Expression, Option<String>)>,
    group_by: Option<Expression>,
}

/// One GROUP BY bucket: the grouping key's representative value plus the
/// row indices that hashed into it. Buckets are kept in first-seen order
/// so output is deterministic without needing a sort the spec never asks
/// for.
struct Group {
    key: Value,
    rows: Vec<usize>,
}

impl<E: Engine> Executor<E> for AggregateExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, rows) = as_scan(self.source.execute(service)?)?;

        let mut groups: Vec<Group> = Vec::new();
        let mut bucket_of: HashMap<u32, usize> = HashMap::new();
        match &self.group_by {
            Some(expr) => {
                for (i, row) in rows.iter().enumerate() {
                    let key = expr.evaluate(&cols, row, &cols, row)?;
                    let hash = key.hash32();
                    match bucket_of.get(&hash) {
                        Some(&gi) => groups[gi].rows.push(i),
                        None => {
                            bucket_of.insert(hash, groups.len());
                            groups.push(Group { key, rows: vec![i] });
                        }
                    }
                }
            }
            None => groups.push(Group { key: Value::Null, rows: (0..rows.len()).collect() }),
        }

        let group_column = self.group_by.as_ref().and_then(|e| e.as_column());

        let out_cols: Vec<String> = self
            .select
            .iter()
            .map(|(expr, alias)| alias.clone().unwrap_or_else(|| default_alias(expr)))
            .collect();

        let mut out_rows = Vec::with_capacity(groups.len());
        for group in &groups {
            let mut out_row = Vec::with_capacity(self.select.len());
            for (expr, _) in &self.select {
                let value = match expr {
                    Expression::Aggregate(call) => eval_aggregate(call, &cols, &rows, &group.rows)?,
                    Expression::Column(name) => {
                        if Some(name.as_str()) != group_column {
                            return Err(Error::Evaluation(format!(
                                "column '{}' must appear in GROUP BY or be wrapped in an aggregate",
                                name
                            )));
                        }
                        group.key.clone()
                    }
                    _ => {
                        return Err(Error::Evaluation(
                            "GROUP BY select entries must be aggregate calls or the grouping column"
                                .into(),
                        ))
                    }
                };
                out_row.push(value);
            }
            out_rows.push(out_row);
        }

        Ok(ResultSet::Scan { cols: out_cols, rows: out_rows })
    }
}

fn eval_aggregate(
    call: &AggregateCall,
    cols: &[String],
    rows: &[Vec<Value>],
    indices: &[usize],
) -> CResult<Value> {
    let idx = cols
        .iter()
        .position(|c| c == &call.column)
        .ok_or_else(|| Error::Evaluation(format!("unknown column '{}'", call.column)))?;
    let values: Vec<&Value> = indices.iter().map(|&i| &rows[i][idx]).collect();
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    match call.name.to_uppercase().as_str() {
        "COUNT" => Ok(Value::Int(non_null.len() as i64)),
        "SUM" => {
            if non_null.is_empty() {
                return Ok(Value::Null);
            }
            let total = non_null.iter().map(|v| numeric(v)).sum::<CResult<f64>>()?;
            // A quirk preserved from the source: a zero total renders as
            // NULL rather than Float(0.0).
            if total == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(total))
            }
        }
        "AVG" => {
            if non_null.is_empty() {
                return Ok(Value::Null);
            }
            let total = non_null.iter().map(|v| numeric(v)).sum::<CResult<f64>>()?;
            Ok(Value::Float(total / non_null.len() as f64))
        }
        "MIN" => {
            let mut sorted = non_null;
            sorted.sort_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal));
            Ok(sorted.first().map(|v| (*v).clone()).unwrap_or(Value::Null))
        }
        "MAX" => {
            let mut sorted = non_null;
            sorted.sort_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal));
            Ok(sorted.last().map(|v| (*v).clone()).unwrap_or(Value::Null))
        }
        other => Err(Error::Evaluation(format!("unsupported aggregate function '{}'", other))),
    }
}

fn numeric(value: &Value) -> CResult<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(Error::Evaluation(format!("aggregate expects a numeric value, got {:?}", other))),
    }
}

struct OrderExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    terms: Vec<(String, OrderDirection)>,
}

impl<E: Engine> Executor<E> for OrderExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, mut rows) = as_scan(self.source.execute(service)?)?;
        let positions: Vec<(usize, OrderDirection)> = self
            .terms
            .iter()
            .map(|(name, dir)| {
                cols.iter()
                    .position(|c| c == name)
                    .map(|i| (i, *dir))
                    .ok_or_else(|| Error::Evaluation(format!("unknown column '{}'", name)))
            })
            .collect::<CResult<_>>()?;

        rows.sort_by(|a, b| {
            for (idx, dir) in &positions {
                if let Some(ordering) = a[*idx].partial_compare(&b[*idx]) {
                    if ordering != Ordering::Equal {
                        return if *dir == OrderDirection::Desc { ordering.reverse() } else { ordering };
                    }
                }
                // incomparable or equal: fall through to the next key
            }
            Ordering::Equal
        });

        Ok(ResultSet::Scan { cols, rows })
    }
}

struct LimitExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    limit: usize,
}

impl<E: Engine> Executor<E> for LimitExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, rows) = as_scan(self.source.execute(service)?)?;
        let rows = rows.into_iter().take(self.limit).collect();
        Ok(ResultSet::Scan { cols, rows })
    }
}

struct OffsetExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    offset: usize,
}

impl<E: Engine> Executor<E> for OffsetExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (cols, rows) = as_scan(self.source.execute(service)?)?;
        // An offset past the end of the result clamps to the last row
        // rather than yielding an empty set.
        let skip = if self.offset > rows.len() { rows.len().saturating_sub(1) } else { self.offset };
        let rows = rows.into_iter().skip(skip).collect();
        Ok(ResultSet::Scan { cols, rows })
    }
}

// --- joins ---------------------------------------------------------------

struct NestedLoopJoinExec<E: Engine> {
    left: Box<dyn Executor<E>>,
    right: Box<dyn Executor<E>>,
    predicate: Option<Expression>,
    outer: bool,
}

impl<E: Engine> Executor<E> for NestedLoopJoinExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (left_cols, left_rows) = as_scan(self.left.execute(service)?)?;
        let (right_cols, right_rows) = as_scan(self.right.execute(service)?)?;

        let mut out_cols = left_cols.clone();
        out_cols.extend(right_cols.clone());

        let mut out_rows = Vec::new();
        for left_row in &left_rows {
            let mut matched = false;
            for right_row in &right_rows {
                let keep = match &self.predicate {
                    None => true,
                    Some(pred) => match pred.evaluate(&left_cols, left_row, &right_cols, right_row)? {
                        Value::Bool(b) => b,
                        other => {
                            return Err(Error::Evaluation(format!(
                                "join predicate did not evaluate to a boolean: {:?}",
                                other
                            )))
                        }
                    },
                };
                if keep {
                    matched = true;
                    let mut row = left_row.clone();
                    row.extend(right_row.clone());
                    out_rows.push(row);
                }
            }
            if self.outer && !matched {
                let mut row = left_row.clone();
                row.extend(std::iter::repeat(Value::Null).take(right_cols.len()));
                out_rows.push(row);
            }
        }

        Ok(ResultSet::Scan { cols: out_cols, rows: out_rows })
    }
}

struct HashJoinExec<E: Engine> {
    left: Box<dyn Executor<E>>,
    right: Box<dyn Executor<E>>,
    left_field: String,
    right_field: String,
    outer: bool,
}

impl<E: Engine> Executor<E> for HashJoinExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let (left_cols, left_rows) = as_scan(self.left.execute(service)?)?;
        let (right_cols, right_rows) = as_scan(self.right.execute(service)?)?;

        let left_idx = left_cols
            .iter()
            .position(|c| c == &self.left_field)
            .ok_or_else(|| Error::Evaluation(format!("unknown column '{}'", self.left_field)))?;
        let right_idx = right_cols
            .iter()
            .position(|c| c == &self.right_field)
            .ok_or_else(|| Error::Evaluation(format!("unknown column '{}'", self.right_field)))?;

        let mut table: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, row) in right_rows.iter().enumerate() {
            table.entry(row[right_idx].hash32()).or_default().push(i);
        }

        let mut out_cols = left_cols.clone();
        out_cols.extend(right_cols.clone());

        let mut out_rows = Vec::new();
        for left_row in &left_rows {
            let key = &left_row[left_idx];
            let mut matched = false;
            if let Some(candidates) = table.get(&key.hash32()) {
                for &ri in candidates {
                    if &right_rows[ri][right_idx] == key {
                        matched = true;
                        let mut row = left_row.clone();
                        row.extend(right_rows[ri].clone());
                        out_rows.push(row);
                    }
                }
            }
            if self.outer && !matched {
                let mut row = left_row.clone();
                row.extend(std::iter::repeat(Value::Null).take(right_cols.len()));
                out_rows.push(row);
            }
        }

        Ok(ResultSet::Scan { cols: out_cols, rows: out_rows })
    }
}

// --- DML / DDL -------------------------------------------------------------

struct InsertExec {
    table: String,
    columns: Option<Vec<String>>,
    values: Vec<Vec<Expression>>,
}

impl<E: Engine> Executor<E> for InsertExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let mut count = 0;
        for value_exprs in self.values {
            let no_cols: [String; 0] = [];
            let no_row: [Value; 0] = [];
            let cells: Vec<Value> = value_exprs
                .iter()
                .map(|expr| expr.evaluate(&no_cols, &no_row, &no_cols, &no_row))
                .collect::<CResult<_>>()?;

            let row = match &self.columns {
                Some(names) => {
                    if names.len() != cells.len() {
                        return Err(Error::Schema(
                            "column list and VALUES tuple have different lengths".into(),
                        ));
                    }
                    let mut row = vec![Value::Null; schema.columns.len()];
                    let mut supplied = vec![false; schema.columns.len()];
                    for (name, cell) in names.iter().zip(cells) {
                        let idx = schema.column_index(name).ok_or_else(|| {
                            Error::Schema(format!("unknown column '{}'", name))
                        })?;
                        row[idx] = cell;
                        supplied[idx] = true;
                    }
                    for (i, col) in schema.columns.iter().enumerate() {
                        if !supplied[i] {
                            if col.default_value.is_null() {
                                return Err(Error::Schema(format!(
                                    "column '{}' has no default value and was not supplied",
                                    col.name
                                )));
                            }
                            row[i] = col.default_value.clone();
                        }
                    }
                    row
                }
                None => {
                    if cells.len() > schema.columns.len() {
                        return Err(Error::Schema(format!(
                            "table '{}' expects at most {} columns, got {}",
                            schema.name,
                            schema.columns.len(),
                            cells.len()
                        )));
                    }
                    let mut row = cells;
                    for col in &schema.columns[row.len()..] {
                        if col.default_value.is_null() {
                            return Err(Error::Schema(format!(
                                "column '{}' has no default value and was not supplied",
                                col.name
                            )));
                        }
                        row.push(col.default_value.clone());
                    }
                    row
                }
            };

            service.create_row(&schema, row)?;
            count += 1;
        }
        Ok(ResultSet::Insert { count })
    }
}

struct UpdateExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    table: String,
    assignments: Vec<(String, Expression)>,
}

impl<E: Engine> Executor<E> for UpdateExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let (cols, rows) = as_scan(self.source.execute(service)?)?;
        let mut count = 0;
        for row in rows {
            let pk = schema.primary_key_value(&row)?;
            let mut new_row = row.clone();
            for (name, expr) in &self.assignments {
                let idx = schema
                    .column_index(name)
                    .ok_or_else(|| Error::Schema(format!("unknown column '{}'", name)))?;
                new_row[idx] = expr.evaluate(&cols, &row, &cols, &row)?;
            }
            service.update_row(&schema, &pk, new_row)?;
            count += 1;
        }
        Ok(ResultSet::Update { count })
    }
}

struct DeleteExec<E: Engine> {
    source: Box<dyn Executor<E>>,
    table: String,
}

impl<E: Engine> Executor<E> for DeleteExec<E> {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        let schema = service.get_table(&self.table)?;
        let (_, rows) = as_scan(self.source.execute(service)?)?;
        let mut count = 0;
        for row in rows {
            let pk = schema.primary_key_value(&row)?;
            service.delete_row(&schema, &pk)?;
            count += 1;
        }
        Ok(ResultSet::Delete { count })
    }
}

struct CreateTableExec {
    table: crate::table::Table,
}

impl<E: Engine> Executor<E> for CreateTableExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        service.create_table(self.table)?;
        Ok(ResultSet::CreateTable)
    }
}

struct DropTableExec {
    name: String,
}

impl<E: Engine> Executor<E> for DropTableExec {
    fn execute(self: Box<Self>, service: &TableService<E>) -> CResult<ResultSet> {
        service.drop_table(&self.name)?;
        Ok(ResultSet::DropTable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::MVCC;
    use crate::sql::parser::parse;
    use crate::sql::plan::Planner;
    use crate::storage::memory::Memory;

    fn run(sql: &str, mvcc: &MVCC<Memory>) -> CResult<ResultSet> {
        let txn = mvcc.begin()?;
        let service = TableService::new(&txn);
        let planner = Planner::new(&service);
        let plan = planner.build(parse(sql)?)?;
        let executor: Box<dyn Executor<Memory>> = build_executor(plan);
        let result = executor.execute(&service)?;
        txn.commit()?;
        Ok(result)
    }

    #[test]
    fn insert_with_defaults_and_reordered_columns() {
        let mvcc = MVCC::new(Memory::new());
        run(
            "CREATE TABLE t(a INT PRIMARY KEY, b TEXT DEFAULT 'vv', c INTEGER DEFAULT 100);",
            &mvcc,
        )
        .unwrap();
        run("INSERT INTO t(a) VALUES (1);", &mvcc).unwrap();
        run("INSERT INTO t VALUES (2,'a',2);", &mvcc).unwrap();
        run("INSERT INTO t(b,a) VALUES ('b',3);", &mvcc).unwrap();

        let result = run("SELECT * FROM t;", &mvcc).unwrap();
        match result {
            ResultSet::Scan { cols, rows } => {
                assert_eq!(cols, vec!["a", "b", "c"]);
                assert_eq!(
                    rows,
                    vec![
                        vec![Value::Int(1), Value::String("vv".into()), Value::Int(100)],
                        vec![Value::Int(2), Value::String("a".into()), Value::Int(2)],
                        vec![Value::Int(3), Value::String("b".into()), Value::Int(100)],
                    ]
                );
            }
            other => panic!("expected Scan, got {:?}", other),
        }
    }

    #[test]
    fn group_by_with_nulls() {
        let mvcc = MVCC::new(Memory::new());
        run("CREATE TABLE test(a INT PRIMARY KEY, b INT, c FLOAT);", &mvcc).unwrap();
        let c_values = [1.0, 1.0, f64::NAN, 2.0, 2.0, 3.0, 3.0, 7.8, 7.8];
        for (i, c) in c_values.iter().enumerate() {
            if c.is_nan() {
                run(&format!("INSERT INTO test VALUES ({}, {}, NULL);", i, i), &mvcc).unwrap();
            } else {
                run(&format!("INSERT INTO test VALUES ({}, {}, {});", i, i, c), &mvcc).unwrap();
            }
        }

        let result =
            run("SELECT count(a) AS total, min(a), max(b), sum(c), avg(c) FROM test GROUP BY c;", &mvcc)
                .unwrap();
        match result {
            ResultSet::Scan { cols, rows } => {
                assert_eq!(cols, vec!["total", "MIN_a", "MAX_b", "SUM_c", "AVG_c"]);
                assert_eq!(rows.len(), 5);
                // groups are emitted in first-seen scan order: c=1.0 (a=0,1),
                // then NULL (a=2), then c=2.0, c=3.0, c=7.8 (two rows each).
                assert_eq!(
                    rows[0],
                    vec![Value::Int(2), Value::Int(0), Value::Int(1), Value::Float(2.0), Value::Float(1.0)]
                );
                assert_eq!(
                    rows[1],
                    vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Null, Value::Null]
                );
                for row in &rows[2..] {
                    assert_eq!(row[0], Value::Int(2));
                }
            }
            other => panic!("expected Scan, got {:?}", other),
        }
    }

    #[test]
    fn hash_join_matches_equal_keys() {
        let mvcc = MVCC::new(Memory::new());
        run("CREATE TABLE a(x INT PRIMARY KEY);", &mvcc).unwrap();
        run("CREATE TABLE b(x INT PRIMARY KEY);", &mvcc).unwrap();
        run("INSERT INTO a VALUES (1),(2),(3);", &mvcc).unwrap();
        run("INSERT INTO b VALUES (2),(3),(4);", &mvcc).unwrap();

        let result = run("SELECT * FROM a JOIN b ON x = x;", &mvcc).unwrap();
        match result {
            ResultSet::Scan { rows, .. } => {
                assert_eq!(
                    rows,
                    vec![
                        vec![Value::Int(2), Value::Int(2)],
                        vec![Value::Int(3), Value::Int(3)],
                    ]
                );
            }
            other => panic!("expected Scan, got {:?}", other),
        }
    }

    #[test]
    fn order_by_composite_with_limit_offset() {
        let mvcc = MVCC::new(Memory::new());
        run("CREATE TABLE t(a INT PRIMARY KEY, b INT, c INT, d FLOAT);", &mvcc).unwrap();
        for (a, b, c, d) in [
            (40, 23, 65, 4.23),
            (10, 34, 22, 1.22),
            (30, 56, 22, 2.88),
            (20, 87, 57, 6.78),
            (50, 87, 14, 3.28),
            (70, 87, 82, 9.52),
        ] {
            run(&format!("INSERT INTO t VALUES ({},{},{},{});", a, b, c, d), &mvcc).unwrap();
        }

        let result =
            run("SELECT b AS col2, a FROM t ORDER BY b ASC, a DESC LIMIT 4 OFFSET 2;", &mvcc).unwrap();
        match result {
            ResultSet::Scan { cols, rows } => {
                assert_eq!(cols, vec!["col2", "a"]);
                assert_eq!(
                    rows,
                    vec![
                        vec![Value::Int(56), Value::Int(30)],
                        vec![Value::Int(87), Value::Int(70)],
                        vec![Value::Int(87), Value::Int(50)],
                        vec![Value::Int(87), Value::Int(20)],
                    ]
                );
            }
            other => panic!("expected Scan, got {:?}", other),
        }
    }

    #[test]
    fn update_and_delete_affect_expected_rows() {
        let mvcc = MVCC::new(Memory::new());
        run("CREATE TABLE t(a INT PRIMARY KEY, b TEXT);", &mvcc).unwrap();
        run("INSERT INTO t VALUES (1,'x'),(2,'y');", &mvcc).unwrap();

        let updated = run("UPDATE t SET b = 'z' WHERE a = 1;", &mvcc).unwrap();
        assert_eq!(updated, ResultSet::Update { count: 1 });

        let deleted = run("DELETE FROM t WHERE a = 2;", &mvcc).unwrap();
        assert_eq!(deleted, ResultSet::Delete { count: 1 });

        let result = run("SELECT * FROM t;", &mvcc).unwrap();
        assert_eq!(
            result,
            ResultSet::Scan {
                cols: vec!["a".to_string(), "b".to_string()],
                rows: vec![vec![Value::Int(1), Value::String("z".into())]],
            }
        );
    }

    #[test]
    fn left_join_pads_unmatched_rows_with_null() {
        let mvcc = MVCC::new(Memory::new());
        run("CREATE TABLE a(x INT PRIMARY KEY);", &mvcc).unwrap();
        run("CREATE TABLE b(x INT PRIMARY KEY);", &mvcc).unwrap();
        run("INSERT INTO a VALUES (1),(2);", &mvcc).unwrap();
        run("INSERT INTO b VALUES (2);", &mvcc).unwrap();

        let result = run("SELECT * FROM a LEFT JOIN b ON x = x;", &mvcc).unwrap();
        match result {
            ResultSet::Scan { rows, .. } => {
                assert_eq!(
                    rows,
                    vec![vec![Value::Int(1), Value::Null], vec![Value::Int(2), Value::Int(2)]]
                );
            }
            other => panic!("expected Scan, got {:?}", other),
        }
    }
}
