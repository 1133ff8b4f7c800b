//! Lowers a parsed [`Statement`] into a physical operator tree. Planning is
//! pure rule-based access-path selection (no cost model, no statistics):
//! a `WHERE <field> = <const>` predicate against a primary-key or indexed
//! column picks `PrimaryKeyScan`/`IndexScan`, everything else falls back to
//! a full `Scan`.

use crate::error::{CResult, Error};
use crate::expr::{CompareOp, Expression};
use crate::sql::ast::{FromItem, JoinType, OrderDirection, OrderTerm, SelectStatement, Statement};
use crate::storage::engine::Engine;
use crate::table::{Column, Table, TableService};
use crate::value::Value;

#[derive(Debug)]
pub enum PlanNode {
    CreateTable { table: Table },
    DropTable { name: String },
    Insert { table: String, columns: Option<Vec<String>>, values: Vec<Vec<Expression>> },
    Update { source: Box<PlanNode>, table: String, assignments: Vec<(String, Expression)> },
    Delete { source: Box<PlanNode>, table: String },
    Scan { table: String, filter: Option<Expression> },
    PrimaryKeyScan { table: String, value: Value },
    IndexScan { table: String, column: String, value: Value },
    Filter { source: Box<PlanNode>, predicate: Expression },
    Project { source: Box<PlanNode>, columns: Vec<(Expression, String)> },
    Aggregate { source: Box<PlanNode>, select: Vec<(Expression, Option<String>)>, group_by: Option<Expression> },
    Order { source: Box<PlanNode>, terms: Vec<(String, OrderDirection)> },
    Limit { source: Box<PlanNode>, limit: usize },
    Offset { source: Box<PlanNode>, offset: usize },
    NestedLoopJoin { left: Box<PlanNode>, right: Box<PlanNode>, predicate: Option<Expression>, outer: bool },
    HashJoin { left: Box<PlanNode>, right: Box<PlanNode>, left_field: String, right_field: String, outer: bool },
}

pub struct Planner<'t, E: Engine> {
    service: &'t TableService<'t, E>,
}

impl<'t, E: Engine> Planner<'t, E> {
    pub fn new(service: &'t TableService<'t, E>) -> Self {
        Self { service }
    }

    /// Lowers any statement except the transaction-control and
    /// introspection ones (`BEGIN`/`COMMIT`/`ROLLBACK`/`EXPLAIN`/`SHOW`),
    /// which the session dispatches directly without going through a plan.
    pub fn build(&self, statement: Statement) -> CResult<PlanNode> {
        match statement {
            Statement::CreateTable { name, columns } => {
                let cols = columns
                    .into_iter()
                    .map(|c| {
                        Ok(Column {
                            name: c.name,
                            data_type: c.data_type,
                            nullable: c.nullable,
                            default_value: resolve_default(c.default)?,
                            is_primary_key: c.is_primary_key,
                            is_indexed: c.is_indexed,
                        })
                    })
                    .collect::<CResult<Vec<_>>>()?;
                Ok(PlanNode::CreateTable { table: Table { name, columns: cols } })
            }
            Statement::DropTable(name) => Ok(PlanNode::DropTable { name }),
            Statement::Insert { table, columns, values } => {
                Ok(PlanNode::Insert { table, columns, values })
            }
            Statement::Select(select) => self.build_select(select),
            Statement::Update { table, assignments, where_clause } => {
                let schema = self.service.get_table(&table)?;
                let source = self.build_scan(&schema, where_clause);
                Ok(PlanNode::Update { source: Box::new(source), table, assignments })
            }
            Statement::Delete { table, where_clause } => {
                let schema = self.service.get_table(&table)?;
                let source = self.build_scan(&schema, where_clause);
                Ok(PlanNode::Delete { source: Box::new(source), table })
            }
            other => Err(Error::Internal(format!(
                "statement {:?} is handled by the session, not the planner",
                other
            ))),
        }
    }

    fn build_select(&self, select: SelectStatement) -> CResult<PlanNode> {
        let SelectStatement { columns, from, where_clause, group_by, having, order_by, limit, offset } =
            select;
        let has_aggregate = columns.iter().any(|c| c.expr.is_aggregate()) || group_by.is_some();
        let is_star = columns.is_empty();

        let node = self.build_from_item(from, where_clause)?;

        if has_aggregate {
            let entries = columns.into_iter().map(|c| (c.expr, c.alias)).collect();
            let node = PlanNode::Aggregate { source: Box::new(node), select: entries, group_by };
            wrap_common(node, having, order_by, offset, limit)
        } else {
            let node = wrap_common(node, having, order_by, offset, limit)?;
            if is_star {
                Ok(node)
            } else {
                let cols = columns
                    .into_iter()
                    .map(|c| {
                        let alias = c.alias.clone().unwrap_or_else(|| default_alias(&c.expr));
                        (c.expr, alias)
                    })
                    .collect();
                Ok(PlanNode::Project { source: Box::new(node), columns: cols })
            }
        }
    }

    fn build_from_item(&self, item: FromItem, where_clause: Option<Expression>) -> CResult<PlanNode> {
        match item {
            FromItem::Table(name) => {
                let schema = self.service.get_table(&name)?;
                Ok(self.build_scan(&schema, where_clause))
            }
            FromItem::Join { left, right, join_type, on } => {
                let outer = matches!(join_type, JoinType::Left | JoinType::Right);
                let (left_item, right_item) = match join_type {
                    JoinType::Right => (right, left),
                    _ => (left, right),
                };
                let left_node = self.build_from_item(*left_item, None)?;
                let right_node = self.build_from_item(*right_item, None)?;
                match join_type {
                    JoinType::Cross => Ok(PlanNode::NestedLoopJoin {
                        left: Box::new(left_node),
                        right: Box::new(right_node),
                        predicate: on,
                        outer,
                    }),
                    _ => {
                        let (left_field, right_field) = extract_join_fields(on.as_ref())?;
                        Ok(PlanNode::HashJoin {
                            left: Box::new(left_node),
                            right: Box::new(right_node),
                            left_field,
                            right_field,
                            outer,
                        })
                    }
                }
            }
        }
    }

    /// Reduces an optional WHERE expression to a single `(field, value)`
    /// equality pair and picks a `PrimaryKeyScan`/`IndexScan` access path
    /// when it matches a primary-key or indexed column; otherwise falls
    /// back to a full `Scan` carrying the original predicate unchanged.
    fn build_scan(&self, schema: &Table, where_clause: Option<Expression>) -> PlanNode {
        if let Some(expr) = &where_clause {
            if let Some((field, value)) = reduce_to_field_value(expr) {
                if let Some(col) = schema.columns.iter().find(|c| c.name == field) {
                    if col.is_primary_key {
                        return PlanNode::PrimaryKeyScan { table: schema.name.clone(), value };
                    }
                    if col.is_indexed {
                        return PlanNode::IndexScan { table: schema.name.clone(), column: field, value };
                    }
                }
            }
        }
        PlanNode::Scan { table: schema.name.clone(), filter: where_clause }
    }
}

/// Applies the HAVING/ORDER BY/OFFSET/LIMIT wraps shared by the aggregate
/// and non-aggregate lowering paths, in that fixed order.
fn wrap_common(
    node: PlanNode,
    having: Option<Expression>,
    order_by: Vec<OrderTerm>,
    offset: Option<Expression>,
    limit: Option<Expression>,
) -> CResult<PlanNode> {
    let mut node = node;
    if let Some(having) = having {
        node = PlanNode::Filter { source: Box::new(node), predicate: having };
    }
    if !order_by.is_empty() {
        let terms = order_by.into_iter().map(|t| (t.column, t.direction)).collect();
        node = PlanNode::Order { source: Box::new(node), terms };
    }
    if let Some(offset_expr) = offset {
        node = PlanNode::Offset { source: Box::new(node), offset: eval_const_usize(&offset_expr)? };
    }
    if let Some(limit_expr) = limit {
        node = PlanNode::Limit { source: Box::new(node), limit: eval_const_usize(&limit_expr)? };
    }
    Ok(node)
}

fn resolve_default(expr: Option<Expression>) -> CResult<Value> {
    match expr {
        None => Ok(Value::Null),
        Some(Expression::Const(v)) => Ok(v),
        Some(_) => Err(Error::Schema("DEFAULT must be a constant expression".into())),
    }
}

fn eval_const_usize(expr: &Expression) -> CResult<usize> {
    match expr {
        Expression::Const(Value::Int(i)) if *i >= 0 => Ok(*i as usize),
        Expression::Const(Value::Float(f)) if *f >= 0.0 => Ok(*f as usize),
        _ => Err(Error::Schema("LIMIT/OFFSET must be a non-negative constant number".into())),
    }
}

struct FieldValue {
    field: Option<String>,
    value: Option<Value>,
}

fn reduce_to_field_value(expr: &Expression) -> Option<(String, Value)> {
    let fv = reduce(expr)?;
    match (fv.field, fv.value) {
        (Some(field), Some(value)) => Some((field, value)),
        _ => None,
    }
}

fn reduce(expr: &Expression) -> Option<FieldValue> {
    match expr {
        Expression::Column(name) => Some(FieldValue { field: Some(name.clone()), value: None }),
        Expression::Const(v) => Some(FieldValue { field: None, value: Some(v.clone()) }),
        Expression::Binary { op: CompareOp::Equal, left, right } => {
            let l = reduce(left)?;
            let r = reduce(right)?;
            Some(FieldValue { field: l.field.or(r.field), value: l.value.or(r.value) })
        }
        _ => None,
    }
}

fn extract_join_fields(on: Option<&Expression>) -> CResult<(String, String)> {
    let on = on.ok_or_else(|| Error::Schema("JOIN requires an ON clause".into()))?;
    match on {
        Expression::Binary { op: CompareOp::Equal, left, right } => {
            let l = left
                .as_column()
                .ok_or_else(|| Error::Schema("JOIN predicate must be column = column".into()))?;
            let r = right
                .as_column()
                .ok_or_else(|| Error::Schema("JOIN predicate must be column = column".into()))?;
            Ok((l.to_string(), r.to_string()))
        }
        _ => Err(Error::Schema("JOIN predicate must be column = column".into())),
    }
}

pub fn default_alias(expr: &Expression) -> String {
    match expr {
        Expression::Column(name) => name.clone(),
        Expression::Const(v) => v.to_display_string(),
        Expression::Aggregate(call) => format!("{}_{}", call.name.to_uppercase(), call.column),
        Expression::Binary { .. } => "expr".to_string(),
    }
}

// --- EXPLAIN pre-order printer -------------------------------------------

fn describe(node: &PlanNode) -> String {
    match node {
        PlanNode::CreateTable { table } => format!("CreateTable {}", table.name),
        PlanNode::DropTable { name } => format!("DropTable {}", name),
        PlanNode::Insert { table, .. } => format!("Insert {}", table),
        PlanNode::Update { table, .. } => format!("Update {}", table),
        PlanNode::Delete { table, .. } => format!("Delete {}", table),
        PlanNode::Scan { table, filter } => {
            format!("Scan {}{}", table, if filter.is_some() { " (filtered)" } else { "" })
        }
        PlanNode::PrimaryKeyScan { table, value } => {
            format!("PrimaryKeyScan {} = {}", table, value)
        }
        PlanNode::IndexScan { table, column, value } => {
            format!("IndexScan {}.{} = {}", table, column, value)
        }
        PlanNode::Filter { .. } => "Filter".to_string(),
        PlanNode::Project { columns, .. } => {
            let names: Vec<&str> = columns.iter().map(|(_, name)| name.as_str()).collect();
            format!("Project [{}]", names.join(", "))
        }
        PlanNode::Aggregate { group_by, .. } => {
            format!("Aggregate{}", if group_by.is_some() { " GROUP BY" } else { "" })
        }
        PlanNode::Order { terms, .. } => {
            let parts: Vec<String> = terms
                .iter()
                .map(|(c, d)| format!("{} {}", c, if *d == OrderDirection::Asc { "ASC" } else { "DESC" }))
                .collect();
            format!("Order by [{}]", parts.join(", "))
        }
        PlanNode::Limit { limit, .. } => format!("Limit {}", limit),
        PlanNode::Offset { offset, .. } => format!("Offset {}", offset),
        PlanNode::NestedLoopJoin { outer, .. } => {
            format!("NestedLoopJoin{}", if *outer { " (outer)" } else { "" })
        }
        PlanNode::HashJoin { left_field, right_field, outer, .. } => format!(
            "HashJoin {} = {}{}",
            left_field,
            right_field,
            if *outer { " (outer)" } else { "" }
        ),
    }
}

fn children(node: &PlanNode) -> Vec<&PlanNode> {
    match node {
        PlanNode::CreateTable { .. }
        | PlanNode::DropTable { .. }
        | PlanNode::Insert { .. }
        | PlanNode::Scan { .. }
        | PlanNode::PrimaryKeyScan { .. }
        | PlanNode::IndexScan { .. } => vec![],
        PlanNode::Update { source, .. }
        | PlanNode::Delete { source, .. }
        | PlanNode::Filter { source, .. }
        | PlanNode::Project { source, .. }
        | PlanNode::Aggregate { source, .. }
        | PlanNode::Order { source, .. }
        | PlanNode::Limit { source, .. }
        | PlanNode::Offset { source, .. } => vec![source.as_ref()],
        PlanNode::NestedLoopJoin { left, right, .. } | PlanNode::HashJoin { left, right, .. } => {
            vec![left.as_ref(), right.as_ref()]
        }
    }
}

fn explain_lines(node: &PlanNode, depth: usize, out: &mut Vec<String>) {
    let indent = "  ->  ".repeat(depth);
    out.push(format!("{}{}", indent, describe(node)));
    for child in children(node) {
        explain_lines(child, depth + 1, out);
    }
}

/// Renders the plan tree in pre-order with a `"  ->  "` edge prefix per
/// nesting level, preceded by a header and a `-`-rule separator.
pub fn explain(node: &PlanNode) -> String {
    let mut lines = Vec::new();
    explain_lines(node, 0, &mut lines);
    let header = "QUERY PLAN";
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0).max(header.len());
    let mut text = format!("{}\n{}\n", header, "-".repeat(width));
    text.push_str(&lines.join("\n"));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::MVCC;
    use crate::sql::parser::parse;
    use crate::storage::memory::Memory;

    fn plan_for(sql: &str, setup: &[&str]) -> PlanNode {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        for stmt in setup {
            let planner = Planner::new(&service);
            let built = planner.build(parse(stmt).unwrap()).unwrap();
            execute_ddl_for_test(&service, built);
        }
        let planner = Planner::new(&service);
        planner.build(parse(sql).unwrap()).unwrap()
    }

    fn execute_ddl_for_test<E: Engine>(service: &TableService<E>, node: PlanNode) {
        match node {
            PlanNode::CreateTable { table } => service.create_table(table).unwrap(),
            _ => panic!("test setup statements must be CREATE TABLE"),
        }
    }

    #[test]
    fn picks_primary_key_scan() {
        let node = plan_for(
            "SELECT * FROM t WHERE a = 1;",
            &["CREATE TABLE t (a INT PRIMARY KEY, b TEXT);"],
        );
        assert!(matches!(node, PlanNode::PrimaryKeyScan { .. }));
    }

    #[test]
    fn picks_index_scan() {
        let node = plan_for(
            "SELECT * FROM t WHERE b = 'x';",
            &["CREATE TABLE t (a INT PRIMARY KEY, b TEXT INDEX);"],
        );
        assert!(matches!(node, PlanNode::IndexScan { .. }));
    }

    #[test]
    fn falls_back_to_full_scan() {
        let node = plan_for(
            "SELECT * FROM t WHERE b = 'x';",
            &["CREATE TABLE t (a INT PRIMARY KEY, b TEXT);"],
        );
        assert!(matches!(node, PlanNode::Scan { .. }));
    }

    #[test]
    fn star_select_has_no_project() {
        let node = plan_for("SELECT * FROM t;", &["CREATE TABLE t (a INT PRIMARY KEY);"]);
        assert!(matches!(node, PlanNode::Scan { .. }));
    }

    #[test]
    fn named_select_wraps_project() {
        let node = plan_for("SELECT a FROM t;", &["CREATE TABLE t (a INT PRIMARY KEY);"]);
        assert!(matches!(node, PlanNode::Project { .. }));
    }

    #[test]
    fn limit_offset_ordering_wraps_offset_inside_limit() {
        let node =
            plan_for("SELECT a FROM t LIMIT 4 OFFSET 2;", &["CREATE TABLE t (a INT PRIMARY KEY);"]);
        match node {
            PlanNode::Project { source, .. } => match *source {
                PlanNode::Limit { source, limit } => {
                    assert_eq!(limit, 4);
                    assert!(matches!(*source, PlanNode::Offset { offset: 2, .. }));
                }
                other => panic!("expected Limit, got {:?}", other),
            },
            other => panic!("expected Project, got {:?}", other),
        }
    }

    #[test]
    fn explain_renders_a_header_and_indented_tree() {
        let node = plan_for("SELECT a FROM t;", &["CREATE TABLE t (a INT PRIMARY KEY);"]);
        let text = explain(&node);
        assert!(text.starts_with("QUERY PLAN\n"));
        assert!(text.contains("Project"));
        assert!(text.contains("  ->  Scan"));
    }
}
