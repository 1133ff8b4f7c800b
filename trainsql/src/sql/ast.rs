//! The abstract syntax tree produced by the parser. Every node is a finite,
//! acyclic, owned tree — child nodes are boxed where recursive, never
//! shared, since a parsed statement is consumed exactly once by the
//! planner.

use crate::expr::Expression;
use crate::value::DataType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

/// A left-deep join tree: `table [[CROSS|INNER|LEFT|RIGHT] JOIN table [ON
/// expr]]*`.
#[derive(Clone, Debug, PartialEq)]
pub enum FromItem {
    Table(String),
    Join { left: Box<FromItem>, right: Box<FromItem>, join_type: JoinType, on: Option<Expression> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectColumn {
    pub expr: Expression,
    pub alias: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: OrderDirection,
}

/// `columns` empty means `SELECT *` (all columns, no projection).
#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<SelectColumn>,
    pub from: FromItem,
    pub where_clause: Option<Expression>,
    pub group_by: Option<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

/// One column of a `CREATE TABLE` definition, before default-value
/// constant-folding has resolved its `default` expression to a `Value`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Expression>,
    pub is_primary_key: bool,
    pub is_indexed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    ShowTables,
    ShowTable(String),
    CreateTable { name: String, columns: Vec<ColumnDef> },
    DropTable(String),
    Insert { table: String, columns: Option<Vec<String>>, values: Vec<Vec<Expression>> },
    Select(SelectStatement),
    Update { table: String, assignments: Vec<(String, Expression)>, where_clause: Option<Expression> },
    Delete { table: String, where_clause: Option<Expression> },
    Begin,
    Commit,
    Rollback,
    Explain(Box<Statement>),
}
