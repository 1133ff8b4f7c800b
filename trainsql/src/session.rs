//! Per-connection statement dispatch: parses, plans and executes SQL text
//! against an attached (or implicit, one-shot) transaction, translating
//! every `Err` into a [`ResultSet::Error`] so callers never see a Rust-level
//! failure from a bad statement — only a malformed wire frame or a dead
//! connection should ever become a hard error above this layer.

use log::debug;

use crate::error::{CResult, Error};
use crate::mvcc::{Transaction, MVCC};
use crate::result::ResultSet;
use crate::sql::ast::Statement;
use crate::sql::executor::build_executor;
use crate::sql::parser::parse;
use crate::sql::plan::{explain, Planner};
use crate::storage::engine::Engine;
use crate::table::TableService;

/// One client's view of the database: an `MVCC` handle plus at most one
/// transaction currently open across statements. With nothing attached,
/// each statement runs in its own auto-committed (or auto-rolled-back)
/// transaction; `BEGIN` attaches one that persists until `COMMIT`/
/// `ROLLBACK`.
pub struct Session<E: Engine> {
    mvcc: MVCC<E>,
    txn: Option<Transaction<E>>,
}

impl<E: Engine> Session<E> {
    pub fn new(mvcc: MVCC<E>) -> Self {
        Self { mvcc, txn: None }
    }

    /// Returns `true` while an explicit transaction is attached.
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Executes one SQL statement and renders its outcome. Every failure
    /// mode — a parse error, a schema violation, a write conflict — is
    /// caught and returned as `ResultSet::Error` rather than propagated,
    /// so a caller can always format and send back a response.
    pub fn execute(&mut self, sql: &str) -> ResultSet {
        match self.dispatch(sql) {
            Ok(result) => result,
            Err(err) => ResultSet::Error { msg: err.to_string() },
        }
    }

    fn dispatch(&mut self, sql: &str) -> CResult<ResultSet> {
        let statement = parse(sql)?;
        debug!("executing statement: {:?}", statement);
        match statement {
            Statement::Begin => self.begin(),
            Statement::Commit => self.commit(),
            Statement::Rollback => self.rollback(),
            Statement::Explain(inner) => self.explain(*inner),
            Statement::ShowTables => self.with_readonly(|service| {
                let mut names = service.get_table_names()?;
                names.sort();
                Ok(ResultSet::ShowDatabase { text: names.join("\n") })
            }),
            Statement::ShowTable(name) => self.with_readonly(|service| {
                let table = service.get_table(&name)?;
                Ok(ResultSet::ShowTable { text: format_table_schema(&table) })
            }),
            other => self.with_transaction(|service| {
                let plan = Planner::new(service).build(other)?;
                build_executor(plan).execute(service)
            }),
        }
    }

    fn begin(&mut self) -> CResult<ResultSet> {
        if self.txn.is_some() {
            return Err(Error::Internal("a transaction is already open on this session".into()));
        }
        let txn = self.mvcc.begin()?;
        let version = txn.version();
        self.txn = Some(txn);
        Ok(ResultSet::Begin { version })
    }

    fn commit(&mut self) -> CResult<ResultSet> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| Error::Internal("no transaction is open on this session".into()))?;
        let version = txn.version();
        txn.commit()?;
        Ok(ResultSet::Commit { version })
    }

    fn rollback(&mut self) -> CResult<ResultSet> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| Error::Internal("no transaction is open on this session".into()))?;
        let version = txn.version();
        txn.rollback()?;
        Ok(ResultSet::Rollback { version })
    }

    /// `EXPLAIN` never touches storage beyond reading schema for access-path
    /// selection, and never executes the resulting plan.
    fn explain(&mut self, inner: Statement) -> CResult<ResultSet> {
        if matches!(inner, Statement::Explain(_)) {
            return Err(Error::Parse("EXPLAIN cannot be nested".into()));
        }
        self.with_readonly(|service| {
            let plan = Planner::new(service).build(inner)?;
            Ok(ResultSet::Explain { text: explain(&plan) })
        })
    }

    /// Runs `f` against the attached transaction if one is open, otherwise
    /// begins a fresh one, runs `f`, and commits on success or rolls back
    /// on failure.
    fn with_transaction(
        &mut self,
        f: impl FnOnce(&TableService<E>) -> CResult<ResultSet>,
    ) -> CResult<ResultSet> {
        if let Some(txn) = &self.txn {
            let service = TableService::new(txn);
            return f(&service);
        }

        let txn = self.mvcc.begin()?;
        let service = TableService::new(&txn);
        match f(&service) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(err) => {
                txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Like `with_transaction`, but for statements (`SHOW`, `EXPLAIN`) that
    /// never write: a freshly begun transaction is always committed, never
    /// rolled back, since there's nothing to undo and an explicitly attached
    /// transaction's lifecycle is left untouched either way.
    fn with_readonly(
        &mut self,
        f: impl FnOnce(&TableService<E>) -> CResult<ResultSet>,
    ) -> CResult<ResultSet> {
        if let Some(txn) = &self.txn {
            let service = TableService::new(txn);
            return f(&service);
        }

        let txn = self.mvcc.begin()?;
        let service = TableService::new(&txn);
        let result = f(&service)?;
        txn.commit()?;
        Ok(result)
    }
}

fn format_table_schema(table: &crate::table::Table) -> String {
    let mut lines = vec![format!("CREATE TABLE {} (", table.name)];
    for (i, col) in table.columns.iter().enumerate() {
        let mut parts = vec![col.name.clone(), col.data_type.to_string()];
        if col.is_primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if !col.nullable && !col.is_primary_key {
            parts.push("NOT NULL".to_string());
        }
        if col.is_indexed {
            parts.push("INDEX".to_string());
        }
        if !col.default_value.is_null() {
            parts.push(format!("DEFAULT {}", col.default_value));
        }
        let suffix = if i + 1 == table.columns.len() { "" } else { "," };
        lines.push(format!("  {}{}", parts.join(" "), suffix));
    }
    lines.push(")".to_string());
    lines.join("\n")
}
