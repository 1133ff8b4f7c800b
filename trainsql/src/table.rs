//! The table service: schema storage, row encoding, and secondary-index
//! maintenance, built directly atop an MVCC [`Transaction`]. Every method
//! here takes the active transaction as its storage handle — there is no
//! independent locking at this layer, since `Transaction::get`/`set`/
//! `delete`/`scan_prefix` already serialise through the shared engine lock.

use std::collections::HashSet;

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::expr::Expression;
use crate::mvcc::transaction::Transaction;
use crate::storage::engine::Engine;
use crate::value::{DataType, Value};

const TABLE_PREFIX: &[u8] = b"Table_";
const ROW_PREFIX: &[u8] = b"Row_";
const INDEX_PREFIX: &[u8] = b"Index_";

fn table_key(name: &str) -> Vec<u8> {
    let mut buf = TABLE_PREFIX.to_vec();
    buf.extend_from_slice(name.as_bytes());
    buf
}

fn row_prefix(table: &str) -> Vec<u8> {
    let mut buf = ROW_PREFIX.to_vec();
    buf.extend_from_slice(table.as_bytes());
    buf
}

fn row_key(table: &str, pk: &Value) -> Vec<u8> {
    let mut buf = row_prefix(table);
    buf.extend_from_slice(&pk.to_bytes());
    buf
}

fn index_key(table: &str, col: &str, value: &Value) -> Vec<u8> {
    let mut buf = INDEX_PREFIX.to_vec();
    buf.extend_from_slice(table.as_bytes());
    buf.extend_from_slice(col.as_bytes());
    buf.extend_from_slice(&value.to_bytes());
    buf
}

/// One column of a table's schema. A primary-key column is implicitly
/// non-nullable; `default_value` may be `Null` even for a non-null-typed
/// column (meaning: no value was supplied unless the statement gives one
/// explicitly).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default_value: Value,
    pub is_primary_key: bool,
    pub is_indexed: bool,
}

/// A table's schema. Column order is significant: it is the row tuple
/// order used for disk encoding, default-value padding, and `SELECT *`
/// output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_column(&self) -> CResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .ok_or_else(|| Error::Schema(format!("table '{}' has no primary key", self.name)))
    }

    pub fn primary_key_value(&self, row: &[Value]) -> CResult<Value> {
        let idx = self.column_index(&self.primary_key_column()?.name).unwrap();
        Ok(row[idx].clone())
    }
}

/// Bound to a single in-flight transaction; every call here goes through
/// `Transaction::get`/`set`/`delete`/`scan_prefix`, inheriting their
/// snapshot-isolation and write-conflict behaviour.
pub struct TableService<'t, E: Engine> {
    txn: &'t Transaction<E>,
}

impl<'t, E: Engine> TableService<'t, E> {
    pub fn new(txn: &'t Transaction<E>) -> Self {
        Self { txn }
    }

    /// Validates and persists a new table's schema. Fails if a table of
    /// this name already exists, if there isn't exactly one primary-key
    /// column, if two columns share a name, or if a default value doesn't
    /// match its column's declared type (`Null` defaults are always
    /// accepted).
    pub fn create_table(&self, table: Table) -> CResult<()> {
        let mut seen = HashSet::new();
        for col in &table.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(Error::Schema(format!("duplicate column '{}'", col.name)));
            }
        }

        let pk_count = table.columns.iter().filter(|c| c.is_primary_key).count();
        if pk_count == 0 {
            return Err(Error::Schema(format!("table '{}' must have a primary key", table.name)));
        }
        if pk_count > 1 {
            return Err(Error::Schema(format!(
                "table '{}' may have only one primary key column",
                table.name
            )));
        }

        for col in &table.columns {
            if !col.default_value.is_null() && !col.data_type.accepts(&col.default_value) {
                return Err(Error::Schema(format!(
                    "column '{}' default value does not match type {}",
                    col.name, col.data_type
                )));
            }
        }

        let key = table_key(&table.name);
        if self.txn.get(&key)?.is_some() {
            return Err(Error::Schema(format!("table '{}' already exists", table.name)));
        }
        self.txn.set(&key, bincode::serialize(&table)?)?;
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> CResult<Table> {
        let raw = self
            .txn
            .get(&table_key(name))?
            .ok_or_else(|| Error::Schema(format!("table '{}' does not exist", name)))?;
        Ok(bincode::deserialize(&raw)?)
    }

    /// Deletes every row and index entry belonging to `name`, then its
    /// schema.
    pub fn drop_table(&self, name: &str) -> CResult<()> {
        let table = self.get_table(name)?;
        for row in self.scan_table(&table, None)? {
            let pk = table.primary_key_value(&row)?;
            self.delete_row(&table, &pk)?;
        }
        self.txn.delete(&table_key(name))?;
        Ok(())
    }

    /// Validates `row` against the schema, writes it under its primary key,
    /// and appends its key to every indexed column's index entry. Fails if
    /// the primary key is already present.
    pub fn create_row(&self, table: &Table, row: Vec<Value>) -> CResult<()> {
        self.validate_row(table, &row)?;
        let pk = table.primary_key_value(&row)?;
        let key = row_key(&table.name, &pk);
        if self.txn.get(&key)?.is_some() {
            return Err(Error::Constraint("row already exists".into()));
        }
        self.txn.set(&key, bincode::serialize(&row)?)?;

        for col in table.columns.iter().filter(|c| c.is_indexed) {
            let idx = table.column_index(&col.name).unwrap();
            let mut pks = self.load_index(table, &col.name, &row[idx])?;
            pks.push(pk.clone());
            self.save_index(table, &col.name, &row[idx], pks)?;
        }
        Ok(())
    }

    /// If the primary key changed, deletes the old row (and its index
    /// entries) and inserts `new_row` fresh — the primary-key-uniqueness
    /// guard in `create_row` enforces that the new key isn't already taken.
    /// Otherwise overwrites the row payload in place and adjusts only the
    /// indexed columns whose value actually changed.
    pub fn update_row(&self, table: &Table, old_pk: &Value, new_row: Vec<Value>) -> CResult<()> {
        self.validate_row(table, &new_row)?;
        let new_pk = table.primary_key_value(&new_row)?;
        if &new_pk != old_pk {
            self.delete_row(table, old_pk)?;
            return self.create_row(table, new_row);
        }

        let old_row = self
            .read_by_id(table, old_pk)?
            .ok_or_else(|| Error::Internal("row vanished during update".into()))?;

        for col in table.columns.iter().filter(|c| c.is_indexed) {
            let idx = table.column_index(&col.name).unwrap();
            if old_row[idx] != new_row[idx] {
                let mut old_pks = self.load_index(table, &col.name, &old_row[idx])?;
                old_pks.retain(|pk| pk != old_pk);
                self.save_index(table, &col.name, &old_row[idx], old_pks)?;

                let mut new_pks = self.load_index(table, &col.name, &new_row[idx])?;
                new_pks.push(old_pk.clone());
                self.save_index(table, &col.name, &new_row[idx], new_pks)?;
            }
        }

        self.txn.set(&row_key(&table.name, old_pk), bincode::serialize(&new_row)?)?;
        Ok(())
    }

    /// Reads the row to recover its indexed column values, removes its key
    /// from each of those index entries, then deletes the row itself.
    pub fn delete_row(&self, table: &Table, pk: &Value) -> CResult<()> {
        let row = self
            .read_by_id(table, pk)?
            .ok_or_else(|| Error::Schema("row does not exist".into()))?;

        for col in table.columns.iter().filter(|c| c.is_indexed) {
            let idx = table.column_index(&col.name).unwrap();
            let mut pks = self.load_index(table, &col.name, &row[idx])?;
            pks.retain(|candidate| candidate != pk);
            self.save_index(table, &col.name, &row[idx], pks)?;
        }

        self.txn.delete(&row_key(&table.name, pk))?;
        Ok(())
    }

    /// Prefix-scans every row of `table`, optionally keeping only those
    /// for which `filter` evaluates to `Bool(true)` (a `Null` result is
    /// treated as false; any other variant is an error).
    pub fn scan_table(&self, table: &Table, filter: Option<&Expression>) -> CResult<Vec<Vec<Value>>> {
        let entries = self.txn.scan_prefix(&row_prefix(&table.name))?;
        let cols = table.column_names();
        let mut rows = Vec::with_capacity(entries.len());
        for (_, raw) in entries {
            let row: Vec<Value> = bincode::deserialize(&raw)?;
            match filter {
                None => rows.push(row),
                Some(expr) => match expr.evaluate(&cols, &row, &cols, &row)? {
                    Value::Bool(true) => rows.push(row),
                    Value::Bool(false) | Value::Null => {}
                    other => {
                        return Err(Error::Evaluation(format!(
                            "filter did not evaluate to a boolean: {:?}",
                            other
                        )))
                    }
                },
            }
        }
        Ok(rows)
    }

    pub fn read_by_id(&self, table: &Table, pk: &Value) -> CResult<Option<Vec<Value>>> {
        match self.txn.get(&row_key(&table.name, pk))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn load_index(&self, table: &Table, col: &str, value: &Value) -> CResult<Vec<Value>> {
        match self.txn.get(&index_key(&table.name, col, value))? {
            Some(raw) => Ok(bincode::deserialize(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Saves an index entry; saving an empty list deletes the key instead
    /// of leaving a stale empty payload behind.
    pub fn save_index(&self, table: &Table, col: &str, value: &Value, pks: Vec<Value>) -> CResult<()> {
        let key = index_key(&table.name, col, value);
        if pks.is_empty() {
            self.txn.delete(&key)?;
        } else {
            self.txn.set(&key, bincode::serialize(&pks)?)?;
        }
        Ok(())
    }

    pub fn get_table_names(&self) -> CResult<Vec<String>> {
        self.txn
            .scan_prefix(TABLE_PREFIX)?
            .into_iter()
            .map(|(key, _)| {
                String::from_utf8(key[TABLE_PREFIX.len()..].to_vec())
                    .map_err(|e| Error::Encoding(e.to_string()))
            })
            .collect()
    }

    fn validate_row(&self, table: &Table, row: &[Value]) -> CResult<()> {
        if row.len() != table.columns.len() {
            return Err(Error::Schema(format!(
                "table '{}' expects {} columns, got {}",
                table.name,
                table.columns.len(),
                row.len()
            )));
        }
        for (col, value) in table.columns.iter().zip(row.iter()) {
            if value.is_null() {
                if !col.nullable {
                    return Err(Error::Constraint(format!("column '{}' does not accept NULL", col.name)));
                }
            } else if !col.data_type.accepts(value) {
                return Err(Error::Schema(format!(
                    "column '{}' expects {}, got {:?}",
                    col.name, col.data_type, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::MVCC;
    use crate::storage::memory::Memory;

    fn sample_table() -> Table {
        Table {
            name: "t".into(),
            columns: vec![
                Column {
                    name: "a".into(),
                    data_type: DataType::Integer,
                    nullable: false,
                    default_value: Value::Null,
                    is_primary_key: true,
                    is_indexed: false,
                },
                Column {
                    name: "b".into(),
                    data_type: DataType::String,
                    nullable: true,
                    default_value: Value::String("vv".into()),
                    is_primary_key: false,
                    is_indexed: true,
                },
            ],
        }
    }

    #[test]
    fn create_table_rejects_missing_primary_key() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let mut table = sample_table();
        table.columns[0].is_primary_key = false;
        assert!(service.create_table(table).is_err());
    }

    #[test]
    fn create_table_rejects_duplicate_columns() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let mut table = sample_table();
        table.columns[1].name = "a".into();
        assert!(service.create_table(table).is_err());
    }

    #[test]
    fn row_lifecycle_maintains_index() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let table = sample_table();
        service.create_table(table.clone()).unwrap();

        service.create_row(&table, vec![Value::Int(1), Value::String("x".into())]).unwrap();
        service.create_row(&table, vec![Value::Int(2), Value::String("x".into())]).unwrap();

        let pks = service.load_index(&table, "b", &Value::String("x".into())).unwrap();
        assert_eq!(pks.len(), 2);

        service.delete_row(&table, &Value::Int(1)).unwrap();
        let pks = service.load_index(&table, "b", &Value::String("x".into())).unwrap();
        assert_eq!(pks, vec![Value::Int(2)]);
    }

    #[test]
    fn update_row_changing_primary_key_moves_indexes() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let table = sample_table();
        service.create_table(table.clone()).unwrap();
        service.create_row(&table, vec![Value::Int(1), Value::String("x".into())]).unwrap();

        service
            .update_row(&table, &Value::Int(1), vec![Value::Int(2), Value::String("y".into())])
            .unwrap();

        assert!(service.read_by_id(&table, &Value::Int(1)).unwrap().is_none());
        assert_eq!(
            service.read_by_id(&table, &Value::Int(2)).unwrap(),
            Some(vec![Value::Int(2), Value::String("y".into())])
        );
        assert!(service.load_index(&table, "b", &Value::String("x".into())).unwrap().is_empty());
        assert_eq!(
            service.load_index(&table, "b", &Value::String("y".into())).unwrap(),
            vec![Value::Int(2)]
        );
    }

    #[test]
    fn scan_table_applies_filter() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let table = sample_table();
        service.create_table(table.clone()).unwrap();
        service.create_row(&table, vec![Value::Int(1), Value::String("x".into())]).unwrap();
        service.create_row(&table, vec![Value::Int(2), Value::String("y".into())]).unwrap();

        let filter = Expression::Binary {
            op: crate::expr::CompareOp::Equal,
            left: Box::new(Expression::column("b")),
            right: Box::new(Expression::Const(Value::String("y".into()))),
        };
        let rows = service.scan_table(&table, Some(&filter)).unwrap();
        assert_eq!(rows, vec![vec![Value::Int(2), Value::String("y".into())]]);
    }

    #[test]
    fn drop_table_removes_rows_and_schema() {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin().unwrap();
        let service = TableService::new(&txn);
        let table = sample_table();
        service.create_table(table.clone()).unwrap();
        service.create_row(&table, vec![Value::Int(1), Value::String("x".into())]).unwrap();

        service.drop_table("t").unwrap();
        assert!(service.get_table("t").is_err());
    }
}
