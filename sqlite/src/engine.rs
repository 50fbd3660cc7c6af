//! Serialized SQL execution against the embedded engine.
//!
//! Provides [`Engine`], the single owner of the SQLite connection. All SQL
//! in this crate (migration DDL, query-builder statements, config
//! bookkeeping) flows through the [`Engine::write`] and [`Engine::read`]
//! transaction scopes, so statement execution is serialized and every
//! transaction either commits whole or rolls back whole.
//!
//! The engine also decodes the two schema introspection pragmas
//! (`table_info`, `index_list`) into typed rows for the migration engine.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ToSql, TransactionBehavior, types::ToSqlOutput};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Longest SQL prefix included in debug logs.
const MAX_LOGGED_SQL: usize = 100;

/// A decoded result row: column name → JSON value.
pub type Row = Map<String, Value>;

/// A scalar value bound to a `?` placeholder.
///
/// This is the full vocabulary of the engine contract: every argument that
/// reaches SQLite is one of these. Structured field values are encoded to
/// text before they get here.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Boolean, stored as integer 0/1.
    Bool(bool),
}

impl ScalarValue {
    /// Converts a JSON value to a bindable scalar.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for arrays and objects; those
    /// must pass through the structured-field codec before binding.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(ScalarValue::Null),
            Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ScalarValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(ScalarValue::Real(f))
                } else {
                    Err(StoreError::Validation(format!(
                        "number {n} is not representable as a column value"
                    )))
                }
            }
            Value::String(s) => Ok(ScalarValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(StoreError::Validation(
                "structured value bound without encoding".to_string(),
            )),
        }
    }
}

impl ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            ScalarValue::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            ScalarValue::Integer(i) => Ok(ToSqlOutput::from(*i)),
            ScalarValue::Real(f) => Ok(ToSqlOutput::from(*f)),
            ScalarValue::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            ScalarValue::Bool(b) => Ok(ToSqlOutput::from(*b)),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Integer(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Real(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

/// One decoded `PRAGMA table_info` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column position.
    pub cid: i64,
    /// Column name.
    pub name: String,
    /// Declared storage type (may be empty).
    pub data_type: String,
    /// NOT NULL constraint present.
    pub not_null: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// Part of the primary key.
    pub primary_key: bool,
}

/// One decoded `PRAGMA index_list` row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Position in the index list.
    pub sequence: i64,
    /// Index name.
    pub name: String,
    /// UNIQUE index.
    pub unique: bool,
    /// How the index came to exist: `c` = CREATE INDEX, `u` = UNIQUE
    /// constraint, `pk` = primary key.
    pub origin: String,
    /// Partial index (has a WHERE clause).
    pub partial: bool,
}

/// Serialized access to one SQLite connection.
///
/// Write transactions open IMMEDIATE (taking the reserved lock up front);
/// read transactions open DEFERRED. The connection mutex means statements
/// from different callers never interleave inside one another's
/// transactions.
pub struct Engine {
    conn: Mutex<Connection>,
}

impl Engine {
    /// Wraps an existing connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (creating if needed) a database file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Engine`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Runs `f` inside an exclusive write transaction.
    ///
    /// Commits if `f` returns `Ok`, otherwise rolls back; either way the
    /// closure's result is passed through. No partial application: the
    /// first failing statement aborts the whole transaction.
    pub fn write<T>(&self, f: impl FnOnce(&Tx) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&Tx::new(&tx)) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            // Dropping the transaction rolls it back.
            Err(err) => Err(err),
        }
    }

    /// Runs `f` inside a read transaction.
    ///
    /// The closure sees one consistent snapshot; its result is passed
    /// through on commit.
    pub fn read<T>(&self, f: impl FnOnce(&Tx) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        match f(&Tx::new(&tx)) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    /// Lists user tables currently present in the store.
    ///
    /// Internal `sqlite_*` tables are excluded; the reserved config table
    /// is included.
    pub fn user_tables(&self) -> Result<Vec<String>> {
        self.read(|tx| {
            let rows = tx.query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )?;
            Ok(rows
                .iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect())
        })
    }

    /// Returns the column list of each named table, in call order.
    ///
    /// A missing table yields an empty column list, which is how the
    /// migration engine detects absent tables.
    pub fn table_columns(&self, tables: &[&str]) -> Result<Vec<Vec<ColumnInfo>>> {
        self.read(|tx| {
            let mut all = Vec::with_capacity(tables.len());
            for table in tables {
                let rows = tx.query(&format!("PRAGMA table_info({table})"), &[])?;
                let mut columns = Vec::with_capacity(rows.len());
                for row in &rows {
                    columns.push(ColumnInfo {
                        cid: int_field(row, "cid"),
                        name: text_field(row, "name"),
                        data_type: text_field(row, "type"),
                        not_null: int_field(row, "notnull") != 0,
                        default_value: opt_text_field(row, "dflt_value"),
                        primary_key: int_field(row, "pk") != 0,
                    });
                }
                all.push(columns);
            }
            Ok(all)
        })
    }

    /// Returns the index list of each named table, in call order.
    pub fn table_indexes(&self, tables: &[&str]) -> Result<Vec<Vec<IndexInfo>>> {
        self.read(|tx| {
            let mut all = Vec::with_capacity(tables.len());
            for table in tables {
                let rows = tx.query(&format!("PRAGMA index_list({table})"), &[])?;
                let mut indexes = Vec::with_capacity(rows.len());
                for row in &rows {
                    indexes.push(IndexInfo {
                        sequence: int_field(row, "seq"),
                        name: text_field(row, "name"),
                        unique: int_field(row, "unique") != 0,
                        origin: text_field(row, "origin"),
                        partial: int_field(row, "partial") != 0,
                    });
                }
                all.push(indexes);
            }
            Ok(all)
        })
    }
}

/// Statement access inside an open transaction.
///
/// Handed to the closures of [`Engine::write`] and [`Engine::read`]; every
/// statement issued through it belongs to that transaction.
pub struct Tx<'a> {
    conn: &'a Connection,
}

impl<'a> Tx<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Runs a statement that returns rows.
    pub fn query(&self, sql: &str, args: &[ScalarValue]) -> Result<Vec<Row>> {
        debug!(sql = truncated(sql), args = args.len(), "Query");
        let mut stmt = self.conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(args.iter()))?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                object.insert(name.clone(), decode_value(row.get_ref(i)?));
            }
            decoded.push(object);
        }
        Ok(decoded)
    }

    /// Runs a statement that returns no rows; yields the affected row count.
    pub fn execute(&self, sql: &str, args: &[ScalarValue]) -> Result<usize> {
        debug!(sql = truncated(sql), args = args.len(), "Execute");
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(args.iter()))?)
    }
}

fn decode_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn int_field(row: &Row, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn text_field(row: &Row, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_text_field(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(String::from)
}

fn truncated(sql: &str) -> &str {
    if sql.len() <= MAX_LOGGED_SQL {
        return sql;
    }
    let mut end = MAX_LOGGED_SQL;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
