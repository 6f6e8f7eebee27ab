//! Internal SQLite database.
//!
//! CSV sources are ingested into an embedded SQLite database, and bare table
//! names are assumed to live there. The connection is owned by an explicit
//! [`InternalDb`] handle that callers pass into the source materializer, so
//! lifetime and access discipline are visible at the call site:
//!
//! - opened lazily, on first need
//! - closed when the handle is dropped, or explicitly via [`InternalDb::close`]
//! - not `Sync`: one in-flight request per handle. Give each thread its own
//!   handle, or put the handle behind a mutex.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use once_cell::unsync::OnceCell;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::cursor::{Cursor, DriverError, QueryTimedOut};
use super::value::{Row, Value};
use crate::error::{Error, Result};
use crate::sql::engine::EngineDescriptor;

/// SQLite VM instructions between timeout checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

/// Where the internal database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbPath {
    Memory,
    File(PathBuf),
}

impl DbPath {
    /// `":memory:"` (or empty) selects an in-memory database.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | ":memory:" => DbPath::Memory,
            other => DbPath::File(PathBuf::from(other)),
        }
    }
}

/// Options for CSV ingestion.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub table: String,
    pub delimiter: u8,
    /// Replace an existing table of the same name instead of failing.
    pub overwrite: bool,
}

/// Summary of one CSV ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: usize,
    pub replaced: bool,
}

/// Explicitly owned handle to the internal SQLite database.
#[derive(Debug)]
pub struct InternalDb {
    path: DbPath,
    timeout: Option<Duration>,
    conn: OnceCell<Connection>,
}

impl InternalDb {
    pub fn new(path: DbPath) -> Self {
        Self {
            path,
            timeout: None,
            conn: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DbPath::Memory)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(DbPath::File(path.into()))
    }

    /// Per-query timeout applied to cursors handed out by this handle.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &DbPath {
        &self.path
    }

    /// Whether the connection has been opened yet.
    pub fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    /// The connection, opening it on first use.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.get_or_try_init(|| -> Result<Connection> {
            let conn = match &self.path {
                DbPath::Memory => Connection::open_in_memory()?,
                DbPath::File(path) => {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent)?;
                        }
                    }
                    Connection::open(path)?
                }
            };
            debug!(path = ?self.path, "opened internal database");
            Ok(conn)
        })
    }

    /// A cursor over the internal database.
    pub fn cursor(&self) -> Result<SqliteCursor<'_>> {
        Ok(SqliteCursor::new(self.connection()?).with_timeout(self.timeout))
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.stored_table_name(table)?.is_some())
    }

    /// The stored name of `table`, matched case-insensitively as SQLite
    /// resolves identifiers.
    pub fn stored_table_name(&self, table: &str) -> Result<Option<String>> {
        let found = self
            .connection()?
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found)
    }

    /// Load a CSV file (header row required) into `options.table`.
    ///
    /// Column names are taken verbatim from the header. Column types are
    /// inferred: all-integer columns become INTEGER, all-numeric columns REAL,
    /// anything else TEXT. Empty fields are NULL. An existing table is replaced
    /// when `overwrite` is set, otherwise ingestion fails and the existing
    /// table is left untouched.
    #[instrument(skip_all, fields(path = %path.display(), table = %options.table))]
    pub fn ingest_csv(&self, path: &Path, options: &CsvOptions) -> Result<IngestReport> {
        let csv_err = |source| Error::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::EmptyCsv {
                path: path.to_path_buf(),
            });
        }

        let mut records: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            records.push(record.iter().map(str::to_string).collect());
        }

        let types: Vec<ColumnType> = (0..columns.len())
            .map(|i| ColumnType::infer(records.iter().filter_map(|r| r.get(i))))
            .collect();

        let conn = self.connection()?;
        let existing = self.stored_table_name(&options.table)?;
        let exists = existing.is_some();
        if exists && !options.overwrite {
            return Err(Error::TableExists {
                table: options.table.clone(),
            });
        }

        let engine = EngineDescriptor::sqlite();
        let table_q = engine.quote_identifier(&options.table);
        let col_defs: Vec<String> = columns
            .iter()
            .zip(&types)
            .map(|(name, ty)| format!("{} {}", engine.quote_identifier(name), ty.as_sql()))
            .collect();
        let insert_sql = format!(
            "INSERT INTO {table_q} ({}) VALUES ({})",
            columns
                .iter()
                .map(|c| engine.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            engine.placeholders(columns.len())
        );

        let tx = conn.unchecked_transaction()?;
        if let Some(stored) = &existing {
            tx.execute(
                &format!("DROP TABLE {}", engine.quote_identifier(stored)),
                [],
            )?;
        }
        tx.execute(
            &format!("CREATE TABLE {table_q} ({})", col_defs.join(", ")),
            [],
        )?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for record in &records {
                let row: Vec<Value> = types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| ty.convert(record.get(i).map(String::as_str).unwrap_or("")))
                    .collect();
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        info!(
            rows = records.len(),
            replaced = exists,
            "ingested CSV into internal database"
        );
        Ok(IngestReport {
            table: options.table.clone(),
            columns,
            rows: records.len(),
            replaced: exists,
        })
    }

    /// Close the connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<()> {
        if let Some(conn) = self.conn.into_inner() {
            conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn infer<'a>(fields: impl Iterator<Item = &'a String>) -> Self {
        let mut ty = ColumnType::Integer;
        for field in fields {
            match Value::parse_field(field) {
                Value::Null | Value::Integer(_) => {}
                Value::Real(_) => ty = ColumnType::Real,
                Value::Text(_) => return ColumnType::Text,
            }
        }
        ty
    }

    fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    fn convert(self, raw: &str) -> Value {
        match (self, Value::parse_field(raw)) {
            (_, Value::Null) => Value::Null,
            (ColumnType::Text, _) => Value::Text(raw.to_string()),
            (ColumnType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (_, value) => value,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// [`Cursor`] over a rusqlite connection.
///
/// `execute` runs the statement to completion and buffers its rows.
pub struct SqliteCursor<'a> {
    conn: &'a Connection,
    timeout: Option<Duration>,
    rows: Vec<Row>,
}

impl<'a> SqliteCursor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            timeout: None,
            rows: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    fn run(&self, sql: &str) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let n = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut vals = Vec::with_capacity(n);
            for i in 0..n {
                vals.push(Value::from(row.get_ref(i)?));
            }
            out.push(vals);
        }
        Ok(out)
    }
}

impl Cursor for SqliteCursor<'_> {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        self.rows.clear();
        let started = Instant::now();
        if let Some(timeout) = self.timeout {
            let deadline = started + timeout;
            self.conn
                .progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= deadline));
        }
        let result = self.run(sql);
        if self.timeout.is_some() {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
        match result {
            Ok(rows) => {
                self.rows = rows;
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::OperationInterrupted && self.timeout.is_some() =>
            {
                Err(Box::new(QueryTimedOut {
                    elapsed: started.elapsed(),
                }))
            }
            Err(e) => Err(Box::new(e)),
        }
    }

    fn fetch_all(&mut self) -> std::result::Result<Vec<Row>, DriverError> {
        Ok(std::mem::take(&mut self.rows))
    }
}
