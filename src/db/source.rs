//! Source materialization.
//!
//! A report can be fed from three kinds of source, and all of them end up as
//! the same triple: a [`ManagedCursor`], the [`EngineDescriptor`] of the
//! database behind it, and a table name.
//!
//! | supplied                          | result                                   |
//! |-----------------------------------|------------------------------------------|
//! | CSV path (+ optional table name)  | CSV ingested into the internal database  |
//! | cursor + engine name + table name | the caller's cursor, resolved engine     |
//! | bare table name                   | table in the internal database           |
//!
//! Anything else is a configuration error.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use super::cursor::{Cursor, ManagedCursor};
use super::sqlite::{CsvOptions, IngestReport, InternalDb};
use crate::error::{Error, Result};
use crate::sql::engine::{EngineDescriptor, EngineRegistry, SQLITE};

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Table name derived from arbitrary text (usually a file stem).
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`; a leading digit gets
/// a `_` prefix.
pub fn safer_name(raw: &str) -> String {
    let name = UNSAFE_NAME_CHARS.replace_all(raw, "_").into_owned();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{name}")
    } else {
        name
    }
}

/// Arguments describing where a table comes from.
///
/// Build one with [`SourceArgs::csv`], [`SourceArgs::cursor`] or
/// [`SourceArgs::table`]; the setters exist so contradictory combinations
/// can be expressed and rejected by [`SourceArgs::materialize`].
pub struct SourceArgs<'c> {
    csv_path: Option<PathBuf>,
    delimiter: u8,
    overwrite: bool,
    cursor: Option<Box<dyn Cursor + 'c>>,
    engine: Option<String>,
    table: Option<String>,
}

impl Default for SourceArgs<'_> {
    fn default() -> Self {
        Self {
            csv_path: None,
            delimiter: b',',
            overwrite: false,
            cursor: None,
            engine: None,
            table: None,
        }
    }
}

impl<'c> SourceArgs<'c> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A CSV file to ingest into the internal database.
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::new().with_csv_path(path)
    }

    /// A table reached through the caller's own cursor.
    pub fn cursor(
        cursor: impl Cursor + 'c,
        engine: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_cursor(cursor)
            .with_engine(engine)
            .with_table(table)
    }

    /// A table already present in the internal database.
    pub fn table(table: impl Into<String>) -> Self {
        Self::new().with_table(table)
    }

    pub fn with_csv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.csv_path = Some(path.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Replace an existing internal table instead of failing.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_cursor(mut self, cursor: impl Cursor + 'c) -> Self {
        self.cursor = Some(Box::new(cursor));
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Normalize the arguments into a queryable table.
    #[instrument(skip_all, fields(
        csv = ?self.csv_path,
        engine = ?self.engine,
        table = ?self.table,
    ))]
    pub fn materialize(
        self,
        db: &'c InternalDb,
        registry: &EngineRegistry,
    ) -> Result<Materialized<'c>> {
        let SourceArgs {
            csv_path,
            delimiter,
            overwrite,
            cursor,
            engine,
            table,
        } = self;

        if let Some(path) = csv_path {
            if cursor.is_some() || engine.is_some() {
                return Err(Error::InvalidSource(
                    "a CSV path cannot be combined with a cursor or engine name".to_string(),
                ));
            }
            let table = match table {
                Some(table) => non_empty_table(table)?,
                None => table_name_for(&path)?,
            };
            let options = CsvOptions {
                table,
                delimiter,
                overwrite,
            };
            let report = db.ingest_csv(&path, &options)?;
            let table = report.table.clone();
            return Materialized::internal(db, registry, table, Some(report));
        }

        match (cursor, engine, table) {
            (Some(cursor), Some(engine), Some(table)) => {
                let engine = registry.resolve(&engine)?;
                let table = non_empty_table(table)?;
                debug!(engine = %engine.name, table = %table, "using caller cursor");
                Ok(Materialized {
                    cursor: ManagedCursor::new(cursor),
                    engine,
                    table,
                    ingested: None,
                })
            }
            (Some(_), _, _) => Err(Error::InvalidSource(
                "a cursor requires both an engine name and a table name".to_string(),
            )),
            (None, Some(engine), Some(table)) if engine == SQLITE => {
                Materialized::internal(db, registry, non_empty_table(table)?, None)
            }
            (None, Some(engine), _) => Err(Error::InvalidSource(format!(
                "engine '{engine}' given without a cursor; only the internal \
                 {SQLITE} database can be used without one"
            ))),
            (None, None, Some(table)) => {
                Materialized::internal(db, registry, non_empty_table(table)?, None)
            }
            (None, None, None) => Err(Error::InvalidSource(
                "supply a CSV path, a cursor with engine and table names, or a table name"
                    .to_string(),
            )),
        }
    }
}

fn non_empty_table(table: String) -> Result<String> {
    if table.trim().is_empty() {
        return Err(Error::InvalidSource("table name is empty".to_string()));
    }
    Ok(table)
}

fn table_name_for(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        return Err(Error::InvalidSource(format!(
            "cannot derive a table name from {}",
            path.display()
        )));
    }
    Ok(safer_name(&stem))
}

/// A table ready to be queried.
#[derive(Debug)]
pub struct Materialized<'c> {
    pub cursor: ManagedCursor<'c>,
    pub engine: EngineDescriptor,
    pub table: String,
    /// Set when the source was a CSV file ingested on the way.
    pub ingested: Option<IngestReport>,
}

impl<'c> Materialized<'c> {
    fn internal(
        db: &'c InternalDb,
        registry: &EngineRegistry,
        table: String,
        ingested: Option<IngestReport>,
    ) -> Result<Self> {
        Ok(Self {
            cursor: ManagedCursor::new(db.cursor()?),
            engine: registry.resolve(SQLITE)?,
            table,
            ingested,
        })
    }
}
