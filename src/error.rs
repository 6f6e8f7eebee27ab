//! Unified error type for the crosstab engine.
//!
//! Mirrors the failure taxonomy of the engine:
//!
//! - configuration errors (unknown engine, bad descriptor, contradictory
//!   source arguments, invalid dimension trees)
//! - ingestion conflicts (table already exists without overwrite)
//! - query errors, always carrying the SQL that failed
//!
//! Degenerate data (zero denominators, too few groups) is not an error at
//! this layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::SettingsError;
use crate::db::cursor::DriverError;

/// Result type for crosstab operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("No database engine name supplied")]
    MissingEngineName,

    #[error(
        "Unknown database engine '{engine}': not among the built-in engines [{builtins}] \
         and no descriptor file found at {}",
        display_paths(searched)
    )]
    UnknownEngine {
        engine: String,
        builtins: String,
        searched: Vec<PathBuf>,
    },

    #[error("Invalid database engine name '{0}': must not contain path separators or '..'")]
    InvalidEngineName(String),

    #[error("Engine descriptor {} is missing required key '{key}'", path.display())]
    MissingDescriptorField { path: PathBuf, key: String },

    #[error("Invalid engine descriptor {}: {reason}", path.display())]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid dimension spec: {0}")]
    InvalidDimSpec(String),

    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    // =========================================================================
    // Ingestion
    // =========================================================================
    #[error("Table '{table}' already exists in the internal database (overwrite not permitted)")]
    TableExists { table: String },

    #[error("Failed to read CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("CSV {} has no header row", path.display())]
    EmptyCsv { path: PathBuf },

    // =========================================================================
    // Queries
    // =========================================================================
    #[error("Error: {source}\n\nOriginal SQL:\n{sql}")]
    Query {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("Query timed out after {elapsed:?}\n\nOriginal SQL:\n{sql}")]
    QueryTimeout { sql: String, elapsed: Duration },

    #[error("Request cancelled before running:\n{sql}")]
    Cancelled { sql: String },

    #[error("Field '{field}' holds non-numeric value '{value}'")]
    NonNumeric { field: String, value: String },

    // =========================================================================
    // Plumbing
    // =========================================================================
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The SQL text attached to a query failure, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query { sql, .. }
            | Error::QueryTimeout { sql, .. }
            | Error::Cancelled { sql } => Some(sql),
            _ => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}
