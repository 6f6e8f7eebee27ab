//! Managed cursor.
//!
//! Every query the engine issues goes through [`ManagedCursor`], so every
//! failure carries the exact SQL text that failed. The cursor depends only on
//! the narrow [`Cursor`] interface (execute + fetch); anything else a driver
//! offers must be obtained from the driver directly.

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::value::{Row, Value};
use crate::error::{Error, Result};

/// Error type returned by cursor drivers.
pub type DriverError = Box<dyn StdError + Send + Sync + 'static>;

/// The narrow interface the engine needs from a database cursor.
pub trait Cursor {
    /// Run one SQL statement.
    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError>;

    /// All rows produced by the last executed statement.
    fn fetch_all(&mut self) -> std::result::Result<Vec<Row>, DriverError>;
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        (**self).execute(sql)
    }

    fn fetch_all(&mut self) -> std::result::Result<Vec<Row>, DriverError> {
        (**self).fetch_all()
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        (**self).execute(sql)
    }

    fn fetch_all(&mut self) -> std::result::Result<Vec<Row>, DriverError> {
        (**self).fetch_all()
    }
}

/// Driver error signalling that a per-query timeout interrupted the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimedOut {
    pub elapsed: Duration,
}

impl fmt::Display for QueryTimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query interrupted after {:?}", self.elapsed)
    }
}

impl StdError for QueryTimedOut {}

/// Shared flag for cancelling an in-flight request.
///
/// Clones observe the same flag; once cancelled, every subsequent query
/// through a cursor holding the token fails with [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A cursor wrapper that annotates every failure with its SQL.
pub struct ManagedCursor<'c> {
    inner: Box<dyn Cursor + 'c>,
    cancel: Option<CancelToken>,
    last_sql: String,
}

impl<'c> ManagedCursor<'c> {
    pub fn new(cursor: impl Cursor + 'c) -> Self {
        Self {
            inner: Box::new(cursor),
            cancel: None,
            last_sql: String::new(),
        }
    }

    /// Attach a cancellation token checked before every query.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn set_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Execute `sql`, attaching the SQL text to any failure.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled {
                sql: sql.to_string(),
            });
        }
        debug!(sql = %sql, "executing query");
        self.last_sql.clear();
        self.last_sql.push_str(sql);
        self.inner
            .execute(sql)
            .map_err(|source| annotate(sql, source))
    }

    /// Rows of the last executed statement.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let sql = &self.last_sql;
        self.inner
            .fetch_all()
            .map_err(|source| annotate(sql, source))
    }

    /// Execute and fetch in one step.
    pub fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.execute(sql)?;
        self.fetch_all()
    }

    /// First column of the first row, as a number. NULL or no rows is `None`.
    pub fn query_f64(&mut self, sql: &str) -> Result<Option<f64>> {
        let rows = self.query(sql)?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_f64))
    }
}

impl fmt::Debug for ManagedCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedCursor")
            .field("cancel", &self.cancel)
            .field("last_sql", &self.last_sql)
            .finish_non_exhaustive()
    }
}

fn annotate(sql: &str, source: DriverError) -> Error {
    match source.downcast::<QueryTimedOut>() {
        Ok(timeout) => Error::QueryTimeout {
            sql: sql.to_string(),
            elapsed: timeout.elapsed,
        },
        Err(source) => Error::Query {
            sql: sql.to_string(),
            source,
        },
    }
}
