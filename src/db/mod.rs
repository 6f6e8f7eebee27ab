//! Database access: values, the managed cursor, the internal SQLite
//! database and source materialization.

pub mod cursor;
pub mod source;
pub mod sqlite;
pub mod value;

pub use cursor::{CancelToken, Cursor, DriverError, ManagedCursor};
pub use source::{safer_name, Materialized, SourceArgs};
pub use sqlite::{CsvOptions, DbPath, IngestReport, InternalDb, SqliteCursor};
pub use value::{Row, Value};
