//! # crosstab
//!
//! A cross-tabulation engine that turns tabular data into pivot tables,
//! frequency tables and numeric samples using dialect-portable SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │   CSV file  |  cursor + engine + table  |  table name    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [db::source]
//! ┌─────────────────────────────────────────────────────────┐
//! │   ManagedCursor + EngineDescriptor + table name          │
//! └─────────────────────────────────────────────────────────┘
//!              │                               │
//!              ▼ [dims::expand]                ▼ [samples]
//! ┌──────────────────────────────┐  ┌──────────────────────┐
//! │  row / column HeaderPaths    │  │  Sample (label,      │
//! └──────────────────────────────┘  │  null-free values)   │
//!              │                    └──────────────────────┘
//!              ▼ [crosstab]
//! ┌──────────────────────────────┐
//! │  TableSpec (paths + cells)   │
//! └──────────────────────────────┘
//! ```
//!
//! Rendering and the statistical tests themselves live outside this crate.

pub mod config;
pub mod crosstab;
pub mod db;
pub mod dims;
pub mod error;
pub mod labels;
pub mod samples;
pub mod sql;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::crosstab::{Cell, CrossTab, Measure, Ratio, Strategy, TableSpec};
    pub use crate::db::{
        CancelToken, Cursor, InternalDb, Materialized, ManagedCursor, SourceArgs, Value,
    };
    pub use crate::dims::{Axis, DimSpec, HeaderPath, Metric, Sort};
    pub use crate::error::{Error, Result};
    pub use crate::labels::VarLabels;
    pub use crate::samples::{Sample, SampleExtractor};
    pub use crate::sql::{EngineDescriptor, EngineRegistry, ValFilterSpec, ValSpec};
}
