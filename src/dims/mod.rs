//! Dimension trees and their expansion into header paths.

pub mod expand;
pub mod spec;

pub use expand::{
    expand, Discovered, HeaderEntry, HeaderPath, TableValues, ValueSource, TOTAL_LABEL,
};
pub use spec::{Axis, DimSpec, Metric, Sort};
