//! SQL generation building blocks.
//!
//! - [`engine`] - engine descriptors and the registry resolving them
//! - [`helpers`] - quoting and template filling shared by descriptors
//! - [`filter`] - value filters, predicates and WHERE clause rendering

pub mod engine;
pub mod filter;
pub mod helpers;


pub use engine::{EngineDescriptor, EngineRegistry};
pub use filter::{Predicate, ValFilterSpec, ValSpec, WhereClause};
