//! Filter predicates and WHERE clause rendering.
//!
//! Every generated query restricts rows the same way: equality (or
//! membership) predicates on dimension values, `IS NOT NULL` guards on
//! measures, and an optional user-supplied table filter clause. Values are
//! embedded as literals using the engine's quoting rules: numbers unquoted,
//! text quoted and escaped.

use serde::{Deserialize, Serialize};

use super::engine::EngineDescriptor;
use super::helpers;
use crate::db::value::Value;

/// A stored value paired with its display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValSpec {
    pub val: Value,
    pub lbl: String,
}

impl ValSpec {
    pub fn new(val: impl Into<Value>, lbl: impl Into<String>) -> Self {
        Self {
            val: val.into(),
            lbl: lbl.into(),
        }
    }
}

/// Restricts a table to one value of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValFilterSpec {
    pub variable_name: String,
    pub val_spec: ValSpec,
    /// Embed the value unquoted (numeric) rather than as a quoted string.
    pub val_is_numeric: bool,
}

impl ValFilterSpec {
    /// Filter whose quoting follows the value's own type.
    pub fn new(variable_name: impl Into<String>, val_spec: ValSpec) -> Self {
        let val_is_numeric = val_spec.val.is_numeric();
        Self {
            variable_name: variable_name.into(),
            val_spec,
            val_is_numeric,
        }
    }

    /// Override the quoting decision.
    pub fn numeric(mut self, val_is_numeric: bool) -> Self {
        self.val_is_numeric = val_is_numeric;
        self
    }

    pub fn predicate(&self) -> Predicate {
        Predicate::Eq {
            var: self.variable_name.clone(),
            value: self.val_spec.val.clone(),
            numeric: self.val_is_numeric,
        }
    }

    pub fn to_sql(&self, engine: &EngineDescriptor) -> String {
        self.predicate().to_sql(engine)
    }
}

/// Render a value as a SQL literal.
pub fn literal(value: &Value, numeric: bool, engine: &EngineDescriptor) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        v if numeric => v.to_string(),
        v => engine.quote_string(&v.to_string()),
    }
}

/// A single row restriction.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `var = value` (`var IS NULL` for a NULL value)
    Eq {
        var: String,
        value: Value,
        numeric: bool,
    },
    /// `var <> value`, spelled per engine
    NotEq {
        var: String,
        value: Value,
        numeric: bool,
    },
    /// `var IN (values...)`; an empty set matches nothing.
    In { var: String, values: Vec<Value> },
    /// `var IS NOT NULL`
    NotNull(String),
    /// Raw SQL condition, embedded parenthesised.
    Raw(String),
}

impl Predicate {
    /// Equality on a value, quoted according to its type.
    pub fn eq(var: impl Into<String>, value: Value) -> Self {
        let numeric = value.is_numeric();
        Predicate::Eq {
            var: var.into(),
            value,
            numeric,
        }
    }

    pub fn not_eq(var: impl Into<String>, value: Value) -> Self {
        let numeric = value.is_numeric();
        Predicate::NotEq {
            var: var.into(),
            value,
            numeric,
        }
    }

    pub fn not_null(var: impl Into<String>) -> Self {
        Predicate::NotNull(var.into())
    }

    pub fn to_sql(&self, engine: &EngineDescriptor) -> String {
        match self {
            Predicate::Eq { var, value, .. } if value.is_null() => {
                format!("{} IS NULL", engine.quote_identifier(var))
            }
            Predicate::Eq {
                var,
                value,
                numeric,
            } => format!(
                "{} = {}",
                engine.quote_identifier(var),
                literal(value, *numeric, engine)
            ),
            Predicate::NotEq { var, value, .. } if value.is_null() => {
                format!("{} IS NOT NULL", engine.quote_identifier(var))
            }
            Predicate::NotEq {
                var,
                value,
                numeric,
            } => engine.not_equals(
                &engine.quote_identifier(var),
                &literal(value, *numeric, engine),
            ),
            Predicate::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Predicate::In { var, values } => {
                let items: Vec<String> = values
                    .iter()
                    .map(|v| literal(v, v.is_numeric(), engine))
                    .collect();
                format!("{} IN ({})", engine.quote_identifier(var), items.join(", "))
            }
            Predicate::NotNull(var) => format!("{} IS NOT NULL", engine.quote_identifier(var)),
            Predicate::Raw(sql) => format!("({sql})"),
        }
    }
}

/// Conjunction of predicates plus an optional table filter clause.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: &Predicate, engine: &EngineDescriptor) -> Self {
        self.conditions.push(predicate.to_sql(engine));
        self
    }

    pub fn and_all<'p>(
        mut self,
        predicates: impl IntoIterator<Item = &'p Predicate>,
        engine: &EngineDescriptor,
    ) -> Self {
        self.conditions
            .extend(predicates.into_iter().map(|p| p.to_sql(engine)));
        self
    }

    /// Add a user-supplied filter clause, with or without a leading `WHERE`.
    pub fn and_table_filter(mut self, clause: Option<&str>) -> Self {
        if let Some(body) = clause.and_then(helpers::strip_where) {
            self.conditions.push(format!("({body})"));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The conditions joined with `AND`, without the `WHERE` keyword.
    /// Empty clauses render as an always-true condition.
    pub fn condition(&self) -> String {
        if self.conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    /// ` WHERE ...`, or nothing for an empty clause.
    pub fn to_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}
