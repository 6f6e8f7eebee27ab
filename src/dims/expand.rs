//! Dimension tree expansion.
//!
//! Turns a list of [`DimSpec`] trees for one axis into the ordered list of
//! [`HeaderPath`]s identifying that axis's rows (or columns):
//!
//! ```text
//! country(total) -> gender            [1, F]  [1, M]
//!                                     [2, F]  [2, M]
//!                                     [Total, F]  [Total, M]
//! ```
//!
//! Each level obtains its values (explicit, or discovered from the table
//! under the filters accumulated so far), orders them by the level's sort
//! rule, appends Total last when requested, and expands its child beneath
//! every value. Children of a Total entry are expanded over the union of the
//! Total's sibling values. Every path has exactly one entry per level.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, instrument};

use super::spec::{validate_axis, Axis, DimSpec, Metric, Sort};
use crate::db::cursor::ManagedCursor;
use crate::db::value::Value;
use crate::error::Result;
use crate::labels::VarLabels;
use crate::sql::engine::EngineDescriptor;
use crate::sql::filter::{Predicate, WhereClause};

/// Label shown for Total entries.
pub const TOTAL_LABEL: &str = "Total";

/// One level of a header path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderEntry {
    pub var: String,
    pub var_lbl: String,
    /// Stored value; NULL for Total entries.
    pub value: Value,
    pub label: String,
    pub is_total: bool,
}

impl HeaderEntry {
    /// Filter selecting this entry's rows. Total entries select everything.
    pub fn predicate(&self) -> Option<Predicate> {
        (!self.is_total).then(|| Predicate::eq(self.var.clone(), self.value.clone()))
    }
}

/// One concrete row or column of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaderPath {
    pub entries: Vec<HeaderEntry>,
    /// Percentage metrics requested by the path's leaf level.
    pub metrics: BTreeSet<Metric>,
}

impl HeaderPath {
    /// Filters selecting this path's rows.
    pub fn predicates(&self) -> Vec<Predicate> {
        self.entries.iter().filter_map(HeaderEntry::predicate).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any level of the path is a Total entry.
    pub fn has_total(&self) -> bool {
        self.entries.iter().any(|e| e.is_total)
    }
}

/// A value found in the table together with how many rows hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered {
    pub value: Value,
    pub freq: u64,
}

impl Discovered {
    pub fn new(value: impl Into<Value>, freq: u64) -> Self {
        Self {
            value: value.into(),
            freq,
        }
    }
}

/// Supplies the distinct non-null values of a variable under some filters.
pub trait ValueSource {
    fn discover(&mut self, var: &str, filters: &[Predicate]) -> Result<Vec<Discovered>>;
}

impl<F> ValueSource for F
where
    F: FnMut(&str, &[Predicate]) -> Result<Vec<Discovered>>,
{
    fn discover(&mut self, var: &str, filters: &[Predicate]) -> Result<Vec<Discovered>> {
        self(var, filters)
    }
}

/// Discovers values by querying a table.
pub struct TableValues<'a, 'c> {
    cursor: &'a mut ManagedCursor<'c>,
    engine: &'a EngineDescriptor,
    table: &'a str,
    table_filter: Option<&'a str>,
}

impl<'a, 'c> TableValues<'a, 'c> {
    pub fn new(
        cursor: &'a mut ManagedCursor<'c>,
        engine: &'a EngineDescriptor,
        table: &'a str,
    ) -> Self {
        Self {
            cursor,
            engine,
            table,
            table_filter: None,
        }
    }

    /// Restrict discovery with a raw table filter clause.
    pub fn with_table_filter(mut self, clause: Option<&'a str>) -> Self {
        self.table_filter = clause;
        self
    }

    /// The query discovering `var`'s values and frequencies.
    pub fn discovery_sql(&self, var: &str, filters: &[Predicate]) -> String {
        let var_q = self.engine.quote_identifier(var);
        let where_clause = WhereClause::new()
            .and(&Predicate::not_null(var), self.engine)
            .and_all(filters, self.engine)
            .and_table_filter(self.table_filter);
        format!(
            "SELECT {var_q}, COUNT(*) FROM {}{} GROUP BY {var_q}",
            self.engine.quote_identifier(self.table),
            where_clause.to_sql()
        )
    }
}

impl ValueSource for TableValues<'_, '_> {
    fn discover(&mut self, var: &str, filters: &[Predicate]) -> Result<Vec<Discovered>> {
        let sql = self.discovery_sql(var, filters);
        let rows = self.cursor.query(&sql)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut cols = row.into_iter();
                let value = cols.next()?;
                let freq = cols.next().and_then(|f| f.as_f64()).unwrap_or(0.0);
                (!value.is_null()).then(|| Discovered::new(value, freq as u64))
            })
            .collect())
    }
}

/// Expand sibling trees for one axis into ordered header paths.
///
/// The paths of each tree follow those of the tree before it.
#[instrument(skip_all, fields(axis = ?axis, trees = specs.len()))]
pub fn expand(
    specs: &[DimSpec],
    axis: Axis,
    source: &mut impl ValueSource,
    labels: &VarLabels,
) -> Result<Vec<HeaderPath>> {
    validate_axis(specs, axis)?;
    let mut paths = Vec::new();
    for spec in specs {
        let metrics = spec.leaf().pct_metrics.clone();
        for entries in expand_level(spec, &[], source, labels)? {
            paths.push(HeaderPath {
                entries,
                metrics: metrics.clone(),
            });
        }
    }
    debug!(paths = paths.len(), "expanded axis");
    Ok(paths)
}

struct Candidate {
    value: Value,
    label: String,
    freq: u64,
}

fn expand_level(
    spec: &DimSpec,
    filters: &[Predicate],
    source: &mut impl ValueSource,
    labels: &VarLabels,
) -> Result<Vec<Vec<HeaderEntry>>> {
    let mut candidates = candidates(spec, filters, source, labels)?;
    sort_candidates(&mut candidates, spec.sort);
    debug!(
        var = %spec.var,
        values = candidates.len(),
        total = spec.has_total,
        "expanding dimension level"
    );

    let var_lbl = labels.var_label(&spec.var).to_string();
    let mut out = Vec::new();
    for cand in &candidates {
        let entry = HeaderEntry {
            var: spec.var.clone(),
            var_lbl: var_lbl.clone(),
            value: cand.value.clone(),
            label: cand.label.clone(),
            is_total: false,
        };
        let narrowed = with_filter(filters, Predicate::eq(spec.var.clone(), cand.value.clone()));
        push_with_children(&mut out, entry, spec, &narrowed, source, labels)?;
    }

    if spec.has_total {
        let entry = HeaderEntry {
            var: spec.var.clone(),
            var_lbl,
            value: Value::Null,
            label: TOTAL_LABEL.to_string(),
            is_total: true,
        };
        let siblings: Vec<Value> = candidates.into_iter().map(|c| c.value).collect();
        let before = out.len();
        if !siblings.is_empty() {
            let union = Predicate::In {
                var: spec.var.clone(),
                values: siblings,
            };
            let narrowed = with_filter(filters, union);
            push_with_children(&mut out, entry.clone(), spec, &narrowed, source, labels)?;
        }
        // A union matching no rows leaves the Total spanning the whole level.
        if out.len() == before {
            push_with_children(&mut out, entry, spec, filters, source, labels)?;
        }
    }
    Ok(out)
}

fn push_with_children(
    out: &mut Vec<Vec<HeaderEntry>>,
    entry: HeaderEntry,
    spec: &DimSpec,
    filters: &[Predicate],
    source: &mut impl ValueSource,
    labels: &VarLabels,
) -> Result<()> {
    match &spec.child {
        None => out.push(vec![entry]),
        Some(child) => {
            for tail in expand_level(child, filters, source, labels)? {
                let mut path = Vec::with_capacity(tail.len() + 1);
                path.push(entry.clone());
                path.extend(tail);
                out.push(path);
            }
        }
    }
    Ok(())
}

fn with_filter(filters: &[Predicate], extra: Predicate) -> Vec<Predicate> {
    let mut narrowed = filters.to_vec();
    narrowed.push(extra);
    narrowed
}

fn candidates(
    spec: &DimSpec,
    filters: &[Predicate],
    source: &mut impl ValueSource,
    labels: &VarLabels,
) -> Result<Vec<Candidate>> {
    let make = |value: Value, freq: u64| Candidate {
        label: labels.val_label(&spec.var, &value),
        value,
        freq,
    };
    match &spec.values {
        None => Ok(source
            .discover(&spec.var, filters)?
            .into_iter()
            .filter(|d| !d.value.is_null())
            .map(|d| make(d.value, d.freq))
            .collect()),
        Some(values) => {
            // Frequencies only matter when sorting by them.
            let freqs: HashMap<String, u64> = if spec.sort == Sort::Frequency {
                source
                    .discover(&spec.var, filters)?
                    .into_iter()
                    .map(|d| (d.value.to_string(), d.freq))
                    .collect()
            } else {
                HashMap::new()
            };
            let mut seen = BTreeSet::new();
            Ok(values
                .iter()
                .filter(|v| !v.is_null() && seen.insert(v.to_string()))
                .map(|v| make(v.clone(), freqs.get(&v.to_string()).copied().unwrap_or(0)))
                .collect())
        }
    }
}

fn sort_candidates(candidates: &mut [Candidate], sort: Sort) {
    let by_value = |a: &Candidate, b: &Candidate| a.value.total_cmp(&b.value);
    match sort {
        Sort::Value => candidates.sort_by(by_value),
        Sort::Label => {
            candidates.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| by_value(a, b)))
        }
        Sort::Frequency => candidates.sort_by(|a, b| match b.freq.cmp(&a.freq) {
            Ordering::Equal => by_value(a, b),
            other => other,
        }),
    }
}
