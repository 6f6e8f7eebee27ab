//! Cross-tab cell aggregation.
//!
//! Given the row and column header paths of a table, computes one aggregate
//! per (row, column) pair plus any percentage metrics requested by the paths'
//! leaf dimensions.
//!
//! # Denominators
//!
//! | metric      | denominator                                     |
//! |-------------|-------------------------------------------------|
//! | `RowPct`    | same row path, every column (row Total)         |
//! | `ColPct`    | same column path, every row (column Total)      |
//! | `TotalPct`  | whole (filtered) table (grand Total)            |
//!
//! A zero denominator yields [`Ratio::Undefined`], never a number.
//!
//! # Strategies
//!
//! [`Strategy::PerCell`] issues one aggregate query per cell.
//! [`Strategy::PerRow`] issues one query per row path with a conditional
//! aggregate per column. Both apply the same predicates to each cell, so
//! they produce identical tables. Denominators are memoised by query text in
//! both cases.

pub mod freq;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::cursor::ManagedCursor;
use crate::db::value::Value;
use crate::dims::expand::{expand, HeaderPath, TableValues};
use crate::dims::spec::{Axis, DimSpec, Metric};
use crate::error::Result;
use crate::labels::VarLabels;
use crate::sql::engine::EngineDescriptor;
use crate::sql::filter::{Predicate, WhereClause};

/// What each cell aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Number of rows.
    #[default]
    Count,
    /// Sum of a numeric field.
    Sum(String),
}

impl Measure {
    fn expr(&self, engine: &EngineDescriptor) -> String {
        match self {
            Measure::Count => "COUNT(*)".to_string(),
            Measure::Sum(field) => format!("SUM({})", engine.quote_identifier(field)),
        }
    }

    fn conditional_expr(&self, engine: &EngineDescriptor, cond: &str) -> String {
        match self {
            Measure::Count => engine.conditional_count(cond),
            Measure::Sum(field) => engine.conditional_sum(cond, &engine.quote_identifier(field)),
        }
    }
}

/// How cells are queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    PerCell,
    PerRow,
}

/// A percentage metric: a fraction, or undefined for a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator / denominator)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Ratio::Defined(_))
    }
}

/// One table cell: indices into [`TableSpec::row_paths`] and
/// [`TableSpec::col_paths`], the aggregate, and requested metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub value: f64,
    pub metrics: BTreeMap<Metric, Ratio>,
}

/// A fully aggregated table, handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    pub row_paths: Vec<HeaderPath>,
    pub col_paths: Vec<HeaderPath>,
    /// Row-major: `cells[row * col_paths.len() + col]`.
    pub cells: Vec<Cell>,
}

impl TableSpec {
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.row_paths.len() || col >= self.col_paths.len() {
            return None;
        }
        self.cells.get(row * self.col_paths.len() + col)
    }

    /// Cells of one row, in column order.
    pub fn row(&self, row: usize) -> &[Cell] {
        if row >= self.row_paths.len() {
            return &[];
        }
        let n = self.col_paths.len();
        self.cells.get(row * n..(row + 1) * n).unwrap_or(&[])
    }
}

/// Aggregation settings for one table.
#[derive(Debug, Clone)]
pub struct CrossTab<'a> {
    engine: &'a EngineDescriptor,
    table: &'a str,
    table_filter: Option<&'a str>,
    measure: Measure,
    strategy: Strategy,
}

impl<'a> CrossTab<'a> {
    pub fn new(engine: &'a EngineDescriptor, table: &'a str) -> Self {
        Self {
            engine,
            table,
            table_filter: None,
            measure: Measure::Count,
            strategy: Strategy::PerCell,
        }
    }

    /// Raw filter clause applied to every query, `WHERE` optional.
    pub fn with_table_filter(mut self, clause: Option<&'a str>) -> Self {
        self.table_filter = clause;
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Expand both axes from the table, then aggregate.
    ///
    /// No column dimensions yields a single column spanning the whole table.
    #[instrument(skip_all, fields(table = %self.table))]
    pub fn build(
        &self,
        cursor: &mut ManagedCursor<'_>,
        row_specs: &[DimSpec],
        col_specs: &[DimSpec],
        labels: &VarLabels,
    ) -> Result<TableSpec> {
        let (row_paths, col_paths) = {
            let mut source = TableValues::new(cursor, self.engine, self.table)
                .with_table_filter(self.table_filter);
            let rows = expand(row_specs, Axis::Row, &mut source, labels)?;
            let cols = if col_specs.is_empty() {
                vec![HeaderPath::default()]
            } else {
                expand(col_specs, Axis::Col, &mut source, labels)?
            };
            (rows, cols)
        };
        self.aggregate(cursor, row_paths, col_paths)
    }

    /// Aggregate every (row path, column path) pair.
    ///
    /// Any failing query aborts the whole table.
    #[instrument(skip_all, fields(
        table = %self.table,
        rows = row_paths.len(),
        cols = col_paths.len(),
        strategy = ?self.strategy,
    ))]
    pub fn aggregate(
        &self,
        cursor: &mut ManagedCursor<'_>,
        row_paths: Vec<HeaderPath>,
        col_paths: Vec<HeaderPath>,
    ) -> Result<TableSpec> {
        let mut agg = Aggregator {
            crosstab: self,
            cursor,
            memo: HashMap::new(),
        };
        let col_preds: Vec<Vec<Predicate>> = col_paths.iter().map(HeaderPath::predicates).collect();
        let mut cells = Vec::with_capacity(row_paths.len() * col_paths.len());

        for (r, row_path) in row_paths.iter().enumerate() {
            let row_preds = row_path.predicates();
            let values = match self.strategy {
                Strategy::PerCell => col_preds
                    .iter()
                    .map(|cp| agg.total(&concat(&row_preds, cp)))
                    .collect::<Result<Vec<f64>>>()?,
                Strategy::PerRow => agg.row_totals(&row_preds, &col_preds)?,
            };

            for (c, (col_path, value)) in col_paths.iter().zip(values).enumerate() {
                let mut metrics = BTreeMap::new();
                for metric in row_path.metrics.iter().chain(&col_path.metrics) {
                    if metrics.contains_key(metric) {
                        continue;
                    }
                    let denominator = match metric {
                        Metric::RowPct => agg.total(&row_preds)?,
                        Metric::ColPct => agg.total(&col_preds[c])?,
                        Metric::TotalPct => agg.total(&[])?,
                    };
                    metrics.insert(*metric, Ratio::of(value, denominator));
                }
                cells.push(Cell {
                    row: r,
                    col: c,
                    value,
                    metrics,
                });
            }
        }

        debug!(cells = cells.len(), queries = agg.memo.len(), "aggregated table");
        Ok(TableSpec {
            row_paths,
            col_paths,
            cells,
        })
    }

    /// Aggregate over the rows matching `predicates`.
    pub fn aggregate_sql(&self, predicates: &[Predicate]) -> String {
        format!(
            "SELECT {} FROM {}{}",
            self.measure.expr(self.engine),
            self.engine.quote_identifier(self.table),
            self.where_clause(predicates).to_sql()
        )
    }

    /// One conditional aggregate per column, over the rows of one row path.
    pub fn row_sql(&self, row_preds: &[Predicate], col_preds: &[Vec<Predicate>]) -> String {
        let exprs: Vec<String> = col_preds
            .iter()
            .map(|preds| {
                let cond = WhereClause::new().and_all(preds, self.engine).condition();
                self.measure.conditional_expr(self.engine, &cond)
            })
            .collect();
        format!(
            "SELECT {} FROM {}{}",
            exprs.join(", "),
            self.engine.quote_identifier(self.table),
            self.where_clause(row_preds).to_sql()
        )
    }

    fn where_clause(&self, predicates: &[Predicate]) -> WhereClause {
        WhereClause::new()
            .and_all(predicates, self.engine)
            .and_table_filter(self.table_filter)
    }
}

fn concat(a: &[Predicate], b: &[Predicate]) -> Vec<Predicate> {
    a.iter().chain(b).cloned().collect()
}

struct Aggregator<'x, 'c> {
    crosstab: &'x CrossTab<'x>,
    cursor: &'x mut ManagedCursor<'c>,
    memo: HashMap<String, f64>,
}

impl Aggregator<'_, '_> {
    /// Memoised aggregate over the rows matching `predicates`. NULL is 0.
    fn total(&mut self, predicates: &[Predicate]) -> Result<f64> {
        let sql = self.crosstab.aggregate_sql(predicates);
        if let Some(value) = self.memo.get(&sql) {
            return Ok(*value);
        }
        let value = self.cursor.query_f64(&sql)?.unwrap_or(0.0);
        self.memo.insert(sql, value);
        Ok(value)
    }

    fn row_totals(&mut self, row_preds: &[Predicate], col_preds: &[Vec<Predicate>]) -> Result<Vec<f64>> {
        if col_preds.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.crosstab.row_sql(row_preds, col_preds);
        let rows = self.cursor.query(&sql)?;
        let row = rows.into_iter().next().unwrap_or_default();
        Ok((0..col_preds.len())
            .map(|i| row.get(i).and_then(Value::as_f64).unwrap_or(0.0))
            .collect())
    }
}
