//! Dimension specifications.
//!
//! A [`DimSpec`] describes one level of a row or column header tree: the
//! variable, whether a Total entry follows its values, how its values are
//! ordered, and at most one nested child level on the same axis. The tree
//! owns its child directly, so it is acyclic by construction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::db::value::Value;
use crate::error::{Error, Result};

/// Which side of the table a dimension sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Row,
    Col,
}

/// Ordering of a level's values. Total entries always come last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    /// Underlying stored value.
    #[default]
    Value,
    /// Display label, ties broken by value.
    Label,
    /// Observed frequency, most frequent first, ties broken by value.
    Frequency,
}

/// Percentage metrics a leaf dimension can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RowPct,
    ColPct,
    TotalPct,
}

/// One level of a header tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimSpec {
    pub var: String,
    pub axis: Axis,
    #[serde(default)]
    pub has_total: bool,
    #[serde(default)]
    pub sort: Sort,
    /// Metrics computed for cells under this level; leaf levels only.
    #[serde(default)]
    pub pct_metrics: BTreeSet<Metric>,
    /// Values known ahead of time. When absent, values are discovered from
    /// the table.
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub child: Option<Box<DimSpec>>,
}

impl DimSpec {
    pub fn new(var: impl Into<String>, axis: Axis) -> Self {
        Self {
            var: var.into(),
            axis,
            has_total: false,
            sort: Sort::default(),
            pct_metrics: BTreeSet::new(),
            values: None,
            child: None,
        }
    }

    pub fn row(var: impl Into<String>) -> Self {
        Self::new(var, Axis::Row)
    }

    pub fn col(var: impl Into<String>) -> Self {
        Self::new(var, Axis::Col)
    }

    pub fn with_total(mut self) -> Self {
        self.has_total = true;
        self
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.pct_metrics.insert(metric);
        self
    }

    /// Use these values instead of discovering them.
    pub fn with_values(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.values = Some(values.into_iter().collect());
        self
    }

    /// Nest `child` beneath every value of this level.
    pub fn with_child(mut self, child: DimSpec) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    /// Number of levels in this chain.
    pub fn depth(&self) -> usize {
        1 + self.child.as_ref().map_or(0, |c| c.depth())
    }

    /// The terminal level of this chain.
    pub fn leaf(&self) -> &DimSpec {
        match &self.child {
            Some(child) => child.leaf(),
            None => self,
        }
    }

    /// Levels from the root down.
    pub fn levels(&self) -> impl Iterator<Item = &DimSpec> {
        std::iter::successors(Some(self), |spec| spec.child.as_deref())
    }

    /// Reject trees mixing axes, or requesting metrics above the leaf.
    pub fn validate(&self) -> Result<()> {
        for level in self.levels() {
            if level.var.trim().is_empty() {
                return Err(Error::InvalidDimSpec(
                    "dimension variable name is empty".to_string(),
                ));
            }
            if let Some(child) = &level.child {
                if child.axis != level.axis {
                    return Err(Error::InvalidDimSpec(format!(
                        "'{}' is nested under '{}' but sits on a different axis",
                        child.var, level.var
                    )));
                }
                if !level.pct_metrics.is_empty() {
                    return Err(Error::InvalidDimSpec(format!(
                        "percentage metrics requested on '{}', which is not a leaf dimension",
                        level.var
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Validate a list of sibling trees that must all sit on `axis`.
pub fn validate_axis(specs: &[DimSpec], axis: Axis) -> Result<()> {
    for spec in specs {
        if spec.axis != axis {
            return Err(Error::InvalidDimSpec(format!(
                "'{}' is a {:?} dimension but was supplied as a {:?} dimension",
                spec.var, spec.axis, axis
            )));
        }
        spec.validate()?;
    }
    Ok(())
}
