//! Sample extraction for statistical tests.
//!
//! Every sample is a plain vector of numbers with its label. Rows whose
//! measure is NULL are excluded in SQL (`IS NOT NULL`), never skipped later,
//! and paired samples drop a row from both sides when either field is NULL.
//! Whether there are enough groups or values for a given test is the
//! caller's concern.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::db::cursor::ManagedCursor;
use crate::db::value::Value;
use crate::error::{Error, Result};
use crate::labels::VarLabels;
use crate::sql::engine::EngineDescriptor;
use crate::sql::filter::{Predicate, ValFilterSpec, ValSpec, WhereClause};

/// A labelled, null-free vector of measurements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub lbl: String,
    pub vals: Vec<f64>,
}

impl Sample {
    pub fn new(lbl: impl Into<String>, vals: Vec<f64>) -> Self {
        Self {
            lbl: lbl.into(),
            vals,
        }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }
}

/// Pulls samples out of one table.
#[derive(Debug, Clone)]
pub struct SampleExtractor<'a> {
    engine: &'a EngineDescriptor,
    table: &'a str,
    table_filter: Option<&'a str>,
}

impl<'a> SampleExtractor<'a> {
    pub fn new(engine: &'a EngineDescriptor, table: &'a str) -> Self {
        Self {
            engine,
            table,
            table_filter: None,
        }
    }

    /// Raw filter clause applied to every query, `WHERE` optional.
    pub fn with_table_filter(mut self, clause: Option<&'a str>) -> Self {
        self.table_filter = clause;
        self
    }

    /// Non-null values of `measure`, optionally restricted to one group.
    ///
    /// Labelled with the group's label, or the measure name when unfiltered.
    #[instrument(skip_all, fields(table = %self.table, measure = %measure))]
    pub fn sample(
        &self,
        cursor: &mut ManagedCursor<'_>,
        measure: &str,
        filter: Option<&ValFilterSpec>,
    ) -> Result<Sample> {
        let sql = self.select_sql(&[measure], filter);
        let vals = cursor
            .query(&sql)?
            .iter()
            .map(|row| number(measure, row.first()))
            .collect::<Result<Vec<f64>>>()?;
        let lbl = filter.map_or_else(|| measure.to_string(), |f| f.val_spec.lbl.clone());
        debug!(values = vals.len(), "extracted sample");
        Ok(Sample::new(lbl, vals))
    }

    /// Row-aligned values of two fields, dropping rows where either is NULL.
    #[instrument(skip_all, fields(table = %self.table, field_a = %field_a, field_b = %field_b))]
    pub fn paired_sample(
        &self,
        cursor: &mut ManagedCursor<'_>,
        field_a: &str,
        field_b: &str,
        filter: Option<&ValFilterSpec>,
    ) -> Result<(Sample, Sample)> {
        let sql = self.select_sql(&[field_a, field_b], filter);
        let rows = cursor.query(&sql)?;
        let mut a = Vec::with_capacity(rows.len());
        let mut b = Vec::with_capacity(rows.len());
        for row in &rows {
            a.push(number(field_a, row.first())?);
            b.push(number(field_b, row.get(1))?);
        }
        debug!(pairs = a.len(), "extracted paired sample");
        Ok((Sample::new(field_a, a), Sample::new(field_b, b)))
    }

    /// Element-wise `field_a - field_b` over row-aligned pairs.
    pub fn paired_difference_sample(
        &self,
        cursor: &mut ManagedCursor<'_>,
        field_a: &str,
        field_b: &str,
        filter: Option<&ValFilterSpec>,
    ) -> Result<Sample> {
        let (a, b) = self.paired_sample(cursor, field_a, field_b, filter)?;
        let diffs = a.vals.iter().zip(&b.vals).map(|(x, y)| x - y).collect();
        Ok(Sample::new(format!("{field_a} - {field_b}"), diffs))
    }

    /// One sample of `measure` per group value, ordered by group label.
    ///
    /// Duplicate group values are collapsed.
    #[instrument(skip_all, fields(table = %self.table, grouping_field = %grouping_field, groups = val_specs.len()))]
    pub fn samples_for_groups(
        &self,
        cursor: &mut ManagedCursor<'_>,
        grouping_field: &str,
        val_specs: &[ValSpec],
        measure: &str,
    ) -> Result<Vec<Sample>> {
        let mut groups: Vec<&ValSpec> = Vec::with_capacity(val_specs.len());
        for spec in val_specs {
            if !groups.iter().any(|g| g.val == spec.val) {
                groups.push(spec);
            }
        }
        groups.sort_by(|a, b| a.lbl.cmp(&b.lbl).then_with(|| a.val.total_cmp(&b.val)));
        groups
            .into_iter()
            .map(|spec| {
                let filter = ValFilterSpec::new(grouping_field, spec.clone());
                self.sample(cursor, measure, Some(&filter))
            })
            .collect()
    }

    /// One sample of `measure` per distinct non-null value of `group_field`,
    /// ordered by group value and labelled via `labels`.
    #[instrument(skip_all, fields(table = %self.table, group_field = %group_field, measure = %measure))]
    pub fn values_by_group(
        &self,
        cursor: &mut ManagedCursor<'_>,
        group_field: &str,
        measure: &str,
        labels: &VarLabels,
    ) -> Result<Vec<Sample>> {
        let sql = self.select_sql(&[group_field, measure], None);
        let mut groups: Vec<(Value, Vec<f64>)> = Vec::new();
        for row in cursor.query(&sql)? {
            let mut cols = row.into_iter();
            let group = cols.next().unwrap_or(Value::Null);
            let val = number(measure, cols.next().as_ref())?;
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, vals)) => vals.push(val),
                None => groups.push((group, vec![val])),
            }
        }
        groups.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(groups
            .into_iter()
            .map(|(group, vals)| Sample::new(labels.val_label(group_field, &group), vals))
            .collect())
    }

    /// `SELECT fields` over rows where every field is non-null.
    pub fn select_sql(&self, fields: &[&str], filter: Option<&ValFilterSpec>) -> String {
        let not_null: Vec<Predicate> = fields.iter().map(|f| Predicate::not_null(*f)).collect();
        let mut clause = WhereClause::new().and_all(&not_null, self.engine);
        if let Some(filter) = filter {
            clause = clause.and(&filter.predicate(), self.engine);
        }
        let cols: Vec<String> = fields
            .iter()
            .map(|f| self.engine.quote_identifier(f))
            .collect();
        format!(
            "SELECT {} FROM {}{}",
            cols.join(", "),
            self.engine.quote_identifier(self.table),
            clause.and_table_filter(self.table_filter).to_sql()
        )
    }
}

fn number(field: &str, value: Option<&Value>) -> Result<f64> {
    match value {
        Some(v) => v.as_f64().ok_or_else(|| Error::NonNumeric {
            field: field.to_string(),
            value: v.to_string(),
        }),
        None => Err(Error::NonNumeric {
            field: field.to_string(),
            value: Value::Null.to_string(),
        }),
    }
}
