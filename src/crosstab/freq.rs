//! Frequency tables: row dimensions against a single synthetic column.

use std::collections::BTreeSet;

use tracing::instrument;

use super::{CrossTab, TableSpec};
use crate::db::cursor::ManagedCursor;
use crate::dims::expand::{expand, HeaderPath, TableValues};
use crate::dims::spec::{Axis, DimSpec, Metric};
use crate::error::Result;
use crate::labels::VarLabels;

impl CrossTab<'_> {
    /// One aggregate per row path, optionally with its share of the whole
    /// table (column percent of the single column).
    #[instrument(skip_all, fields(table = %self.table, inc_col_pct = inc_col_pct))]
    pub fn freq_table(
        &self,
        cursor: &mut ManagedCursor<'_>,
        row_specs: &[DimSpec],
        labels: &VarLabels,
        inc_col_pct: bool,
    ) -> Result<TableSpec> {
        let row_paths = {
            let mut source = TableValues::new(cursor, self.engine, self.table)
                .with_table_filter(self.table_filter);
            expand(row_specs, Axis::Row, &mut source, labels)?
        };
        let mut metrics = BTreeSet::new();
        if inc_col_pct {
            metrics.insert(Metric::ColPct);
        }
        let column = HeaderPath {
            entries: Vec::new(),
            metrics,
        };
        self.aggregate(cursor, row_paths, vec![column])
    }
}
