use crosstab::crosstab::{CrossTab, Measure, Ratio, Strategy, TableSpec};
use crosstab::db::{CancelToken, InternalDb, ManagedCursor};
use crosstab::dims::{DimSpec, Metric};
use crosstab::labels::VarLabels;
use crosstab::sql::{EngineDescriptor, Predicate};
use crosstab::Error;
use std::time::Duration;

fn sales() -> InternalDb {
    let db = InternalDb::in_memory();
    db.connection()
        .unwrap()
        .execute_batch(
            "CREATE TABLE sales (region TEXT, product TEXT, units INTEGER);
             INSERT INTO sales VALUES
               ('North', 'Apples', 10), ('North', 'Pears', 5), ('North', 'Apples', 3),
               ('South', 'Pears', 7), ('South', 'Plums', 2),
               ('East', 'Apples', 4);",
        )
        .unwrap();
    db
}

fn build(db: &InternalDb, engine: &EngineDescriptor, strategy: Strategy, metrics: &[Metric]) -> TableSpec {
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut col = DimSpec::col("product").with_total();
    for metric in metrics {
        col = col.with_metric(*metric);
    }
    CrossTab::new(engine, "sales")
        .with_strategy(strategy)
        .build(
            &mut cursor,
            &[DimSpec::row("region").with_total()],
            &[col],
            &VarLabels::new(),
        )
        .unwrap()
}

#[test]
fn test_cell_count_is_rows_times_cols() {
    let db = sales();
    let table = build(&db, &EngineDescriptor::sqlite(), Strategy::PerCell, &[]);
    // 3 regions + Total, 3 products + Total
    assert_eq!(table.row_paths.len(), 4);
    assert_eq!(table.col_paths.len(), 4);
    assert_eq!(table.cells.len(), 16);
    for (r, _) in table.row_paths.iter().enumerate() {
        for (c, _) in table.col_paths.iter().enumerate() {
            let cell = table.cell(r, c).unwrap();
            assert_eq!((cell.row, cell.col), (r, c));
        }
    }
}

#[test]
fn test_row_pct_sums_to_one() {
    let db = sales();
    let table = build(&db, &EngineDescriptor::sqlite(), Strategy::PerCell, &[Metric::RowPct]);
    let non_total_cols: Vec<usize> = (0..table.col_paths.len())
        .filter(|&c| !table.col_paths[c].has_total())
        .collect();
    for r in 0..table.row_paths.len() {
        let sum: f64 = non_total_cols
            .iter()
            .map(|&c| table.cell(r, c).unwrap().metrics[&Metric::RowPct].value().unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-9, "row {r} sums to {sum}");
        let total_col = table.col_paths.len() - 1;
        assert_eq!(
            table.cell(r, total_col).unwrap().metrics[&Metric::RowPct],
            Ratio::Defined(1.0)
        );
    }
}

#[test]
fn test_col_pct_sums_to_one() {
    let db = sales();
    let table = build(&db, &EngineDescriptor::sqlite(), Strategy::PerCell, &[Metric::ColPct]);
    let total_row = table.row_paths.len() - 1;
    for c in 0..table.col_paths.len() {
        let sum: f64 = (0..total_row)
            .map(|r| table.cell(r, c).unwrap().metrics[&Metric::ColPct].value().unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-9, "col {c} sums to {sum}");
    }
}

#[test]
fn test_total_pct_against_grand_total() {
    let db = sales();
    let table = build(&db, &EngineDescriptor::sqlite(), Strategy::PerCell, &[Metric::TotalPct]);
    // North / Apples = 2 of 6 rows
    let north_apples = table.cell(1, 0).unwrap();
    assert_eq!(table.row_paths[1].labels(), ["North"]);
    assert_eq!(table.col_paths[0].labels(), ["Apples"]);
    assert_eq!(north_apples.value, 2.0);
    assert_eq!(north_apples.metrics[&Metric::TotalPct], Ratio::Defined(2.0 / 6.0));
}

#[test]
fn test_per_row_matches_per_cell_on_non_summable_engine() {
    let db = sales();
    let case_sum = EngineDescriptor {
        name: "sqlite_case".to_string(),
        summable: false,
        ..EngineDescriptor::sqlite()
    };
    let metrics = [Metric::RowPct, Metric::ColPct, Metric::TotalPct];
    let per_cell = build(&db, &EngineDescriptor::sqlite(), Strategy::PerCell, &metrics);
    let per_row = build(&db, &case_sum, Strategy::PerRow, &metrics);
    assert_eq!(per_cell, per_row);

    let sql = CrossTab::new(&case_sum, "sales").row_sql(
        &[Predicate::eq("region", "North".into())],
        &[vec![Predicate::eq("product", "Pears".into())]],
    );
    insta::assert_snapshot!(sql, @"SELECT SUM(CASE WHEN `product` = 'Pears' THEN 1 ELSE 0 END) FROM `sales` WHERE `region` = 'North'");
}

#[test]
fn test_sum_measure() {
    let db = sales();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let table = CrossTab::new(&EngineDescriptor::sqlite(), "sales")
        .with_measure(Measure::Sum("units".to_string()))
        .build(
            &mut cursor,
            &[DimSpec::row("region").with_metric(Metric::RowPct)],
            &[],
            &VarLabels::new(),
        )
        .unwrap();
    let values: Vec<f64> = table.cells.iter().map(|c| c.value).collect();
    // East, North, South
    assert_eq!(values, [4.0, 18.0, 9.0]);
    assert_eq!(table.col_paths.len(), 1);
    assert!(table.col_paths[0].is_empty());
}

#[test]
fn test_cancelled_request_fails() {
    let db = sales();
    let token = CancelToken::new();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap()).with_cancel(token.clone());
    token.cancel();
    let err = CrossTab::new(&EngineDescriptor::sqlite(), "sales")
        .build(&mut cursor, &[DimSpec::row("region")], &[], &VarLabels::new())
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
}

#[test]
fn test_query_timeout() {
    let db = InternalDb::in_memory().with_timeout(Some(Duration::from_millis(1)));
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let err = cursor
        .query(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000) \
             SELECT COUNT(*) FROM c",
        )
        .unwrap_err();
    assert!(matches!(err, Error::QueryTimeout { .. }), "got {err:?}");
    assert!(err.sql().unwrap().contains("WITH RECURSIVE"));
}
