use crosstab::db::{InternalDb, ManagedCursor, Value};
use crosstab::dims::{expand, Axis, DimSpec, Metric, Sort, TableValues};
use crosstab::labels::VarLabels;
use crosstab::sql::EngineDescriptor;
use crosstab::Error;

fn survey() -> InternalDb {
    let db = InternalDb::in_memory();
    db.connection()
        .unwrap()
        .execute_batch(
            "CREATE TABLE survey (country INTEGER, gender TEXT, browser TEXT);
             INSERT INTO survey VALUES
               (1, 'M', 'Firefox'), (1, 'F', 'Chrome'), (1, 'F', 'Chrome'),
               (2, 'F', 'Opera'), (2, 'M', 'Chrome'), (2, NULL, 'Chrome'),
               (NULL, 'M', 'Firefox');",
        )
        .unwrap();
    db
}

fn labels() -> VarLabels {
    VarLabels::new()
        .with_var_label("country", "Country")
        .with_var_label("gender", "Gender")
        .with_val_label("country", 1_i64, "NZ")
        .with_val_label("country", 2_i64, "AU")
        .with_val_label("gender", "F", "Female")
        .with_val_label("gender", "M", "Male")
}

fn label_paths(paths: &[crosstab::dims::HeaderPath]) -> Vec<Vec<String>> {
    paths
        .iter()
        .map(|p| p.labels().into_iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn test_country_gender_scenario() {
    let db = survey();
    let engine = EngineDescriptor::sqlite();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut source = TableValues::new(&mut cursor, &engine, "survey");

    let spec = DimSpec::row("country")
        .with_total()
        .with_child(DimSpec::row("gender").with_total().sorted_by(Sort::Label));
    let paths = expand(&[spec], Axis::Row, &mut source, &labels()).unwrap();

    let expected: Vec<Vec<String>> = [
        ["NZ", "Female"],
        ["NZ", "Male"],
        ["NZ", "Total"],
        ["AU", "Female"],
        ["AU", "Male"],
        ["AU", "Total"],
        ["Total", "Female"],
        ["Total", "Male"],
        ["Total", "Total"],
    ]
    .iter()
    .map(|p| p.iter().map(|s| s.to_string()).collect())
    .collect();
    assert_eq!(label_paths(&paths), expected);
    assert!(paths.iter().all(|p| p.len() == 2));
    assert_eq!(paths[0].entries[0].var_lbl, "Country");
    assert_eq!(paths[0].entries[1].var_lbl, "Gender");
    assert_eq!(paths[0].entries[0].value, Value::Integer(1));
}

#[test]
fn test_nulls_never_become_values() {
    let db = survey();
    let engine = EngineDescriptor::sqlite();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut source = TableValues::new(&mut cursor, &engine, "survey");
    let paths = expand(&[DimSpec::row("country")], Axis::Row, &mut source, &labels()).unwrap();
    assert_eq!(label_paths(&paths), vec![vec!["NZ"], vec!["AU"]]);
}

#[test]
fn test_frequency_sort_with_table_filter() {
    let db = survey();
    let engine = EngineDescriptor::sqlite();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut source = TableValues::new(&mut cursor, &engine, "survey")
        .with_table_filter(Some("WHERE browser NOT IN ('Opera')"));
    let spec = DimSpec::col("browser").sorted_by(Sort::Frequency).with_total();
    let paths = expand(&[spec], Axis::Col, &mut source, &VarLabels::new()).unwrap();
    assert_eq!(
        label_paths(&paths),
        vec![vec!["Chrome"], vec!["Firefox"], vec!["Total"]]
    );
}

#[test]
fn test_metrics_only_on_leaf() {
    let db = survey();
    let engine = EngineDescriptor::sqlite();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut source = TableValues::new(&mut cursor, &engine, "survey");
    let bad = DimSpec::row("country")
        .with_metric(Metric::RowPct)
        .with_child(DimSpec::row("gender"));
    let err = expand(&[bad], Axis::Row, &mut source, &labels()).unwrap_err();
    assert!(matches!(err, Error::InvalidDimSpec(_)));

    let wrong_axis = expand(&[DimSpec::col("browser")], Axis::Row, &mut source, &labels());
    assert!(matches!(wrong_axis, Err(Error::InvalidDimSpec(_))));
}

#[test]
fn test_discovery_failure_carries_sql() {
    let db = survey();
    let engine = EngineDescriptor::sqlite();
    let mut cursor = ManagedCursor::new(db.cursor().unwrap());
    let mut source = TableValues::new(&mut cursor, &engine, "survey");
    let err = expand(&[DimSpec::row("no_such_column")], Axis::Row, &mut source, &labels())
        .unwrap_err();
    assert!(err.sql().unwrap().contains("`no_such_column`"));
}
