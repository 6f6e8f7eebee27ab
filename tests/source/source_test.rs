use crosstab::db::{InternalDb, SourceArgs, Value};
use crosstab::sql::engine::{EngineRegistry, SQLITE};
use crosstab::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn registry() -> EngineRegistry {
    EngineRegistry::new("/nonexistent/engines")
}

#[test]
fn test_csv_ingested_under_file_stem() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, "2024 survey.csv", "country,height\nNZ,1.8\nAU,\n");
    let db = InternalDb::in_memory();

    let mut source = SourceArgs::csv(&csv).materialize(&db, &registry()).unwrap();
    assert_eq!(source.table, "_2024_survey");
    assert_eq!(source.engine.name, SQLITE);
    let report = source.ingested.clone().unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(report.columns, ["country", "height"]);
    assert!(!report.replaced);

    let rows = source
        .cursor
        .query("SELECT country, height FROM `_2024_survey` ORDER BY country")
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::from("AU"), Value::Null],
            vec![Value::from("NZ"), Value::Real(1.8)],
        ]
    );
}

#[test]
fn test_second_ingest_without_overwrite_fails_and_keeps_first() {
    let dir = TempDir::new().unwrap();
    let first = write_csv(&dir, "first.csv", "x\n1\n2\n");
    let second = write_csv(&dir, "second.csv", "y\n9\n");
    let db = InternalDb::in_memory();

    SourceArgs::csv(&first)
        .with_table("people")
        .materialize(&db, &registry())
        .unwrap();
    let err = SourceArgs::csv(&second)
        .with_table("people")
        .materialize(&db, &registry())
        .unwrap_err();
    assert!(matches!(err, Error::TableExists { ref table } if table == "people"));
    assert!(err.to_string().contains("people"));

    let mut source = SourceArgs::table("people")
        .materialize(&db, &registry())
        .unwrap();
    let rows = source.cursor.query("SELECT SUM(x) FROM people").unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(3)]]);
}

#[test]
fn test_overwrite_replaces_table() {
    let dir = TempDir::new().unwrap();
    let first = write_csv(&dir, "data.csv", "x\n1\n");
    let db = InternalDb::in_memory();
    SourceArgs::csv(&first).materialize(&db, &registry()).unwrap();

    fs::write(&first, "x;label\n5;five\n6;six\n").unwrap();
    let mut source = SourceArgs::csv(&first)
        .with_delimiter(b';')
        .with_overwrite(true)
        .materialize(&db, &registry())
        .unwrap();
    assert!(source.ingested.as_ref().unwrap().replaced);
    let rows = source
        .cursor
        .query("SELECT COUNT(*), SUM(x) FROM data")
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(2), Value::Integer(11)]]);
}

#[test]
fn test_table_collision_ignores_case() {
    let dir = TempDir::new().unwrap();
    let first = write_csv(&dir, "first.csv", "x\n1\n2\n");
    let second = write_csv(&dir, "second.csv", "x\n7\n");
    let db = InternalDb::in_memory();

    SourceArgs::csv(&first)
        .with_table("people")
        .materialize(&db, &registry())
        .unwrap();
    assert!(db.table_exists("PEOPLE").unwrap());

    let err = SourceArgs::csv(&second)
        .with_table("People")
        .materialize(&db, &registry())
        .unwrap_err();
    assert!(matches!(err, Error::TableExists { ref table } if table == "People"));

    let mut source = SourceArgs::csv(&second)
        .with_table("People")
        .with_overwrite(true)
        .materialize(&db, &registry())
        .unwrap();
    assert!(source.ingested.as_ref().unwrap().replaced);
    let rows = source.cursor.query("SELECT SUM(x) FROM people").unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(7)]]);
}

#[test]
fn test_caller_cursor_with_engine_and_table() {
    let external = InternalDb::in_memory();
    external
        .connection()
        .unwrap()
        .execute_batch("CREATE TABLE sales (amount INTEGER); INSERT INTO sales VALUES (4), (6);")
        .unwrap();
    let internal = InternalDb::in_memory();

    let mut source = SourceArgs::cursor(external.cursor().unwrap(), SQLITE, "sales")
        .materialize(&internal, &registry())
        .unwrap();
    assert_eq!(source.table, "sales");
    assert_eq!(
        source.cursor.query_f64("SELECT SUM(amount) FROM sales").unwrap(),
        Some(10.0)
    );
    assert!(!internal.is_open());
}

#[test]
fn test_contradictory_arguments_rejected() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, "data.csv", "x\n1\n");
    let db = InternalDb::in_memory();
    let other = InternalDb::in_memory();

    let cases = vec![
        SourceArgs::csv(&csv).with_engine("postgres"),
        SourceArgs::csv(&csv).with_cursor(other.cursor().unwrap()),
        SourceArgs::new().with_cursor(other.cursor().unwrap()),
        SourceArgs::new()
            .with_cursor(other.cursor().unwrap())
            .with_engine(SQLITE),
        SourceArgs::new().with_engine("postgres").with_table("t"),
        SourceArgs::table("  "),
        SourceArgs::new(),
    ];
    for args in cases {
        let err = args.materialize(&db, &registry()).unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)), "got {err:?}");
    }
    // Nothing was ingested along the way.
    assert!(!db.table_exists("data").unwrap());
}

#[test]
fn test_cursor_with_unknown_engine() {
    let other = InternalDb::in_memory();
    let db = InternalDb::in_memory();
    let err = SourceArgs::cursor(other.cursor().unwrap(), "oracle", "t")
        .materialize(&db, &registry())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEngine { .. }));
}

#[test]
fn test_missing_csv_file() {
    let db = InternalDb::in_memory();
    let err = SourceArgs::csv("/nonexistent/file.csv")
        .materialize(&db, &registry())
        .unwrap_err();
    assert!(matches!(err, Error::Csv { .. }));
}
