use crosstab::sql::engine::{EngineDescriptor, EngineRegistry, DESCRIPTOR_KEYS, SQLITE};
use crosstab::Error;
use std::fs;
use tempfile::TempDir;

const MSSQL: &str = r#"
if_clause = "IIF(%s, %s, %s)"
placeholder = "?"
left_entity_quote = "["
right_entity_quote = "]"
gte_not_equals = "<>"
cartesian_joiner = " CROSS JOIN "
str_value_quote = "'"
str_value_quote_escaped = "''"
summable = false
"#;

const MSSQL_YAML: &str = r#"
if_clause: IIF(%s, %s, %s)
placeholder: "?"
left_entity_quote: "["
right_entity_quote: "]"
gte_not_equals: <>
cartesian_joiner: " CROSS JOIN "
str_value_quote: "'"
str_value_quote_escaped: "''"
summable: false
"#;

fn registry_with(files: &[(&str, &str)]) -> (TempDir, EngineRegistry) {
    let dir = TempDir::new().unwrap();
    for (file, content) in files {
        let file = if file.contains('.') {
            file.to_string()
        } else {
            format!("{file}.toml")
        };
        fs::write(dir.path().join(file), content).unwrap();
    }
    let registry = EngineRegistry::new(dir.path());
    (dir, registry)
}

#[test]
fn test_builtin_sqlite_needs_no_files() {
    let registry = EngineRegistry::new("/definitely/not/here");
    let sqlite = registry.resolve(SQLITE).unwrap();
    assert_eq!(sqlite, EngineDescriptor::sqlite());
    assert_eq!(registry.builtin_names(), vec![SQLITE]);
}

#[test]
fn test_external_descriptor_loaded() {
    let (_dir, registry) = registry_with(&[("mssql", MSSQL)]);
    let mssql = registry.resolve("mssql").unwrap();

    assert_eq!(mssql.name, "mssql");
    assert_eq!(mssql.quote_identifier("order"), "[order]");
    assert_eq!(mssql.quote_identifier("a]b"), "[a]]b]");
    assert_eq!(mssql.quote_string("it's"), "'it''s'");
    assert_eq!(mssql.not_equals("[x]", "1"), "[x] <> 1");
    assert_eq!(mssql.cross_join("[a]", "[b]"), "[a] CROSS JOIN [b]");
    assert_eq!(mssql.placeholders(3), "?, ?, ?");
    assert_eq!(mssql.conditional_count("[x] = 1"), "SUM(IIF([x] = 1, 1, 0))");
    assert_eq!(
        mssql.conditional_sum("[x] = 1", "[amount]"),
        "SUM(IIF([x] = 1, [amount], 0))"
    );
}

#[test]
fn test_unknown_engine_names_builtins_and_searched_path() {
    let (dir, registry) = registry_with(&[]);
    let err = registry.resolve("oracle").unwrap_err();
    let expected_paths = vec![dir.path().join("oracle.yaml"), dir.path().join("oracle.toml")];

    match &err {
        Error::UnknownEngine {
            engine,
            builtins,
            searched,
        } => {
            assert_eq!(engine, "oracle");
            assert_eq!(builtins, SQLITE);
            assert_eq!(searched, &expected_paths);
        }
        other => panic!("expected UnknownEngine, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("built-in engines [sqlite]"));
    for path in &expected_paths {
        assert!(msg.contains(&path.display().to_string()));
    }
}

#[test]
fn test_yaml_descriptor_loaded_and_preferred() {
    let (_dir, registry) = registry_with(&[
        ("mssql.yaml", MSSQL_YAML),
        ("mssql.toml", &MSSQL.replace("IIF(%s, %s, %s)", "CASE WHEN %s THEN %s ELSE %s END")),
    ]);
    let mssql = registry.resolve("mssql").unwrap();
    assert_eq!(mssql.quote_identifier("order"), "[order]");
    assert_eq!(mssql.not_equals("[x]", "1"), "[x] <> 1");
    assert_eq!(mssql.conditional_count("[x] = 1"), "SUM(IIF([x] = 1, 1, 0))");
    assert!(!mssql.summable);
}

#[test]
fn test_engine_name_cannot_leave_descriptor_folder() {
    let outer = TempDir::new().unwrap();
    fs::write(outer.path().join("escaped.toml"), MSSQL).unwrap();
    let inner = outer.path().join("engines");
    fs::create_dir(&inner).unwrap();
    let registry = EngineRegistry::new(&inner);

    let err = registry.resolve("../escaped").unwrap_err();
    assert!(matches!(err, Error::InvalidEngineName(ref name) if name == "../escaped"));
}

#[test]
fn test_missing_key_is_named() {
    for key in DESCRIPTOR_KEYS {
        let content: String = MSSQL
            .lines()
            .filter(|line| !line.starts_with(&format!("{key} =")))
            .collect::<Vec<_>>()
            .join("\n");
        let (_dir, registry) = registry_with(&[("partial", &content)]);
        let err = registry.resolve("partial").unwrap_err();
        assert!(
            matches!(&err, Error::MissingDescriptorField { key: k, .. } if k == key),
            "removing {key} gave {err:?}"
        );
    }
}

#[test]
fn test_invalid_descriptors_rejected() {
    let bad_template = MSSQL.replace("IIF(%s, %s, %s)", "IIF(%s, %s)");
    let empty_quote = MSSQL.replace("left_entity_quote = \"[\"", "left_entity_quote = \"\"");
    let (_dir, registry) = registry_with(&[
        ("bad_template", &bad_template),
        ("empty_quote", &empty_quote),
        ("not_toml", "if_clause = "),
    ]);

    for engine in ["bad_template", "empty_quote", "not_toml"] {
        let err = registry.resolve(engine).unwrap_err();
        assert!(
            matches!(err, Error::InvalidDescriptor { .. }),
            "{engine} gave {err:?}"
        );
    }
}

#[test]
fn test_empty_engine_name() {
    let registry = EngineRegistry::new("/tmp");
    assert!(matches!(registry.resolve(""), Err(Error::MissingEngineName)));
}
