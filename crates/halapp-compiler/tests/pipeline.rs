//! End-to-end runs: XML schema directory to model, SQL and rows.

use std::fs;
use std::path::Path;

use halapp_compiler::model::{from_db_rows, to_db_rows, ColumnRole};
use halapp_compiler::query::SelectStatement;
use halapp_compiler::{AggregatePath, Compiler, CompilerConfig, CompilerError, QueryError, SearchQuery};
use serde_json::json;
use tempfile::TempDir;

const SALES: &str = r#"<schema>
  <Customer>
    <code type="identifier" key="true"/>
    <name type="word" name="true"/>
  </Customer>
  <Order>
    <id type="identifier" key="true"/>
    <total type="numeric"/>
    <Customer refTo="/Customer"/>
    <Lines multiple="true" table="Line">
      <id type="sequence" key="true"/>
      <qty type="numeric"/>
    </Lines>
  </Order>
</schema>"#;

const THREE_LEVELS: &str = r#"<schema>
  <Order>
    <id type="identifier" key="true"/>
    <Lines multiple="true" table="Line">
      <qty type="numeric"/>
      <Notes multiple="true" table="Note">
        <text type="sentence"/>
      </Notes>
    </Lines>
  </Order>
</schema>"#;

fn schema_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn compiler(dir: &Path) -> Compiler {
    Compiler::new(CompilerConfig {
        schema_dir: dir.to_path_buf(),
        ..Default::default()
    })
}

#[test]
fn order_lines_select_renders_descendant_join() {
    let dir = schema_dir(&[("sales.xml", SALES)]);
    let schema = compiler(dir.path()).load().unwrap();

    let order = schema.db_entity(&AggregatePath::parse("/Order")).unwrap();
    let line = schema.db_entity(&AggregatePath::parse("/Order/Lines")).unwrap();
    let customer = schema.db_entity(&AggregatePath::parse("/Customer")).unwrap();

    let mut statement = SelectStatement::new();
    statement.from(order).unwrap();
    statement.left_join(line).unwrap();
    assert!(matches!(
        statement.left_join(customer),
        Err(QueryError::NotADescendant { .. })
    ));
    statement
        .select(|arg| Ok(format!("{}.total AS total", arg.alias(order)?)))
        .unwrap()
        .select(|arg| Ok(format!("{}.qty AS qty", arg.alias(line)?)))
        .unwrap();

    let sql = statement.to_sql_string().unwrap();
    assert!(sql.starts_with("SELECT t0.total AS total, t1.qty AS qty"));
    assert!(sql.contains("FROM Order AS t0 LEFT JOIN Line AS t1 ON (t1.order_id = t0.id)"));
}

#[test]
fn grandchild_key_starts_with_parent_keys_then_sequence() {
    let dir = schema_dir(&[("order.xml", THREE_LEVELS)]);
    let schema = compiler(dir.path()).load().unwrap();

    let note = schema
        .db_entity(&AggregatePath::parse("/Order/Lines/Notes"))
        .unwrap();
    let keys: Vec<_> = note.pk_columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(keys, vec!["order_id", "line_seq", "seq"]);
    assert_eq!(note.pk_columns[1].role, ColumnRole::Sequence);
    assert!(note.pk_columns[1].inherited);
}

#[test]
fn search_query_filters_on_reference_key() {
    let dir = schema_dir(&[("sales.xml", SALES)]);
    let schema = compiler(dir.path()).load().unwrap();

    let query = SearchQuery::build(
        &schema,
        &AggregatePath::parse("/Order"),
        &json!({"total": {"from": 100}, "Customer": {"key": {"code": "C-1"}}}),
    )
    .unwrap();
    assert_eq!(
        query.to_sql_string().unwrap(),
        "SELECT t0.id AS id, t0.total AS total FROM Order AS t0 \
         WHERE (t0.total >= @p_0) AND (t0.Customer_code = @p_1) ORDER BY t0.id ASC"
    );
    let bound: Vec<String> = query
        .statement
        .bind(|name, value| format!("{name}:{value}"));
    assert_eq!(bound, vec!["@p_0:100", "@p_1:\"C-1\""]);
}

#[test]
fn rows_round_trip_through_the_persisted_shape() {
    let dir = schema_dir(&[("sales.xml", SALES)]);
    let schema = compiler(dir.path()).load().unwrap();
    let root = AggregatePath::parse("/Order");

    let instance = json!({
        "id": "A-1",
        "total": 3,
        "Customer": {"key": {"code": "C-1"}, "text": "Acme"},
        "Lines": [{"id": 7, "qty": 1}, {"id": 8, "qty": 2}]
    });
    let rows = to_db_rows(&schema, &root, &instance).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].get("order_id"), &json!("A-1"));

    let back = from_db_rows(&schema, &root, &rows).unwrap();
    assert_eq!(back["Lines"], json!([{"id": 7, "qty": 1}, {"id": 8, "qty": 2}]));
    assert_eq!(back["Customer"]["key"], json!({"code": "C-1"}));
}

#[test]
fn compile_writes_snapshot() {
    let dir = schema_dir(&[("sales.xml", SALES)]);
    let out = dir.path().join("build").join("model.json");
    let result = Compiler::new(CompilerConfig {
        schema_dir: dir.path().to_path_buf(),
        out_file: Some(out.clone()),
        ..Default::default()
    })
    .compile()
    .unwrap();

    assert_eq!(result.aggregates, 3);
    assert_eq!(result.roots, 2);
    assert_eq!(result.written.as_deref(), Some(out.as_path()));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["aggregates"].as_array().unwrap().len(), 3);
}

#[test]
fn every_schema_problem_is_reported_at_once() {
    let broken = r#"<schema>
  <Order>
    <id type="uuid" key="true"/>
    <total type="money"/>
    <Customer refTo="/Nowhere"/>
  </Order>
</schema>"#;
    let dir = schema_dir(&[("broken.xml", broken)]);
    let err = compiler(dir.path()).check().unwrap_err();
    let CompilerError::InvalidSchema { errors } = err else {
        panic!("expected an invalid schema, got {err:?}");
    };
    assert!(errors.contains("uuid"));
    assert!(errors.contains("money"));
    assert!(errors.len() >= 2);
}

#[test]
fn problems_from_every_file_are_reported_together() {
    let audit = r#"<schema>
  <Audit multiple="true"><id type="identifier" key="true"/></Audit>
</schema>"#;
    let order = r#"<schema>
  <Order>
    <id type="identifier" key="true"/>
    <total type="no-such-type"/>
  </Order>
</schema>"#;
    let dir = schema_dir(&[("a.xml", audit), ("b.xml", order)]);
    let err = compiler(dir.path()).check().unwrap_err();
    let CompilerError::InvalidSchema { errors } = err else {
        panic!("expected an invalid schema, got {err:?}");
    };
    assert!(errors.contains("a.xml: Root aggregate '/Audit' cannot be multiple."));
    assert!(errors.contains("Type name 'no-such-type' of 'total' in '/Order' is invalid."));
    assert_eq!(errors.len(), 2);
}

#[test]
fn skip_validation_tolerates_design_rule_violations() {
    let self_ref = r#"<schema>
  <Order>
    <id type="identifier" key="true"/>
    <Previous refTo="/Order"/>
  </Order>
</schema>"#;
    let dir = schema_dir(&[("order.xml", self_ref)]);

    assert!(matches!(
        compiler(dir.path()).check(),
        Err(CompilerError::InvalidSchema { .. })
    ));

    let lenient = Compiler::new(CompilerConfig {
        schema_dir: dir.path().to_path_buf(),
        skip_validation: true,
        ..Default::default()
    });
    assert!(lenient.check().is_ok());
}

#[test]
fn unsupported_language_and_empty_directory() {
    let dir = TempDir::new().unwrap();
    let err = Compiler::new(CompilerConfig {
        schema_dir: dir.path().to_path_buf(),
        language: "yaml".to_string(),
        ..Default::default()
    })
    .check()
    .unwrap_err();
    assert!(matches!(err, CompilerError::UnsupportedLanguage { .. }));

    let err = compiler(dir.path()).check().unwrap_err();
    assert!(matches!(err, CompilerError::NoSchemaFiles { .. }));
}
