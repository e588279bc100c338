//! Integration tests for EXPLAIN and EXPLAIN ANALYZE.

use anyhow::Result;
use database::{Database, QueryResult};

fn explain_text(result: QueryResult) -> String {
    match result {
        QueryResult::Rows { schema, rows } => {
            assert_eq!(schema, vec!["Explain".to_string()]);
            assert_eq!(rows.len(), 1);
            match &rows[0].values[0] {
                types::Value::Text(s) => s.clone(),
                other => panic!("expected a text explain output, got {other:?}"),
            }
        }
        other => panic!("expected Rows result, got {other:?}"),
    }
}

#[test]
fn explain_analyze_select_query() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json")?;

    db.execute("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(32), age INT)")?;
    db.execute("INSERT INTO users VALUES (1, 'Alice', 30)")?;
    db.execute("INSERT INTO users VALUES (2, 'Bob', 25)")?;

    let output = explain_text(db.execute("EXPLAIN ANALYZE SELECT * FROM users WHERE age > 20")?);

    assert!(output.contains("Execution"));
    assert!(output.contains("Total rows"));
    Ok(())
}

#[test]
fn explain_select_query_without_execution() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json")?;

    db.execute("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(32))")?;

    let output = explain_text(db.execute("EXPLAIN SELECT * FROM users")?);

    assert!(output.contains("SeqScan"));
    assert!(!output.contains("Execution"));
    Ok(())
}

#[test]
fn explain_analyze_insert_query_actually_executes() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json")?;

    db.execute("CREATE TABLE products (id INT PRIMARY KEY, name VARCHAR(32))")?;

    let output = explain_text(db.execute("EXPLAIN ANALYZE INSERT INTO products VALUES (1, 'Widget')")?);
    assert!(output.contains("Insert"));

    match db.execute("SELECT * FROM products")? {
        QueryResult::Rows { rows, .. } => assert_eq!(rows.len(), 1, "INSERT should have executed"),
        other => panic!("expected rows, got {other:?}"),
    }
    Ok(())
}

#[test]
fn explain_analyze_with_filter_shows_stats() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json")?;

    db.execute("CREATE TABLE numbers (id INT PRIMARY KEY, value INT)")?;
    for i in 1..=10 {
        db.execute(&format!("INSERT INTO numbers VALUES ({i}, {})", i * 10))?;
    }

    let output = explain_text(db.execute("EXPLAIN ANALYZE SELECT * FROM numbers WHERE value > 50")?);

    assert!(output.contains("Total rows: 5"));
    Ok(())
}
