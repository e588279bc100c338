use super::*;
use common::DbError;
use expr::Expr;
use types::SqlType;

#[test]
fn parse_basic_statements() {
    let sql = r#"
        CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(32), age INT);
        INSERT INTO users VALUES (1, 'Will', 27);
        SELECT id, name FROM users WHERE age > 20;
    "#;

    let stmts = parse_sql(sql).expect("parser should succeed");
    assert_eq!(stmts.len(), 3);

    match &stmts[0] {
        Statement::CreateTable {
            name,
            columns,
            primary_key,
        } => {
            assert_eq!(name, "users");
            assert_eq!(columns.len(), 3);
            assert_eq!(columns[1].name, "name");
            assert_eq!(columns[1].ty.base, SqlType::Text);
            assert_eq!(columns[1].ty.length, Some(32));
            assert_eq!(primary_key.as_deref(), Some(&["id".to_string()][..]));
        }
        other => panic!("expected CreateTable, got {other:?}"),
    }

    match &stmts[1] {
        Statement::Insert {
            table,
            columns,
            values,
        } => {
            assert_eq!(table, "users");
            assert!(columns.is_none());
            assert_eq!(values.len(), 3);
        }
        other => panic!("expected Insert, got {other:?}"),
    }

    match &stmts[2] {
        Statement::Select {
            from,
            selection,
            columns,
            ..
        } => {
            assert_eq!(from.name, "users");
            assert_eq!(columns.len(), 2);
            let selection = selection.as_ref().expect("WHERE clause required");
            let display = format!("{selection:?}");
            assert!(display.contains("age"));
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn table_level_primary_key_constraint() {
    let stmts = parse_sql("CREATE TABLE t (a INT, b INT, PRIMARY KEY (a, b));").unwrap();
    match &stmts[0] {
        Statement::CreateTable { primary_key, .. } => {
            assert_eq!(primary_key.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        }
        other => panic!("expected CreateTable, got {other:?}"),
    }
}

#[test]
fn insert_with_explicit_column_list() {
    let stmts = parse_sql("INSERT INTO t (a, b) VALUES (1, 2);").unwrap();
    match &stmts[0] {
        Statement::Insert { columns, .. } => {
            assert_eq!(columns.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        }
        other => panic!("expected Insert, got {other:?}"),
    }
}

#[test]
fn select_with_join_and_alias() {
    let stmts = parse_sql(
        "SELECT o.id, c.name FROM orders o JOIN customers c ON o.customer_id = c.id WHERE c.name <> 'x';",
    )
    .unwrap();
    match &stmts[0] {
        Statement::Select { from, joins, .. } => {
            assert_eq!(from.name, "orders");
            assert_eq!(from.effective_name(), "o");
            assert_eq!(joins.len(), 1);
            assert_eq!(joins[0].join_type, JoinType::Inner);
            assert_eq!(joins[0].table.effective_name(), "c");
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn select_with_group_by_having_order_by() {
    let stmts = parse_sql(
        "SELECT dept, COUNT(*) FROM employees GROUP BY dept HAVING COUNT(*) > 1 ORDER BY dept DESC;",
    )
    .unwrap();
    match &stmts[0] {
        Statement::Select {
            group_by,
            having,
            order_by,
            columns,
            ..
        } => {
            assert_eq!(group_by, &["dept".to_string()]);
            assert!(having.is_some());
            assert_eq!(order_by.len(), 1);
            assert!(order_by[0].desc);
            match &columns[1] {
                SelectItem::Expr { expr: Expr::Function { name, star, .. }, .. } => {
                    assert_eq!(name, "COUNT");
                    assert!(star);
                }
                other => panic!("expected aggregate call, got {other:?}"),
            }
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn in_list_predicate() {
    let stmts = parse_sql("SELECT id FROM t WHERE id IN (1, 2, 3);").unwrap();
    match &stmts[0] {
        Statement::Select { selection, .. } => match selection.as_ref().unwrap() {
            Expr::InList { list, negated, .. } => {
                assert_eq!(list.len(), 3);
                assert!(!negated);
            }
            other => panic!("expected InList, got {other:?}"),
        },
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn not_in_list_predicate() {
    let stmts = parse_sql("SELECT id FROM t WHERE id NOT IN (1);").unwrap();
    match &stmts[0] {
        Statement::Select { selection, .. } => match selection.as_ref().unwrap() {
            Expr::InList { negated, .. } => assert!(negated),
            other => panic!("expected InList, got {other:?}"),
        },
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn drop_table_if_exists() {
    let stmts = parse_sql("DROP TABLE IF EXISTS t;").unwrap();
    match &stmts[0] {
        Statement::DropTable { if_exists, .. } => assert!(if_exists),
        other => panic!("expected DropTable, got {other:?}"),
    }
}

#[test]
fn drop_view_with_cascade() {
    let stmts = parse_sql("DROP VIEW IF EXISTS v CASCADE;").unwrap();
    match &stmts[0] {
        Statement::DropView {
            if_exists, cascade, ..
        } => {
            assert!(if_exists);
            assert!(cascade);
        }
        other => panic!("expected DropView, got {other:?}"),
    }
}

#[test]
fn create_unique_index() {
    let stmts = parse_sql("CREATE UNIQUE INDEX idx_name ON t (a, b);").unwrap();
    match &stmts[0] {
        Statement::CreateIndex { unique, columns, .. } => {
            assert!(unique);
            assert_eq!(columns.len(), 2);
        }
        other => panic!("expected CreateIndex, got {other:?}"),
    }
}

#[test]
fn explain_analyze_wraps_select() {
    let stmts = parse_sql("EXPLAIN ANALYZE SELECT id FROM t;").unwrap();
    match &stmts[0] {
        Statement::Explain { analyze, query } => {
            assert!(analyze);
            assert!(matches!(**query, Statement::Select { .. }));
        }
        other => panic!("expected Explain, got {other:?}"),
    }
}

#[test]
fn missing_select_list_is_syntax_error_with_position() {
    let err = parse_sql("SELECT FROM t;").unwrap_err();
    match err {
        DbError::Syntax {
            line,
            column,
            expected,
            ..
        } => {
            assert_eq!((line, column), (1, 8));
            assert_eq!(expected.as_deref(), Some("literal, identifier, function call, or '('"));
        }
        other => panic!("expected Syntax error, got {other:?}"),
    }
}

#[test]
fn varchar_requires_positive_length() {
    let err = parse_sql("CREATE TABLE t (a VARCHAR(0));").unwrap_err();
    assert!(matches!(err, DbError::Syntax { .. }));
}

#[test]
fn boolean_column_type() {
    let stmts = parse_sql("CREATE TABLE flags (id INT, active BOOLEAN);").unwrap();
    match &stmts[0] {
        Statement::CreateTable { columns, .. } => {
            assert_eq!(columns[1].ty.base, SqlType::Bool);
            assert_eq!(columns[1].ty.length, None);
        }
        other => panic!("expected CreateTable, got {other:?}"),
    }

    let stmts = parse_sql("CREATE TABLE flags2 (id INT, active BOOL);").unwrap();
    match &stmts[0] {
        Statement::CreateTable { columns, .. } => assert_eq!(columns[1].ty.base, SqlType::Bool),
        other => panic!("expected CreateTable, got {other:?}"),
    }
}

#[test]
fn update_statement() {
    let stmts = parse_sql("UPDATE t SET a = 1, b = 2 WHERE id = 5;").unwrap();
    match &stmts[0] {
        Statement::Update {
            table,
            assignments,
            selection,
        } => {
            assert_eq!(table, "t");
            assert_eq!(assignments.len(), 2);
            assert!(selection.is_some());
        }
        other => panic!("expected Update, got {other:?}"),
    }
}

#[test]
fn delete_statement() {
    let stmts = parse_sql("DELETE FROM t WHERE id = 1;").unwrap();
    match &stmts[0] {
        Statement::Delete { table, selection } => {
            assert_eq!(table, "t");
            assert!(selection.is_some());
        }
        other => panic!("expected Delete, got {other:?}"),
    }
}
