use super::*;
use common::Row;
use types::Value::*;

fn schema(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|s| s.to_string()).collect()
}

fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        name: name.into(),
    }
}

#[test]
fn eval_literals_and_columns() {
    let row = Row::new(vec![Int(1), Text("Will".into()), Bool(true)]);
    let schema = schema(&["id", "name", "active"]);
    let ctx = EvalContext { schema: &schema };

    assert_eq!(ctx.eval(&Expr::Literal(Int(42)), &row).unwrap(), Int(42));
    assert_eq!(ctx.eval(&col("name"), &row).unwrap(), Text("Will".into()));
}

#[test]
fn eval_qualified_column() {
    let row = Row::new(vec![Int(1)]);
    let schema = vec!["t.id".to_string()];
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::Column {
        table: Some("t".into()),
        name: "id".into(),
    };
    assert_eq!(ctx.eval(&expr, &row).unwrap(), Int(1));
}

#[test]
fn eval_comparisons() {
    let row = Row::new(vec![Int(10), Int(20)]);
    let schema = schema(&["a", "b"]);
    let ctx = EvalContext { schema: &schema };

    let lt = Expr::Binary {
        left: Box::new(col("a")),
        op: BinaryOp::Lt,
        right: Box::new(col("b")),
    };
    assert_eq!(ctx.eval(&lt, &row).unwrap(), Bool(true));
}

#[test]
fn eval_logical_ops() {
    let row = Row::new(vec![Bool(true), Bool(false)]);
    let schema = schema(&["x", "y"]);
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::Binary {
        left: Box::new(col("x")),
        op: BinaryOp::And,
        right: Box::new(col("y")),
    };
    assert_eq!(ctx.eval(&expr, &row).unwrap(), Bool(false));
}

#[test]
fn not_operator() {
    let row = Row::new(vec![Bool(false)]);
    let schema = schema(&["f"]);
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::Unary {
        op: UnaryOp::Not,
        expr: Box::new(col("f")),
    };
    assert_eq!(ctx.eval(&expr, &row).unwrap(), Bool(true));
}

#[test]
fn mismatched_types_fail() {
    let row = Row::new(vec![Int(1), Text("hi".into())]);
    let schema = schema(&["a", "b"]);
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::Binary {
        left: Box::new(col("a")),
        op: BinaryOp::Eq,
        right: Box::new(col("b")),
    };

    let err = ctx.eval(&expr, &row).unwrap_err();
    assert!(format!("{err:?}").contains("incompatible types"));
}

#[test]
fn in_list_membership() {
    let row = Row::new(vec![Int(5)]);
    let schema = schema(&["id"]);
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::InList {
        expr: Box::new(col("id")),
        list: vec![Expr::Literal(Int(1)), Expr::Literal(Int(5))],
        negated: false,
    };
    assert_eq!(ctx.eval(&expr, &row).unwrap(), Bool(true));
}

#[test]
fn not_in_list_membership() {
    let row = Row::new(vec![Int(5)]);
    let schema = schema(&["id"]);
    let ctx = EvalContext { schema: &schema };

    let expr = Expr::InList {
        expr: Box::new(col("id")),
        list: vec![Expr::Literal(Int(1))],
        negated: true,
    };
    assert_eq!(ctx.eval(&expr, &row).unwrap(), Bool(true));
}

#[test]
fn aggregate_call_detection() {
    let count_star = Expr::Function {
        name: "COUNT".into(),
        args: vec![],
        star: true,
    };
    assert!(count_star.is_aggregate_call());

    let plain_call = Expr::Function {
        name: "UPPER".into(),
        args: vec![col("name")],
        star: false,
    };
    assert!(!plain_call.is_aggregate_call());
}

#[test]
fn function_eval_is_executor_responsibility() {
    let row = Row::new(vec![]);
    let schema: Vec<String> = vec![];
    let ctx = EvalContext { schema: &schema };
    let expr = Expr::Function {
        name: "COUNT".into(),
        args: vec![],
        star: true,
    };
    assert!(ctx.eval(&expr, &row).is_err());
}
