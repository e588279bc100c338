use common::{DbError, DbResult, ExecutionStats, Row};
use expr::{BinaryOp, UnaryOp};
use planner::ResolvedExpr;
use types::Value;

use crate::{ExecutionContext, Executor};

/// Evaluates a resolved, column-ordinal-bound expression against a materialized row.
pub fn eval_resolved_expr(expr: &ResolvedExpr, row: &Row) -> DbResult<Value> {
    match expr {
        ResolvedExpr::Literal(v) => Ok(v.clone()),
        ResolvedExpr::Column(col) => row
            .values
            .get(*col as usize)
            .cloned()
            .ok_or_else(|| DbError::Executor(format!("column ordinal {col} out of bounds"))),
        ResolvedExpr::Unary { op, expr } => {
            let v = eval_resolved_expr(expr, row)?;
            eval_unary_op(*op, v)
        }
        ResolvedExpr::Binary { left, op, right } => {
            let l = eval_resolved_expr(left, row)?;
            let r = eval_resolved_expr(right, row)?;
            eval_binary_op(l, *op, r)
        }
        ResolvedExpr::InList { expr, list, negated } => {
            let v = eval_resolved_expr(expr, row)?;
            if v == Value::Null {
                return Ok(Value::Null);
            }
            let mut found = false;
            for item in list {
                let iv = eval_resolved_expr(item, row)?;
                if v.eq_same_type(&iv) == Some(true) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
    }
}

fn eval_unary_op(op: UnaryOp, val: Value) -> DbResult<Value> {
    match op {
        UnaryOp::Not => match val {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(DbError::Executor(format!("NOT expects bool, got {other:?}"))),
        },
    }
}

fn eval_binary_op(left: Value, op: BinaryOp, right: Value) -> DbResult<Value> {
    use BinaryOp::*;

    if matches!(op, And | Or) {
        return match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(match op {
                And => *l && *r,
                Or => *l || *r,
                _ => unreachable!(),
            })),
            _ => Err(DbError::Executor(format!(
                "AND/OR expect bools, got {left:?}, {right:?}"
            ))),
        };
    }

    if left == Value::Null || right == Value::Null {
        return Ok(Value::Null);
    }

    let ord = left.cmp_same_type(&right).ok_or_else(|| {
        DbError::Executor(format!("incompatible types for {op:?}: {left:?}, {right:?}"))
    })?;

    let result = match op {
        Eq => ord == std::cmp::Ordering::Equal,
        Ne => ord != std::cmp::Ordering::Equal,
        Lt => ord == std::cmp::Ordering::Less,
        Le => ord != std::cmp::Ordering::Greater,
        Gt => ord == std::cmp::Ordering::Greater,
        Ge => ord != std::cmp::Ordering::Less,
        And | Or => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// Evaluates `predicate` against each row from `input`, passing through rows
/// for which it evaluates to `true`. NULL and `false` are both rejected.
pub struct FilterExec {
    input: Box<dyn Executor>,
    predicate: ResolvedExpr,
    stats: ExecutionStats,
}

impl FilterExec {
    pub fn new(input: Box<dyn Executor>, predicate: ResolvedExpr) -> Self {
        Self {
            input,
            predicate,
            stats: ExecutionStats::default(),
        }
    }
}

impl Executor for FilterExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        while let Some(row) = self.input.next(ctx)? {
            let keep = eval_resolved_expr(&self.predicate, &row)?.as_bool().unwrap_or(false);
            if keep {
                self.stats.rows_produced += 1;
                return Ok(Some(row));
            }
            self.stats.rows_filtered += 1;
        }
        Ok(None)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner::ResolvedExpr as RE;

    fn row(values: Vec<Value>) -> Row {
        Row::new(values)
    }

    #[test]
    fn literal_evaluates_to_itself() {
        let r = row(vec![Value::Int(1)]);
        assert_eq!(eval_resolved_expr(&RE::Literal(Value::Int(5)), &r).unwrap(), Value::Int(5));
    }

    #[test]
    fn column_reads_by_ordinal() {
        let r = row(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(eval_resolved_expr(&RE::Column(1), &r).unwrap(), Value::Text("a".into()));
    }

    #[test]
    fn column_out_of_bounds_errors() {
        let r = row(vec![Value::Int(1)]);
        assert!(eval_resolved_expr(&RE::Column(9), &r).is_err());
    }

    #[test]
    fn not_negates_bool() {
        let r = row(vec![]);
        let e = RE::Unary { op: UnaryOp::Not, expr: Box::new(RE::Literal(Value::Bool(true))) };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Bool(false));
    }

    #[test]
    fn not_on_null_is_null() {
        let r = row(vec![]);
        let e = RE::Unary { op: UnaryOp::Not, expr: Box::new(RE::Literal(Value::Null)) };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn binary_eq_compares_same_type() {
        let r = row(vec![]);
        let e = RE::Binary {
            left: Box::new(RE::Literal(Value::Int(1))),
            op: BinaryOp::Eq,
            right: Box::new(RE::Literal(Value::Int(1))),
        };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn binary_null_propagates() {
        let r = row(vec![]);
        let e = RE::Binary {
            left: Box::new(RE::Literal(Value::Null)),
            op: BinaryOp::Eq,
            right: Box::new(RE::Literal(Value::Int(1))),
        };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn binary_cross_type_is_error() {
        let r = row(vec![]);
        let e = RE::Binary {
            left: Box::new(RE::Literal(Value::Int(1))),
            op: BinaryOp::Eq,
            right: Box::new(RE::Literal(Value::Text("1".into()))),
        };
        assert!(eval_resolved_expr(&e, &r).is_err());
    }

    #[test]
    fn in_list_matches_any_member() {
        let r = row(vec![]);
        let e = RE::InList {
            expr: Box::new(RE::Literal(Value::Int(2))),
            list: vec![RE::Literal(Value::Int(1)), RE::Literal(Value::Int(2))],
            negated: false,
        };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn not_in_list_negates() {
        let r = row(vec![]);
        let e = RE::InList {
            expr: Box::new(RE::Literal(Value::Int(3))),
            list: vec![RE::Literal(Value::Int(1)), RE::Literal(Value::Int(2))],
            negated: true,
        };
        assert_eq!(eval_resolved_expr(&e, &r).unwrap(), Value::Bool(true));
    }

    struct MockExecutor {
        rows: Vec<Row>,
        idx: usize,
        schema: Vec<String>,
    }

    impl Executor for MockExecutor {
        fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
            Ok(())
        }
        fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
            if self.idx < self.rows.len() {
                let r = self.rows[self.idx].clone();
                self.idx += 1;
                Ok(Some(r))
            } else {
                Ok(None)
            }
        }
        fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
            Ok(())
        }
        fn schema(&self) -> &[String] {
            &self.schema
        }
    }

    fn mock_ctx() -> (ExecutionContext<'static>, tempfile::TempDir, &'static catalog::Catalog) {
        let temp = tempfile::tempdir().unwrap();
        let catalog: &'static catalog::Catalog = Box::leak(Box::new(catalog::Catalog::new()));
        let ctx = ExecutionContext::new(catalog, temp.path());
        (ctx, temp, catalog)
    }

    #[test]
    fn filter_exec_keeps_matching_rows() {
        let (mut ctx, _temp, _cat) = mock_ctx();
        let input = MockExecutor {
            rows: vec![
                row(vec![Value::Bool(true)]),
                row(vec![Value::Bool(false)]),
                row(vec![Value::Bool(true)]),
            ],
            idx: 0,
            schema: vec!["active".into()],
        };
        let mut exec = FilterExec::new(Box::new(input), RE::Column(0));
        exec.open(&mut ctx).unwrap();
        let mut count = 0;
        while exec.next(&mut ctx).unwrap().is_some() {
            count += 1;
        }
        exec.close(&mut ctx).unwrap();
        assert_eq!(count, 2);
        assert_eq!(exec.stats().unwrap().rows_produced, 2);
        assert_eq!(exec.stats().unwrap().rows_filtered, 1);
    }

    #[test]
    fn filter_exec_null_predicate_excludes_row() {
        let (mut ctx, _temp, _cat) = mock_ctx();
        let input = MockExecutor {
            rows: vec![row(vec![Value::Null])],
            idx: 0,
            schema: vec!["active".into()],
        };
        let mut exec = FilterExec::new(Box::new(input), RE::Column(0));
        exec.open(&mut ctx).unwrap();
        assert!(exec.next(&mut ctx).unwrap().is_none());
    }
}
