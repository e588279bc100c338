use std::cmp::Ordering;

use common::{DbError, DbResult, ExecutionStats, Row};
use planner::ResolvedOrderByExpr;
use types::Value;

use crate::{ExecutionContext, Executor};

/// Sorts `Null` before every other value, then orders by type: `Bool < Int <
/// Text`, a fallback ordering for values that should never actually meet in
/// a well-typed column.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Bool(_), _) => Ordering::Less,
        (_, Value::Bool(_)) => Ordering::Greater,
        (Value::Int(_), Value::Text(_)) => Ordering::Less,
        (Value::Text(_), Value::Int(_)) => Ordering::Greater,
    }
}

fn compare_rows(a: &Row, b: &Row, keys: &[ResolvedOrderByExpr]) -> Ordering {
    for key in keys {
        let av = a.values.get(key.column_id as usize).unwrap_or(&Value::Null);
        let bv = b.values.get(key.column_id as usize).unwrap_or(&Value::Null);
        let ord = compare_values(av, bv);
        let ord = if key.desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Materializes every input row on the first `next()` call, sorts them
/// (stably, so ties keep their input order), then yields them one at a time.
pub struct SortExec {
    input: Box<dyn Executor>,
    order_by: Vec<ResolvedOrderByExpr>,
    sorted: Option<std::vec::IntoIter<Row>>,
    stats: ExecutionStats,
}

impl SortExec {
    pub fn new(input: Box<dyn Executor>, order_by: Vec<ResolvedOrderByExpr>) -> Self {
        Self {
            input,
            order_by,
            sorted: None,
            stats: ExecutionStats::default(),
        }
    }

    fn materialize_and_sort(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut rows = Vec::new();
        while let Some(row) = self.input.next(ctx)? {
            rows.push(row);
        }
        rows.sort_by(|a, b| compare_rows(a, b, &self.order_by));
        self.sorted = Some(rows.into_iter());
        Ok(())
    }
}

impl Executor for SortExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.sorted.is_none() {
            self.materialize_and_sort(ctx)?;
        }
        let iter = self
            .sorted
            .as_mut()
            .ok_or_else(|| DbError::Executor("SortExec failed to materialize".into()))?;
        let next = iter.next();
        if next.is_some() {
            self.stats.rows_produced += 1;
        }
        Ok(next)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.sorted = None;
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

    fn mock_ctx() -> (ExecutionContext<'static>, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let catalog: &'static catalog::Catalog = Box::leak(Box::new(catalog::Catalog::new()));
        (ExecutionContext::new(catalog, temp.path()), temp)
    }

    #[test]
    fn sorts_ascending_by_default() {
        let (mut ctx, _temp) = mock_ctx();
        let input = MockExecutor {
            rows: vec![
                Row::new(vec![Value::Int(3)]),
                Row::new(vec![Value::Int(1)]),
                Row::new(vec![Value::Int(2)]),
            ],
            idx: 0,
            schema: vec!["n".into()],
        };
        let mut exec = SortExec::new(Box::new(input), vec![ResolvedOrderByExpr { column_id: 0, desc: false }]);
        exec.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = exec.next(&mut ctx).unwrap() {
            out.push(r.values[0].clone());
        }
        assert_eq!(out, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn sorts_descending() {
        let (mut ctx, _temp) = mock_ctx();
        let input = MockExecutor {
            rows: vec![Row::new(vec![Value::Int(1)]), Row::new(vec![Value::Int(3)])],
            idx: 0,
            schema: vec!["n".into()],
        };
        let mut exec = SortExec::new(Box::new(input), vec![ResolvedOrderByExpr { column_id: 0, desc: true }]);
        exec.open(&mut ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = exec.next(&mut ctx).unwrap() {
            out.push(r.values[0].clone());
        }
        assert_eq!(out, vec![Value::Int(3), Value::Int(1)]);
    }

    #[test]
    fn nulls_sort_first() {
        let (mut ctx, _temp) = mock_ctx();
        let input = MockExecutor {
            rows: vec![Row::new(vec![Value::Int(1)]), Row::new(vec![Value::Null])],
            idx: 0,
            schema: vec!["n".into()],
        };
        let mut exec = SortExec::new(Box::new(input), vec![ResolvedOrderByExpr { column_id: 0, desc: false }]);
        exec.open(&mut ctx).unwrap();
        let first = exec.next(&mut ctx).unwrap().unwrap();
        assert_eq!(first.values[0], Value::Null);
    }
}
