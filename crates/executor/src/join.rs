use common::{DbResult, ExecutionStats, Row};
use parser::JoinType;
use planner::ResolvedExpr;
use types::Value;

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};

/// Nested-loop join: materializes the right side once in `open()`, then for
/// each left row scans the whole materialized right side evaluating
/// `condition`. `Left`/`Right` additionally emit an all-NULL-padded row for an
/// outer side that never matched; `Cross` ignores `condition` and pairs every
/// row. Joined rows carry no single originating rid.
pub struct NestedLoopJoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    join_type: JoinType,
    condition: ResolvedExpr,
    schema: Vec<String>,
    right_schema_len: usize,
    current_left_row: Option<Row>,
    left_row_matched: bool,
    right_materialized: Vec<Row>,
    right_cursor: usize,
    stats: ExecutionStats,
}

impl NestedLoopJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        join_type: JoinType,
        condition: ResolvedExpr,
        schema: Vec<String>,
    ) -> Self {
        let right_schema_len = right.schema().len();
        Self {
            left,
            right,
            join_type,
            condition,
            schema,
            right_schema_len,
            current_left_row: None,
            left_row_matched: false,
            right_materialized: Vec::new(),
            right_cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    fn combine_rows(&self, left: &Row, right: &Row) -> Row {
        let mut values = left.values.clone();
        values.extend(right.values.clone());
        Row::new(values)
    }

    fn padded_with_nulls(&self, left: &Row) -> Row {
        let mut values = left.values.clone();
        values.extend(std::iter::repeat(Value::Null).take(self.right_schema_len));
        Row::new(values)
    }

    fn eval_condition(&self, row: &Row) -> DbResult<bool> {
        Ok(eval_resolved_expr(&self.condition, row)?.as_bool().unwrap_or(false))
    }

    fn advance_left(&mut self, ctx: &mut ExecutionContext) -> DbResult<bool> {
        self.current_left_row = self.left.next(ctx)?;
        self.left_row_matched = false;
        self.right_cursor = 0;
        Ok(self.current_left_row.is_some())
    }
}

impl Executor for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;

        let mut rows = Vec::new();
        while let Some(row) = self.right.next(ctx)? {
            rows.push(row);
        }
        self.right_materialized = rows;

        self.advance_left(ctx)?;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        loop {
            let Some(left_row) = self.current_left_row.clone() else {
                return Ok(None);
            };

            if matches!(self.join_type, JoinType::Cross) {
                if self.right_cursor < self.right_materialized.len() {
                    let right_row = self.right_materialized[self.right_cursor].clone();
                    self.right_cursor += 1;
                    self.stats.rows_produced += 1;
                    return Ok(Some(self.combine_rows(&left_row, &right_row)));
                }
                self.advance_left(ctx)?;
                continue;
            }

            while self.right_cursor < self.right_materialized.len() {
                let right_row = self.right_materialized[self.right_cursor].clone();
                self.right_cursor += 1;
                let combined = self.combine_rows(&left_row, &right_row);
                if self.eval_condition(&combined)? {
                    self.left_row_matched = true;
                    self.stats.rows_produced += 1;
                    return Ok(Some(combined));
                }
            }

            let emit_unmatched = matches!(self.join_type, JoinType::Left | JoinType::Right) && !self.left_row_matched;
            let unmatched_row = if emit_unmatched { Some(self.padded_with_nulls(&left_row)) } else { None };

            if !self.advance_left(ctx)? && unmatched_row.is_none() {
                return Ok(None);
            }
            if let Some(row) = unmatched_row {
                self.stats.rows_produced += 1;
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.current_left_row = None;
        self.right_materialized.clear();
        self.left.close(ctx)?;
        self.right.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}
