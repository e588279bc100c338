use common::{DbResult, ExecutionStats, Row};
use planner::ResolvedExpr;

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};

/// Evaluates each projection expression against every input row, producing a
/// new row with the given output names. The rid, if any, is preserved so a
/// plain column-only projection still identifies the underlying record.
pub struct ProjectExec {
    input: Box<dyn Executor>,
    projections: Vec<(String, ResolvedExpr)>,
    schema: Vec<String>,
    stats: ExecutionStats,
}

impl ProjectExec {
    pub fn new(input: Box<dyn Executor>, projections: Vec<(String, ResolvedExpr)>) -> Self {
        let schema = projections.iter().map(|(name, _)| name.clone()).collect();
        Self {
            input,
            projections,
            schema,
            stats: ExecutionStats::default(),
        }
    }
}

impl Executor for ProjectExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let Some(row) = self.input.next(ctx)? else {
            return Ok(None);
        };
        let rid = row.rid();
        let mut values = Vec::with_capacity(self.projections.len());
        for (_, expr) in &self.projections {
            values.push(eval_resolved_expr(expr, &row)?);
        }
        let mut projected = Row::new(values);
        projected.set_rid(rid);
        self.stats.rows_produced += 1;
        Ok(Some(projected))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}
