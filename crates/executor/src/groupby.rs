use std::collections::HashMap;

use common::{ColumnId, DbError, DbResult, ExecutionStats, Row};
use planner::{AggregateFunc, ResolvedAggregate};
use types::Value;

use crate::{ExecutionContext, Executor};

fn compute_aggregate(func: AggregateFunc, arg: Option<ColumnId>, group: &[Row]) -> DbResult<Value> {
    match func {
        AggregateFunc::Count => {
            let count = match arg {
                None => group.len(),
                Some(col) => group
                    .iter()
                    .filter(|r| !matches!(r.values.get(col as usize), Some(Value::Null) | None))
                    .count(),
            };
            Ok(Value::Int(count as i64))
        }
        AggregateFunc::Sum | AggregateFunc::Avg | AggregateFunc::Max | AggregateFunc::Min => {
            let col = arg.ok_or_else(|| {
                DbError::Executor(format!("{func:?} requires an argument column"))
            })?;
            let values: Vec<i64> = group
                .iter()
                .filter_map(|r| match r.values.get(col as usize) {
                    Some(Value::Int(n)) => Some(*n),
                    _ => None,
                })
                .collect();
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let result = match func {
                AggregateFunc::Sum => values.iter().sum::<i64>(),
                AggregateFunc::Avg => values.iter().sum::<i64>() / values.len() as i64,
                AggregateFunc::Max => *values.iter().max().unwrap(),
                AggregateFunc::Min => *values.iter().min().unwrap(),
                AggregateFunc::Count => unreachable!(),
            };
            Ok(Value::Int(result))
        }
    }
}

/// Groups input rows by `keys` (an empty key list groups the whole input into
/// a single bucket) and evaluates each aggregate per group. Output rows are
/// `keys.len() + aggregates.len()` wide, group columns first.
pub struct GroupByExec {
    input: Box<dyn Executor>,
    keys: Vec<ColumnId>,
    aggregates: Vec<ResolvedAggregate>,
    schema: Vec<String>,
    output: Option<std::vec::IntoIter<Row>>,
    stats: ExecutionStats,
}

impl GroupByExec {
    pub fn new(
        input: Box<dyn Executor>,
        keys: Vec<ColumnId>,
        aggregates: Vec<ResolvedAggregate>,
        schema: Vec<String>,
    ) -> Self {
        Self {
            input,
            keys,
            aggregates,
            schema,
            output: None,
            stats: ExecutionStats::default(),
        }
    }

    fn materialize(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();

        while let Some(row) = self.input.next(ctx)? {
            let key: Vec<Value> = self.keys.iter().map(|c| row.values[*c as usize].clone()).collect();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }

        let mut rows = Vec::with_capacity(order.len().max(1));
        if order.is_empty() && self.keys.is_empty() {
            // A whole-table aggregate over zero rows still produces one row
            // (e.g. COUNT(*) = 0), matching standard SQL aggregate semantics.
            let mut values = Vec::new();
            for agg in &self.aggregates {
                values.push(compute_aggregate(agg.func, agg.arg, &[])?);
            }
            rows.push(Row::new(values));
        } else {
            for key in order {
                let group = &groups[&key];
                let mut values = key.clone();
                for agg in &self.aggregates {
                    values.push(compute_aggregate(agg.func, agg.arg, group)?);
                }
                rows.push(Row::new(values));
            }
        }

        self.output = Some(rows.into_iter());
        Ok(())
    }
}

impl Executor for GroupByExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.output.is_none() {
            self.materialize(ctx)?;
        }
        let iter = self
            .output
            .as_mut()
            .ok_or_else(|| DbError::Executor("GroupByExec failed to materialize".into()))?;
        let next = iter.next();
        if next.is_some() {
            self.stats.rows_produced += 1;
        }
        Ok(next)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output = None;
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}
