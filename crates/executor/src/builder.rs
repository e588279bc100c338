use common::DbResult;
use planner::PhysicalPlan;

use crate::dml::{DeleteExec, InsertExec, UpdateExec};
use crate::filter::FilterExec;
use crate::groupby::GroupByExec;
use crate::join::NestedLoopJoinExec;
use crate::project::ProjectExec;
use crate::scan::{IndexScanExec, SeqScanExec};
use crate::sort::SortExec;
use crate::Executor;

/// Builds the schema a table's rows carry when scanned in full, used to
/// synthesize the scan `UPDATE`/`DELETE` run underneath their own predicate.
/// `Update`/`Delete` physical plans only carry a `table_id` and an optional
/// predicate, not a sub-plan, so the scan has to be assembled here.
fn table_schema(catalog: &catalog::Catalog, table_id: common::TableId) -> DbResult<Vec<String>> {
    let table = catalog.table_by_id(table_id)?;
    Ok(table.schema.columns.iter().map(|c| c.name.clone()).collect())
}

/// Turns a `PhysicalPlan` into the executor tree that runs it.
///
/// `catalog` is needed only to recover the schema for the `SeqScan`
/// `Update`/`Delete` synthesize internally; every other variant carries
/// everything it needs in the plan itself.
pub fn build_executor(plan: PhysicalPlan, catalog: &catalog::Catalog) -> DbResult<Box<dyn Executor>> {
    match plan {
        PhysicalPlan::SeqScan { table_id, schema } => Ok(Box::new(SeqScanExec::new(table_id, schema))),
        PhysicalPlan::IndexScan { table_id, index_name, predicate, schema } => {
            Ok(Box::new(IndexScanExec::new(table_id, index_name, predicate, schema)))
        }
        PhysicalPlan::Filter { input, predicate } => {
            let input = build_executor(*input, catalog)?;
            Ok(Box::new(FilterExec::new(input, predicate)))
        }
        PhysicalPlan::Project { input, columns } => {
            let input = build_executor(*input, catalog)?;
            Ok(Box::new(ProjectExec::new(input, columns)))
        }
        PhysicalPlan::GroupBy { input, keys, aggregates, schema } => {
            let input = build_executor(*input, catalog)?;
            Ok(Box::new(GroupByExec::new(input, keys, aggregates, schema)))
        }
        PhysicalPlan::Sort { input, order_by } => {
            let input = build_executor(*input, catalog)?;
            Ok(Box::new(SortExec::new(input, order_by)))
        }
        PhysicalPlan::Insert { table_id, values } => Ok(Box::new(InsertExec::new(table_id, values))),
        PhysicalPlan::Update { table_id, assignments, predicate } => {
            let schema = table_schema(catalog, table_id)?;
            let scan: Box<dyn Executor> = Box::new(SeqScanExec::new(table_id, schema));
            let input = match predicate {
                Some(p) => Box::new(FilterExec::new(scan, p)) as Box<dyn Executor>,
                None => scan,
            };
            Ok(Box::new(UpdateExec::new(table_id, assignments, input)))
        }
        PhysicalPlan::Delete { table_id, predicate } => {
            let schema = table_schema(catalog, table_id)?;
            let scan: Box<dyn Executor> = Box::new(SeqScanExec::new(table_id, schema));
            let input = match predicate {
                Some(p) => Box::new(FilterExec::new(scan, p)) as Box<dyn Executor>,
                None => scan,
            };
            Ok(Box::new(DeleteExec::new(table_id, input)))
        }
        PhysicalPlan::NestedLoopJoin { left, right, join_type, condition, schema } => {
            let left = build_executor(*left, catalog)?;
            let right = build_executor(*right, catalog)?;
            Ok(Box::new(NestedLoopJoinExec::new(left, right, join_type, condition, schema)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Catalog, Column};
    use planner::ResolvedExpr;
    use types::{TypeSpec, Value};

    fn setup() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                "users",
                vec![Column::new("id", TypeSpec::int()), Column::new("name", TypeSpec::varchar(32))],
                vec!["id".into()],
            )
            .unwrap();
        catalog
    }

    #[test]
    fn builds_seq_scan() {
        let catalog = setup();
        let plan = PhysicalPlan::SeqScan { table_id: common::TableId(1), schema: vec!["id".into(), "name".into()] };
        let exec = build_executor(plan, &catalog).unwrap();
        assert_eq!(exec.schema(), &["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn builds_delete_with_synthesized_scan() {
        let catalog = setup();
        let plan = PhysicalPlan::Delete {
            table_id: common::TableId(1),
            predicate: Some(ResolvedExpr::Literal(Value::Bool(true))),
        };
        let exec = build_executor(plan, &catalog).unwrap();
        assert!(exec.schema().is_empty());
    }
}
