use buffer::HeapTable;
use catalog::IndexMeta;
use common::{ColumnId, DbResult, ExecutionStats, RecordId, Row, TableId};
use planner::ResolvedExpr;
use types::Value;

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};

fn index_key(index: &IndexMeta, values: &[Value]) -> Vec<Value> {
    index.columns.iter().map(|col| values[*col as usize].clone()).collect()
}

fn insert_into_indexes(ctx: &mut ExecutionContext, indexes: &[IndexMeta], values: &[Value], rid: RecordId) -> DbResult<()> {
    for index in indexes {
        let key = index_key(index, values);
        match index.kind {
            catalog::IndexKind::BTree => ctx.btree_index(index)?.insert(key, rid)?,
            catalog::IndexKind::Hash => ctx.hash_index(index)?.insert(key, rid)?,
        }
    }
    Ok(())
}

fn remove_from_indexes(ctx: &mut ExecutionContext, indexes: &[IndexMeta], values: &[Value], rid: RecordId) -> DbResult<()> {
    for index in indexes {
        let key = index_key(index, values);
        match index.kind {
            catalog::IndexKind::BTree => {
                ctx.btree_index(index)?.delete(&key, rid)?;
            }
            catalog::IndexKind::Hash => {
                ctx.hash_index(index)?.delete(&key, rid)?;
            }
        }
    }
    Ok(())
}

/// Inserts a single row built from resolved, literal-bound value expressions,
/// maintaining every index on the table. Yields one row holding the count `1`.
pub struct InsertExec {
    table_id: TableId,
    values: Vec<ResolvedExpr>,
    done: bool,
}

impl InsertExec {
    pub fn new(table_id: TableId, values: Vec<ResolvedExpr>) -> Self {
        Self { table_id, values, done: false }
    }
}

impl Executor for InsertExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let empty = Row::new(Vec::new());
        let values = self
            .values
            .iter()
            .map(|expr| eval_resolved_expr(expr, &empty))
            .collect::<DbResult<Vec<_>>>()?;

        let row = Row::new(values.clone());
        let mut heap = ctx.heap_table(self.table_id)?;
        let rid = heap.insert(&row)?;
        heap.flush()?;

        let indexes = ctx.catalog.table_by_id(self.table_id)?.indexes().to_vec();
        insert_into_indexes(ctx, &indexes, &values, rid)?;

        Ok(Some(Row::new(vec![Value::Int(1)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &[]
    }
}

/// Applies `assignments` to every row the wrapped child (a seq scan, optionally
/// filtered) produces, updating the heap entry and every index whose key
/// changed. Yields one row holding the number of rows updated.
pub struct UpdateExec {
    table_id: TableId,
    assignments: Vec<(ColumnId, ResolvedExpr)>,
    input: Box<dyn Executor>,
    done: bool,
}

impl UpdateExec {
    pub fn new(table_id: TableId, assignments: Vec<(ColumnId, ResolvedExpr)>, input: Box<dyn Executor>) -> Self {
        Self { table_id, assignments, input, done: false }
    }
}

impl Executor for UpdateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let indexes = ctx.catalog.table_by_id(self.table_id)?.indexes().to_vec();
        let mut count: u64 = 0;
        let mut heap = ctx.heap_table(self.table_id)?;

        while let Some(old_row) = self.input.next(ctx)? {
            let Some(rid) = old_row.rid() else {
                continue;
            };
            let mut new_values = old_row.values.clone();
            for (col, expr) in &self.assignments {
                new_values[*col as usize] = eval_resolved_expr(expr, &old_row)?;
            }
            let new_row = Row::new(new_values.clone());
            let new_rid = heap.update(rid, &new_row)?;

            for index in &indexes {
                let old_key = index_key(index, &old_row.values);
                let new_key = index_key(index, &new_values);
                if old_key != new_key {
                    match index.kind {
                        catalog::IndexKind::BTree => {
                            let mut b = ctx.btree_index(index)?;
                            b.delete(&old_key, rid)?;
                            b.insert(new_key, new_rid)?;
                        }
                        catalog::IndexKind::Hash => {
                            let mut h = ctx.hash_index(index)?;
                            h.delete(&old_key, rid)?;
                            h.insert(new_key, new_rid)?;
                        }
                    }
                }
            }
            count += 1;
        }
        heap.flush()?;

        Ok(Some(Row::new(vec![Value::Int(count as i64)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &[]
    }
}

/// Deletes every row the wrapped child (a seq scan, optionally filtered)
/// produces, along with its index entries. Yields one row holding the number
/// of rows deleted.
pub struct DeleteExec {
    table_id: TableId,
    input: Box<dyn Executor>,
    done: bool,
}

impl DeleteExec {
    pub fn new(table_id: TableId, input: Box<dyn Executor>) -> Self {
        Self { table_id, input, done: false }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let indexes = ctx.catalog.table_by_id(self.table_id)?.indexes().to_vec();
        let mut count: u64 = 0;
        let mut heap = ctx.heap_table(self.table_id)?;

        while let Some(row) = self.input.next(ctx)? {
            let Some(rid) = row.rid() else {
                continue;
            };
            heap.delete(rid)?;
            remove_from_indexes(ctx, &indexes, &row.values, rid)?;
            count += 1;
        }
        heap.flush()?;

        Ok(Some(Row::new(vec![Value::Int(count as i64)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::SeqScanExec;
    use catalog::{Catalog, Column, IndexKind};
    use types::TypeSpec;

    fn setup() -> (Catalog, tempfile::TempDir) {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                "users",
                vec![Column::new("id", TypeSpec::int()), Column::new("name", TypeSpec::varchar(32))],
                vec!["id".into()],
            )
            .unwrap();
        let temp = tempfile::tempdir().unwrap();
        (catalog, temp)
    }

    #[test]
    fn insert_writes_row_and_returns_one() {
        let (catalog, temp) = setup();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());
        let mut exec = InsertExec::new(
            TableId(1),
            vec![ResolvedExpr::Literal(Value::Int(1)), ResolvedExpr::Literal(Value::Text("alice".into()))],
        );
        exec.open(&mut ctx).unwrap();
        let result = exec.next(&mut ctx).unwrap().unwrap();
        assert_eq!(result.values, vec![Value::Int(1)]);

        let mut scan = SeqScanExec::new(TableId(1), vec!["id".into(), "name".into()]);
        scan.open(&mut ctx).unwrap();
        let row = scan.next(&mut ctx).unwrap().unwrap();
        assert_eq!(row.values, vec![Value::Int(1), Value::Text("alice".into())]);
    }

    #[test]
    fn insert_maintains_index() {
        let (mut catalog, temp) = setup();
        catalog.create_index("users", "idx_id", &["id"], IndexKind::BTree, true).unwrap();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());
        let mut exec = InsertExec::new(
            TableId(1),
            vec![ResolvedExpr::Literal(Value::Int(7)), ResolvedExpr::Literal(Value::Text("bob".into()))],
        );
        exec.open(&mut ctx).unwrap();
        exec.next(&mut ctx).unwrap();

        let table = ctx.catalog.table("users").unwrap();
        let index = table.index("idx_id").unwrap();
        let mut btree = ctx.btree_index(index).unwrap();
        let found = btree.search(&[Value::Int(7)]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn delete_removes_row_and_index_entry() {
        let (mut catalog, temp) = setup();
        catalog.create_index("users", "idx_id", &["id"], IndexKind::BTree, true).unwrap();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());

        let mut insert = InsertExec::new(
            TableId(1),
            vec![ResolvedExpr::Literal(Value::Int(1)), ResolvedExpr::Literal(Value::Text("alice".into()))],
        );
        insert.open(&mut ctx).unwrap();
        insert.next(&mut ctx).unwrap();

        let scan = SeqScanExec::new(TableId(1), vec!["id".into(), "name".into()]);
        let mut delete = DeleteExec::new(TableId(1), Box::new(scan));
        delete.open(&mut ctx).unwrap();
        let result = delete.next(&mut ctx).unwrap().unwrap();
        assert_eq!(result.values, vec![Value::Int(1)]);

        let table = ctx.catalog.table("users").unwrap();
        let index = table.index("idx_id").unwrap();
        let mut btree = ctx.btree_index(index).unwrap();
        assert!(btree.search(&[Value::Int(1)]).unwrap().is_empty());
    }

    #[test]
    fn update_changes_values_and_index_key() {
        let (mut catalog, temp) = setup();
        catalog.create_index("users", "idx_id", &["id"], IndexKind::BTree, true).unwrap();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());

        let mut insert = InsertExec::new(
            TableId(1),
            vec![ResolvedExpr::Literal(Value::Int(1)), ResolvedExpr::Literal(Value::Text("alice".into()))],
        );
        insert.open(&mut ctx).unwrap();
        insert.next(&mut ctx).unwrap();

        let scan = SeqScanExec::new(TableId(1), vec!["id".into(), "name".into()]);
        let mut update = UpdateExec::new(TableId(1), vec![(0, ResolvedExpr::Literal(Value::Int(2)))], Box::new(scan));
        update.open(&mut ctx).unwrap();
        let result = update.next(&mut ctx).unwrap().unwrap();
        assert_eq!(result.values, vec![Value::Int(1)]);

        let table = ctx.catalog.table("users").unwrap();
        let index = table.index("idx_id").unwrap();
        let mut btree = ctx.btree_index(index).unwrap();
        assert!(btree.search(&[Value::Int(1)]).unwrap().is_empty());
        assert_eq!(btree.search(&[Value::Int(2)]).unwrap().len(), 1);
    }
}
