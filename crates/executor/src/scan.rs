use buffer::HeapTable;
use catalog::IndexKind;
use common::{DbError, DbResult, ExecutionStats, RecordId, Row, TableId};
use planner::{IndexPredicate, ResolvedExpr};

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};

/// Materializes every live row of a table's heap file, in page/slot order.
pub struct SeqScanExec {
    table_id: TableId,
    schema: Vec<String>,
    rows: Option<std::vec::IntoIter<(RecordId, Row)>>,
    stats: ExecutionStats,
}

impl SeqScanExec {
    pub fn new(table_id: TableId, schema: Vec<String>) -> Self {
        Self {
            table_id,
            schema,
            rows: None,
            stats: ExecutionStats::default(),
        }
    }
}

impl Executor for SeqScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut heap = ctx.heap_table(self.table_id)?;
        let rows = heap.scan()?;
        self.stats.pages_scanned = rows
            .iter()
            .map(|(rid, _)| rid.page_id.0)
            .collect::<std::collections::HashSet<_>>()
            .len() as u64;
        self.rows = Some(rows.into_iter());
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let Some(iter) = self.rows.as_mut() else {
            return Err(DbError::Executor("SeqScanExec::next called before open".into()));
        };
        match iter.next() {
            Some((rid, mut row)) => {
                row.set_rid(Some(rid));
                self.stats.rows_produced += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.rows = None;
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

/// Looks up matching record ids through a named index, then fetches each row
/// from the heap file. Dispatches to a B+Tree or hash index depending on the
/// index's own kind, and to the predicate variant (`Eq`/`CompositeEq`/`Range`)
/// the planner selected.
pub struct IndexScanExec {
    table_id: TableId,
    index_name: String,
    predicate: IndexPredicate,
    schema: Vec<String>,
    matching_rids: Option<std::vec::IntoIter<RecordId>>,
    stats: ExecutionStats,
}

impl IndexScanExec {
    pub fn new(table_id: TableId, index_name: String, predicate: IndexPredicate, schema: Vec<String>) -> Self {
        Self {
            table_id,
            index_name,
            predicate,
            schema,
            matching_rids: None,
            stats: ExecutionStats::default(),
        }
    }

    fn eval_literal(&self, expr: &ResolvedExpr) -> DbResult<types::Value> {
        // Index predicates only ever carry literal bounds: there is no row
        // to evaluate a column reference against at this point.
        eval_resolved_expr(expr, &Row::new(Vec::new()))
    }

    fn query_index(&self, ctx: &mut ExecutionContext) -> DbResult<Vec<RecordId>> {
        let table = ctx.catalog.table_by_id(self.table_id)?;
        let index_meta = table.index(&self.index_name)?.clone();

        match index_meta.kind {
            IndexKind::BTree => {
                let mut btree = ctx.btree_index(&index_meta)?;
                match &self.predicate {
                    IndexPredicate::Eq { value, .. } => {
                        let key = vec![self.eval_literal(value)?];
                        btree.search(&key)
                    }
                    IndexPredicate::CompositeEq { values, .. } => {
                        let key = values
                            .iter()
                            .map(|v| self.eval_literal(v))
                            .collect::<DbResult<Vec<_>>>()?;
                        btree.search(&key)
                    }
                    IndexPredicate::Range { low, high, .. } => {
                        let low = vec![self.eval_literal(low)?];
                        let high = vec![self.eval_literal(high)?];
                        btree.range_scan(Some(&low), Some(&high))
                    }
                }
            }
            IndexKind::Hash => {
                let mut hash = ctx.hash_index(&index_meta)?;
                match &self.predicate {
                    IndexPredicate::Eq { value, .. } => {
                        let key = vec![self.eval_literal(value)?];
                        hash.search(&key)
                    }
                    IndexPredicate::CompositeEq { values, .. } => {
                        let key = values
                            .iter()
                            .map(|v| self.eval_literal(v))
                            .collect::<DbResult<Vec<_>>>()?;
                        hash.search(&key)
                    }
                    IndexPredicate::Range { .. } => Err(DbError::Executor(
                        "range predicates require a B+Tree index".into(),
                    )),
                }
            }
        }
    }
}

impl Executor for IndexScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let rids = self.query_index(ctx)?;
        self.matching_rids = Some(rids.into_iter());
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let Some(iter) = self.matching_rids.as_mut() else {
            return Err(DbError::Executor("IndexScanExec::next called before open".into()));
        };
        match iter.next() {
            Some(rid) => {
                let mut heap = ctx.heap_table(self.table_id)?;
                let mut row = heap.get(rid)?;
                row.set_rid(Some(rid));
                self.stats.rows_produced += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.matching_rids = None;
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Catalog, Column};
    use types::{TypeSpec, Value};

    fn setup() -> (Catalog, tempfile::TempDir) {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                "users",
                vec![
                    Column::new("id", TypeSpec::int()),
                    Column::new("name", TypeSpec::varchar(32)),
                ],
                vec!["id".into()],
            )
            .unwrap();
        let temp = tempfile::tempdir().unwrap();
        (catalog, temp)
    }

    fn insert_rows(ctx: &mut ExecutionContext, table_id: TableId, rows: Vec<Row>) {
        let mut heap = ctx.heap_table(table_id).unwrap();
        for row in rows {
            heap.insert(&row).unwrap();
        }
        heap.flush().unwrap();
    }

    #[test]
    fn seq_scan_empty_table() {
        let (catalog, temp) = setup();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());
        let mut exec = SeqScanExec::new(TableId(1), vec!["id".into(), "name".into()]);
        exec.open(&mut ctx).unwrap();
        assert!(exec.next(&mut ctx).unwrap().is_none());
    }

    #[test]
    fn seq_scan_returns_inserted_rows_with_rid() {
        let (catalog, temp) = setup();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());
        insert_rows(
            &mut ctx,
            TableId(1),
            vec![
                Row::new(vec![Value::Int(1), Value::Text("alice".into())]),
                Row::new(vec![Value::Int(2), Value::Text("bob".into())]),
            ],
        );

        let mut exec = SeqScanExec::new(TableId(1), vec!["id".into(), "name".into()]);
        exec.open(&mut ctx).unwrap();
        let mut seen = Vec::new();
        while let Some(row) = exec.next(&mut ctx).unwrap() {
            assert!(row.rid().is_some());
            seen.push(row.values);
        }
        assert_eq!(
            seen,
            vec![
                vec![Value::Int(1), Value::Text("alice".into())],
                vec![Value::Int(2), Value::Text("bob".into())],
            ]
        );
    }

    #[test]
    fn index_scan_eq_dispatches_to_btree() {
        let (mut catalog, temp) = setup();
        catalog
            .create_index("users", "idx_id", &["id"], IndexKind::BTree, true)
            .unwrap();
        let mut ctx = ExecutionContext::new(&catalog, temp.path());
        insert_rows(
            &mut ctx,
            TableId(1),
            vec![Row::new(vec![Value::Int(1), Value::Text("alice".into())])],
        );
        let table = ctx.catalog.table("users").unwrap();
        let index_meta = table.index("idx_id").unwrap();
        let mut btree = ctx.btree_index(index_meta).unwrap();
        let rid = common::RecordId { page_id: common::PageId(1), slot: 0 };
        btree.insert(vec![Value::Int(1)], rid).unwrap();
        btree.flush().unwrap();

        let mut exec = IndexScanExec::new(
            TableId(1),
            "idx_id".into(),
            IndexPredicate::Eq { col: 0, value: ResolvedExpr::Literal(Value::Int(1)) },
            vec!["id".into(), "name".into()],
        );
        exec.open(&mut ctx).unwrap();
        let row = exec.next(&mut ctx).unwrap().unwrap();
        assert_eq!(row.values[0], Value::Int(1));
    }
}
