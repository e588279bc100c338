//! Query executor: executes physical plans using a Volcano-style iterator model.
//!
//! The executor bridges the planner's physical operators with the storage and
//! buffer pool layers to perform actual query execution. It implements a
//! pull-based iterator model where each operator pulls rows from its children.
//!
//! # Architecture
//!
//! ```text
//! Physical Plan
//!     ↓
//! Build Executor Tree
//!     ↓
//! open() → Initialize resources
//!     ↓
//! next() → Pull rows iteratively
//!     ↓
//! close() → Clean up resources
//! ```
//!
//! # Example
//!
//! ```no_run
//! use executor::{execute_query, ExecutionContext};
//! use planner::PhysicalPlan;
//! use catalog::Catalog;
//! use common::TableId;
//!
//! let catalog = Catalog::new();
//! let mut ctx = ExecutionContext::new(&catalog, "/tmp/db");
//!
//! let plan = PhysicalPlan::SeqScan {
//!     table_id: TableId(1),
//!     schema: vec!["id".into(), "name".into()],
//! };
//! let results = execute_query(plan, &mut ctx).unwrap();
//! ```

mod builder;
mod dml;
mod filter;
mod groupby;
mod join;
mod project;
mod scan;
mod sort;

use std::path::PathBuf;

use catalog::Catalog;
use common::{DbError, DbResult, ExecutionStats, Row, TableId};
use planner::PhysicalPlan;

pub use builder::build_executor;
pub use dml::{DeleteExec, InsertExec, UpdateExec};
pub use filter::{eval_resolved_expr, FilterExec};
pub use groupby::GroupByExec;
pub use join::NestedLoopJoinExec;
pub use project::ProjectExec;
pub use scan::{IndexScanExec, SeqScanExec};
pub use sort::SortExec;

/// Volcano-style iterator interface for query execution.
///
/// Each operator implements this trait to provide a pull-based execution model.
/// Operators initialize resources in `open()`, produce rows via `next()`, and
/// clean up in `close()`.
pub trait Executor {
    /// Initialize the operator (open files, allocate buffers, etc.).
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Fetch the next row, or None if exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>>;

    /// Release resources (close files, flush buffers, etc.).
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Return the schema (column names) of rows produced by this operator.
    fn schema(&self) -> &[String];

    /// Per-operator counters gathered during execution, for EXPLAIN ANALYZE.
    /// Most operators track these; ones that don't return `None`.
    fn stats(&self) -> Option<&ExecutionStats> {
        None
    }
}

/// Shared execution context passed to all operators.
///
/// Holds the catalog snapshot the plan was bound against and the directory
/// holding every table's heap and index files. Storage is reopened per
/// access rather than kept live across calls, so the context carries no
/// buffer pool or log state of its own.
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub data_dir: PathBuf,
}

impl<'a> ExecutionContext<'a> {
    /// Create a new execution context rooted at `data_dir`.
    pub fn new(catalog: &'a Catalog, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            data_dir: data_dir.into(),
        }
    }

    /// Open the heap file backing `table_id`.
    pub fn heap_table(&self, table_id: TableId) -> DbResult<buffer::HeapFile> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        let file_path = self.data_dir.join(format!("{}.heap", table_meta.name));
        buffer::HeapFile::open(&file_path, table_id.0)
    }

    /// Open a named index's B+Tree file, creating it if this is the first use.
    pub fn btree_index(&self, index: &catalog::IndexMeta) -> DbResult<btree::BTreeIndex> {
        let path = self.data_dir.join(format!("{}.btidx", index.name));
        if path.exists() {
            btree::BTreeIndex::open(&path, index.id)
        } else {
            btree::BTreeIndex::create(&path, index.id)
        }
    }

    /// Open a named index's hash file, creating it if this is the first use.
    pub fn hash_index(&self, index: &catalog::IndexMeta) -> DbResult<hash::HashIndex> {
        let path = self.data_dir.join(format!("{}.hidx", index.name));
        if path.exists() {
            hash::HashIndex::open(&path, index.id)
        } else {
            hash::HashIndex::create(&path, index.id)
        }
    }
}

/// Execute a query plan and return all result rows.
///
/// This is the main entry point for executing SELECT queries that return data.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails at any stage.
pub fn execute_query(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<Vec<Row>> {
    let mut executor = builder::build_executor(plan, ctx.catalog)?;

    executor.open(ctx)?;

    let mut results = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        results.push(row);
    }

    executor.close(ctx)?;

    Ok(results)
}

/// Execute a DML statement (INSERT/UPDATE/DELETE) and return affected row count.
///
/// DML statements return a single row containing the number of affected rows.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails or no result is produced.
pub fn execute_dml(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<u64> {
    let mut executor = builder::build_executor(plan, ctx.catalog)?;

    executor.open(ctx)?;

    let result = executor
        .next(ctx)?
        .ok_or_else(|| DbError::Executor("DML operation returned no result".into()))?;

    executor.close(ctx)?;

    match result.values.first() {
        Some(types::Value::Int(count)) => Ok(*count as u64),
        Some(other) => Err(DbError::Executor(format!(
            "DML result count must be integer, got {:?}",
            other
        ))),
        None => Err(DbError::Executor("DML result has no columns".into())),
    }
}
