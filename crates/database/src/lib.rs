//! Synchronous database facade: parses SQL text, runs DDL straight against
//! the catalog, and drives everything else through the planner and executor.
//!
//! # Example
//!
//! ```no_run
//! use database::{Database, QueryResult};
//!
//! let mut db = Database::new("/tmp/my_db", "catalog.json").unwrap();
//! db.execute("CREATE TABLE users (id INT, name VARCHAR(32))").unwrap();
//! db.execute("INSERT INTO users VALUES (1, 'alice')").unwrap();
//! match db.execute("SELECT * FROM users").unwrap() {
//!     QueryResult::Rows { schema, rows } => println!("{schema:?}: {} rows", rows.len()),
//!     _ => unreachable!(),
//! }
//! ```

mod view;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use analyzer::Analyzer;
use anyhow::{anyhow, bail, Context, Result};
use catalog::{Catalog, Column, CreateOutcome, DropOutcome, IndexKind, IndexMeta};
use common::{ExecutionStats, Row};
use executor::{ExecutionContext, Executor};
use parser::{parse_sql, Statement};
use planner::{explain_physical, PhysicalPlan, Planner, PlanningContext};

/// Result of running a single statement through [`Database::execute`].
#[derive(Debug)]
pub enum QueryResult {
    /// Query returned rows.
    Rows { schema: Vec<String>, rows: Vec<Row> },
    /// A DML statement affected N rows.
    Count { affected: u64 },
    /// DDL or another statement with no tabular result.
    Empty,
}

/// A single embedded database: one catalog plus the heap/index files it
/// describes, all rooted at `data_dir`. Every method call re-opens the
/// storage it touches; nothing is held open across calls.
pub struct Database {
    data_dir: PathBuf,
    catalog_path: PathBuf,
    catalog: Catalog,
}

impl Database {
    /// Opens (or creates) a database rooted at `data_dir`, loading its
    /// catalog from `catalog_file` (a name relative to `data_dir`).
    pub fn new(data_dir: impl AsRef<Path>, catalog_file: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        let catalog_path = data_dir.join(catalog_file);
        let catalog = Catalog::load(&catalog_path).context("loading catalog")?;
        Ok(Self { data_dir, catalog_path, catalog })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parses and runs a single SQL statement.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let mut statements = parse_sql(sql)?;
        if statements.is_empty() {
            return Ok(QueryResult::Empty);
        }
        if statements.len() > 1 {
            bail!("only one statement may be executed at a time, found {}", statements.len());
        }
        self.execute_statement(statements.remove(0))
    }

    /// Drops every table/index/view file this database owns and starts over
    /// with an empty catalog. Leaves `data_dir` itself in place.
    pub fn reset(&mut self) -> Result<()> {
        for entry in fs::read_dir(&self.data_dir).context("reading data directory")? {
            let entry = entry?;
            if entry.path() != self.catalog_path {
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        self.catalog = Catalog::new();
        self.catalog.save(&self.catalog_path)?;
        Ok(())
    }

    fn execute_statement(&mut self, stmt: Statement) -> Result<QueryResult> {
        Analyzer::new(&self.catalog).analyze(&stmt).context("semantic analysis")?;
        match stmt {
            Statement::CreateTable { name, columns, primary_key } => {
                self.execute_create_table(name, columns, primary_key)
            }
            Statement::DropTable { name, if_exists } => self.execute_drop_table(name, if_exists),
            Statement::CreateIndex { name, table, columns, unique } => {
                self.execute_create_index(name, table, columns, unique)
            }
            Statement::DropIndex { name, if_exists } => self.execute_drop_index(name, if_exists),
            Statement::CreateView { name, query } => self.execute_create_view(name, *query),
            Statement::DropView { name, if_exists, cascade } => self.execute_drop_view(name, if_exists, cascade),
            Statement::Explain { query, analyze } => self.execute_explain(*query, analyze),
            other => self.execute_query_or_dml(other),
        }
    }

    fn execute_create_table(
        &mut self,
        name: String,
        columns: Vec<parser::ColumnDef>,
        primary_key: Option<Vec<String>>,
    ) -> Result<QueryResult> {
        let columns: Vec<Column> = columns.into_iter().map(|c| Column::new(c.name, c.ty)).collect();
        match self.catalog.create_table(&name, columns, primary_key.unwrap_or_default())? {
            CreateOutcome::Created(_) => {
                self.catalog.save(&self.catalog_path)?;
                Ok(QueryResult::Empty)
            }
            CreateOutcome::AlreadyExists => Err(anyhow!("table '{name}' already exists")),
        }
    }

    fn execute_drop_table(&mut self, name: String, if_exists: bool) -> Result<QueryResult> {
        let index_files: Vec<PathBuf> =
            self.catalog.table(&name).map(|t| t.indexes().iter().map(|i| self.index_file_path(i)).collect()).unwrap_or_default();
        match self.catalog.drop_table(&name, false)? {
            DropOutcome::Dropped => {
                let _ = fs::remove_file(self.data_dir.join(format!("{name}.heap")));
                for path in index_files {
                    let _ = fs::remove_file(path);
                }
                self.catalog.save(&self.catalog_path)?;
                Ok(QueryResult::Empty)
            }
            DropOutcome::DidNotExist if if_exists => Ok(QueryResult::Empty),
            DropOutcome::DidNotExist => Err(anyhow!("table '{name}' does not exist")),
        }
    }

    /// Every index the grammar can express is a B+Tree; hash indexes are an
    /// internal storage capability with no `CREATE INDEX ... USING HASH`
    /// syntax to reach them.
    fn execute_create_index(&mut self, name: String, table: String, columns: Vec<String>, unique: bool) -> Result<QueryResult> {
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        self.catalog.create_index(&table, &name, &column_refs, IndexKind::BTree, unique)?;
        self.catalog.save(&self.catalog_path)?;
        Ok(QueryResult::Empty)
    }

    /// `DROP INDEX` carries no table name, so the owning table is found by
    /// scanning the catalog.
    fn execute_drop_index(&mut self, name: String, if_exists: bool) -> Result<QueryResult> {
        let owner = self.catalog.tables().find(|t| t.has_index(&name)).map(|t| t.name.clone());
        let Some(table_name) = owner else {
            return if if_exists { Ok(QueryResult::Empty) } else { Err(anyhow!("index '{name}' does not exist")) };
        };
        let index_file = self.index_file_path(self.catalog.table(&table_name)?.index(&name)?);
        self.catalog.drop_index(&table_name, &name)?;
        let _ = fs::remove_file(index_file);
        self.catalog.save(&self.catalog_path)?;
        Ok(QueryResult::Empty)
    }

    fn index_file_path(&self, index: &IndexMeta) -> PathBuf {
        let ext = match index.kind {
            IndexKind::BTree => "btidx",
            IndexKind::Hash => "hidx",
        };
        self.data_dir.join(format!("{}.{ext}", index.name))
    }

    fn execute_create_view(&mut self, name: String, query: Statement) -> Result<QueryResult> {
        let Statement::Select { ref from, ref joins, .. } = query else {
            bail!("CREATE VIEW only supports SELECT queries");
        };
        let mut depends_on = vec![from.name.clone()];
        depends_on.extend(joins.iter().map(|j| j.table.name.clone()));
        let query_text = view::render_select(&query);
        match self.catalog.create_view(&name, &query_text, depends_on)? {
            CreateOutcome::Created(_) => {
                self.catalog.save(&self.catalog_path)?;
                Ok(QueryResult::Empty)
            }
            CreateOutcome::AlreadyExists => Err(anyhow!("view '{name}' already exists")),
        }
    }

    fn execute_drop_view(&mut self, name: String, if_exists: bool, cascade: bool) -> Result<QueryResult> {
        match self.catalog.drop_view(&name, cascade)? {
            DropOutcome::Dropped => {
                self.catalog.save(&self.catalog_path)?;
                Ok(QueryResult::Empty)
            }
            DropOutcome::DidNotExist if if_exists => Ok(QueryResult::Empty),
            DropOutcome::DidNotExist => Err(anyhow!("view '{name}' does not exist")),
        }
    }

    /// If `stmt` is a bare `SELECT * FROM <view>` (no joins, filter, grouping
    /// or ordering of its own), substitutes the view's stored query. A view
    /// referenced any other way is rejected: views resolve one level deep and
    /// only as a full stand-in for the table they name.
    fn resolve_view(&self, stmt: Statement) -> Result<Statement> {
        let Statement::Select { ref columns, ref from, ref joins, ref selection, ref group_by, ref having, ref order_by } = stmt
        else {
            return Ok(stmt);
        };
        if !self.catalog.view_exists(&from.name) {
            return Ok(stmt);
        }
        let bare = matches!(columns.as_slice(), [parser::SelectItem::Wildcard])
            && joins.is_empty()
            && selection.is_none()
            && group_by.is_empty()
            && having.is_none()
            && order_by.is_empty();
        if !bare {
            bail!("view '{}' can only be queried as a bare SELECT * FROM <view>", from.name);
        }
        let view = self.catalog.view(&from.name)?;
        let mut inner = parse_sql(&view.query_text)?;
        if inner.len() != 1 {
            bail!("view '{}' stores more than one statement", from.name);
        }
        Ok(inner.remove(0))
    }

    fn execute_query_or_dml(&mut self, stmt: Statement) -> Result<QueryResult> {
        let stmt = self.resolve_view(stmt)?;
        let row_count_delta = row_count_target(&stmt);

        let plan = {
            let mut planning_ctx = PlanningContext::new(&self.catalog);
            Planner::plan(stmt, &mut planning_ctx)?
        };

        let mut ctx = ExecutionContext::new(&self.catalog, self.data_dir.clone());
        if is_dml(&plan) {
            let affected = executor::execute_dml(plan, &mut ctx)?;
            drop(ctx);
            if let Some((table_name, sign)) = row_count_delta {
                self.catalog.update_row_count(&table_name, sign * affected as i64)?;
            }
            self.catalog.save(&self.catalog_path)?;
            Ok(QueryResult::Count { affected })
        } else {
            let schema = output_schema(&plan);
            let rows = executor::execute_query(plan, &mut ctx)?;
            Ok(QueryResult::Rows { schema, rows })
        }
    }

    fn execute_explain(&mut self, query: Statement, analyze: bool) -> Result<QueryResult> {
        let query = self.resolve_view(query)?;
        let row_count_delta = row_count_target(&query);
        let plan = {
            let mut planning_ctx = PlanningContext::new(&self.catalog);
            Planner::plan(query, &mut planning_ctx)?
        };

        let mut description = format!("Plan:\n{}", explain_physical(&plan));

        if analyze {
            let dml = is_dml(&plan);
            let mut ctx = ExecutionContext::new(&self.catalog, self.data_dir.clone());

            let started = Instant::now();
            let (rows_produced, stats) = if dml {
                let affected = executor::execute_dml(plan, &mut ctx)?;
                drop(ctx);
                if let Some((table_name, sign)) = row_count_delta {
                    self.catalog.update_row_count(&table_name, sign * affected as i64)?;
                }
                self.catalog.save(&self.catalog_path)?;
                (affected, None)
            } else {
                let mut exec = executor::build_executor(plan, ctx.catalog)?;
                exec.open(&mut ctx)?;
                let mut count = 0u64;
                while exec.next(&mut ctx)?.is_some() {
                    count += 1;
                }
                exec.close(&mut ctx)?;
                (count, exec.stats().cloned())
            };
            let elapsed = started.elapsed();

            description.push_str(&format!("\n\nExecution:\n  Total time: {}", ExecutionStats::format_duration(elapsed)));
            description.push_str(&format!("\n  Total rows: {rows_produced}"));
            if let Some(stats) = stats {
                description.push_str(&format!(
                    "\n  Root operator: rows_produced={} rows_filtered={} pages_scanned={}",
                    stats.rows_produced, stats.rows_filtered, stats.pages_scanned
                ));
            }
        }

        Ok(QueryResult::Rows { schema: vec!["Explain".into()], rows: vec![Row::new(vec![types::Value::Text(description)])] })
    }
}

fn is_dml(plan: &PhysicalPlan) -> bool {
    matches!(plan, PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. })
}

/// The table whose `row_count_hint` a DML statement affects, and the sign to
/// apply to the affected-row count (`+1` insert, `-1` delete, `0` update).
/// Looked up from the *unplanned* statement since the physical plan only
/// carries a `TableId`, not a name.
fn row_count_target(stmt: &Statement) -> Option<(String, i64)> {
    match stmt {
        Statement::Insert { table, .. } => Some((table.clone(), 1)),
        Statement::Delete { table, .. } => Some((table.clone(), -1)),
        Statement::Update { table, .. } => Some((table.clone(), 0)),
        _ => None,
    }
}

/// The column names a physical plan's root node produces. `Insert`/`Update`/
/// `Delete` produce a single anonymous count column handled separately by
/// `execute_dml`, not through this path.
fn output_schema(plan: &PhysicalPlan) -> Vec<String> {
    match plan {
        PhysicalPlan::SeqScan { schema, .. }
        | PhysicalPlan::IndexScan { schema, .. }
        | PhysicalPlan::GroupBy { schema, .. }
        | PhysicalPlan::NestedLoopJoin { schema, .. } => schema.clone(),
        PhysicalPlan::Filter { input, .. } | PhysicalPlan::Sort { input, .. } => output_schema(input),
        PhysicalPlan::Project { columns, .. } => columns.iter().map(|(name, _)| name.clone()).collect(),
        PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Value;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let db = Database::new(temp.path(), "catalog.json").unwrap();
        (db, temp)
    }

    #[test]
    fn create_insert_and_select_roundtrip() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT, name VARCHAR(32))").unwrap();
        db.execute("INSERT INTO users VALUES (1, 'alice')").unwrap();
        db.execute("INSERT INTO users VALUES (2, 'bob')").unwrap();

        match db.execute("SELECT * FROM users").unwrap() {
            QueryResult::Rows { schema, rows } => {
                assert_eq!(schema, vec!["id".to_string(), "name".to_string()]);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn create_table_twice_is_an_error() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT)").unwrap();
        assert!(db.execute("CREATE TABLE users (id INT)").is_err());
    }

    #[test]
    fn drop_table_if_exists_is_a_no_op_when_absent() {
        let (mut db, _temp) = temp_db();
        let result = db.execute("DROP TABLE IF EXISTS ghosts").unwrap();
        assert!(matches!(result, QueryResult::Empty));
    }

    #[test]
    fn update_and_delete_return_affected_counts() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT, active BOOL)").unwrap();
        db.execute("INSERT INTO users VALUES (1, TRUE)").unwrap();
        db.execute("INSERT INTO users VALUES (2, TRUE)").unwrap();

        match db.execute("UPDATE users SET active = FALSE WHERE id = 1").unwrap() {
            QueryResult::Count { affected } => assert_eq!(affected, 1),
            other => panic!("expected a count, got {other:?}"),
        }
        match db.execute("DELETE FROM users WHERE active = FALSE").unwrap() {
            QueryResult::Count { affected } => assert_eq!(affected, 1),
            other => panic!("expected a count, got {other:?}"),
        }
        assert_eq!(db.catalog().table("users").unwrap().row_count_hint, 1);
    }

    #[test]
    fn create_index_then_drop_index_without_table_name() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT, name VARCHAR(32))").unwrap();
        db.execute("CREATE INDEX idx_id ON users (id)").unwrap();
        assert!(db.catalog().table("users").unwrap().has_index("idx_id"));
        db.execute("DROP INDEX idx_id").unwrap();
        assert!(!db.catalog().table("users").unwrap().has_index("idx_id"));
    }

    #[test]
    fn view_over_bare_select_star_is_queryable() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT, name VARCHAR(32))").unwrap();
        db.execute("INSERT INTO users VALUES (1, 'alice')").unwrap();
        db.execute("CREATE VIEW all_users AS SELECT * FROM users").unwrap();

        match db.execute("SELECT * FROM all_users").unwrap() {
            QueryResult::Rows { rows, .. } => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].values[1], Value::Text("alice".into()));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn dropping_table_behind_a_view_requires_cascade() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT)").unwrap();
        db.execute("CREATE VIEW all_users AS SELECT * FROM users").unwrap();
        assert!(db.execute("DROP TABLE users").is_err());
    }

    #[test]
    fn explain_reports_a_plan_description() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT)").unwrap();
        match db.execute("EXPLAIN SELECT * FROM users").unwrap() {
            QueryResult::Rows { rows, .. } => {
                let Value::Text(text) = &rows[0].values[0] else { panic!("expected text") };
                assert!(text.contains("SeqScan"));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn explain_analyze_reports_timing_and_row_count() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT)").unwrap();
        db.execute("INSERT INTO users VALUES (1)").unwrap();
        match db.execute("EXPLAIN ANALYZE SELECT * FROM users").unwrap() {
            QueryResult::Rows { rows, .. } => {
                let Value::Text(text) = &rows[0].values[0] else { panic!("expected text") };
                assert!(text.contains("Execution"));
                assert!(text.contains("Total rows: 1"));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn reset_clears_tables_and_data() {
        let (mut db, _temp) = temp_db();
        db.execute("CREATE TABLE users (id INT)").unwrap();
        db.execute("INSERT INTO users VALUES (1)").unwrap();
        db.reset().unwrap();
        assert!(!db.catalog().table_exists("users"));
    }
}
