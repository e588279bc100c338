//! Semantic analysis: walks a parsed [`Statement`] against the [`Catalog`]
//! and rejects anything that would not make sense to execute — unknown
//! tables/columns, arity mismatches, GROUP BY/HAVING misuse, aggregates
//! where they are not allowed.
//!
//! Like the analyser this is ported from, semantic errors do not carry a
//! source position: by the time a statement is fully parsed the line/column
//! of an identifier is no longer tracked on the AST, only its name.


use std::collections::HashMap;

use catalog::Catalog;
use common::{DbError, DbResult};
use expr::Expr;
use parser::{JoinClause, OrderByItem, SelectItem, Statement, TableRef};
use types::{SqlType, TypeSpec};

pub struct Analyzer<'c> {
    catalog: &'c Catalog,
}

impl<'c> Analyzer<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    pub fn analyze(&self, stmt: &Statement) -> DbResult<()> {
        match stmt {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => self.analyze_create_table(name, columns, primary_key),
            Statement::DropTable { .. } | Statement::DropIndex { .. } | Statement::DropView { .. } => {
                // Existence is checked at execution time so IF EXISTS can be
                // honoured without the analyser pre-empting it.
                Ok(())
            }
            Statement::CreateIndex { table, columns, .. } => self.analyze_create_index(table, columns),
            Statement::CreateView { query, .. } => self.analyze(query),
            Statement::Insert {
                table,
                columns,
                values,
            } => self.analyze_insert(table, columns, values),
            Statement::Select { .. } => self.analyze_select(stmt),
            Statement::Update {
                table,
                assignments,
                selection,
            } => self.analyze_update(table, assignments, selection),
            Statement::Delete { table, selection } => self.analyze_delete(table, selection),
            Statement::Explain { query, .. } => self.analyze(query),
        }
    }

    fn analyze_create_table(
        &self,
        name: &str,
        columns: &[parser::ColumnDef],
        primary_key: &Option<Vec<String>>,
    ) -> DbResult<()> {
        if self.catalog.table_exists(name) {
            return Err(semantic(format!("table '{name}' already exists")));
        }
        let mut seen = HashMap::new();
        for col in columns {
            if seen.insert(col.name.as_str(), ()).is_some() {
                return Err(semantic("duplicate column name in table definition"));
            }
        }
        if let Some(pk) = primary_key {
            for col_name in pk {
                if !columns.iter().any(|c| &c.name == col_name) {
                    return Err(semantic(format!(
                        "primary key references unknown column '{col_name}'"
                    )));
                }
            }
        }
        Ok(())
    }

    fn analyze_create_index(&self, table: &str, columns: &[String]) -> DbResult<()> {
        let meta = self
            .catalog
            .table(table)
            .map_err(|_| semantic(format!("table '{table}' does not exist")))?;
        for col in columns {
            if meta.schema.column_index(col).is_none() {
                return Err(semantic(format!("table '{table}' has no column '{col}'")));
            }
        }
        Ok(())
    }

    fn analyze_insert(&self, table: &str, columns: &Option<Vec<String>>, values: &[Expr]) -> DbResult<()> {
        let meta = self
            .catalog
            .table(table)
            .map_err(|_| semantic(format!("table '{table}' does not exist")))?;

        let target_columns: Vec<&str> = match columns {
            Some(cols) => {
                for col in cols {
                    if meta.schema.column_index(col).is_none() {
                        return Err(semantic(format!("table '{table}' has no column '{col}'")));
                    }
                }
                cols.iter().map(|s| s.as_str()).collect()
            }
            None => meta.schema.columns.iter().map(|c| c.name.as_str()).collect(),
        };

        if values.len() != target_columns.len() {
            return Err(semantic(format!(
                "INSERT has {} value(s) but {} column(s) are targeted",
                values.len(),
                target_columns.len()
            )));
        }

        for (col_name, value) in target_columns.iter().zip(values.iter()) {
            let ordinal = meta.schema.column_index(col_name).expect("validated above");
            let declared = meta.schema.column_type(ordinal).expect("ordinal in range");
            if let Expr::Literal(lit) = value {
                check_assignable(declared, &sql_type_of(lit), col_name)?;
            }
            // Non-literal expressions (e.g. column references in a nested
            // INSERT ... SELECT) are left for the planner/executor to type
            // at evaluation time.
        }
        Ok(())
    }

    fn analyze_select(&self, stmt: &Statement) -> DbResult<()> {
        let Statement::Select {
            columns,
            from,
            joins,
            selection,
            group_by,
            having,
            order_by,
        } = stmt
        else {
            unreachable!("caller guarantees Select")
        };

        let scope = self.resolve_from(from, joins)?;

        if !group_by.is_empty() {
            for col in group_by {
                if !scope.has_column(None, col) {
                    return Err(semantic(format!("GROUP BY references unknown column '{col}'")));
                }
            }
        } else if having.is_some() {
            return Err(semantic("HAVING requires a GROUP BY clause"));
        }

        for item in columns {
            if let SelectItem::Expr { expr, .. } = item {
                self.check_select_expr(expr, &scope, group_by)?;
            }
        }

        if let Some(predicate) = selection {
            if contains_aggregate(predicate) {
                return Err(semantic("aggregate functions are not allowed in WHERE"));
            }
            self.check_expr(predicate, &scope)?;
        }

        if let Some(predicate) = having {
            self.check_expr(predicate, &scope)?;
        }

        for OrderByItem { expr, .. } in order_by {
            self.check_expr(expr, &scope)?;
        }

        Ok(())
    }

    /// SELECT-list items are allowed to be aggregate calls (or contain one);
    /// bare column references must appear in GROUP BY once GROUP BY is used,
    /// per the conservative rule: anything not wrapped in an aggregate and
    /// not listed in GROUP BY is rejected.
    fn check_select_expr(&self, expr: &Expr, scope: &Scope, group_by: &[String]) -> DbResult<()> {
        match expr {
            Expr::Function { .. } if expr.is_aggregate_call() => {
                for arg in function_args(expr) {
                    self.check_expr(arg, scope)?;
                }
                Ok(())
            }
            Expr::Column { table, name } => {
                if !scope.has_column(table.as_deref(), name) {
                    return Err(semantic(format!("invalid column reference '{name}'")));
                }
                if !group_by.is_empty() && !group_by.iter().any(|g| g == name) {
                    return Err(semantic(format!(
                        "column '{name}' must appear in GROUP BY or be used in an aggregate"
                    )));
                }
                Ok(())
            }
            _ => self.check_expr(expr, scope),
        }
    }

    fn analyze_update(
        &self,
        table: &str,
        assignments: &[(String, Expr)],
        selection: &Option<Expr>,
    ) -> DbResult<()> {
        let meta = self
            .catalog
            .table(table)
            .map_err(|_| semantic(format!("table '{table}' does not exist")))?;
        let scope = Scope::single(table.to_string(), meta);

        for (col, value) in assignments {
            let ordinal = meta
                .schema
                .column_index(col)
                .ok_or_else(|| semantic(format!("table '{table}' has no column '{col}'")))?;
            if let Expr::Literal(lit) = value {
                let declared = meta.schema.column_type(ordinal).expect("ordinal in range");
                check_assignable(declared, &sql_type_of(lit), col)?;
            }
            self.check_expr(value, &scope)?;
        }

        if let Some(predicate) = selection {
            self.check_expr(predicate, &scope)?;
        }
        Ok(())
    }

    fn analyze_delete(&self, table: &str, selection: &Option<Expr>) -> DbResult<()> {
        let meta = self
            .catalog
            .table(table)
            .map_err(|_| semantic(format!("table '{table}' does not exist")))?;
        if let Some(predicate) = selection {
            let scope = Scope::single(table.to_string(), meta);
            self.check_expr(predicate, &scope)?;
        }
        Ok(())
    }

    fn resolve_from<'s>(&'s self, from: &TableRef, joins: &[JoinClause]) -> DbResult<Scope<'s>> {
        let mut scope = Scope::default();
        self.bind_table_ref(from, &mut scope)?;
        for join in joins {
            self.bind_table_ref(&join.table, &mut scope)?;
            self.check_expr(&join.condition, &scope)?;
        }
        Ok(scope)
    }

    fn bind_table_ref<'s>(&'s self, table_ref: &TableRef, scope: &mut Scope<'s>) -> DbResult<()> {
        let meta = self
            .catalog
            .table(&table_ref.name)
            .map_err(|_| semantic(format!("table '{}' does not exist", table_ref.name)))?;
        scope
            .tables
            .insert(table_ref.effective_name().to_string(), meta);
        Ok(())
    }

    fn check_expr(&self, expr: &Expr, scope: &Scope) -> DbResult<()> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Column { table, name } => {
                if scope.has_column(table.as_deref(), name) {
                    Ok(())
                } else if let Some(t) = table {
                    Err(semantic(format!("invalid column reference '{t}.{name}'")))
                } else {
                    Err(semantic(format!("invalid column reference '{name}'")))
                }
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(left, scope)?;
                self.check_expr(right, scope)
            }
            Expr::Unary { expr, .. } => self.check_expr(expr, scope),
            Expr::InList { expr, list, .. } => {
                self.check_expr(expr, scope)?;
                for item in list {
                    self.check_expr(item, scope)?;
                }
                Ok(())
            }
            Expr::Function { args, star, .. } => {
                if *star {
                    return Ok(());
                }
                for arg in args {
                    self.check_expr(arg, scope)?;
                }
                Ok(())
            }
        }
    }
}

fn function_args(expr: &Expr) -> &[Expr] {
    match expr {
        Expr::Function { args, .. } => args,
        _ => &[],
    }
}

fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function { .. } if expr.is_aggregate_call() => true,
        Expr::Function { args, .. } => args.iter().any(contains_aggregate),
        Expr::Binary { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::Unary { expr, .. } => contains_aggregate(expr),
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr) || list.iter().any(contains_aggregate)
        }
        Expr::Literal(_) | Expr::Column { .. } => false,
    }
}

fn sql_type_of(value: &types::Value) -> SqlType {
    match value {
        types::Value::Int(_) => SqlType::Int,
        types::Value::Text(_) => SqlType::Text,
        types::Value::Bool(_) => SqlType::Bool,
        types::Value::Null => SqlType::Int, // NULL is assignable to anything; checked separately.
    }
}

fn check_assignable(declared: &TypeSpec, provided: &SqlType, col_name: &str) -> DbResult<()> {
    if matches!(provided, SqlType::Int) && matches!(declared.base, SqlType::Int) {
        return Ok(());
    }
    if declared.assignable_from(provided) {
        return Ok(());
    }
    Err(semantic(format!(
        "value type is not assignable to column '{col_name}'"
    )))
}

#[derive(Default)]
struct Scope<'c> {
    tables: HashMap<String, &'c catalog::TableMeta>,
}

impl<'c> Scope<'c> {
    fn single(name: String, meta: &'c catalog::TableMeta) -> Self {
        let mut tables = HashMap::new();
        tables.insert(name, meta);
        Self { tables }
    }

    fn has_column(&self, qualifier: Option<&str>, name: &str) -> bool {
        match qualifier {
            Some(q) => self
                .tables
                .get(q)
                .is_some_and(|t| t.schema.column_index(name).is_some()),
            None => self
                .tables
                .values()
                .any(|t| t.schema.column_index(name).is_some()),
        }
    }
}

fn semantic(message: impl Into<String>) -> DbError {
    DbError::Semantic {
        message: message.into(),
        line: 0,
        column: 0,
    }
}
