//! Query planner: converts SQL AST to optimized physical execution plans.
//!
//! The planner bridges between the parser's abstract syntax tree and the executor's
//! runtime operators. It performs three main tasks:
//!
//! 1. **Name Binding** - Resolves column names to ordinals using catalog schemas
//! 2. **Optimization** - Applies simple rules like predicate pushdown and projection pruning
//! 3. **Access Method Selection** - Chooses between sequential and index scans
//!
//! # Architecture
//!
//! ```text
//! Parser AST
//!     ↓
//! Logical Plan (table names, column names)
//!     ↓
//! Optimize (pushdown, pruning)
//!     ↓
//! Bind (names → IDs)
//!     ↓
//! Physical Plan (table IDs, column ordinals, access methods)
//!     ↓
//! Executor
//! ```
//!
//! # Example
//!
//! ```no_run
//! use planner::{Planner, PlanningContext};
//! use catalog::Catalog;
//! use parser::parse_sql;
//!
//! let catalog = Catalog::new();
//! let mut ctx = PlanningContext::new(&catalog);
//! let stmt = parse_sql("SELECT name FROM users WHERE id = 1").unwrap().remove(0);
//! let plan = Planner::plan(stmt, &mut ctx).unwrap();
//! ```


use catalog::{Catalog, IndexKind, TableMeta};
use common::{ColumnId, DbError, DbResult, TableId};
use expr::{BinaryOp, Expr, UnaryOp};
use parser::{JoinType, SelectItem, Statement};
use types::Value;

/// Aggregate functions recognised by GROUP BY / the SELECT list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunc {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MAX" => Some(Self::Max),
            "MIN" => Some(Self::Min),
            _ => None,
        }
    }
}

/// An aggregate call collected from the SELECT list or HAVING clause, still
/// carrying a name-based argument.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    /// `None` for `COUNT(*)`.
    pub arg: Option<Expr>,
    /// Canonical text used to refer to this aggregate's result downstream,
    /// e.g. `"COUNT(*)"` or `"SUM(price)"`.
    pub display_name: String,
}

/// A resolved aggregate with its argument bound to a column ordinal.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAggregate {
    pub func: AggregateFunc,
    pub arg: Option<ColumnId>,
    pub display_name: String,
}

/// A single entry in a SELECT list after lowering.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// Logical plan node - optimizer-friendly representation with string names.
///
/// Logical plans use table/column names and are independent of physical
/// storage details. They're the intermediate form used for optimization.
#[derive(Clone, Debug, PartialEq)]
pub enum LogicalPlan {
    TableScan {
        table: String,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<LogicalPlan>,
        items: Vec<ProjectItem>,
    },
    GroupBy {
        input: Box<LogicalPlan>,
        keys: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    },
    Sort {
        input: Box<LogicalPlan>,
        order_by: Vec<OrderByExpr>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Expr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        predicate: Option<Expr>,
    },
    Delete {
        table: String,
        predicate: Option<Expr>,
    },
    /// Join two plans together.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        /// Join condition (ON clause).
        condition: Expr,
        /// Effective name (alias or table name) for the left side.
        left_name: String,
        /// Effective name (alias or table name) for the right side.
        right_name: String,
    },
}

/// Logical ORDER BY expression.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub desc: bool,
}

/// Physical plan node - executor-ready with resolved IDs and access methods.
///
/// Physical plans use table IDs, column ordinals, and concrete access methods.
/// They're ready for the executor to process.
#[derive(Clone, Debug, PartialEq)]
pub enum PhysicalPlan {
    SeqScan {
        table_id: TableId,
        schema: Vec<String>,
    },
    IndexScan {
        table_id: TableId,
        index_name: String,
        predicate: IndexPredicate,
        schema: Vec<String>,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: ResolvedExpr,
    },
    Project {
        input: Box<PhysicalPlan>,
        /// Output column name paired with the expression producing it.
        columns: Vec<(String, ResolvedExpr)>,
    },
    GroupBy {
        input: Box<PhysicalPlan>,
        keys: Vec<ColumnId>,
        aggregates: Vec<ResolvedAggregate>,
        /// Output schema: group key names followed by aggregate display names.
        schema: Vec<String>,
    },
    Sort {
        input: Box<PhysicalPlan>,
        order_by: Vec<ResolvedOrderByExpr>,
    },
    Insert {
        table_id: TableId,
        /// One value per table column, in schema order.
        values: Vec<ResolvedExpr>,
    },
    Update {
        table_id: TableId,
        assignments: Vec<(ColumnId, ResolvedExpr)>,
        predicate: Option<ResolvedExpr>,
    },
    Delete {
        table_id: TableId,
        predicate: Option<ResolvedExpr>,
    },
    /// Nested loop join - for each row from left, scan all right rows.
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        join_type: JoinType,
        /// Join condition with resolved column ordinals.
        condition: ResolvedExpr,
        /// Combined schema: left columns first, then right columns.
        /// Column names are prefixed with table/alias name (e.g., "users.id").
        schema: Vec<String>,
    },
}

/// Physical ORDER BY expression with resolved column ID.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOrderByExpr {
    pub column_id: ColumnId,
    pub desc: bool,
}

/// Index predicate for index scans.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexPredicate {
    /// Single-column equality: col = value
    Eq { col: ColumnId, value: ResolvedExpr },
    /// Composite key equality: (col1, col2, ...) = (val1, val2, ...)
    CompositeEq {
        columns: Vec<ColumnId>,
        values: Vec<ResolvedExpr>,
    },
    /// Range predicate (B+Tree only)
    Range {
        col: ColumnId,
        low: ResolvedExpr,
        high: ResolvedExpr,
    },
}

/// Resolved expression with column references bound to ordinals.
///
/// Unlike `expr::Expr` which uses string column names, `ResolvedExpr`
/// uses numeric column IDs so the executor can avoid name lookups.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedExpr {
    Literal(Value),
    Column(ColumnId),
    Unary {
        op: UnaryOp,
        expr: Box<ResolvedExpr>,
    },
    Binary {
        left: Box<ResolvedExpr>,
        op: BinaryOp,
        right: Box<ResolvedExpr>,
    },
    InList {
        expr: Box<ResolvedExpr>,
        list: Vec<ResolvedExpr>,
        negated: bool,
    },
}

/// Planning context - holds catalog for schema lookups.
pub struct PlanningContext<'a> {
    pub catalog: &'a Catalog,
}

impl<'a> PlanningContext<'a> {
    /// Create a new planning context.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        self.catalog
            .table(name)
            .map_err(|e| DbError::Planner(format!("{e}")))
    }
}

/// Main planner entry point.
pub struct Planner;

impl Planner {
    /// Convert a parser statement into an optimized physical plan.
    ///
    /// # Steps
    ///
    /// 1. Lower AST to logical plan
    /// 2. Apply optimization rules
    /// 3. Bind names to IDs and select access methods
    ///
    /// # Errors
    ///
    /// Returns `DbError::Planner` if:
    /// - Table or column names don't exist
    /// - Statement type is unsupported (DDL, handled directly against the catalog)
    pub fn plan(stmt: Statement, ctx: &mut PlanningContext) -> DbResult<PhysicalPlan> {
        let logical = Self::lower_to_logical(stmt)?;
        let optimized = Self::optimize(logical, ctx)?;
        Self::bind(optimized, ctx)
    }

    /// Lower parser AST to logical plan.
    fn lower_to_logical(stmt: Statement) -> DbResult<LogicalPlan> {
        match stmt {
            Statement::CreateTable { .. }
            | Statement::DropTable { .. }
            | Statement::CreateIndex { .. }
            | Statement::DropIndex { .. }
            | Statement::CreateView { .. }
            | Statement::DropView { .. } => {
                Err(DbError::Planner("DDL handled elsewhere, not through the operator tree".into()))
            }
            Statement::Explain { query, .. } => {
                // For EXPLAIN, just plan the inner query; whether to execute
                // it (ANALYZE) is decided by the database facade.
                Self::lower_to_logical(*query)
            }
            Statement::Insert {
                table,
                columns,
                values,
            } => Ok(LogicalPlan::Insert {
                table,
                columns,
                values,
            }),
            Statement::Update {
                table,
                assignments,
                selection,
            } => Ok(LogicalPlan::Update {
                table,
                assignments,
                predicate: selection,
            }),
            Statement::Delete { table, selection } => Ok(LogicalPlan::Delete {
                table,
                predicate: selection,
            }),
            Statement::Select {
                columns,
                from,
                joins,
                selection,
                group_by,
                having,
                order_by,
            } => {
                // Build initial scan from primary FROM table
                let from_name = from.effective_name().to_string();
                let mut plan = LogicalPlan::TableScan {
                    table: from.name.clone(),
                };

                // Add JOINs left-to-right
                let mut current_left_name = from_name;
                for join_clause in joins {
                    let right_name = join_clause.table.effective_name().to_string();
                    let right_scan = LogicalPlan::TableScan {
                        table: join_clause.table.name.clone(),
                    };
                    plan = LogicalPlan::Join {
                        left: Box::new(plan),
                        right: Box::new(right_scan),
                        join_type: join_clause.join_type,
                        condition: join_clause.condition,
                        left_name: current_left_name.clone(),
                        right_name: right_name.clone(),
                    };
                    // Chained joins are not supported beyond a simple name:
                    // the combined name is only used for error messages.
                    current_left_name = format!("{}_{}", current_left_name, right_name);
                }

                let with_filter = if let Some(pred) = selection {
                    LogicalPlan::Filter {
                        input: Box::new(plan),
                        predicate: pred,
                    }
                } else {
                    plan
                };

                // Collect every aggregate call appearing in the SELECT list
                // or HAVING; their presence (even with an empty GROUP BY)
                // triggers a whole-table group.
                let mut aggregates: Vec<AggregateSpec> = Vec::new();
                for item in &columns {
                    if let SelectItem::Expr { expr, .. } = item {
                        collect_aggregates(expr, &mut aggregates);
                    }
                }
                if let Some(h) = &having {
                    collect_aggregates(h, &mut aggregates);
                }
                let has_group_by = !group_by.is_empty() || !aggregates.is_empty();

                let with_group = if has_group_by {
                    LogicalPlan::GroupBy {
                        input: Box::new(with_filter),
                        keys: group_by,
                        aggregates,
                    }
                } else {
                    with_filter
                };

                let with_having = match having {
                    Some(h) => {
                        let predicate = if has_group_by {
                            rewrite_aggregate_refs(&h)
                        } else {
                            h
                        };
                        LogicalPlan::Filter {
                            input: Box::new(with_group),
                            predicate,
                        }
                    }
                    None => with_group,
                };

                let has_wildcard = columns.iter().any(|c| matches!(c, SelectItem::Wildcard));
                let with_project = if has_wildcard {
                    LogicalPlan::Project {
                        input: Box::new(with_having),
                        items: vec![ProjectItem::Wildcard],
                    }
                } else {
                    let items = columns
                        .into_iter()
                        .map(|c| match c {
                            SelectItem::Wildcard => ProjectItem::Wildcard,
                            SelectItem::Expr { expr, alias } => {
                                let expr = if has_group_by {
                                    rewrite_aggregate_refs(&expr)
                                } else {
                                    expr
                                };
                                ProjectItem::Expr { expr, alias }
                            }
                        })
                        .collect();
                    LogicalPlan::Project {
                        input: Box::new(with_having),
                        items,
                    }
                };

                // Add Sort node if ORDER BY is present
                let with_sort = if !order_by.is_empty() {
                    let order_exprs = order_by
                        .into_iter()
                        .map(|o| OrderByExpr {
                            expr: o.expr,
                            desc: o.desc,
                        })
                        .collect();
                    LogicalPlan::Sort {
                        input: Box::new(with_project),
                        order_by: order_exprs,
                    }
                } else {
                    with_project
                };

                Ok(with_sort)
            }
        }
    }

    /// Apply optimization rules.
    fn optimize(plan: LogicalPlan, _ctx: &mut PlanningContext) -> DbResult<LogicalPlan> {
        let p1 = Self::pushdown(plan);
        let p2 = Self::prune_project(p1);
        let p3 = Self::eliminate_redundant(p2);
        Ok(p3)
    }

    /// Rewrite rule 3: drop a Filter whose predicate is the literal `true`,
    /// and drop a Project that is the identity on its child's schema. A
    /// wildcard `SELECT *` is identity by construction, since its output
    /// columns are exactly the child's in the same order, so it is always
    /// dropped, not just when directly above a scan.
    fn eliminate_redundant(plan: LogicalPlan) -> LogicalPlan {
        use LogicalPlan::*;
        match plan {
            Filter { input, predicate } => {
                let input = Self::eliminate_redundant(*input);
                if matches!(predicate, Expr::Literal(Value::Bool(true))) {
                    input
                } else {
                    Filter {
                        input: Box::new(input),
                        predicate,
                    }
                }
            }
            Project { input, items } => {
                let input = Self::eliminate_redundant(*input);
                if matches!(items.as_slice(), [ProjectItem::Wildcard]) {
                    input
                } else {
                    Project {
                        input: Box::new(input),
                        items,
                    }
                }
            }
            GroupBy {
                input,
                keys,
                aggregates,
            } => GroupBy {
                input: Box::new(Self::eliminate_redundant(*input)),
                keys,
                aggregates,
            },
            Sort { input, order_by } => Sort {
                input: Box::new(Self::eliminate_redundant(*input)),
                order_by,
            },
            Update {
                table,
                assignments,
                predicate,
            } => Update {
                table,
                assignments,
                predicate: predicate
                    .filter(|p| !matches!(p, Expr::Literal(Value::Bool(true)))),
            },
            Delete { table, predicate } => Delete {
                table,
                predicate: predicate
                    .filter(|p| !matches!(p, Expr::Literal(Value::Bool(true)))),
            },
            Insert { .. } | TableScan { .. } => plan,
            Join {
                left,
                right,
                join_type,
                condition,
                left_name,
                right_name,
            } => Join {
                left: Box::new(Self::eliminate_redundant(*left)),
                right: Box::new(Self::eliminate_redundant(*right)),
                join_type,
                condition,
                left_name,
                right_name,
            },
        }
    }

    /// Push filters closer to table scans.
    fn pushdown(plan: LogicalPlan) -> LogicalPlan {
        use LogicalPlan::*;
        match plan {
            Filter { input, predicate } => match *input {
                Project { input: inner, items } => {
                    // Only push down through a pure wildcard projection.
                    if matches!(items.as_slice(), [ProjectItem::Wildcard]) {
                        Filter {
                            input: inner,
                            predicate,
                        }
                    } else {
                        Filter {
                            input: Box::new(Project { input: inner, items }),
                            predicate,
                        }
                    }
                }
                other => Filter {
                    input: Box::new(Self::pushdown(other)),
                    predicate,
                },
            },
            Project { input, items } => Project {
                input: Box::new(Self::pushdown(*input)),
                items,
            },
            GroupBy {
                input,
                keys,
                aggregates,
            } => GroupBy {
                input: Box::new(Self::pushdown(*input)),
                keys,
                aggregates,
            },
            Sort { input, order_by } => Sort {
                input: Box::new(Self::pushdown(*input)),
                order_by,
            },
            Insert { .. } | Update { .. } | Delete { .. } | TableScan { .. } => plan,
            // For joins, recurse into both sides but don't try to push filters through yet
            Join {
                left,
                right,
                join_type,
                condition,
                left_name,
                right_name,
            } => Join {
                left: Box::new(Self::pushdown(*left)),
                right: Box::new(Self::pushdown(*right)),
                join_type,
                condition,
                left_name,
                right_name,
            },
        }
    }

    /// Remove redundant projections.
    fn prune_project(plan: LogicalPlan) -> LogicalPlan {
        use LogicalPlan::*;
        match plan {
            Project { input, items } => match *input {
                Project {
                    input: inner,
                    items: inner_items,
                } => {
                    // Remove double project when the outer one is a pure wildcard.
                    if matches!(items.as_slice(), [ProjectItem::Wildcard]) {
                        Project {
                            input: inner,
                            items: inner_items,
                        }
                    } else {
                        Project {
                            input: Box::new(Self::prune_project(Project {
                                input: inner,
                                items: inner_items,
                            })),
                            items,
                        }
                    }
                }
                other => Project {
                    input: Box::new(Self::prune_project(other)),
                    items,
                },
            },
            Filter { input, predicate } => Filter {
                input: Box::new(Self::prune_project(*input)),
                predicate,
            },
            GroupBy {
                input,
                keys,
                aggregates,
            } => GroupBy {
                input: Box::new(Self::prune_project(*input)),
                keys,
                aggregates,
            },
            Sort { input, order_by } => Sort {
                input: Box::new(Self::prune_project(*input)),
                order_by,
            },
            other => other,
        }
    }

    /// Bind names to IDs and generate physical plan.
    fn bind(plan: LogicalPlan, ctx: &mut PlanningContext) -> DbResult<PhysicalPlan> {
        match plan {
            LogicalPlan::TableScan { table } => {
                let t = ctx.table(&table)?;
                Ok(PhysicalPlan::SeqScan {
                    table_id: t.id,
                    schema: t.schema.columns.iter().map(|c| c.name.clone()).collect(),
                })
            }
            LogicalPlan::Filter { input, predicate } => {
                let input_physical = Self::bind(*input, ctx)?;
                let resolved = Self::bind_expr(&input_physical, predicate)?;

                // Try index scan optimization using composite key selection
                if let PhysicalPlan::SeqScan { table_id, schema } = &input_physical
                    && let Some((index_name, idx_pred, fully_covered)) =
                        Self::find_best_index(ctx, table_id, &resolved)
                {
                    let idx_scan = PhysicalPlan::IndexScan {
                        table_id: *table_id,
                        index_name,
                        predicate: idx_pred,
                        schema: schema.clone(),
                    };
                    // A predicate fully covered by the index predicate needs no
                    // Filter above the scan; a predicate only partly covered
                    // (e.g. a prefix of a composite index) still needs the
                    // residual Filter on top.
                    if fully_covered {
                        return Ok(idx_scan);
                    }
                    return Ok(PhysicalPlan::Filter {
                        input: Box::new(idx_scan),
                        predicate: resolved,
                    });
                }

                Ok(PhysicalPlan::Filter {
                    input: Box::new(input_physical),
                    predicate: resolved,
                })
            }
            LogicalPlan::Project { input, items } => {
                let input_physical = Self::bind(*input, ctx)?;
                let schema = Self::output_schema(&input_physical);

                if matches!(items.as_slice(), [ProjectItem::Wildcard]) {
                    let cols = schema
                        .iter()
                        .enumerate()
                        .map(|(i, name)| (name.clone(), ResolvedExpr::Column(i as ColumnId)))
                        .collect();
                    return Ok(PhysicalPlan::Project {
                        input: Box::new(input_physical),
                        columns: cols,
                    });
                }

                let cols = items
                    .into_iter()
                    .map(|item| match item {
                        ProjectItem::Wildcard => {
                            Err(DbError::Planner("wildcard cannot be mixed with other select items".into()))
                        }
                        ProjectItem::Expr { expr, alias } => {
                            let name = alias.unwrap_or_else(|| output_name_for_expr(&expr));
                            let resolved = Self::bind_expr_with_schema(&schema, expr)?;
                            Ok((name, resolved))
                        }
                    })
                    .collect::<DbResult<Vec<_>>>()?;

                Ok(PhysicalPlan::Project {
                    input: Box::new(input_physical),
                    columns: cols,
                })
            }
            LogicalPlan::GroupBy {
                input,
                keys,
                aggregates,
            } => {
                let input_physical = Self::bind(*input, ctx)?;
                let schema = Self::output_schema(&input_physical);

                let key_ids = keys
                    .iter()
                    .map(|k| {
                        schema
                            .iter()
                            .position(|c| c.eq_ignore_ascii_case(k))
                            .map(|i| i as ColumnId)
                            .ok_or_else(|| {
                                DbError::Planner(format!("GROUP BY references unknown column '{k}'"))
                            })
                    })
                    .collect::<DbResult<Vec<_>>>()?;

                let resolved_aggs = aggregates
                    .into_iter()
                    .map(|a| {
                        let arg = a
                            .arg
                            .as_ref()
                            .map(|e| match e {
                                Expr::Column { table, name } => {
                                    Self::find_column_in_schema(&schema, table.as_deref(), name)
                                        .map(|i| i as ColumnId)
                                }
                                _ => Err(DbError::Planner(
                                    "aggregate argument must be a column reference".into(),
                                )),
                            })
                            .transpose()?;
                        Ok(ResolvedAggregate {
                            func: a.func,
                            arg,
                            display_name: a.display_name,
                        })
                    })
                    .collect::<DbResult<Vec<_>>>()?;

                let out_schema: Vec<String> = keys
                    .into_iter()
                    .chain(resolved_aggs.iter().map(|a| a.display_name.clone()))
                    .collect();

                Ok(PhysicalPlan::GroupBy {
                    input: Box::new(input_physical),
                    keys: key_ids,
                    aggregates: resolved_aggs,
                    schema: out_schema,
                })
            }
            LogicalPlan::Insert {
                table,
                columns,
                values,
            } => {
                let t = ctx.table(&table)?;
                let schema_names: Vec<String> =
                    t.schema.columns.iter().map(|c| c.name.clone()).collect();
                let target_columns = columns.unwrap_or_else(|| schema_names.clone());
                if target_columns.len() != values.len() {
                    return Err(DbError::Planner(format!(
                        "INSERT has {} value(s) but {} column(s) are targeted",
                        values.len(),
                        target_columns.len()
                    )));
                }

                // Any column not targeted is left NULL; the analyser has
                // already checked arity against the target list.
                let mut full_values: Vec<ResolvedExpr> =
                    vec![ResolvedExpr::Literal(Value::Null); schema_names.len()];
                for (col_name, value) in target_columns.into_iter().zip(values.into_iter()) {
                    let idx = t.schema.column_index(&col_name).ok_or_else(|| {
                        DbError::Planner(format!("unknown column '{col_name}'"))
                    })?;
                    full_values[idx as usize] = Self::bind_expr_with_schema(&schema_names, value)?;
                }

                Ok(PhysicalPlan::Insert {
                    table_id: t.id,
                    values: full_values,
                })
            }
            LogicalPlan::Update {
                table,
                assignments,
                predicate,
            } => {
                let t = ctx.table(&table)?;
                let schema = &t.schema;
                let schema_names: Vec<String> =
                    schema.columns.iter().map(|c| c.name.clone()).collect();
                let assigns = assignments
                    .into_iter()
                    .map(|(name, e)| {
                        let idx = schema
                            .column_index(&name)
                            .ok_or_else(|| DbError::Planner(format!("unknown column '{name}'")))?;
                        let re = Self::bind_expr_with_schema(&schema_names, e)?;
                        Ok((idx, re))
                    })
                    .collect::<DbResult<Vec<_>>>()?;
                let pred = predicate
                    .map(|p| Self::bind_expr_with_schema(&schema_names, p))
                    .transpose()?;
                Ok(PhysicalPlan::Update {
                    table_id: t.id,
                    assignments: assigns,
                    predicate: pred,
                })
            }
            LogicalPlan::Delete { table, predicate } => {
                let t = ctx.table(&table)?;
                let schema_names: Vec<String> =
                    t.schema.columns.iter().map(|c| c.name.clone()).collect();
                let pred = predicate
                    .map(|p| Self::bind_expr_with_schema(&schema_names, p))
                    .transpose()?;
                Ok(PhysicalPlan::Delete {
                    table_id: t.id,
                    predicate: pred,
                })
            }
            LogicalPlan::Sort { input, order_by } => {
                let input_physical = Self::bind(*input, ctx)?;
                let schema = Self::output_schema(&input_physical);

                let resolved_order_by = order_by
                    .into_iter()
                    .map(|order_expr| {
                        let col_id = match &order_expr.expr {
                            Expr::Column { table, name } => {
                                Self::find_column_in_schema(&schema, table.as_deref(), name)?
                                    as ColumnId
                            }
                            _ => {
                                return Err(DbError::Planner(
                                    "ORDER BY expression must be a column reference".into(),
                                ))
                            }
                        };
                        Ok(ResolvedOrderByExpr {
                            column_id: col_id,
                            desc: order_expr.desc,
                        })
                    })
                    .collect::<DbResult<Vec<_>>>()?;

                Ok(PhysicalPlan::Sort {
                    input: Box::new(input_physical),
                    order_by: resolved_order_by,
                })
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
                left_name,
                right_name,
            } => {
                // Bind left and right sides
                let left_physical = Self::bind(*left, ctx)?;
                let right_physical = Self::bind(*right, ctx)?;

                // Get schemas from both sides
                let left_schema = Self::output_schema(&left_physical);
                let right_schema = Self::output_schema(&right_physical);

                // Build combined schema with table/alias prefixes
                let combined_schema: Vec<String> = left_schema
                    .iter()
                    .map(|col| {
                        // If already qualified, keep it; otherwise prefix with table name
                        if col.contains('.') {
                            col.clone()
                        } else {
                            format!("{}.{}", left_name, col)
                        }
                    })
                    .chain(right_schema.iter().map(|col| {
                        if col.contains('.') {
                            col.clone()
                        } else {
                            format!("{}.{}", right_name, col)
                        }
                    }))
                    .collect();

                // Bind condition expression with combined schema
                let resolved_condition = Self::bind_expr_with_schema(&combined_schema, condition)?;

                Ok(PhysicalPlan::NestedLoopJoin {
                    left: Box::new(left_physical),
                    right: Box::new(right_physical),
                    join_type,
                    condition: resolved_condition,
                    schema: combined_schema,
                })
            }
        }
    }

    /// Get the output schema (column names) from a physical plan.
    fn output_schema(plan: &PhysicalPlan) -> Vec<String> {
        match plan {
            PhysicalPlan::SeqScan { schema, .. }
            | PhysicalPlan::IndexScan { schema, .. }
            | PhysicalPlan::NestedLoopJoin { schema, .. }
            | PhysicalPlan::GroupBy { schema, .. } => schema.clone(),
            PhysicalPlan::Filter { input, .. } | PhysicalPlan::Sort { input, .. } => {
                Self::output_schema(input)
            }
            PhysicalPlan::Project { columns, .. } => {
                columns.iter().map(|(name, _)| name.clone()).collect()
            }
            PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => {
                vec![]
            }
        }
    }

    /// Bind expression with input schema context.
    fn bind_expr(input: &PhysicalPlan, e: Expr) -> DbResult<ResolvedExpr> {
        let schema = Self::output_schema(input);
        Self::bind_expr_with_schema(&schema, e)
    }

    /// Bind expression with explicit schema.
    fn bind_expr_with_schema(schema: &[String], e: Expr) -> DbResult<ResolvedExpr> {
        match e {
            Expr::Literal(v) => Ok(ResolvedExpr::Literal(v)),
            Expr::Column { table, name } => {
                let idx = Self::find_column_in_schema(schema, table.as_deref(), &name)?;
                Ok(ResolvedExpr::Column(idx as ColumnId))
            }
            Expr::Unary { op, expr } => Ok(ResolvedExpr::Unary {
                op,
                expr: Box::new(Self::bind_expr_with_schema(schema, *expr)?),
            }),
            Expr::Binary { left, op, right } => Ok(ResolvedExpr::Binary {
                left: Box::new(Self::bind_expr_with_schema(schema, *left)?),
                op,
                right: Box::new(Self::bind_expr_with_schema(schema, *right)?),
            }),
            Expr::InList {
                expr,
                list,
                negated,
            } => Ok(ResolvedExpr::InList {
                expr: Box::new(Self::bind_expr_with_schema(schema, *expr)?),
                list: list
                    .into_iter()
                    .map(|item| Self::bind_expr_with_schema(schema, item))
                    .collect::<DbResult<Vec<_>>>()?,
                negated,
            }),
            Expr::Function { name, .. } => {
                // Aggregate calls are rewritten to column references over the
                // GroupBy output before reaching this point (see
                // `rewrite_aggregate_refs`). Anything else (arithmetic,
                // scalar functions) is evaluated by the execution engine,
                // whose internals this planner does not specify.
                Err(DbError::Planner(format!(
                    "function '{name}' cannot be evaluated by the planner"
                )))
            }
        }
    }

    /// Find column in schema, supporting both qualified and unqualified references.
    ///
    /// Schema entries may be simple ("id") or qualified ("users.id").
    /// - Qualified ref: Look for exact match "table.column"
    /// - Unqualified ref: Match simple "column" or suffix ".column", error if ambiguous
    fn find_column_in_schema(schema: &[String], table: Option<&str>, name: &str) -> DbResult<usize> {
        if let Some(qualifier) = table {
            // Qualified: look for exact "table.column" match
            let full_name = format!("{}.{}", qualifier, name);
            schema
                .iter()
                .position(|c| c.eq_ignore_ascii_case(&full_name))
                .ok_or_else(|| {
                    DbError::Planner(format!("unknown column '{}.{}'", qualifier, name))
                })
        } else {
            // Unqualified: search for simple match or suffix match
            // First try exact match
            if let Some(idx) = schema.iter().position(|c| c.eq_ignore_ascii_case(name)) {
                return Ok(idx);
            }
            // Then try suffix match (for qualified schema columns)
            let suffix = format!(".{}", name.to_lowercase());
            let matches: Vec<usize> = schema
                .iter()
                .enumerate()
                .filter(|(_, c)| c.to_lowercase().ends_with(&suffix))
                .map(|(i, _)| i)
                .collect();
            match matches.len() {
                0 => Err(DbError::Planner(format!("unknown column '{}'", name))),
                1 => Ok(matches[0]),
                _ => Err(DbError::Planner(format!(
                    "ambiguous column '{}' (exists in multiple tables)",
                    name
                ))),
            }
        }
    }

    /// Try to extract a simple index predicate from an expression (single-column).
    fn try_extract_index_predicate(pred: &ResolvedExpr) -> Option<(ColumnId, IndexPredicate)> {
        if let ResolvedExpr::Binary { left, op, right } = pred
            && let (ResolvedExpr::Column(col), ResolvedExpr::Literal(val)) = (&**left, &**right)
        {
            return Some(match op {
                BinaryOp::Eq => (
                    *col,
                    IndexPredicate::Eq {
                        col: *col,
                        value: ResolvedExpr::Literal(val.clone()),
                    },
                ),
                BinaryOp::Lt | BinaryOp::Le => (
                    *col,
                    IndexPredicate::Range {
                        col: *col,
                        low: ResolvedExpr::Literal(Value::Int(i64::MIN)),
                        high: ResolvedExpr::Literal(val.clone()),
                    },
                ),
                BinaryOp::Gt | BinaryOp::Ge => (
                    *col,
                    IndexPredicate::Range {
                        col: *col,
                        low: ResolvedExpr::Literal(val.clone()),
                        high: ResolvedExpr::Literal(Value::Int(i64::MAX)),
                    },
                ),
                _ => return None,
            });
        }
        None
    }

    /// Extract all equality predicates from a conjunction (AND tree).
    fn extract_equality_predicates(pred: &ResolvedExpr) -> Vec<(ColumnId, ResolvedExpr)> {
        let mut result = Vec::new();
        Self::collect_equality_predicates(pred, &mut result);
        result
    }

    /// Recursively collect equality predicates from AND expressions.
    fn collect_equality_predicates(pred: &ResolvedExpr, out: &mut Vec<(ColumnId, ResolvedExpr)>) {
        match pred {
            ResolvedExpr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                Self::collect_equality_predicates(left, out);
                Self::collect_equality_predicates(right, out);
            }
            ResolvedExpr::Binary {
                left,
                op: BinaryOp::Eq,
                right,
            } => {
                // col = val
                if let (ResolvedExpr::Column(col), ResolvedExpr::Literal(_)) = (&**left, &**right) {
                    out.push((*col, (**right).clone()));
                }
                // val = col
                else if let (ResolvedExpr::Literal(_), ResolvedExpr::Column(col)) =
                    (&**left, &**right)
                {
                    out.push((*col, (**left).clone()));
                }
            }
            _ => {}
        }
    }

    /// Check if a predicate contains only equality comparisons (no ranges).
    fn is_pure_equality_predicate(pred: &ResolvedExpr) -> bool {
        match pred {
            ResolvedExpr::Binary {
                op: BinaryOp::Eq, ..
            } => true,
            ResolvedExpr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => Self::is_pure_equality_predicate(left) && Self::is_pure_equality_predicate(right),
            _ => false,
        }
    }

    /// Find the best index for a predicate, supporting composite keys.
    ///
    /// Ranking:
    /// 1. Full composite match > prefix match > single column
    /// 2. For equality: prefer Hash > BTree
    /// 3. For range: require BTree
    ///
    /// The returned `bool` is `true` when the index predicate alone decides
    /// every row the original predicate would have decided, so no residual
    /// Filter is needed on top of the `IndexScan`: a Filter fully matching
    /// an indexed column prefix is replaced by the `IndexScan`, not kept
    /// above it. It is `false` when the index only covers a strict prefix
    /// of a multi-column predicate, leaving columns unchecked that still
    /// need a Filter above the scan.
    fn find_best_index(
        ctx: &PlanningContext,
        table_id: &TableId,
        pred: &ResolvedExpr,
    ) -> Option<(String, IndexPredicate, bool)> {
        let table_meta = ctx.catalog.table_by_id(*table_id).ok()?;
        let indexes: Vec<_> = table_meta.indexes().to_vec();

        if indexes.is_empty() {
            return None;
        }

        let is_equality_only = Self::is_pure_equality_predicate(pred);
        let eq_preds = Self::extract_equality_predicates(pred);

        if eq_preds.is_empty() {
            // No equality predicates - try range predicates with single-column extraction.
            // `try_extract_index_predicate` only matches when the whole predicate is one
            // `col op literal` expression, so a match here always fully covers `pred`.
            if let Some((col, range_pred)) = Self::try_extract_index_predicate(pred) {
                for idx in &indexes {
                    if idx.columns.len() == 1
                        && idx.columns[0] == col
                        && matches!(idx.kind, IndexKind::BTree)
                    {
                        return Some((idx.name.clone(), range_pred, true));
                    }
                }
            }
            return None;
        }

        // Build map of column -> value for quick lookup
        let pred_map: std::collections::HashMap<ColumnId, ResolvedExpr> =
            eq_preds.into_iter().collect();

        // Score each index by prefix column coverage
        let mut best_match: Option<(&catalog::IndexMeta, usize)> = None;

        for idx in &indexes {
            // Filter by index kind based on predicate type
            if !is_equality_only && !matches!(idx.kind, IndexKind::BTree) {
                continue; // Range requires BTree
            }
            if !matches!(idx.kind, IndexKind::BTree | IndexKind::Hash) {
                continue; // Only BTree and Hash supported
            }

            // Check prefix match: index columns must match predicate columns in order
            let mut matched_count = 0;
            for &col in &idx.columns {
                if pred_map.contains_key(&col) {
                    matched_count += 1;
                } else {
                    break; // Prefix match broken
                }
            }

            if matched_count > 0 {
                let is_better = match &best_match {
                    None => true,
                    Some((_, best_count)) => {
                        // Prefer more columns matched
                        matched_count > *best_count
                    }
                };
                if is_better {
                    best_match = Some((idx, matched_count));
                }
            }
        }

        let (best_idx, matched_count) = best_match?;

        // Build the predicate
        let columns: Vec<ColumnId> = best_idx.columns[..matched_count].to_vec();
        let values: Vec<ResolvedExpr> = columns
            .iter()
            .map(|col| pred_map.get(col).cloned().unwrap())
            .collect();

        let predicate = if matched_count == 1 {
            IndexPredicate::Eq {
                col: columns[0],
                value: values.into_iter().next().unwrap(),
            }
        } else {
            IndexPredicate::CompositeEq { columns, values }
        };

        // Fully covered only when the predicate is nothing but equality
        // conjuncts (`is_equality_only`) and every one of them landed in the
        // matched index prefix. A non-equality conjunct (e.g. `id = 5 AND
        // age > 10`) can share a column with `pred_map` without actually
        // being decided by the index, so it must keep its residual Filter;
        // a shorter prefix of a multi-column equality predicate leaves the
        // unmatched columns unchecked the same way.
        let fully_covered = is_equality_only && matched_count == pred_map.len();

        Some((best_idx.name.clone(), predicate, fully_covered))
    }
}

/// Recursively collect distinct aggregate calls from an expression tree.
fn collect_aggregates(expr: &Expr, out: &mut Vec<AggregateSpec>) {
    match expr {
        Expr::Function { name, args, star } if expr.is_aggregate_call() => {
            let display = display_name_for_expr(expr);
            if out.iter().any(|a| a.display_name == display) {
                return;
            }
            let func = AggregateFunc::from_name(name).expect("checked by is_aggregate_call");
            let arg = if *star { None } else { args.first().cloned() };
            out.push(AggregateSpec {
                func,
                arg,
                display_name: display,
            });
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect_aggregates(arg, out);
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::Unary { expr, .. } => collect_aggregates(expr, out),
        Expr::InList { expr, list, .. } => {
            collect_aggregates(expr, out);
            for item in list {
                collect_aggregates(item, out);
            }
        }
        Expr::Literal(_) | Expr::Column { .. } => {}
    }
}

/// Replace aggregate calls with a column reference to their post-GroupBy
/// result, leaving everything else untouched. Used to rewrite HAVING and
/// SELECT-list expressions once a GroupBy node has been introduced.
fn rewrite_aggregate_refs(expr: &Expr) -> Expr {
    if expr.is_aggregate_call() {
        return Expr::Column {
            table: None,
            name: display_name_for_expr(expr),
        };
    }
    match expr {
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(rewrite_aggregate_refs(left)),
            op: *op,
            right: Box::new(rewrite_aggregate_refs(right)),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(rewrite_aggregate_refs(expr)),
        },
        Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(rewrite_aggregate_refs(expr)),
            list: list.iter().map(rewrite_aggregate_refs).collect(),
            negated: *negated,
        },
        Expr::Function { name, args, star } => Expr::Function {
            name: name.clone(),
            args: args.iter().map(rewrite_aggregate_refs).collect(),
            star: *star,
        },
        other => other.clone(),
    }
}

/// Canonical text for an expression, used both as an aggregate's display
/// name and as the default output column name for a non-aliased SELECT item.
fn display_name_for_expr(expr: &Expr) -> String {
    match expr {
        Expr::Column { table, name } => match table {
            Some(t) => format!("{t}.{name}"),
            None => name.clone(),
        },
        Expr::Function { name, args, star } => {
            if *star {
                format!("{name}(*)")
            } else {
                let inner = args
                    .iter()
                    .map(display_name_for_expr)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{name}({inner})")
            }
        }
        Expr::Literal(v) => format!("{v:?}"),
        Expr::Unary { op, expr } => format!("{op:?}({})", display_name_for_expr(expr)),
        Expr::Binary { left, op, right } => format!(
            "({} {:?} {})",
            display_name_for_expr(left),
            op,
            display_name_for_expr(right)
        ),
        Expr::InList {
            expr,
            negated,
            list,
        } => format!(
            "{}{}IN({})",
            display_name_for_expr(expr),
            if *negated { " NOT " } else { " " },
            list.len()
        ),
    }
}

fn output_name_for_expr(expr: &Expr) -> String {
    match expr {
        Expr::Column { name, .. } => name.clone(),
        other => display_name_for_expr(other),
    }
}

/// Estimate the total cost of a physical plan, summed over the subtree, per
/// the fixed per-operator weights: SeqScan=100, IndexScan=10, Filter=5,
/// Project=2, Join=200 (×3 if CROSS), GroupBy=150, Sort=300+50·|keys|.
pub fn estimate_cost(plan: &PhysicalPlan) -> u64 {
    match plan {
        PhysicalPlan::SeqScan { .. } => 100,
        PhysicalPlan::IndexScan { .. } => 10,
        PhysicalPlan::Filter { input, .. } => 5 + estimate_cost(input),
        PhysicalPlan::Project { input, .. } => 2 + estimate_cost(input),
        PhysicalPlan::GroupBy { input, .. } => 150 + estimate_cost(input),
        PhysicalPlan::Sort { input, order_by } => {
            300 + 50 * order_by.len() as u64 + estimate_cost(input)
        }
        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            join_type,
            ..
        } => {
            let base = if matches!(join_type, JoinType::Cross) {
                200 * 3
            } else {
                200
            };
            base + estimate_cost(left) + estimate_cost(right)
        }
        PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => 0,
    }
}

/// Pretty-print a logical plan for debugging.
pub fn explain_logical(p: &LogicalPlan) -> String {
    match p {
        LogicalPlan::TableScan { table } => format!("TableScan table={}", table),
        LogicalPlan::Filter { input, predicate } => format!(
            "Filter [{predicate:?}]\n  {}",
            indent(&explain_logical(input))
        ),
        LogicalPlan::Project { input, items } => format!(
            "Project items={:?}\n  {}",
            items,
            indent(&explain_logical(input))
        ),
        LogicalPlan::GroupBy {
            input,
            keys,
            aggregates,
        } => format!(
            "GroupBy keys={:?} aggregates={:?}\n  {}",
            keys,
            aggregates,
            indent(&explain_logical(input))
        ),
        LogicalPlan::Insert {
            table,
            columns,
            values,
        } => format!(
            "Insert table={} columns={:?} values={:?}",
            table, columns, values
        ),
        LogicalPlan::Update {
            table,
            assignments,
            predicate,
        } => format!(
            "Update table={} assigns={:?} pred={:?}",
            table, assignments, predicate
        ),
        LogicalPlan::Delete { table, predicate } => {
            format!("Delete table={} pred={:?}", table, predicate)
        }
        LogicalPlan::Sort { input, order_by } => {
            format!("Sort {:?}\n  {}", order_by, indent(&explain_logical(input)))
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            condition,
            left_name,
            right_name,
        } => format!(
            "Join type={:?} on={:?} ({} x {})\n  left: {}\n  right: {}",
            join_type,
            condition,
            left_name,
            right_name,
            indent(&explain_logical(left)),
            indent(&explain_logical(right))
        ),
    }
}

/// Pretty-print a physical plan for debugging.
pub fn explain_physical(p: &PhysicalPlan) -> String {
    match p {
        PhysicalPlan::SeqScan { table_id, .. } => format!("SeqScan table_id={}", table_id.0),
        PhysicalPlan::IndexScan {
            table_id,
            index_name,
            predicate,
            ..
        } => format!(
            "IndexScan table_id={} index={} pred={predicate:?}",
            table_id.0, index_name
        ),
        PhysicalPlan::Filter { input, predicate } => format!(
            "Filter [{predicate:?}]\n  {}",
            indent(&explain_physical(input))
        ),
        PhysicalPlan::Project { input, columns } => format!(
            "Project {:?}\n  {}",
            columns,
            indent(&explain_physical(input))
        ),
        PhysicalPlan::GroupBy {
            input,
            keys,
            aggregates,
            ..
        } => format!(
            "GroupBy keys={:?} aggregates={:?}\n  {}",
            keys,
            aggregates,
            indent(&explain_physical(input))
        ),
        PhysicalPlan::Insert { table_id, values } => {
            format!("Insert table_id={} values={:?}", table_id.0, values)
        }
        PhysicalPlan::Update {
            table_id,
            assignments,
            predicate,
        } => format!(
            "Update table_id={} assigns={:?} pred={:?}",
            table_id.0, assignments, predicate
        ),
        PhysicalPlan::Delete {
            table_id,
            predicate,
        } => format!("Delete table_id={} pred={:?}", table_id.0, predicate),
        PhysicalPlan::Sort { input, order_by } => format!(
            "Sort {:?}\n  {}",
            order_by,
            indent(&explain_physical(input))
        ),
        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            join_type,
            condition,
            schema,
        } => format!(
            "NestedLoopJoin type={:?} on={:?} schema={:?}\n  left: {}\n  right: {}",
            join_type,
            condition,
            schema,
            indent(&explain_physical(left)),
            indent(&explain_physical(right))
        ),
    }
}

fn indent(s: &str) -> String {
    s.lines()
        .map(|l| format!("  {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
