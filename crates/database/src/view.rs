//! Renders a parsed `SELECT` statement back into SQL text.
//!
//! `CreateView` only carries the query as an AST (positions are not kept past
//! parsing, see [`analyzer`]'s own note on this), so the catalog's
//! `query_text` has to be reconstructed rather than sliced out of the
//! original source. Resolving a view later re-parses whatever this produces.

use expr::{BinaryOp, Expr, UnaryOp};
use parser::{JoinClause, JoinType, OrderByItem, SelectItem, Statement, TableRef};
use types::Value;

pub fn render_select(stmt: &Statement) -> String {
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
        unreachable!("render_select called on a non-SELECT statement");
    };

    let mut sql = format!("SELECT {} FROM {}", render_columns(columns), render_table_ref(from));
    for join in joins {
        sql.push(' ');
        sql.push_str(&render_join(join));
    }
    if let Some(pred) = selection {
        sql.push_str(" WHERE ");
        sql.push_str(&render_expr(pred));
    }
    if !group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by.join(", "));
    }
    if let Some(h) = having {
        sql.push_str(" HAVING ");
        sql.push_str(&render_expr(h));
    }
    if !order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&render_order_by(order_by));
    }
    sql
}

fn render_columns(columns: &[SelectItem]) -> String {
    if columns.is_empty() {
        return "*".into();
    }
    columns.iter().map(render_select_item).collect::<Vec<_>>().join(", ")
}

fn render_select_item(item: &SelectItem) -> String {
    match item {
        SelectItem::Wildcard => "*".into(),
        SelectItem::Expr { expr, alias } => match alias {
            Some(a) => format!("{} AS {a}", render_expr(expr)),
            None => render_expr(expr),
        },
    }
}

fn render_table_ref(t: &TableRef) -> String {
    match &t.alias {
        Some(a) => format!("{} AS {a}", t.name),
        None => t.name.clone(),
    }
}

fn render_join(j: &JoinClause) -> String {
    let kind = match j.join_type {
        JoinType::Inner => "JOIN",
        JoinType::Left => "LEFT JOIN",
        JoinType::Right => "RIGHT JOIN",
        JoinType::Cross => "CROSS JOIN",
    };
    format!("{kind} {} ON {}", render_table_ref(&j.table), render_expr(&j.condition))
}

fn render_order_by(items: &[OrderByItem]) -> String {
    items
        .iter()
        .map(|i| format!("{}{}", render_expr(&i.expr), if i.desc { " DESC" } else { "" }))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_expr(e: &Expr) -> String {
    match e {
        Expr::Literal(v) => render_value(v),
        Expr::Column { table, name } => match table {
            Some(t) => format!("{t}.{name}"),
            None => name.clone(),
        },
        Expr::Unary { op, expr } => match op {
            UnaryOp::Not => format!("NOT ({})", render_expr(expr)),
        },
        Expr::Binary { left, op, right } => {
            format!("({} {} {})", render_expr(left), render_binary_op(*op), render_expr(right))
        }
        Expr::Function { name, args, star } => {
            if *star {
                format!("{name}(*)")
            } else {
                format!("{name}({})", args.iter().map(render_expr).collect::<Vec<_>>().join(", "))
            }
        }
        Expr::InList { expr, list, negated } => {
            let not = if *negated { "NOT " } else { "" };
            format!("{} {not}IN ({})", render_expr(expr), list.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
    }
}

fn render_binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Int(n) => n.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Null => "NULL".into(),
    }
}
