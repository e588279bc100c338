//! Recursive-descent SQL parser.
//!
//! Consumes the token stream produced by `lexer::tokenize` and builds the
//! internal [`Statement`] AST. Every parsing function returns a
//! `DbResult<T>`, composed with `?` instead of exceptions, and every syntax
//! violation is reported as `DbError::Syntax` carrying the offending
//! token's `(line, column)` and, where useful, the `expected` token.

mod ast;
#[cfg(test)]
mod tests;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{BinaryOp, Expr, UnaryOp};
use lexer::{Token, TokenKind, tokenize};
use types::{SqlType, TypeSpec, Value};

/// Parse SQL text into a list of statements, one per `;`-terminated
/// segment: lex -> parse.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    let tokens = tokenize(sql)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_program(&mut self) -> DbResult<Vec<Statement>> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            let stmt = self.parse_statement()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            statements.push(stmt);
            // Allow stray trailing semicolons / EOF between statements.
            while self.check(&TokenKind::Semicolon) {
                self.advance();
            }
        }
        Ok(statements)
    }

    // ---- statement dispatch ----

    fn parse_statement(&mut self) -> DbResult<Statement> {
        match &self.current().kind {
            TokenKind::Create => self.parse_create(),
            TokenKind::Drop => self.parse_drop(),
            TokenKind::Insert => self.parse_insert(),
            TokenKind::Select => self.parse_select(),
            TokenKind::Update => self.parse_update(),
            TokenKind::Delete => self.parse_delete(),
            TokenKind::Explain => self.parse_explain(),
            _ => Err(self.syntax_error(
                "expected a statement",
                Some("CREATE, DROP, INSERT, SELECT, UPDATE, DELETE, or EXPLAIN"),
            )),
        }
    }

    fn parse_create(&mut self) -> DbResult<Statement> {
        self.advance(); // CREATE
        match &self.current().kind {
            TokenKind::Table => self.parse_create_table(),
            TokenKind::Index => self.parse_create_index(false),
            TokenKind::Identifier(word) if word.eq_ignore_ascii_case("UNIQUE") => {
                self.advance();
                self.expect(TokenKind::Index, "INDEX")?;
                self.parse_create_index(true)
            }
            TokenKind::View => self.parse_create_view(),
            _ => Err(self.syntax_error("expected TABLE, INDEX, or VIEW", Some("TABLE, INDEX, or VIEW"))),
        }
    }

    fn parse_create_table(&mut self) -> DbResult<Statement> {
        self.advance(); // TABLE
        let name = self.expect_identifier("table name")?;
        self.expect(TokenKind::LeftParen, "'('")?;

        let mut columns = Vec::new();
        let mut table_pk: Option<Vec<String>> = None;
        loop {
            if self.check_keyword_primary() {
                self.advance(); // PRIMARY
                self.expect(TokenKind::Key, "KEY")?;
                self.expect(TokenKind::LeftParen, "'('")?;
                let mut cols = Vec::new();
                loop {
                    cols.push(self.expect_identifier("column name")?);
                    if self.match_token(&TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
                self.expect(TokenKind::RightParen, "')'")?;
                table_pk = Some(cols);
            } else {
                let col_name = self.expect_identifier("column name")?;
                let ty = self.parse_type_spec()?;
                let mut primary_key = false;
                if self.check(&TokenKind::Primary) {
                    self.advance();
                    self.expect(TokenKind::Key, "KEY")?;
                    primary_key = true;
                }
                columns.push(ColumnDef {
                    name: col_name,
                    ty,
                    primary_key,
                });
            }

            if self.match_token(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        self.expect(TokenKind::RightParen, "')'")?;

        let primary_key = match (table_pk, columns.iter().find(|c| c.primary_key)) {
            (Some(pk), _) => Some(pk),
            (None, Some(col)) => Some(vec![col.name.clone()]),
            (None, None) => None,
        };

        Ok(Statement::CreateTable {
            name,
            columns,
            primary_key,
        })
    }

    fn check_keyword_primary(&self) -> bool {
        matches!(self.current().kind, TokenKind::Primary)
    }

    fn parse_type_spec(&mut self) -> DbResult<TypeSpec> {
        match &self.current().kind {
            TokenKind::Int => {
                self.advance();
                Ok(TypeSpec {
                    base: SqlType::Int,
                    length: None,
                })
            }
            TokenKind::Boolean => {
                self.advance();
                Ok(TypeSpec {
                    base: SqlType::Bool,
                    length: None,
                })
            }
            TokenKind::Varchar | TokenKind::Char => {
                let is_varchar = matches!(self.current().kind, TokenKind::Varchar);
                self.advance();
                self.expect(TokenKind::LeftParen, "'('")?;
                let (line, column) = self.position();
                let n = self.expect_integer("positive length")?;
                if n <= 0 {
                    return Err(DbError::Syntax {
                        message: format!(
                            "{}(n) requires a positive length",
                            if is_varchar { "VARCHAR" } else { "CHAR" }
                        ),
                        line,
                        column,
                        expected: Some("positive integer".into()),
                    });
                }
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(TypeSpec {
                    base: SqlType::Text,
                    length: Some(n as u32),
                })
            }
            _ => Err(self.syntax_error("expected a column type", Some("INT, VARCHAR(n), CHAR(n), or BOOLEAN"))),
        }
    }

    fn parse_drop(&mut self) -> DbResult<Statement> {
        self.advance(); // DROP
        match &self.current().kind {
            TokenKind::Table => {
                self.advance();
                let if_exists = self.match_if_exists()?;
                let name = self.expect_identifier("table name")?;
                Ok(Statement::DropTable { name, if_exists })
            }
            TokenKind::Index => {
                self.advance();
                let if_exists = self.match_if_exists()?;
                let name = self.expect_identifier("index name")?;
                Ok(Statement::DropIndex { name, if_exists })
            }
            TokenKind::View => {
                self.advance();
                let if_exists = self.match_if_exists()?;
                let name = self.expect_identifier("view name")?;
                let cascade = self.match_token(&TokenKind::Cascade);
                Ok(Statement::DropView {
                    name,
                    if_exists,
                    cascade,
                })
            }
            _ => Err(self.syntax_error("expected TABLE, INDEX, or VIEW", Some("TABLE, INDEX, or VIEW"))),
        }
    }

    fn match_if_exists(&mut self) -> DbResult<bool> {
        if self.check(&TokenKind::If) {
            self.advance();
            self.expect(TokenKind::Exists, "EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_create_index(&mut self, unique: bool) -> DbResult<Statement> {
        self.advance(); // INDEX
        let name = self.expect_identifier("index name")?;
        self.expect(TokenKind::On, "ON")?;
        let table = self.expect_identifier("table name")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.expect_identifier("column name")?);
            if self.match_token(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Statement::CreateIndex {
            name,
            table,
            columns,
            unique,
        })
    }

    fn parse_create_view(&mut self) -> DbResult<Statement> {
        self.advance(); // VIEW
        let name = self.expect_identifier("view name")?;
        self.expect(TokenKind::As, "AS")?;
        let query = Box::new(self.parse_select()?);
        Ok(Statement::CreateView { name, query })
    }

    fn parse_insert(&mut self) -> DbResult<Statement> {
        self.advance(); // INSERT
        self.expect(TokenKind::Into, "INTO")?;
        let table = self.expect_identifier("table name")?;

        let columns = if self.check(&TokenKind::LeftParen) {
            self.advance();
            let mut cols = Vec::new();
            loop {
                cols.push(self.expect_identifier("column name")?);
                if self.match_token(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
            self.expect(TokenKind::RightParen, "')'")?;
            Some(cols)
        } else {
            None
        };

        self.expect(TokenKind::Values, "VALUES")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expr()?);
            if self.match_token(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        self.expect(TokenKind::RightParen, "')'")?;

        Ok(Statement::Insert {
            table,
            columns,
            values,
        })
    }

    fn parse_select(&mut self) -> DbResult<Statement> {
        self.advance(); // SELECT
        let columns = self.parse_select_list()?;
        self.expect(TokenKind::From, "FROM")?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        loop {
            let join_type = match &self.current().kind {
                TokenKind::Join => {
                    self.advance();
                    JoinType::Inner
                }
                TokenKind::Inner => {
                    self.advance();
                    self.expect(TokenKind::Join, "JOIN")?;
                    JoinType::Inner
                }
                TokenKind::Left => {
                    self.advance();
                    let _ = self.match_token(&TokenKind::Inner);
                    self.expect(TokenKind::Join, "JOIN")?;
                    JoinType::Left
                }
                TokenKind::Right => {
                    self.advance();
                    let _ = self.match_token(&TokenKind::Inner);
                    self.expect(TokenKind::Join, "JOIN")?;
                    JoinType::Right
                }
                _ => break,
            };
            let table = self.parse_table_ref()?;
            self.expect(TokenKind::On, "ON")?;
            let condition = self.parse_expr()?;
            joins.push(JoinClause {
                join_type,
                table,
                condition,
            });
        }

        let selection = if self.match_token(&TokenKind::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.match_token(&TokenKind::Group) {
            self.expect(TokenKind::By, "BY")?;
            let mut cols = Vec::new();
            loop {
                cols.push(self.expect_identifier("column name")?);
                if self.match_token(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
            cols
        } else {
            Vec::new()
        };

        let having = if self.match_token(&TokenKind::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.match_token(&TokenKind::Order) {
            self.expect(TokenKind::By, "BY")?;
            let mut items = Vec::new();
            loop {
                let expr = self.parse_expr()?;
                let desc = if self.match_token(&TokenKind::Desc) {
                    true
                } else {
                    let _ = self.match_token(&TokenKind::Asc);
                    false
                };
                items.push(OrderByItem { expr, desc });
                if self.match_token(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
            items
        } else {
            Vec::new()
        };

        Ok(Statement::Select {
            columns,
            from,
            joins,
            selection,
            group_by,
            having,
            order_by,
        })
    }

    fn parse_select_list(&mut self) -> DbResult<Vec<SelectItem>> {
        let mut items = Vec::new();
        loop {
            if self.check(&TokenKind::Asterisk) {
                self.advance();
                items.push(SelectItem::Wildcard);
            } else {
                let expr = self.parse_expr()?;
                let alias = if self.match_token(&TokenKind::As) {
                    Some(self.expect_identifier("alias")?)
                } else {
                    None
                };
                items.push(SelectItem::Expr { expr, alias });
            }
            if self.match_token(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        Ok(items)
    }

    fn parse_table_ref(&mut self) -> DbResult<TableRef> {
        let name = self.expect_identifier("table name")?;
        let alias = if self.match_token(&TokenKind::As) {
            Some(self.expect_identifier("alias")?)
        } else if let TokenKind::Identifier(word) = &self.current().kind {
            // Bare alias is only accepted when the next token is a
            // non-reserved identifier (tie-break rule).
            let alias = word.clone();
            self.advance();
            Some(alias)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_update(&mut self) -> DbResult<Statement> {
        self.advance(); // UPDATE
        let table = self.expect_identifier("table name")?;
        self.expect(TokenKind::Set, "SET")?;
        let mut assignments = Vec::new();
        loop {
            let col = self.expect_identifier("column name")?;
            self.expect(TokenKind::Equals, "'='")?;
            let value = self.parse_expr()?;
            assignments.push((col, value));
            if self.match_token(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        let selection = if self.match_token(&TokenKind::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update {
            table,
            assignments,
            selection,
        })
    }

    fn parse_delete(&mut self) -> DbResult<Statement> {
        self.advance(); // DELETE
        self.expect(TokenKind::From, "FROM")?;
        let table = self.expect_identifier("table name")?;
        let selection = if self.match_token(&TokenKind::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete { table, selection })
    }

    fn parse_explain(&mut self) -> DbResult<Statement> {
        self.advance(); // EXPLAIN
        let analyze = self.match_token(&TokenKind::Analyze);
        let query = Box::new(self.parse_statement()?);
        Ok(Statement::Explain { query, analyze })
    }

    // ---- expressions: OR > AND > equality > comparison > additive > multiplicative > unary > primary ----

    fn parse_expr(&mut self) -> DbResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.match_token(&TokenKind::And) {
            let right = self.parse_equality()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Equals => BinaryOp::Eq,
                TokenKind::NotEquals => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            if self.check(&TokenKind::In) || self.is_not_in() {
                let negated = self.is_not_in();
                if negated {
                    self.advance(); // NOT
                }
                self.advance(); // IN
                self.expect(TokenKind::LeftParen, "'('")?;
                let mut list = Vec::new();
                loop {
                    list.push(self.parse_expr()?);
                    if self.match_token(&TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
                self.expect(TokenKind::RightParen, "')'")?;
                left = Expr::InList {
                    expr: Box::new(left),
                    list,
                    negated,
                };
                continue;
            }
            let op = match &self.current().kind {
                TokenKind::LessThan => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::Le,
                TokenKind::GreaterThan => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn is_not_in(&self) -> bool {
        matches!(self.current().kind, TokenKind::Not)
            && matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::In))
    }

    fn parse_additive(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            // Arithmetic is modeled as a binary function call; comparisons
            // and boolean connectives use BinaryOp directly. Evaluation of
            // arithmetic belongs to the (out-of-scope) execution engine.
            left = Expr::Function {
                name: op.into(),
                args: vec![left, right],
                star: false,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Asterisk => "*",
                TokenKind::Slash => "/",
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Function {
                name: op.into(),
                args: vec![left, right],
                star: false,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> DbResult<Expr> {
        if self.match_token(&TokenKind::Not) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> DbResult<Expr> {
        match self.current().kind.clone() {
            TokenKind::IntegerLiteral(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Count | TokenKind::Sum | TokenKind::Avg | TokenKind::Max | TokenKind::Min => {
                let name = match self.current().kind {
                    TokenKind::Count => "COUNT",
                    TokenKind::Sum => "SUM",
                    TokenKind::Avg => "AVG",
                    TokenKind::Max => "MAX",
                    TokenKind::Min => "MIN",
                    _ => unreachable!(),
                };
                self.advance();
                self.expect(TokenKind::LeftParen, "'('")?;
                if self.check(&TokenKind::Asterisk) {
                    self.advance();
                    self.expect(TokenKind::RightParen, "')'")?;
                    return Ok(Expr::Function {
                        name: name.into(),
                        args: vec![],
                        star: true,
                    });
                }
                let mut args = Vec::new();
                loop {
                    args.push(self.parse_expr()?);
                    if self.match_token(&TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(Expr::Function {
                    name: name.into(),
                    args,
                    star: false,
                })
            }
            TokenKind::Identifier(first) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    // A generic function call (not one of the recognised
                    // aggregates): kept for completeness of the grammar.
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.match_token(&TokenKind::Comma) {
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(TokenKind::RightParen, "')'")?;
                    return Ok(Expr::Function {
                        name: first,
                        args,
                        star: false,
                    });
                }
                if self.match_token(&TokenKind::Dot) {
                    let name = self.expect_identifier("column name")?;
                    Ok(Expr::Column {
                        table: Some(first),
                        name,
                    })
                } else {
                    Ok(Expr::Column {
                        table: None,
                        name: first,
                    })
                }
            }
            _ => Err(self.syntax_error(
                "expected an expression",
                Some("literal, identifier, function call, or '('"),
            )),
        }
    }

    // ---- token cursor helpers ----

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> DbResult<&Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.syntax_error(&format!("unexpected token '{}'", self.current().lexeme), Some(expected)))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> DbResult<String> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.syntax_error(&format!("expected {what}"), Some("identifier"))),
        }
    }

    fn expect_integer(&mut self, what: &str) -> DbResult<i64> {
        match self.current().kind.clone() {
            TokenKind::IntegerLiteral(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.syntax_error(&format!("expected {what}"), Some("integer literal"))),
        }
    }

    fn position(&self) -> (usize, usize) {
        (self.current().line, self.current().column)
    }

    fn syntax_error(&self, message: &str, expected: Option<&str>) -> DbError {
        let (line, column) = self.position();
        DbError::Syntax {
            message: message.into(),
            line,
            column,
            expected: expected.map(|s| s.into()),
        }
    }
}
