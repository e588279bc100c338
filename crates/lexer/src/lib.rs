//! Tokenises SQL text into an ordered stream of [`Token`]s.
//!
//! Mirrors a hand-rolled recursive-descent lexer: a `Vec<char>` cursor with
//! `(line, column)` tracking, used by `parser` to build the AST.

use common::DbError;

/// A single lexical token: its kind, the exact source text it came from,
/// and its 1-based source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

/// Closed set of token kinds. Keyword matching is case-insensitive;
/// identifiers and string contents preserve case.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    Select,
    From,
    Where,
    Create,
    Table,
    Drop,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Index,
    On,
    And,
    Or,
    Not,
    Int,
    Varchar,
    Char,
    Boolean,
    Primary,
    Key,
    Group,
    By,
    Having,
    Order,
    Asc,
    Desc,
    Join,
    Inner,
    Left,
    Right,
    As,
    In,
    Count,
    Sum,
    Avg,
    Max,
    Min,
    Null,
    True,
    False,
    If,
    Exists,
    Cascade,
    View,
    Explain,
    Analyze,

    // Literals
    IntegerLiteral(i64),
    StringLiteral(String),
    Identifier(String),

    // Operators / punctuators
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Dot,
    Semicolon,
    Comma,
    LeftParen,
    RightParen,

    Eof,
}

impl TokenKind {
    /// True for any keyword kind that may not be used as a bare alias
    /// immediately following a table reference.
    pub fn is_reserved_keyword(&self) -> bool {
        !matches!(
            self,
            TokenKind::Identifier(_)
                | TokenKind::IntegerLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::Equals
                | TokenKind::NotEquals
                | TokenKind::LessThan
                | TokenKind::LessEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterEqual
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Asterisk
                | TokenKind::Slash
                | TokenKind::Dot
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::LeftParen
                | TokenKind::RightParen
                | TokenKind::Eof
        )
    }
}

fn keyword_kind(word_upper: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word_upper {
        "SELECT" => Select,
        "FROM" => From,
        "WHERE" => Where,
        "CREATE" => Create,
        "TABLE" => Table,
        "DROP" => Drop,
        "INSERT" => Insert,
        "INTO" => Into,
        "VALUES" => Values,
        "UPDATE" => Update,
        "SET" => Set,
        "DELETE" => Delete,
        "INDEX" => Index,
        "ON" => On,
        "AND" => And,
        "OR" => Or,
        "NOT" => Not,
        "INT" | "INTEGER" => Int,
        "VARCHAR" => Varchar,
        "CHAR" => Char,
        "BOOLEAN" | "BOOL" => Boolean,
        "PRIMARY" => Primary,
        "KEY" => Key,
        "GROUP" => Group,
        "BY" => By,
        "HAVING" => Having,
        "ORDER" => Order,
        "ASC" => Asc,
        "DESC" => Desc,
        "JOIN" => Join,
        "INNER" => Inner,
        "LEFT" => Left,
        "RIGHT" => Right,
        "AS" => As,
        "IN" => In,
        "COUNT" => Count,
        "SUM" => Sum,
        "AVG" => Avg,
        "MAX" => Max,
        "MIN" => Min,
        "NULL" => Null,
        "TRUE" => True,
        "FALSE" => False,
        "IF" => If,
        "EXISTS" => Exists,
        "CASCADE" => Cascade,
        "VIEW" => View,
        "EXPLAIN" => Explain,
        "ANALYZE" => Analyze,
        _ => return None,
    })
}

/// Tokenises `source`, always terminating with a single [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, DbError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, DbError> {
        loop {
            self.skip_whitespace_and_comments();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line,
                    column,
                });
                break;
            };

            if c == '\'' || c == '"' {
                self.scan_string(c)?;
            } else if c.is_ascii_digit() {
                self.scan_number();
            } else if c.is_alphabetic() || c == '_' {
                self.scan_identifier_or_keyword();
            } else {
                self.scan_operator_or_punctuator()?;
            }
        }
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => break,
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<(), DbError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(DbError::Lexical {
                        message: "unterminated string literal".into(),
                        line,
                        column,
                    });
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some(c) if c == quote => value.push(quote),
                        Some(other) => value.push(other),
                        None => {
                            return Err(DbError::Lexical {
                                message: "unterminated string literal".into(),
                                line,
                                column,
                            });
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::StringLiteral(value.clone()),
            lexeme: value,
            line,
            column,
        });
        Ok(())
    }

    fn scan_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        // Lexically an integer only; SqlType is INT in this grammar.
        let value: i64 = lexeme.parse().unwrap_or(0);
        self.tokens.push(Token {
            kind: TokenKind::IntegerLiteral(value),
            lexeme,
            line,
            column,
        });
    }

    fn scan_identifier_or_keyword(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let upper = lexeme.to_uppercase();
        let kind = keyword_kind(&upper).unwrap_or_else(|| TokenKind::Identifier(lexeme.clone()));
        self.tokens.push(Token {
            kind,
            lexeme,
            line,
            column,
        });
    }

    fn scan_operator_or_punctuator(&mut self) -> Result<(), DbError> {
        let (line, column) = (self.line, self.column);
        let c = self.advance().expect("peeked non-empty");
        let kind = match c {
            '=' => TokenKind::Equals,
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::LessEqual
                } else if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::NotEquals
                } else {
                    TokenKind::LessThan
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::GreaterThan
                }
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            other => {
                return Err(DbError::Lexical {
                    message: format!("unrecognised character '{other}'"),
                    line,
                    column,
                });
            }
        };
        let lexeme = self.chars[self.pos.saturating_sub(if matches!(kind, TokenKind::LessEqual | TokenKind::GreaterEqual | TokenKind::NotEquals) { 2 } else { 1 })..self.pos]
            .iter()
            .collect();
        self.tokens.push(Token {
            kind,
            lexeme,
            line,
            column,
        });
        Ok(())
    }
}
