//! Parser for the schema statements accepted at open time.
//!
//! Two statement forms are understood:
//!
//! ```text
//! CREATE TABLE [IF NOT EXISTS] name (
//!     column TYPE [PRIMARY KEY] [NOT NULL] [DEFAULT literal] ...,
//!     [PRIMARY KEY (a, b, ...)]
//! ) [WITHOUT ROWID];
//!
//! ALTER TABLE name ADD [COLUMN] column TYPE [NOT NULL] [DEFAULT literal];
//! ```
//!
//! Column constraints other than the ones above are skipped. Statements are
//! separated by `;`.

use crate::error::{StorageError, StorageResult};
use crate::schema::{ColumnDef, ColumnType, TableSchema};
use crate::value::Value;

/// A parsed schema statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE`.
    CreateTable {
        /// The table definition.
        schema: TableSchema,
        /// Whether `IF NOT EXISTS` was given.
        if_not_exists: bool,
    },
    /// `ALTER TABLE ... ADD COLUMN`.
    AddColumn {
        /// Target table.
        table: String,
        /// New column.
        column: ColumnDef,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Symbol(char),
}

/// Parses a script of `;`-separated statements.
pub fn parse_statements(input: &str) -> StorageResult<Vec<Statement>> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();

    loop {
        while parser.eat(&Token::Semicolon) {}
        if parser.at_end() {
            break;
        }
        statements.push(parser.statement()?);
        if !parser.at_end() && !parser.eat(&Token::Semicolon) {
            return Err(parser.error("expected ';' between statements"));
        }
    }

    Ok(statements)
}

fn tokenize(input: &str) -> StorageResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | ';' => {
                chars.next();
                tokens.push((
                    offset,
                    match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        _ => Token::Semicolon,
                    },
                ));
            }
            '-' => {
                chars.next();
                // `--` starts a line comment
                if matches!(chars.peek(), Some((_, '-'))) {
                    for (_, c) in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                tokens.push((offset, Token::Symbol('-')));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => {
                            // '' is an escaped quote
                            if matches!(chars.peek(), Some((_, '\''))) {
                                chars.next();
                                text.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some((_, c)) => text.push(c),
                        None => return Err(StorageError::parse(offset, "unterminated string")),
                    }
                }
                tokens.push((offset, Token::Str(text)));
            }
            '"' | '`' | '[' => {
                chars.next();
                let close = if c == '[' { ']' } else { c };
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == close => break,
                        Some((_, c)) => text.push(c),
                        None => {
                            return Err(StorageError::parse(offset, "unterminated identifier"))
                        }
                    }
                }
                tokens.push((offset, Token::Ident(text)));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Number(text)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Ident(text)));
            }
            c if c.is_ascii_punctuation() => {
                chars.next();
                tokens.push((offset, Token::Symbol(c)));
            }
            other => {
                return Err(StorageError::parse(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(o, _)| *o)
    }

    fn error(&self, message: impl Into<String>) -> StorageError {
        StorageError::parse(self.offset(), message)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> StorageResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {keyword}")))
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> StorageResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn ident(&mut self) -> StorageResult<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn statement(&mut self) -> StorageResult<Statement> {
        if self.eat_keyword("CREATE") {
            self.create_table()
        } else if self.eat_keyword("ALTER") {
            self.alter_table()
        } else {
            Err(self.error("expected CREATE TABLE or ALTER TABLE"))
        }
    }

    fn create_table(&mut self) -> StorageResult<Statement> {
        self.expect_keyword("TABLE")?;
        let if_not_exists = if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let name = self.ident()?;
        self.expect(&Token::LParen, "'('")?;

        let mut columns = Vec::new();
        let mut primary_key = Vec::new();
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                self.expect(&Token::LParen, "'('")?;
                loop {
                    primary_key.push(self.ident()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen, "')'")?;
            } else if self.peek_keyword("UNIQUE") || self.peek_keyword("CONSTRAINT") {
                self.skip_clause();
            } else {
                let (column, inline_key) = self.column_def()?;
                if inline_key {
                    primary_key.push(column.name.clone());
                }
                columns.push(column);
            }

            if self.eat(&Token::RParen) {
                break;
            }
            self.expect(&Token::Comma, "',' or ')'")?;
        }

        if self.eat_keyword("WITHOUT") {
            self.expect_keyword("ROWID")?;
        }

        if columns.is_empty() {
            return Err(self.error(format!("table {name} has no columns")));
        }
        if let Some(missing) = primary_key
            .iter()
            .find(|k| !columns.iter().any(|c| &c.name == *k))
        {
            return Err(self.error(format!("primary key column {missing} is not declared")));
        }

        Ok(Statement::CreateTable {
            schema: TableSchema::new(name, columns, primary_key),
            if_not_exists,
        })
    }

    fn alter_table(&mut self) -> StorageResult<Statement> {
        self.expect_keyword("TABLE")?;
        let table = self.ident()?;
        self.expect_keyword("ADD")?;
        self.eat_keyword("COLUMN");
        let (column, inline_key) = self.column_def()?;
        if inline_key {
            return Err(self.error("cannot add a primary key column"));
        }
        Ok(Statement::AddColumn { table, column })
    }

    /// Parses `name TYPE constraints...`, returning whether it was declared
    /// `PRIMARY KEY` inline.
    fn column_def(&mut self) -> StorageResult<(ColumnDef, bool)> {
        let name = self.ident()?;

        // Type names may span several words and carry a size: `VARCHAR(20)`.
        let mut declared = String::new();
        while let Some(Token::Ident(word)) = self.peek() {
            if is_constraint_keyword(word) {
                break;
            }
            if !declared.is_empty() {
                declared.push(' ');
            }
            declared.push_str(word);
            self.pos += 1;
        }
        if self.peek() == Some(&Token::LParen) {
            self.skip_parens();
        }

        let mut column = ColumnDef::new(name, ColumnType::from_declared(&declared));
        let mut inline_key = false;
        loop {
            match self.peek() {
                None | Some(Token::Comma | Token::RParen | Token::Semicolon) => break,
                _ => {}
            }
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                inline_key = true;
                if !self.eat_keyword("ASC") {
                    self.eat_keyword("DESC");
                }
                self.eat_keyword("AUTOINCREMENT");
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.not_null = true;
            } else if self.eat_keyword("DEFAULT") {
                column.default = Some(self.literal()?);
            } else if self.peek() == Some(&Token::LParen) {
                self.skip_parens();
            } else {
                self.pos += 1;
            }
        }

        Ok((column, inline_key))
    }

    fn literal(&mut self) -> StorageResult<Value> {
        let negative = self.eat(&Token::Symbol('-'));
        match self.peek().cloned() {
            Some(Token::Number(text)) => {
                self.pos += 1;
                let text = if negative { format!("-{text}") } else { text };
                if let Ok(i) = text.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else {
                    text.parse::<f64>()
                        .map(Value::Real)
                        .map_err(|_| self.error(format!("invalid number {text}")))
                }
            }
            Some(Token::Str(text)) if !negative => {
                self.pos += 1;
                Ok(Value::Text(text))
            }
            Some(Token::Ident(word)) if !negative && word.eq_ignore_ascii_case("NULL") => {
                self.pos += 1;
                Ok(Value::Null)
            }
            _ => Err(self.error("expected literal")),
        }
    }

    fn skip_parens(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
            if depth == 0 {
                break;
            }
        }
    }

    /// Skips a table constraint up to the next top-level `,` or `)`.
    fn skip_clause(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Comma | Token::RParen => break,
                Token::LParen => self.skip_parens(),
                _ => self.pos += 1,
            }
        }
    }
}

fn is_constraint_keyword(word: &str) -> bool {
    const KEYWORDS: [&str; 8] = [
        "PRIMARY", "NOT", "NULL", "DEFAULT", "UNIQUE", "CHECK", "REFERENCES", "COLLATE",
    ];
    KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k))
}
