//! Recursive-descent parser with one-token lookahead. Arithmetic
//! (`+ - * /`) is never represented in the AST: `compute_math_operator`
//! folds it to a constant via precedence climbing as it parses, and errors
//! if either side of an operator isn't itself a constant.

use crate::error::{CResult, Error};
use crate::expr::{AggregateCall, CompareOp, Expression};
use crate::sql::ast::*;
use crate::sql::lexer::Lexer;
use crate::sql::token::{Token, TokenKind};
use crate::value::{DataType, Value};

pub fn parse(sql: &str) -> CResult<Statement> {
    Parser::new(sql).parse_program()
}

pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self { lexer: Lexer::new(input) }
    }

    pub fn parse_program(&mut self) -> CResult<Statement> {
        let statement = self.parse_statement()?;
        self.expect_token(TokenKind::Semicolon)?;
        if self.peek()?.is_some() {
            return Err(Error::Parse("unexpected input after ';'".into()));
        }
        Ok(statement)
    }

    // --- lookahead plumbing -------------------------------------------------

    fn peek(&mut self) -> CResult<Option<Token>> {
        self.lexer.peek()
    }

    fn next(&mut self) -> CResult<Token> {
        self.lexer.scan()?.ok_or_else(|| Error::Parse("unexpected end of input".into()))
    }

    fn next_ident(&mut self) -> CResult<String> {
        let token = self.next()?;
        if token.kind == TokenKind::Ident {
            Ok(token.text)
        } else {
            Err(Error::Parse(format!("expected identifier, found '{}'", token.text)))
        }
    }

    fn next_if_keyword(&mut self, word: &str) -> CResult<bool> {
        match self.peek()? {
            Some(token) if token.is_keyword(word) => {
                self.lexer.scan()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn peek_is_keyword(&mut self, word: &str) -> CResult<bool> {
        Ok(matches!(self.peek()?, Some(token) if token.is_keyword(word)))
    }

    fn expect_keyword(&mut self, word: &str) -> CResult<()> {
        let token = self.next()?;
        if token.is_keyword(word) {
            Ok(())
        } else {
            Err(Error::Parse(format!("expected keyword '{}', found '{}'", word, token.text)))
        }
    }

    fn next_if_token(&mut self, kind: TokenKind) -> CResult<bool> {
        match self.peek()? {
            Some(token) if token.kind == kind => {
                self.lexer.scan()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn expect_token(&mut self, kind: TokenKind) -> CResult<Token> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(Error::Parse(format!("expected {:?}, found '{}'", kind, token.text)))
        }
    }

    // --- statements ----------------------------------------------------------

    fn parse_statement(&mut self) -> CResult<Statement> {
        let token = self.peek()?.ok_or_else(|| Error::Parse("expected a statement".into()))?;
        if token.kind != TokenKind::Keyword {
            return Err(Error::Parse(format!("expected a statement, found '{}'", token.text)));
        }
        match token.text.as_str() {
            "SHOW" => self.parse_show(),
            "CREATE" => self.parse_create_table(),
            "DROP" => self.parse_drop_table(),
            "INSERT" => self.parse_insert(),
            "SELECT" => self.parse_select(),
            "UPDATE" => self.parse_update(),
            "DELETE" => self.parse_delete(),
            "BEGIN" => {
                self.next()?;
                Ok(Statement::Begin)
            }
            "COMMIT" => {
                self.next()?;
                Ok(Statement::Commit)
            }
            "ROLLBACK" => {
                self.next()?;
                Ok(Statement::Rollback)
            }
            "EXPLAIN" => self.parse_explain(),
            other => Err(Error::Parse(format!("unrecognised statement keyword '{}'", other))),
        }
    }

    fn parse_show(&mut self) -> CResult<Statement> {
        self.expect_keyword("SHOW")?;
        if self.next_if_keyword("TABLES")? {
            Ok(Statement::ShowTables)
        } else if self.next_if_keyword("TABLE")? {
            Ok(Statement::ShowTable(self.next_ident()?))
        } else {
            Err(Error::Parse("expected TABLES or TABLE after SHOW".into()))
        }
    }

    fn parse_create_table(&mut self) -> CResult<Statement> {
        self.expect_keyword("CREATE")?;
        self.expect_keyword("TABLE")?;
        let name = self.next_ident()?;
        self.expect_token(TokenKind::OpenParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if !self.next_if_token(TokenKind::Comma)? {
                break;
            }
        }
        self.expect_token(TokenKind::CloseParen)?;
        Ok(Statement::CreateTable { name, columns })
    }

    fn parse_column_def(&mut self) -> CResult<ColumnDef> {
        let name = self.next_ident()?;
        let data_type = self.parse_data_type()?;
        let mut nullable = true;
        let mut default = None;
        let mut is_primary_key = false;
        let mut is_indexed = false;
        loop {
            if self.next_if_keyword("NOT")? {
                self.expect_keyword("NULL")?;
                nullable = false;
            } else if self.next_if_keyword("NULL")? {
                nullable = true;
            } else if self.next_if_keyword("DEFAULT")? {
                default = Some(self.compute_math_operator(1)?);
            } else if self.next_if_keyword("PRIMARY")? {
                self.expect_keyword("KEY")?;
                is_primary_key = true;
                nullable = false;
            } else if self.next_if_keyword("INDEX")? {
                is_indexed = true;
            } else {
                break;
            }
        }
        Ok(ColumnDef { name, data_type, nullable, default, is_primary_key, is_indexed })
    }

    fn parse_data_type(&mut self) -> CResult<DataType> {
        let token = self.next()?;
        if token.kind != TokenKind::Keyword {
            return Err(Error::Parse(format!("expected a data type, found '{}'", token.text)));
        }
        match token.text.as_str() {
            "INT" | "INTEGER" => Ok(DataType::Integer),
            "STRING" | "TEXT" | "VARCHAR" | "CHAR" => Ok(DataType::String),
            "BOOL" | "BOOLEAN" => Ok(DataType::Boolean),
            "FLOAT" | "DOUBLE" => Ok(DataType::Float),
            other => Err(Error::Parse(format!("unrecognised data type '{}'", other))),
        }
    }

    fn parse_drop_table(&mut self) -> CResult<Statement> {
        self.expect_keyword("DROP")?;
        self.expect_keyword("TABLE")?;
        Ok(Statement::DropTable(self.next_ident()?))
    }

    fn parse_insert(&mut self) -> CResult<Statement> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.next_ident()?;

        let columns = if self.next_if_token(TokenKind::OpenParen)? {
            let mut names = Vec::new();
            loop {
                names.push(self.next_ident()?);
                if !self.next_if_token(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect_token(TokenKind::CloseParen)?;
            Some(names)
        } else {
            None
        };

        self.expect_keyword("VALUES")?;
        let mut values = Vec::new();
        loop {
            self.expect_token(TokenKind::OpenParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.compute_math_operator(1)?);
                if !self.next_if_token(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect_token(TokenKind::CloseParen)?;
            values.push(row);
            if !self.next_if_token(TokenKind::Comma)? {
                break;
            }
        }
        Ok(Statement::Insert { table, columns, values })
    }

    fn parse_select(&mut self) -> CResult<Statement> {
        self.expect_keyword("SELECT")?;
        let columns = self.parse_select_clause()?;
        self.expect_keyword("FROM")?;
        let from = self.parse_from_clause()?;

        let where_clause =
            if self.next_if_keyword("WHERE")? { Some(self.parse_operation_expr()?) } else { None };

        let group_by = if self.next_if_keyword("GROUP")? {
            self.expect_keyword("BY")?;
            Some(self.compute_math_operator(1)?)
        } else {
            None
        };

        let having =
            if self.next_if_keyword("HAVING")? { Some(self.parse_operation_expr()?) } else { None };

        let order_by = if self.next_if_keyword("ORDER")? {
            self.expect_keyword("BY")?;
            let mut terms = Vec::new();
            loop {
                let column = self.next_ident()?;
                let direction = if self.next_if_keyword("DESC")? {
                    OrderDirection::Desc
                } else {
                    self.next_if_keyword("ASC")?;
                    OrderDirection::Asc
                };
                terms.push(OrderTerm { column, direction });
                if !self.next_if_token(TokenKind::Comma)? {
                    break;
                }
            }
            terms
        } else {
            Vec::new()
        };

        let limit =
            if self.next_if_keyword("LIMIT")? { Some(self.compute_math_operator(1)?) } else { None };
        let offset =
            if self.next_if_keyword("OFFSET")? { Some(self.compute_math_operator(1)?) } else { None };

        Ok(Statement::Select(SelectStatement {
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        }))
    }

    fn parse_select_clause(&mut self) -> CResult<Vec<SelectColumn>> {
        if self.next_if_token(TokenKind::Asterisk)? {
            return Ok(Vec::new());
        }
        let mut columns = Vec::new();
        loop {
            let expr = self.compute_math_operator(1)?;
            let alias = if self.next_if_keyword("AS")? { Some(self.next_ident()?) } else { None };
            columns.push(SelectColumn { expr, alias });
            if !self.next_if_token(TokenKind::Comma)? {
                break;
            }
        }
        Ok(columns)
    }

    fn parse_from_clause(&mut self) -> CResult<FromItem> {
        let mut item = FromItem::Table(self.next_ident()?);
        loop {
            let join_type = match self.parse_join_keyword()? {
                Some(jt) => jt,
                None => break,
            };
            let right = FromItem::Table(self.next_ident()?);
            let on = if join_type == JoinType::Cross {
                if self.peek_is_keyword("ON")? {
                    return Err(Error::Parse("CROSS JOIN does not take an ON clause".into()));
                }
                None
            } else if self.next_if_keyword("ON")? {
                Some(self.parse_operation_expr()?)
            } else {
                None
            };
            item = FromItem::Join { left: Box::new(item), right: Box::new(right), join_type, on };
        }
        Ok(item)
    }

    fn parse_join_keyword(&mut self) -> CResult<Option<JoinType>> {
        if self.next_if_keyword("CROSS")? {
            self.expect_keyword("JOIN")?;
            Ok(Some(JoinType::Cross))
        } else if self.next_if_keyword("INNER")? {
            self.expect_keyword("JOIN")?;
            Ok(Some(JoinType::Inner))
        } else if self.next_if_keyword("LEFT")? {
            self.expect_keyword("JOIN")?;
            Ok(Some(JoinType::Left))
        } else if self.next_if_keyword("RIGHT")? {
            self.expect_keyword("JOIN")?;
            Ok(Some(JoinType::Right))
        } else if self.next_if_keyword("JOIN")? {
            Ok(Some(JoinType::Inner))
        } else {
            Ok(None)
        }
    }

    fn parse_update(&mut self) -> CResult<Statement> {
        self.expect_keyword("UPDATE")?;
        let table = self.next_ident()?;
        self.expect_keyword("SET")?;
        let mut assignments: Vec<(String, Expression)> = Vec::new();
        loop {
            let column = self.next_ident()?;
            if assignments.iter().any(|(c, _)| c == &column) {
                return Err(Error::Parse(format!("column '{}' set more than once", column)));
            }
            self.expect_token(TokenKind::Equal)?;
            let expr = self.compute_math_operator(1)?;
            assignments.push((column, expr));
            if !self.next_if_token(TokenKind::Comma)? {
                break;
            }
        }
        let where_clause =
            if self.next_if_keyword("WHERE")? { Some(self.parse_operation_expr()?) } else { None };
        Ok(Statement::Update { table, assignments, where_clause })
    }

    fn parse_delete(&mut self) -> CResult<Statement> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.next_ident()?;
        let where_clause =
            if self.next_if_keyword("WHERE")? { Some(self.parse_operation_expr()?) } else { None };
        Ok(Statement::Delete { table, where_clause })
    }

    fn parse_explain(&mut self) -> CResult<Statement> {
        self.expect_keyword("EXPLAIN")?;
        if self.peek_is_keyword("EXPLAIN")? {
            return Err(Error::Parse("EXPLAIN cannot be nested".into()));
        }
        Ok(Statement::Explain(Box::new(self.parse_statement()?)))
    }

    // --- expressions -----------------------------------------------------

    /// A comparison: `left_atom (= | > | <) right_expr`. Used for WHERE,
    /// HAVING and ON clauses. If no comparison operator follows, the bare
    /// left-hand expression is returned as-is.
    fn parse_operation_expr(&mut self) -> CResult<Expression> {
        let left = self.parse_atom()?;
        let op = match self.peek()? {
            Some(token) if token.kind == TokenKind::Equal => Some(CompareOp::Equal),
            Some(token) if token.kind == TokenKind::GreaterThan => Some(CompareOp::GreaterThan),
            Some(token) if token.kind == TokenKind::LessThan => Some(CompareOp::LessThan),
            _ => None,
        };
        match op {
            Some(op) => {
                self.next()?;
                let right = self.compute_math_operator(1)?;
                Ok(Expression::Binary { op, left: Box::new(left), right: Box::new(right) })
            }
            None => Ok(left),
        }
    }

    /// Precedence-climbing arithmetic fold: `+ -` at precedence 1, `* /`
    /// at precedence 2. Only constant sub-expressions can be folded; any
    /// operator applied to a non-constant is a parse-time error.
    fn compute_math_operator(&mut self, min_precedence: i32) -> CResult<Expression> {
        let mut left = self.parse_atom()?;
        loop {
            let token = match self.peek()? {
                Some(token) if token.is_operator() => token,
                _ => break,
            };
            let precedence = token.precedence().unwrap();
            if precedence < min_precedence {
                break;
            }
            self.next()?;
            let right = self.compute_math_operator(precedence + 1)?;
            left = fold_arithmetic(&token, left, right)?;
        }
        Ok(left)
    }

    /// The atomic building block of an expression: a column reference, an
    /// aggregate call, a literal, or a parenthesised arithmetic expression.
    fn parse_atom(&mut self) -> CResult<Expression> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Ident => {
                if self.next_if_token(TokenKind::OpenParen)? {
                    let column = self.next_ident()?;
                    self.expect_token(TokenKind::CloseParen)?;
                    Ok(Expression::Aggregate(AggregateCall { name: token.text, column }))
                } else {
                    Ok(Expression::column(token.text))
                }
            }
            TokenKind::Number => {
                if token.text.contains('.') {
                    let value: f64 = token
                        .text
                        .parse()
                        .map_err(|_| Error::Parse(format!("invalid number '{}'", token.text)))?;
                    Ok(Expression::Const(Value::Float(value)))
                } else {
                    let value: i64 = token
                        .text
                        .parse()
                        .map_err(|_| Error::Parse(format!("invalid number '{}'", token.text)))?;
                    Ok(Expression::Const(Value::Int(value)))
                }
            }
            TokenKind::String => Ok(Expression::Const(Value::String(token.text))),
            TokenKind::OpenParen => {
                let expr = self.compute_math_operator(1)?;
                self.expect_token(TokenKind::CloseParen)?;
                Ok(expr)
            }
            TokenKind::Keyword => match token.text.as_str() {
                "NULL" => Ok(Expression::Const(Value::Null)),
                "TRUE" => Ok(Expression::Const(Value::Bool(true))),
                "FALSE" => Ok(Expression::Const(Value::Bool(false))),
                other => Err(Error::Parse(format!("unexpected keyword '{}' in expression", other))),
            },
            _ => Err(Error::Parse(format!("unexpected token '{}' in expression", token.text))),
        }
    }
}

fn fold_arithmetic(op: &Token, left: Expression, right: Expression) -> CResult<Expression> {
    let l = const_number(&left)?;
    let r = const_number(&right)?;
    let result = match op.kind {
        TokenKind::Plus => l + r,
        TokenKind::Minus => l - r,
        TokenKind::Asterisk => l * r,
        TokenKind::Slash => l / r,
        _ => unreachable!("fold_arithmetic called with a non-arithmetic token"),
    };
    Ok(Expression::Const(Value::Float(result)))
}

fn const_number(expr: &Expression) -> CResult<f64> {
    match expr {
        Expression::Const(Value::Int(i)) => Ok(*i as f64),
        Expression::Const(Value::Float(f)) => Ok(*f),
        _ => Err(Error::Parse("arithmetic is only supported over constant numbers".into())),
    }
}
