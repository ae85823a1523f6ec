/// SQL Parser - converts one statement's tokens into an AST
///
/// Single pass, recursive descent, Pratt parsing for expressions. The first
/// unexpected token stops parsing with a `Syntax` error carrying the token's
/// byte offset. The parser never consults the catalog.
use super::ast::*;
use super::lexer::tokenize;
use super::token::{Keyword, Token, TokenKind};
use crate::error::{EngineError, Result};
use crate::types::{ColumnType, Value};

/// Binding power of the postfix predicates (LIKE, IN, BETWEEN, IS NULL):
/// looser than comparisons, tighter than AND.
const PREDICATE_PRECEDENCE: u8 = 3;
const UNARY_MINUS_PRECEDENCE: u8 = 7;

/// Deepest expression accepted, counting both nesting and operator chains.
pub const MAX_EXPR_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    end_offset: usize,
    depth: usize,
}

impl Parser {
    /// Build a parser over a statement's tokens; whitespace and comments are
    /// dropped here.
    pub fn new(tokens: Vec<Token>) -> Self {
        let end_offset = tokens.last().map(|t| t.end).unwrap_or(0);
        let tokens = tokens.into_iter().filter(|t| !t.kind.is_trivia()).collect();
        Self {
            tokens,
            position: 0,
            end_offset,
            depth: 0,
        }
    }

    /// Parse exactly one statement; a single trailing `;` is allowed.
    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Select) => Statement::Select(self.parse_select()?),
            Some(Keyword::Insert) => Statement::Insert(self.parse_insert()?),
            Some(Keyword::Update) => Statement::Update(self.parse_update()?),
            Some(Keyword::Delete) => Statement::Delete(self.parse_delete()?),
            Some(Keyword::Create) => self.parse_create()?,
            Some(Keyword::Drop) => self.parse_drop()?,
            Some(Keyword::Show) => self.parse_show()?,
            Some(Keyword::Describe) | Some(Keyword::Desc) => self.parse_describe()?,
            _ => {
                return Err(self.error(
                    "SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, SHOW or DESCRIBE",
                ))
            }
        };

        self.match_punct(";");
        if self.current().is_some() {
            return Err(self.error("end of statement"));
        }
        Ok(stmt)
    }

    // ----- SELECT -----

    fn parse_select(&mut self) -> Result<SelectStmt> {
        self.expect_keyword(Keyword::Select, "SELECT")?;
        let distinct = self.match_keyword(Keyword::Distinct);
        let columns = self.parse_select_columns()?;

        let from = if self.match_keyword(Keyword::From) {
            Some(self.parse_identifier("table name after FROM")?)
        } else {
            None
        };

        if from.is_some() {
            self.reject_unsupported_clauses()?;
        } else if self.at_keyword(Keyword::Where) {
            return Err(self.error("FROM before WHERE"));
        }

        let where_clause = if self.match_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.match_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By, "BY after ORDER")?;
            order_by = self.parse_order_by()?;
        }

        let limit = if self.match_keyword(Keyword::Limit) {
            Some(self.parse_usize("row count after LIMIT")?)
        } else {
            None
        };

        let offset = if self.match_keyword(Keyword::Offset) {
            Some(self.parse_usize("row count after OFFSET")?)
        } else {
            None
        };

        Ok(SelectStmt {
            distinct,
            columns,
            from,
            where_clause,
            order_by,
            limit,
            offset,
        })
    }

    fn reject_unsupported_clauses(&self) -> Result<()> {
        let unsupported = match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Join) | Some(Keyword::Inner) | Some(Keyword::Left) => "JOIN",
            Some(Keyword::Group) => "GROUP BY",
            Some(Keyword::Having) => "HAVING",
            _ => return Ok(()),
        };
        Err(EngineError::syntax(
            self.offset(),
            format!("{} is not supported in this dialect", unsupported),
        ))
    }

    fn parse_select_columns(&mut self) -> Result<Vec<SelectColumn>> {
        let mut columns = Vec::new();

        loop {
            if self.match_operator("*") {
                columns.push(SelectColumn::Star);
            } else if self.at_count_star() {
                self.position += 4; // COUNT ( * )
                let alias = self.parse_alias()?;
                columns.push(SelectColumn::CountStar { alias });
            } else {
                if self.at_keyword(Keyword::From) {
                    return Err(self.error("column list after SELECT"));
                }
                let expr = self.parse_expr(0)?;
                let alias = self.parse_alias()?;
                columns.push(SelectColumn::Expr { expr, alias });
            }

            if !self.match_punct(",") {
                break;
            }
        }

        if let Some(tok) = self.current() {
            let ends_list = tok.is_punct(";")
                || matches!(
                    tok.keyword(),
                    Some(Keyword::From)
                        | Some(Keyword::Where)
                        | Some(Keyword::Order)
                        | Some(Keyword::Limit)
                        | Some(Keyword::Offset)
                );
            if !ends_list {
                return Err(self.error("FROM after SELECT list"));
            }
        }

        Ok(columns)
    }

    fn at_count_star(&self) -> bool {
        let is_count = self
            .tokens
            .get(self.position)
            .is_some_and(|t| t.kind == TokenKind::Identifier && t.text.eq_ignore_ascii_case("count"));
        is_count
            && self.tokens.get(self.position + 1).is_some_and(|t| t.is_punct("("))
            && self.tokens.get(self.position + 2).is_some_and(|t| t.is_operator("*"))
            && self.tokens.get(self.position + 3).is_some_and(|t| t.is_punct(")"))
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.match_keyword(Keyword::As) {
            Ok(Some(self.parse_identifier("alias after AS")?))
        } else {
            Ok(None)
        }
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderByExpr>> {
        let mut order_by = Vec::new();
        loop {
            let expr = self.parse_expr(0)?;
            let asc = if self.match_keyword(Keyword::Desc) {
                false
            } else {
                self.match_keyword(Keyword::Asc);
                true
            };
            order_by.push(OrderByExpr { expr, asc });

            if !self.match_punct(",") {
                break;
            }
        }
        Ok(order_by)
    }

    // ----- DML -----

    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword(Keyword::Insert, "INSERT")?;
        self.expect_keyword(Keyword::Into, "INTO after INSERT")?;
        let table = self.parse_identifier("table name after INSERT INTO")?;

        let columns = if self.match_punct("(") {
            let cols = self.parse_identifier_list("column name")?;
            self.expect_punct(")", "')' after column list")?;
            Some(cols)
        } else {
            None
        };

        self.expect_keyword(Keyword::Values, "VALUES")?;

        let mut values = Vec::new();
        loop {
            self.expect_punct("(", "'(' to start a VALUES tuple")?;
            let row = self.parse_expr_list()?;
            self.expect_punct(")", "')' to close a VALUES tuple")?;
            values.push(row);

            if !self.match_punct(",") {
                break;
            }
        }

        Ok(InsertStmt {
            table,
            columns,
            values,
        })
    }

    fn parse_update(&mut self) -> Result<UpdateStmt> {
        self.expect_keyword(Keyword::Update, "UPDATE")?;
        let table = self.parse_identifier("table name after UPDATE")?;
        self.expect_keyword(Keyword::Set, "SET after table name")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.parse_identifier("column name in SET")?;
            self.expect_operator("=", "'=' after column name in SET")?;
            let expr = self.parse_expr(0)?;
            assignments.push((column, expr));

            if !self.match_punct(",") {
                break;
            }
        }

        let where_clause = if self.match_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(UpdateStmt {
            table,
            assignments,
            where_clause,
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStmt> {
        self.expect_keyword(Keyword::Delete, "DELETE")?;
        self.expect_keyword(Keyword::From, "FROM after DELETE")?;
        let table = self.parse_identifier("table name after DELETE FROM")?;

        let where_clause = if self.match_keyword(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(DeleteStmt {
            table,
            where_clause,
        })
    }

    // ----- DDL -----

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create, "CREATE")?;

        match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Table) => Ok(Statement::CreateTable(self.parse_create_table()?)),
            Some(Keyword::Index) | Some(Keyword::Unique) => {
                Ok(Statement::CreateIndex(self.parse_create_index()?))
            }
            _ => Err(self.error("TABLE or INDEX after CREATE")),
        }
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if self.match_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not, "NOT after IF")?;
            self.expect_keyword(Keyword::Exists, "EXISTS after IF NOT")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if self.match_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Exists, "EXISTS after IF")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStmt> {
        self.expect_keyword(Keyword::Table, "TABLE")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let table = self.parse_identifier("table name after CREATE TABLE")?;

        self.expect_punct("(", "'(' to start column definitions")?;
        let mut columns: Vec<ColumnSpec> = Vec::new();
        loop {
            if self.at_keyword(Keyword::Primary) {
                self.parse_table_primary_key(&mut columns)?;
            } else {
                columns.push(self.parse_column_spec()?);
            }
            if !self.match_punct(",") {
                break;
            }
        }
        self.expect_punct(")", "',' or ')' after column definition")?;

        Ok(CreateTableStmt {
            table,
            if_not_exists,
            columns,
        })
    }

    /// Table-level `PRIMARY KEY (col)`
    fn parse_table_primary_key(&mut self, columns: &mut [ColumnSpec]) -> Result<()> {
        self.expect_keyword(Keyword::Primary, "PRIMARY")?;
        self.expect_keyword(Keyword::Key, "KEY after PRIMARY")?;
        self.expect_punct("(", "'(' after PRIMARY KEY")?;
        let position = self.offset();
        let names = self.parse_identifier_list("primary key column")?;
        self.expect_punct(")", "')' after primary key columns")?;

        if names.len() != 1 {
            return Err(EngineError::syntax(
                position,
                "composite primary keys are not supported",
            ));
        }
        match columns.iter_mut().find(|c| c.name == names[0]) {
            Some(col) => {
                col.primary_key = true;
                col.nullable = false;
                Ok(())
            }
            None => Err(EngineError::syntax(
                position,
                format!("primary key column '{}' is not declared", names[0]),
            )),
        }
    }

    fn parse_column_spec(&mut self) -> Result<ColumnSpec> {
        let name = self.parse_identifier("column name")?;
        let data_type = self.parse_data_type()?;

        let mut spec = ColumnSpec {
            name,
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
        };

        loop {
            match self.current().and_then(|t| t.keyword()) {
                Some(Keyword::Not) => {
                    self.advance();
                    self.expect_keyword(Keyword::Null, "NULL after NOT")?;
                    spec.nullable = false;
                }
                Some(Keyword::Null) => {
                    self.advance();
                }
                Some(Keyword::Primary) => {
                    self.advance();
                    self.expect_keyword(Keyword::Key, "KEY after PRIMARY")?;
                    spec.primary_key = true;
                    spec.nullable = false;
                }
                Some(Keyword::Unique) => {
                    self.advance();
                    spec.unique = true;
                }
                Some(Keyword::Default) => {
                    self.advance();
                    spec.default = Some(self.parse_literal("literal after DEFAULT")?);
                }
                _ => break,
            }
        }

        Ok(spec)
    }

    fn parse_data_type(&mut self) -> Result<ColumnType> {
        let data_type = match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Integer) => ColumnType::Integer,
            Some(Keyword::Text) => ColumnType::Text,
            Some(Keyword::Real) => ColumnType::Real,
            Some(Keyword::Boolean) => ColumnType::Boolean,
            _ => return Err(self.error("column type (INTEGER, TEXT, REAL or BOOLEAN)")),
        };
        self.advance();

        // VARCHAR(255), DECIMAL(10, 2): size arguments are accepted and ignored
        if self.match_punct("(") {
            loop {
                self.parse_usize("type size")?;
                if !self.match_punct(",") {
                    break;
                }
            }
            self.expect_punct(")", "')' after type size")?;
        }

        Ok(data_type)
    }

    fn parse_create_index(&mut self) -> Result<CreateIndexStmt> {
        let unique = self.match_keyword(Keyword::Unique);
        self.expect_keyword(Keyword::Index, "INDEX")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let index_name = self.parse_identifier("index name")?;
        self.expect_keyword(Keyword::On, "ON after index name")?;
        let table = self.parse_identifier("table name after ON")?;
        self.expect_punct("(", "'(' before indexed columns")?;
        let columns = self.parse_identifier_list("indexed column")?;
        self.expect_punct(")", "')' after indexed columns")?;

        Ok(CreateIndexStmt {
            index_name,
            table,
            columns,
            unique,
            if_not_exists,
        })
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop, "DROP")?;

        match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Table) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let table = self.parse_identifier("table name after DROP TABLE")?;
                Ok(Statement::DropTable(DropTableStmt { table, if_exists }))
            }
            Some(Keyword::Index) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let index_name = self.parse_identifier("index name after DROP INDEX")?;
                Ok(Statement::DropIndex(DropIndexStmt {
                    index_name,
                    if_exists,
                }))
            }
            _ => Err(self.error("TABLE or INDEX after DROP")),
        }
    }

    fn parse_show(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Show, "SHOW")?;
        self.expect_keyword(Keyword::Tables, "TABLES after SHOW")?;
        Ok(Statement::ShowTables)
    }

    fn parse_describe(&mut self) -> Result<Statement> {
        self.advance(); // DESCRIBE | DESC
        let table = self.parse_identifier("table name after DESCRIBE")?;
        Ok(Statement::DescribeTable(table))
    }

    // ----- Expressions -----

    /// Pratt loop: binary operators by precedence, plus the postfix
    /// predicates at `PREDICATE_PRECEDENCE`.
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = self.parse_expr_at(min_precedence);
        self.depth -= 1;
        result
    }

    fn too_deep(&self) -> EngineError {
        EngineError::syntax(self.offset(), "expression nested too deeply")
    }

    fn parse_expr_at(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_prefix_expr()?;
        let mut left_depth = left.depth();

        loop {
            if left_depth > MAX_EXPR_DEPTH {
                return Err(self.too_deep());
            }

            if let Some(op) = self.peek_binary_op() {
                let precedence = op.precedence();
                if precedence < min_precedence {
                    break;
                }
                self.advance();
                let right = self.parse_expr(precedence + 1)?;
                left_depth = 1 + left_depth.max(right.depth());
                left = Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                };
                continue;
            }

            if PREDICATE_PRECEDENCE >= min_precedence && self.at_predicate() {
                left = self.parse_predicate(left)?;
                left_depth = left.depth();
                continue;
            }

            break;
        }

        Ok(left)
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        let token = match self.current() {
            Some(t) => t.clone(),
            None => return Err(self.error("expression")),
        };

        match token.kind {
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                let expr = self.parse_expr(PREDICATE_PRECEDENCE)?;
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(expr),
                })
            }
            TokenKind::Operator if token.text == "-" => {
                self.advance();
                let expr = self.parse_expr(UNARY_MINUS_PRECEDENCE)?;
                Ok(match expr {
                    Expr::Literal(Value::Integer(i)) => Expr::Literal(Value::Integer(-i)),
                    Expr::Literal(Value::Real(r)) => Expr::Literal(Value::Real(-r)),
                    other => Expr::UnaryOp {
                        op: UnaryOperator::Minus,
                        expr: Box::new(other),
                    },
                })
            }
            TokenKind::Operator if token.text == "+" => {
                self.advance();
                self.parse_expr(UNARY_MINUS_PRECEDENCE)
            }
            TokenKind::Punctuation if token.text == "(" => {
                self.advance();
                if self.at_keyword(Keyword::Select) {
                    return Err(self.error("expression (subqueries are not supported)"));
                }
                let expr = self.parse_expr(0)?;
                self.expect_punct(")", "')' to close parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::Number => {
                self.advance();
                Ok(Expr::Literal(self.number_value(&token)?))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal(Value::Text(
                    token.string_value().unwrap_or_default(),
                )))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::Identifier => {
                if self
                    .tokens
                    .get(self.position + 1)
                    .is_some_and(|t| t.is_punct("("))
                {
                    return Err(EngineError::syntax(
                        token.start,
                        format!("function '{}' is not supported", token.text),
                    ));
                }
                let name = self.parse_identifier("column name")?;
                if self.match_punct(".") {
                    let column = self.parse_identifier("column name after '.'")?;
                    return Ok(Expr::QualifiedColumn {
                        table: name,
                        column,
                    });
                }
                Ok(Expr::Column(name))
            }
            TokenKind::Keyword(kw) if !kw.is_reserved() => {
                let name = self.parse_identifier("column name")?;
                Ok(Expr::Column(name))
            }
            _ => Err(self.error("expression")),
        }
    }

    fn number_value(&self, token: &Token) -> Result<Value> {
        let text = token.text.as_str();
        if text.contains(['.', 'e', 'E']) {
            match text.parse::<f64>() {
                Ok(r) if r.is_finite() => Ok(Value::Real(r)),
                Ok(_) => Err(EngineError::syntax(
                    token.start,
                    format!("real literal '{}' is out of range", text),
                )),
                Err(_) => Err(EngineError::syntax(
                    token.start,
                    format!("invalid number '{}'", text),
                )),
            }
        } else {
            text.parse::<i64>().map(Value::Integer).map_err(|_| {
                EngineError::syntax(
                    token.start,
                    format!("integer literal '{}' is out of range", text),
                )
            })
        }
    }

    fn at_predicate(&self) -> bool {
        match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Like) | Some(Keyword::In) | Some(Keyword::Between) | Some(Keyword::Is) => {
                true
            }
            Some(Keyword::Not) => matches!(
                self.tokens.get(self.position + 1).and_then(|t| t.keyword()),
                Some(Keyword::Like) | Some(Keyword::In) | Some(Keyword::Between)
            ),
            _ => false,
        }
    }

    fn parse_predicate(&mut self, expr: Expr) -> Result<Expr> {
        let expr = Box::new(expr);

        if self.match_keyword(Keyword::Is) {
            let negated = self.match_keyword(Keyword::Not);
            self.expect_keyword(Keyword::Null, "NULL after IS")?;
            return Ok(Expr::IsNull { expr, negated });
        }

        let negated = self.match_keyword(Keyword::Not);
        // operands bind at arithmetic level so BETWEEN's AND is not consumed
        let operand_precedence = PREDICATE_PRECEDENCE + 2;

        match self.current().and_then(|t| t.keyword()) {
            Some(Keyword::Like) => {
                self.advance();
                let pattern = self.parse_expr(operand_precedence)?;
                Ok(Expr::Like {
                    expr,
                    pattern: Box::new(pattern),
                    negated,
                })
            }
            Some(Keyword::In) => {
                self.advance();
                self.expect_punct("(", "'(' after IN")?;
                if self.at_keyword(Keyword::Select) {
                    return Err(self.error("value list (subqueries are not supported)"));
                }
                let list = self.parse_expr_list()?;
                self.expect_punct(")", "')' to close IN list")?;
                Ok(Expr::In {
                    expr,
                    list,
                    negated,
                })
            }
            Some(Keyword::Between) => {
                self.advance();
                let low = self.parse_expr(operand_precedence)?;
                self.expect_keyword(Keyword::And, "AND in BETWEEN")?;
                let high = self.parse_expr(operand_precedence)?;
                Ok(Expr::Between {
                    expr,
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                })
            }
            _ => Err(self.error("LIKE, IN or BETWEEN after NOT")),
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOperator> {
        let token = self.current()?;
        match token.kind {
            TokenKind::Keyword(Keyword::And) => Some(BinaryOperator::And),
            TokenKind::Keyword(Keyword::Or) => Some(BinaryOperator::Or),
            TokenKind::Operator => match token.text.as_str() {
                "=" => Some(BinaryOperator::Eq),
                "!=" | "<>" => Some(BinaryOperator::Ne),
                "<" => Some(BinaryOperator::Lt),
                ">" => Some(BinaryOperator::Gt),
                "<=" => Some(BinaryOperator::Le),
                ">=" => Some(BinaryOperator::Ge),
                "+" => Some(BinaryOperator::Add),
                "-" => Some(BinaryOperator::Sub),
                "*" => Some(BinaryOperator::Mul),
                "/" => Some(BinaryOperator::Div),
                "%" => Some(BinaryOperator::Mod),
                "||" => Some(BinaryOperator::Concat),
                _ => None,
            },
            _ => None,
        }
    }

    fn parse_literal(&mut self, context: &str) -> Result<Value> {
        match self.parse_prefix_expr() {
            Ok(Expr::Literal(value)) => Ok(value),
            _ => Err(EngineError::syntax(self.offset(), format!("expected {}", context))),
        }
    }

    // ----- Helpers -----

    fn parse_identifier(&mut self, context: &str) -> Result<String> {
        let name = match self.current() {
            Some(tok) => match tok.kind {
                TokenKind::Identifier => tok.identifier_name(),
                TokenKind::Keyword(kw) if !kw.is_reserved() => Some(tok.text.clone()),
                _ => None,
            },
            None => None,
        };
        match name {
            Some(name) if !name.is_empty() => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(context)),
        }
    }

    fn parse_identifier_list(&mut self, context: &str) -> Result<Vec<String>> {
        let mut list = Vec::new();
        loop {
            list.push(self.parse_identifier(context)?);
            if !self.match_punct(",") {
                break;
            }
        }
        Ok(list)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr(0)?);
            if !self.match_punct(",") {
                break;
            }
        }
        Ok(list)
    }

    fn parse_usize(&mut self, context: &str) -> Result<usize> {
        match self.current() {
            Some(tok) if tok.kind == TokenKind::Number => match tok.text.parse::<usize>() {
                Ok(n) => {
                    self.advance();
                    Ok(n)
                }
                Err(_) => Err(self.error(&format!("non-negative integer {}", context))),
            },
            _ => Err(self.error(context)),
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn offset(&self) -> usize {
        self.current().map(|t| t.start).unwrap_or(self.end_offset)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current().is_some_and(|t| t.is_keyword(keyword))
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_punct(&mut self, p: &str) -> bool {
        if self.current().is_some_and(|t| t.is_punct(p)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, op: &str) -> bool {
        if self.current().is_some_and(|t| t.is_operator(op)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, context: &str) -> Result<()> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(context))
        }
    }

    fn expect_punct(&mut self, p: &str, context: &str) -> Result<()> {
        if self.match_punct(p) {
            Ok(())
        } else {
            Err(self.error(context))
        }
    }

    fn expect_operator(&mut self, op: &str, context: &str) -> Result<()> {
        if self.match_operator(op) {
            Ok(())
        } else {
            Err(self.error(context))
        }
    }

    fn error(&self, expected: &str) -> EngineError {
        let found = match self.current() {
            None => "end of input".to_string(),
            Some(tok) if tok.kind == TokenKind::Unknown => {
                let quoted = tok.text.starts_with(['\'', '"', '`']);
                if quoted {
                    format!("unterminated literal {}", tok.text)
                } else {
                    format!("unrecognized text '{}'", tok.text)
                }
            }
            Some(tok) => format!("'{}'", tok.text),
        };
        EngineError::syntax(self.offset(), format!("expected {}, found {}", expected, found))
    }
}

/// Tokenize and parse a single statement.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    Parser::new(tokenize(sql)).parse()
}
