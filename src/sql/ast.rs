/// Abstract Syntax Tree for SQL statements
use crate::error::{EngineError, Result};
use crate::types::{ColumnType, Value};

/// Top-level SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    DropTable(DropTableStmt),
    CreateIndex(CreateIndexStmt),
    DropIndex(DropIndexStmt),
    ShowTables,
    DescribeTable(String),
}

impl Statement {
    /// Short verb used in logs and definition messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::CreateIndex(_) => "CREATE INDEX",
            Statement::DropIndex(_) => "DROP INDEX",
            Statement::ShowTables => "SHOW TABLES",
            Statement::DescribeTable(_) => "DESCRIBE",
        }
    }

    /// Rewrite `table.column` references into plain columns of the
    /// statement's table. A qualifier naming any other table is an
    /// `UnknownReference`.
    pub fn resolve_qualifiers(&mut self) -> Result<()> {
        match self {
            Statement::Select(s) => {
                let table = s.from.as_deref();
                for column in &mut s.columns {
                    if let SelectColumn::Expr { expr, .. } = column {
                        expr.resolve_qualifiers(table)?;
                    }
                }
                if let Some(expr) = &mut s.where_clause {
                    expr.resolve_qualifiers(table)?;
                }
                for order in &mut s.order_by {
                    order.expr.resolve_qualifiers(table)?;
                }
            }
            Statement::Insert(i) => {
                for expr in i.values.iter_mut().flatten() {
                    expr.resolve_qualifiers(Some(i.table.as_str()))?;
                }
            }
            Statement::Update(u) => {
                for (_, expr) in &mut u.assignments {
                    expr.resolve_qualifiers(Some(u.table.as_str()))?;
                }
                if let Some(expr) = &mut u.where_clause {
                    expr.resolve_qualifiers(Some(u.table.as_str()))?;
                }
            }
            Statement::Delete(d) => {
                if let Some(expr) = &mut d.where_clause {
                    expr.resolve_qualifiers(Some(d.table.as_str()))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    /// `None` for constant selects such as `SELECT 1`
    pub from: Option<String>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// `*`
    Star,
    /// `COUNT(*)`
    CountStar { alias: Option<String> },
    /// expression [AS alias]
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub asc: bool,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    /// `None` means all columns in declared order
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expr>>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnSpec>,
}

/// Column as written in CREATE TABLE; becomes a `ColumnDef` in the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    pub table: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub index_name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexStmt {
    pub index_name: String,
    pub if_exists: bool,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    /// `table.column`; resolved to `Column` before execution
    QualifiedColumn {
        table: String,
        column: String,
    },
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// expr [NOT] IN (list)
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// expr [NOT] BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// expr [NOT] LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// expr IS [NOT] NULL
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    /// Every column name the expression refers to.
    pub fn referenced_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) | Expr::QualifiedColumn { column: name, .. } => out.push(name),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => {
                expr.referenced_columns(out)
            }
            Expr::In { expr, list, .. } => {
                expr.referenced_columns(out);
                for item in list {
                    item.referenced_columns(out);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.referenced_columns(out);
                low.referenced_columns(out);
                high.referenced_columns(out);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.referenced_columns(out);
                pattern.referenced_columns(out);
            }
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::QualifiedColumn { .. } | Expr::Literal(_) => Vec::new(),
            Expr::BinaryOp { left, right, .. } => vec![&**left, &**right],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => vec![&**expr],
            Expr::In { expr, list, .. } => std::iter::once(&**expr).chain(list).collect(),
            Expr::Between { expr, low, high, .. } => vec![&**expr, &**low, &**high],
            Expr::Like { expr, pattern, .. } => vec![&**expr, &**pattern],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Column(_) | Expr::QualifiedColumn { .. } | Expr::Literal(_) => Vec::new(),
            Expr::BinaryOp { left, right, .. } => vec![&mut **left, &mut **right],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => vec![&mut **expr],
            Expr::In { expr, list, .. } => std::iter::once(&mut **expr).chain(list).collect(),
            Expr::Between { expr, low, high, .. } => vec![&mut **expr, &mut **low, &mut **high],
            Expr::Like { expr, pattern, .. } => vec![&mut **expr, &mut **pattern],
        }
    }

    /// Height of the expression tree; a lone column or literal is 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expr::depth)
            .max()
            .unwrap_or(0)
    }

    pub fn resolve_qualifiers(&mut self, table: Option<&str>) -> Result<()> {
        let resolved = match self {
            Expr::QualifiedColumn { table: qualifier, column } => {
                if table != Some(qualifier.as_str()) {
                    return Err(EngineError::UnknownReference(format!(
                        "table '{}' in '{}.{}' is not the statement's table",
                        qualifier, qualifier, column
                    )));
                }
                Some(std::mem::take(column))
            }
            _ => None,
        };
        if let Some(column) = resolved {
            *self = Expr::Column(column);
            return Ok(());
        }
        for child in self.children_mut() {
            child.resolve_qualifiers(table)?;
        }
        Ok(())
    }

    /// Display name for an unaliased projection.
    pub fn display_name(&self) -> String {
        match self {
            Expr::Column(name) | Expr::QualifiedColumn { column: name, .. } => name.clone(),
            Expr::Literal(Value::Text(s)) => format!("'{}'", s),
            Expr::Literal(v) => v.to_string(),
            Expr::BinaryOp { left, op, right } => format!(
                "{} {} {}",
                left.display_name(),
                op.symbol(),
                right.display_name()
            ),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => format!("NOT {}", expr.display_name()),
                UnaryOperator::Minus => format!("-{}", expr.display_name()),
            },
            _ => "expr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    /// `||` string concatenation
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl BinaryOperator {
    /// Operator precedence (higher = tighter binding)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::Le
            | BinaryOperator::Ge => 4,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Concat => 5,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 6,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Le
                | BinaryOperator::Ge
        )
    }

    /// The same comparison with its operands swapped (`5 < x` is `x > 5`).
    pub fn flipped(&self) -> Self {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::Le => BinaryOperator::Ge,
            BinaryOperator::Ge => BinaryOperator::Le,
            other => *other,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Concat => "||",
        }
    }
}
