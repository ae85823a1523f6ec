/// Expression evaluator - evaluates expressions against rows
///
/// Evaluation is three-valued: NULL propagates through arithmetic and
/// comparisons, and AND/OR follow the SQL truth tables. Operand types are
/// checked once per statement by `check`, before any row is touched, so a
/// predicate fails the same way whichever rows a scan happens to visit.
use super::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{EngineError, Result};
use crate::types::{ColumnType, Fields, TableDef, Value};
use lru::LruCache;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Arc;

const DEFAULT_PATTERN_CACHE: usize = 256;

/// Compiled LIKE pattern. `%` matches any run of characters, `_` exactly
/// one. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq)]
enum CompiledPattern {
    /// "abc" (no wildcards)
    Exact(String),
    /// "abc%"
    Prefix(String),
    /// "%abc"
    Suffix(String),
    /// "%abc%"
    Contains(String),
    /// Anything else
    Complex(Vec<PatternSegment>),
}

#[derive(Debug, Clone, PartialEq)]
enum PatternSegment {
    Literal(Vec<char>),
    AnyChar,
    AnyChars,
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Self {
        let has_underscore = pattern.contains('_');
        let percent_count = pattern.matches('%').count();

        if !has_underscore {
            if percent_count == 0 {
                return CompiledPattern::Exact(pattern.to_string());
            }
            if percent_count == 1 && pattern.ends_with('%') {
                return CompiledPattern::Prefix(pattern[..pattern.len() - 1].to_string());
            }
            if percent_count == 1 && pattern.starts_with('%') {
                return CompiledPattern::Suffix(pattern[1..].to_string());
            }
            if percent_count == 2 && pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') {
                return CompiledPattern::Contains(pattern[1..pattern.len() - 1].to_string());
            }
        }

        let mut segments = Vec::new();
        let mut literal = Vec::new();
        for ch in pattern.chars() {
            match ch {
                '%' | '_' => {
                    if !literal.is_empty() {
                        segments.push(PatternSegment::Literal(std::mem::take(&mut literal)));
                    }
                    if ch == '_' {
                        segments.push(PatternSegment::AnyChar);
                    } else if segments.last() != Some(&PatternSegment::AnyChars) {
                        segments.push(PatternSegment::AnyChars);
                    }
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(PatternSegment::Literal(literal));
        }

        CompiledPattern::Complex(segments)
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Exact(pattern) => text == pattern,
            CompiledPattern::Prefix(prefix) => text.starts_with(prefix.as_str()),
            CompiledPattern::Suffix(suffix) => text.ends_with(suffix.as_str()),
            CompiledPattern::Contains(substring) => text.contains(substring.as_str()),
            CompiledPattern::Complex(segments) => {
                let chars: Vec<char> = text.chars().collect();
                Self::match_segments(&chars, segments)
            }
        }
    }

    /// Greedy wildcard match with a single backtrack point: on a mismatch,
    /// retry from the most recent `%` one character further along.
    fn match_segments(text: &[char], segments: &[PatternSegment]) -> bool {
        let mut ti = 0;
        let mut si = 0;
        let mut backtrack: Option<(usize, usize)> = None;

        loop {
            if si == segments.len() && ti == text.len() {
                return true;
            }

            let step = match segments.get(si) {
                Some(PatternSegment::AnyChars) => {
                    backtrack = Some((si, ti));
                    si += 1;
                    continue;
                }
                Some(PatternSegment::AnyChar) if ti < text.len() => Some(1),
                Some(PatternSegment::Literal(lit)) if text[ti..].starts_with(lit) => Some(lit.len()),
                _ => None,
            };

            match step {
                Some(len) => {
                    ti += len;
                    si += 1;
                }
                None => match backtrack {
                    Some((star_si, star_ti)) if star_ti < text.len() => {
                        backtrack = Some((star_si, star_ti + 1));
                        si = star_si + 1;
                        ti = star_ti + 1;
                    }
                    _ => return false,
                },
            }
        }
    }
}

pub struct ExprEvaluator {
    /// pattern text -> compiled pattern, least recently used evicted first
    pattern_cache: Mutex<LruCache<String, Arc<CompiledPattern>>>,
}

impl ExprEvaluator {
    pub fn new(pattern_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(pattern_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            pattern_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Evaluate an expression against a row's fields. Absent columns read
    /// as NULL.
    pub fn eval(&self, expr: &Expr, row: &Fields) -> Result<Value> {
        match expr {
            Expr::Column(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
            Expr::QualifiedColumn { table, column } => Err(unresolved(table, column)),
            Expr::Literal(value) => Ok(value.clone()),

            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => {
                    let l = truth(&self.eval(left, row)?);
                    if l == Some(false) {
                        return Ok(Value::Boolean(false));
                    }
                    let r = truth(&self.eval(right, row)?);
                    Ok(match (l, r) {
                        (_, Some(false)) => Value::Boolean(false),
                        (Some(true), Some(true)) => Value::Boolean(true),
                        _ => Value::Null,
                    })
                }
                BinaryOperator::Or => {
                    let l = truth(&self.eval(left, row)?);
                    if l == Some(true) {
                        return Ok(Value::Boolean(true));
                    }
                    let r = truth(&self.eval(right, row)?);
                    Ok(match (l, r) {
                        (_, Some(true)) => Value::Boolean(true),
                        (Some(false), Some(false)) => Value::Boolean(false),
                        _ => Value::Null,
                    })
                }
                _ => {
                    let l = self.eval(left, row)?;
                    let r = self.eval(right, row)?;
                    self.eval_binary_op(*op, l, r)
                }
            },

            Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr, row)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOperator::Not, v) => Ok(match truth(&v) {
                        Some(b) => Value::Boolean(!b),
                        None => Value::Null,
                    }),
                    (UnaryOperator::Minus, Value::Integer(i)) => i
                        .checked_neg()
                        .map(Value::Integer)
                        .ok_or_else(|| overflow("negation")),
                    (UnaryOperator::Minus, Value::Real(r)) => Ok(Value::Real(-r)),
                    (UnaryOperator::Minus, v) => Err(EngineError::TypeMismatch(format!(
                        "cannot negate {}",
                        v.type_name()
                    ))),
                }
            }

            Expr::In {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item, row)?;
                    match value.compare(&candidate) {
                        Some(Ordering::Equal) => return Ok(Value::Boolean(!negated)),
                        None => saw_null = true,
                        _ => {}
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                })
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                let low = self.eval(low, row)?;
                let high = self.eval(high, row)?;
                let above = value.compare(&low).map(|o| o != Ordering::Less);
                let below = value.compare(&high).map(|o| o != Ordering::Greater);
                let within = match (above, below) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(match within {
                    Some(b) => Value::Boolean(b != *negated),
                    None => Value::Null,
                })
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                let pattern = self.eval(pattern, row)?;
                match (value, pattern) {
                    (Value::Text(text), Value::Text(pattern)) => {
                        Ok(Value::Boolean(self.like_match(&text, &pattern) != *negated))
                    }
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (v, p) => Err(EngineError::TypeMismatch(format!(
                        "LIKE needs TEXT operands, found {} and {}",
                        v.type_name(),
                        p.type_name()
                    ))),
                }
            }

            Expr::IsNull { expr, negated } => {
                let value = self.eval(expr, row)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
        }
    }

    /// Evaluate an expression that references no columns.
    pub fn eval_constant(&self, expr: &Expr) -> Result<Value> {
        self.eval(expr, &Fields::new())
    }

    /// WHERE semantics: a row qualifies only when the predicate is TRUE.
    pub fn matches(&self, predicate: &Expr, row: &Fields) -> Result<bool> {
        Ok(truth(&self.eval(predicate, row)?) == Some(true))
    }

    fn eval_binary_op(&self, op: BinaryOperator, left: Value, right: Value) -> Result<Value> {
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }

        if op.is_comparison() {
            let ordering = match left.compare(&right) {
                Some(o) => o,
                None => return Ok(Value::Null),
            };
            let result = match op {
                BinaryOperator::Eq => ordering == Ordering::Equal,
                BinaryOperator::Ne => ordering != Ordering::Equal,
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Boolean(result));
        }

        match op {
            BinaryOperator::Concat => Ok(Value::Text(format!("{}{}", left, right))),
            BinaryOperator::Add => arithmetic(op, left, right, i64::checked_add, |a, b| a + b),
            BinaryOperator::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
            BinaryOperator::Mul => arithmetic(op, left, right, i64::checked_mul, |a, b| a * b),
            BinaryOperator::Div | BinaryOperator::Mod => {
                let is_zero = matches!(right, Value::Integer(0))
                    || matches!(right, Value::Real(r) if r == 0.0);
                if is_zero {
                    return Ok(Value::Null);
                }
                if op == BinaryOperator::Div {
                    arithmetic(op, left, right, i64::checked_div, |a, b| a / b)
                } else {
                    arithmetic(op, left, right, i64::checked_rem, |a, b| a % b)
                }
            }
            _ => Err(EngineError::TypeMismatch(format!(
                "operator {} is not arithmetic",
                op.symbol()
            ))),
        }
    }

    fn like_match(&self, text: &str, pattern: &str) -> bool {
        let compiled = {
            let mut cache = self.pattern_cache.lock();
            match cache.get(pattern) {
                Some(compiled) => Arc::clone(compiled),
                None => {
                    let compiled = Arc::new(CompiledPattern::compile(pattern));
                    cache.put(pattern.to_string(), Arc::clone(&compiled));
                    compiled
                }
            }
        };
        compiled.matches(text)
    }

    /// Static check of an expression against a table's schema (or against
    /// no table for constant selects). Reports unknown columns and operand
    /// types that can never work; returns the expression's type, `None`
    /// when it is always NULL.
    pub fn check(expr: &Expr, table: Option<&TableDef>) -> Result<Option<ColumnType>> {
        match expr {
            Expr::Column(name) => match table {
                Some(def) => Ok(Some(def.column(name)?.col_type)),
                None => Err(EngineError::UnknownReference(format!(
                    "column '{}' used without FROM",
                    name
                ))),
            },
            Expr::QualifiedColumn { table, column } => Err(unresolved(table, column)),
            Expr::Literal(value) => Ok(literal_type(value)),

            Expr::BinaryOp { left, op, right } => {
                let l = Self::check(left, table)?;
                let r = Self::check(right, table)?;
                match op {
                    BinaryOperator::And | BinaryOperator::Or => {
                        require_logical(l, op.symbol())?;
                        require_logical(r, op.symbol())?;
                        Ok(Some(ColumnType::Boolean))
                    }
                    BinaryOperator::Concat => Ok(Some(ColumnType::Text)),
                    op if op.is_comparison() => {
                        require_comparable(l, r, op.symbol())?;
                        Ok(Some(ColumnType::Boolean))
                    }
                    _ => {
                        require_numeric(l, op.symbol())?;
                        require_numeric(r, op.symbol())?;
                        Ok(match (l, r) {
                            (Some(ColumnType::Real), _) | (_, Some(ColumnType::Real)) => {
                                Some(ColumnType::Real)
                            }
                            (None, _) | (_, None) => None,
                            _ => Some(ColumnType::Integer),
                        })
                    }
                }
            }

            Expr::UnaryOp { op, expr } => {
                let t = Self::check(expr, table)?;
                match op {
                    UnaryOperator::Not => {
                        require_logical(t, "NOT")?;
                        Ok(Some(ColumnType::Boolean))
                    }
                    UnaryOperator::Minus => {
                        require_numeric(t, "-")?;
                        Ok(t)
                    }
                }
            }

            Expr::In { expr, list, .. } => {
                let t = Self::check(expr, table)?;
                for item in list {
                    let item_type = Self::check(item, table)?;
                    require_comparable(t, item_type, "IN")?;
                }
                Ok(Some(ColumnType::Boolean))
            }

            Expr::Between {
                expr, low, high, ..
            } => {
                let t = Self::check(expr, table)?;
                require_comparable(t, Self::check(low, table)?, "BETWEEN")?;
                require_comparable(t, Self::check(high, table)?, "BETWEEN")?;
                Ok(Some(ColumnType::Boolean))
            }

            Expr::Like { expr, pattern, .. } => {
                for side in [Self::check(expr, table)?, Self::check(pattern, table)?] {
                    if let Some(t) = side {
                        if t != ColumnType::Text {
                            return Err(EngineError::TypeMismatch(format!(
                                "LIKE needs TEXT operands, found {}",
                                t.name()
                            )));
                        }
                    }
                }
                Ok(Some(ColumnType::Boolean))
            }

            Expr::IsNull { expr, .. } => {
                Self::check(expr, table)?;
                Ok(Some(ColumnType::Boolean))
            }
        }
    }
}

impl Default for ExprEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE)
    }
}

/// SQL truth value: `None` is UNKNOWN.
fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        other => Some(other.is_truthy()),
    }
}

/// REAL results must stay finite; infinities and NaN cannot be stored.
fn finite(op: BinaryOperator, result: f64) -> Result<Value> {
    if result.is_finite() {
        Ok(Value::Real(result))
    } else {
        Err(EngineError::TypeMismatch(format!(
            "REAL overflow in {}",
            op.symbol()
        )))
    }
}

fn unresolved(table: &str, column: &str) -> EngineError {
    EngineError::UnknownReference(format!("column '{}.{}' is not resolved", table, column))
}

fn overflow(context: &str) -> EngineError {
    EngineError::TypeMismatch(format!("integer overflow in {}", context))
}

fn arithmetic(
    op: BinaryOperator,
    left: Value,
    right: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => int_op(l, r)
            .map(Value::Integer)
            .ok_or_else(|| overflow(op.symbol())),
        (Value::Real(l), Value::Real(r)) => finite(op, real_op(l, r)),
        (Value::Integer(l), Value::Real(r)) => finite(op, real_op(l as f64, r)),
        (Value::Real(l), Value::Integer(r)) => finite(op, real_op(l, r as f64)),
        (l, r) => Err(EngineError::TypeMismatch(format!(
            "cannot apply {} to {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn literal_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Boolean(_) => Some(ColumnType::Boolean),
        Value::Integer(_) => Some(ColumnType::Integer),
        Value::Real(_) => Some(ColumnType::Real),
        Value::Text(_) => Some(ColumnType::Text),
    }
}

fn is_numeric(t: ColumnType) -> bool {
    matches!(t, ColumnType::Integer | ColumnType::Real)
}

fn require_numeric(t: Option<ColumnType>, op: &str) -> Result<()> {
    match t {
        Some(t) if !is_numeric(t) => Err(EngineError::TypeMismatch(format!(
            "operator {} needs numeric operands, found {}",
            op,
            t.name()
        ))),
        _ => Ok(()),
    }
}

fn require_logical(t: Option<ColumnType>, op: &str) -> Result<()> {
    match t {
        Some(ColumnType::Text) => Err(EngineError::TypeMismatch(format!(
            "operator {} needs a boolean operand, found TEXT",
            op
        ))),
        _ => Ok(()),
    }
}

fn require_comparable(l: Option<ColumnType>, r: Option<ColumnType>, op: &str) -> Result<()> {
    match (l, r) {
        (Some(a), Some(b)) if a != b && !(is_numeric(a) && is_numeric(b)) => {
            Err(EngineError::TypeMismatch(format!(
                "cannot compare {} with {} using {}",
                a.name(),
                b.name(),
                op
            )))
        }
        _ => Ok(()),
    }
}
