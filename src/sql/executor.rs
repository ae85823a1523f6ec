/// Query executor - executes SQL statements against one scope's catalog
use super::ast::*;
use super::evaluator::ExprEvaluator;
use crate::catalog::{ScopeCatalog, TableEntry};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::IndexValue;
use crate::persistence::PendingWrite;
use crate::types::{ColumnDef, ColumnType, Fields, IndexDef, RowId, TableDef, Value};
use serde::Serialize;
use std::collections::BTreeSet;

/// Query result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    /// SELECT result
    Select {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },

    /// INSERT/UPDATE/DELETE result
    Modification { affected_rows: usize },

    /// CREATE/DROP result
    Definition { message: String },
}

impl QueryResult {
    pub fn affected_rows(&self) -> usize {
        match self {
            QueryResult::Modification { affected_rows } => *affected_rows,
            _ => 0,
        }
    }

    /// Columns and rows of a SELECT result
    pub fn select_rows(&self) -> Option<(&[String], &[Vec<Value>])> {
        match self {
            QueryResult::Select { columns, rows } => Some((columns.as_slice(), rows.as_slice())),
            _ => None,
        }
    }

    /// Rows as column name -> value maps. Empty unless this is a SELECT.
    pub fn rows_as_maps(&self) -> Vec<Fields> {
        match self {
            QueryResult::Select { columns, rows } => rows
                .iter()
                .map(|row| columns.iter().cloned().zip(row.iter().cloned()).collect())
                .collect(),
            _ => vec![],
        }
    }

    /// Rows returned by a SELECT or touched by a modification
    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Select { rows, .. } => rows.len(),
            QueryResult::Modification { affected_rows } => *affected_rows,
            _ => 0,
        }
    }
}

/// Result of one statement plus the durable writes it implies.
#[derive(Debug)]
pub struct Execution {
    pub result: QueryResult,
    pub writes: Vec<PendingWrite>,
}

impl Execution {
    fn read(result: QueryResult) -> Self {
        Self {
            result,
            writes: Vec::new(),
        }
    }

    fn definition(message: String, writes: Vec<PendingWrite>) -> Self {
        Self {
            result: QueryResult::Definition { message },
            writes,
        }
    }
}

pub struct QueryExecutor {
    evaluator: ExprEvaluator,
    max_rows_per_table: usize,
    max_result_rows: usize,
}

impl QueryExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            evaluator: ExprEvaluator::new(config.like_cache_size),
            max_rows_per_table: config.max_rows_per_table,
            max_result_rows: config.max_result_rows,
        }
    }

    pub fn evaluator(&self) -> &ExprEvaluator {
        &self.evaluator
    }

    /// Run one statement against `catalog`. A failing statement leaves the
    /// catalog and row stores as they were.
    pub fn execute(&self, mut stmt: Statement, catalog: &mut ScopeCatalog) -> Result<Execution> {
        tracing::debug!(scope = %catalog.scope(), verb = stmt.verb(), "executing statement");
        stmt.resolve_qualifiers()?;
        match stmt {
            Statement::Select(s) => self.execute_select(s, catalog),
            Statement::Insert(i) => self.execute_insert(i, catalog),
            Statement::Update(u) => self.execute_update(u, catalog),
            Statement::Delete(d) => self.execute_delete(d, catalog),
            Statement::CreateTable(c) => self.execute_create_table(c, catalog),
            Statement::CreateIndex(c) => self.execute_create_index(c, catalog),
            Statement::DropTable(d) => self.execute_drop_table(d, catalog),
            Statement::DropIndex(d) => self.execute_drop_index(d, catalog),
            Statement::ShowTables => Ok(self.execute_show_tables(catalog)),
            Statement::DescribeTable(table) => self.execute_describe_table(&table, catalog),
        }
    }

    // ----- SELECT -----

    fn execute_select(&self, stmt: SelectStmt, catalog: &mut ScopeCatalog) -> Result<Execution> {
        let count_items = stmt
            .columns
            .iter()
            .filter(|c| matches!(c, SelectColumn::CountStar { .. }))
            .count();
        if count_items > 0 && stmt.columns.len() > 1 {
            return Err(EngineError::ConstraintViolation(
                "COUNT(*) cannot be combined with other select items".into(),
            ));
        }

        let table_name = match &stmt.from {
            Some(name) => name.clone(),
            None => return self.execute_constant_select(&stmt),
        };
        let entry = catalog.get_table_mut(&table_name).map_err(|_| {
            EngineError::UnknownReference(format!("table '{}' does not exist", table_name))
        })?;

        if let Some(predicate) = &stmt.where_clause {
            check_predicate(predicate, &entry.def, "WHERE")?;
        }

        if let Some(SelectColumn::CountStar { alias }) = stmt.columns.first() {
            let count = entry
                .store
                .matching_ids(stmt.where_clause.as_ref(), &self.evaluator)?
                .len();
            let rows = window(vec![vec![Value::Integer(count as i64)]], stmt.offset, stmt.limit);
            return Ok(Execution::read(QueryResult::Select {
                columns: vec![alias.clone().unwrap_or_else(|| "COUNT(*)".to_string())],
                rows,
            }));
        }

        let projection = projection(&stmt.columns, &entry.def)?;
        let order_by = resolve_order_by(&stmt.order_by, &projection, &entry.def)?;
        let columns: Vec<String> = projection.iter().map(|(name, _)| name.clone()).collect();

        // DISTINCT applies before the window
        let (offset, limit) = if stmt.distinct {
            (0, None)
        } else {
            (stmt.offset.unwrap_or(0), stmt.limit)
        };
        let matched = entry.store.scan(
            stmt.where_clause.as_ref(),
            &order_by,
            offset,
            limit,
            &self.evaluator,
        )?;

        let mut rows = Vec::with_capacity(matched.len());
        for row in matched {
            let values = projection
                .iter()
                .map(|(_, expr)| self.evaluator.eval(expr, &row.fields))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }
        if stmt.distinct {
            rows = window(apply_distinct(rows), stmt.offset, stmt.limit);
        }

        self.check_result_size(rows.len())?;
        Ok(Execution::read(QueryResult::Select { columns, rows }))
    }

    /// `SELECT <exprs>` without FROM: one row of constants.
    fn execute_constant_select(&self, stmt: &SelectStmt) -> Result<Execution> {
        let mut columns = Vec::with_capacity(stmt.columns.len());
        let mut row = Vec::with_capacity(stmt.columns.len());
        for column in &stmt.columns {
            match column {
                SelectColumn::Star => {
                    return Err(EngineError::UnknownReference(
                        "SELECT * requires a FROM clause".into(),
                    ))
                }
                SelectColumn::CountStar { alias } => {
                    columns.push(alias.clone().unwrap_or_else(|| "COUNT(*)".to_string()));
                    row.push(Value::Integer(1));
                }
                SelectColumn::Expr { expr, alias } => {
                    ExprEvaluator::check(expr, None)?;
                    columns.push(alias.clone().unwrap_or_else(|| expr.display_name()));
                    row.push(self.evaluator.eval_constant(expr)?);
                }
            }
        }
        for order in &stmt.order_by {
            ExprEvaluator::check(&order.expr, None)?;
        }

        let rows = window(vec![row], stmt.offset, stmt.limit);
        Ok(Execution::read(QueryResult::Select { columns, rows }))
    }

    fn check_result_size(&self, rows: usize) -> Result<()> {
        if rows > self.max_result_rows {
            return Err(EngineError::LimitExceeded(format!(
                "query returned {} rows, more than the limit of {}; add a LIMIT clause",
                rows, self.max_result_rows
            )));
        }
        Ok(())
    }

    // ----- INSERT / UPDATE / DELETE -----

    fn execute_insert(&self, stmt: InsertStmt, catalog: &mut ScopeCatalog) -> Result<Execution> {
        let scope = catalog.scope().clone();
        let entry = catalog.get_table_mut(&stmt.table).map_err(|_| {
            EngineError::UnknownReference(format!("table '{}' does not exist", stmt.table))
        })?;
        let def = &entry.def;

        // Determine column order
        let columns: Vec<&ColumnDef> = match &stmt.columns {
            Some(names) => {
                let mut resolved = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    if names[..i].contains(name) {
                        return Err(EngineError::ConstraintViolation(format!(
                            "column '{}' listed more than once",
                            name
                        )));
                    }
                    resolved.push(def.column(name)?);
                }
                resolved
            }
            None => def.columns.iter().collect(),
        };

        // Prepare all rows first; nothing is written unless every row is valid
        let mut images = Vec::with_capacity(stmt.values.len());
        for (n, tuple) in stmt.values.iter().enumerate() {
            if tuple.len() != columns.len() {
                return Err(EngineError::ConstraintViolation(format!(
                    "row {} has {} values but {} columns were given",
                    n + 1,
                    tuple.len(),
                    columns.len()
                )));
            }

            let mut fields = Fields::new();
            for (column, expr) in columns.iter().zip(tuple) {
                ExprEvaluator::check(expr, None).map_err(|e| match e {
                    EngineError::UnknownReference(_) => EngineError::UnknownReference(format!(
                        "VALUES may only contain constants, found column reference in '{}'",
                        column.name
                    )),
                    other => other,
                })?;
                let value = self.evaluator.eval_constant(expr)?;
                fields.insert(column.name.clone(), column.coerce(value)?);
            }
            for column in &def.columns {
                if !fields.contains_key(&column.name) {
                    let value = column.default.clone().unwrap_or(Value::Null);
                    fields.insert(column.name.clone(), column.coerce(value)?);
                }
            }
            images.push(fields);
        }

        if entry.store.len() + images.len() > self.max_rows_per_table {
            return Err(EngineError::LimitExceeded(format!(
                "table '{}' would hold {} rows, more than the limit of {}",
                stmt.table,
                entry.store.len() + images.len(),
                self.max_rows_per_table
            )));
        }

        let inserted = entry.store.insert_many(images)?;
        let writes = vec![PendingWrite::rows(&scope, entry.record_id, &inserted)?];
        Ok(Execution {
            result: QueryResult::Modification {
                affected_rows: inserted.len(),
            },
            writes,
        })
    }

    fn execute_update(&self, stmt: UpdateStmt, catalog: &mut ScopeCatalog) -> Result<Execution> {
        let scope = catalog.scope().clone();
        let entry = catalog.get_table_mut(&stmt.table)?;

        let mut targets: Vec<(&ColumnDef, &Expr)> = Vec::with_capacity(stmt.assignments.len());
        for (name, expr) in &stmt.assignments {
            if targets.iter().any(|(c, _)| &c.name == name) {
                return Err(EngineError::ConstraintViolation(format!(
                    "column '{}' assigned more than once",
                    name
                )));
            }
            let column = entry.def.column(name)?;
            let value_type = ExprEvaluator::check(expr, Some(&entry.def))?;
            check_assignable(column, value_type)?;
            targets.push((column, expr));
        }
        if let Some(predicate) = &stmt.where_clause {
            check_predicate(predicate, &entry.def, "WHERE")?;
        }

        let ids = entry
            .store
            .matching_ids(stmt.where_clause.as_ref(), &self.evaluator)?;

        // New images are computed from the old row, all before any change
        let mut changes: Vec<(RowId, Fields)> = Vec::with_capacity(ids.len());
        for id in ids {
            let row = match entry.store.get(id) {
                Some(row) => row,
                None => continue,
            };
            let mut fields = row.fields.clone();
            for (column, expr) in &targets {
                let value = self.evaluator.eval(expr, &row.fields)?;
                fields.insert(column.name.clone(), column.coerce(value)?);
            }
            changes.push((id, fields));
        }

        let updated = entry.store.update_many(changes)?;
        let writes = if updated.is_empty() {
            Vec::new()
        } else {
            vec![PendingWrite::rows(&scope, entry.record_id, &updated)?]
        };
        Ok(Execution {
            result: QueryResult::Modification {
                affected_rows: updated.len(),
            },
            writes,
        })
    }

    fn execute_delete(&self, stmt: DeleteStmt, catalog: &mut ScopeCatalog) -> Result<Execution> {
        let entry = catalog.get_table_mut(&stmt.table)?;
        if let Some(predicate) = &stmt.where_clause {
            check_predicate(predicate, &entry.def, "WHERE")?;
        }

        let removed = entry
            .store
            .delete_where(stmt.where_clause.as_ref(), &self.evaluator)?;
        let writes = if removed.is_empty() {
            Vec::new()
        } else {
            vec![PendingWrite::delete_rows(entry.record_id, &removed)]
        };
        Ok(Execution {
            result: QueryResult::Modification {
                affected_rows: removed.len(),
            },
            writes,
        })
    }

    // ----- DDL -----

    fn execute_create_table(
        &self,
        stmt: CreateTableStmt,
        catalog: &mut ScopeCatalog,
    ) -> Result<Execution> {
        if catalog.table_exists(&stmt.table) {
            if stmt.if_not_exists {
                return Ok(Execution::definition(
                    format!("Table '{}' already exists, skipped", stmt.table),
                    Vec::new(),
                ));
            }
            return Err(EngineError::AlreadyExists(format!(
                "table '{}' already exists",
                stmt.table
            )));
        }

        let mut columns = Vec::with_capacity(stmt.columns.len());
        for spec in stmt.columns {
            let mut column = ColumnDef::new(spec.name, spec.data_type);
            column.nullable = spec.nullable && !spec.primary_key;
            column.primary_key = spec.primary_key;
            column.unique = spec.unique;
            if let Some(default) = spec.default {
                column.default = Some(column.coerce(default)?);
            }
            columns.push(column);
        }

        let def = TableDef::new(stmt.table.clone(), columns)?;
        let implicit: Vec<String> = def.indexes.iter().map(|i| i.name.clone()).collect();

        let scope = catalog.scope().clone();
        let entry = catalog.define_table(def)?;
        let writes = vec![PendingWrite::table(&scope, entry)?];

        let message = if implicit.is_empty() {
            format!("Table '{}' created", stmt.table)
        } else {
            format!(
                "Table '{}' created (indexes: {})",
                stmt.table,
                implicit.join(", ")
            )
        };
        Ok(Execution::definition(message, writes))
    }

    fn execute_drop_table(
        &self,
        stmt: DropTableStmt,
        catalog: &mut ScopeCatalog,
    ) -> Result<Execution> {
        if stmt.if_exists && !catalog.table_exists(&stmt.table) {
            return Ok(Execution::definition(
                format!("Table '{}' does not exist, skipped", stmt.table),
                Vec::new(),
            ));
        }

        let entry = catalog.drop_table(&stmt.table)?;
        Ok(Execution::definition(
            format!(
                "Table '{}' dropped ({} rows removed)",
                stmt.table,
                entry.store.len()
            ),
            vec![PendingWrite::DeleteTable(entry.record_id)],
        ))
    }

    fn execute_create_index(
        &self,
        stmt: CreateIndexStmt,
        catalog: &mut ScopeCatalog,
    ) -> Result<Execution> {
        if catalog.get_index(&stmt.index_name).is_ok() {
            if stmt.if_not_exists {
                return Ok(Execution::definition(
                    format!("Index '{}' already exists, skipped", stmt.index_name),
                    Vec::new(),
                ));
            }
            return Err(EngineError::AlreadyExists(format!(
                "index '{}' already exists",
                stmt.index_name
            )));
        }
        for (i, column) in stmt.columns.iter().enumerate() {
            if stmt.columns[..i].contains(column) {
                return Err(EngineError::ConstraintViolation(format!(
                    "column '{}' appears twice in index '{}'",
                    column, stmt.index_name
                )));
            }
        }

        let index = IndexDef::new(
            stmt.index_name.clone(),
            stmt.table.clone(),
            stmt.columns.clone(),
            stmt.unique,
        );
        catalog.add_index(index)?;

        let scope = catalog.scope().clone();
        let entry = catalog.get_table(&stmt.table)?;
        Ok(Execution::definition(
            format!(
                "{}ndex '{}' created on {}({})",
                if stmt.unique { "Unique i" } else { "I" },
                stmt.index_name,
                stmt.table,
                stmt.columns.join(", ")
            ),
            vec![PendingWrite::table(&scope, entry)?],
        ))
    }

    fn execute_drop_index(
        &self,
        stmt: DropIndexStmt,
        catalog: &mut ScopeCatalog,
    ) -> Result<Execution> {
        let table = match catalog.get_index(&stmt.index_name) {
            Ok(index) => index.table_name.clone(),
            Err(_) if stmt.if_exists => {
                return Ok(Execution::definition(
                    format!("Index '{}' does not exist, skipped", stmt.index_name),
                    Vec::new(),
                ))
            }
            Err(e) => return Err(e),
        };

        let entry = catalog.get_table(&table)?;
        if constraint_indexes(&entry.def).contains(&stmt.index_name) {
            return Err(EngineError::ConstraintViolation(format!(
                "index '{}' enforces a PRIMARY KEY or UNIQUE column of '{}' and cannot be dropped",
                stmt.index_name, table
            )));
        }

        catalog.drop_index(&stmt.index_name)?;
        let scope = catalog.scope().clone();
        let entry = catalog.get_table(&table)?;
        Ok(Execution::definition(
            format!("Index '{}' dropped", stmt.index_name),
            vec![PendingWrite::table(&scope, entry)?],
        ))
    }

    // ----- Introspection -----

    fn execute_show_tables(&self, catalog: &ScopeCatalog) -> Execution {
        let rows = catalog
            .list_tables()
            .into_iter()
            .map(|table_name| vec![Value::Text(table_name)])
            .collect();
        Execution::read(QueryResult::Select {
            columns: vec!["Tables".to_string()],
            rows,
        })
    }

    fn execute_describe_table(&self, table: &str, catalog: &ScopeCatalog) -> Result<Execution> {
        let entry: &TableEntry = catalog.get_table(table)?;

        let columns = vec![
            "Field".to_string(),
            "Type".to_string(),
            "Nullable".to_string(),
            "Key".to_string(),
            "Default".to_string(),
        ];
        let rows = entry
            .def
            .columns
            .iter()
            .map(|col| {
                let key = if col.primary_key {
                    "PRI"
                } else if col.unique {
                    "UNI"
                } else {
                    ""
                };
                vec![
                    Value::Text(col.name.clone()),
                    Value::Text(col.col_type.name().to_string()),
                    Value::Text(if col.nullable { "YES" } else { "NO" }.into()),
                    Value::Text(key.into()),
                    col.default.clone().unwrap_or(Value::Null),
                ]
            })
            .collect();

        Ok(Execution::read(QueryResult::Select { columns, rows }))
    }
}

// Helper functions

/// Output name and expression of every projected column.
fn projection(columns: &[SelectColumn], def: &TableDef) -> Result<Vec<(String, Expr)>> {
    let mut out = Vec::new();
    for column in columns {
        match column {
            SelectColumn::Star => out.extend(
                def.columns
                    .iter()
                    .map(|c| (c.name.clone(), Expr::Column(c.name.clone()))),
            ),
            SelectColumn::Expr { expr, alias } => {
                ExprEvaluator::check(expr, Some(def))?;
                let name = alias.clone().unwrap_or_else(|| expr.display_name());
                out.push((name, expr.clone()));
            }
            SelectColumn::CountStar { .. } => {
                return Err(EngineError::ConstraintViolation(
                    "COUNT(*) cannot be combined with other select items".into(),
                ))
            }
        }
    }
    Ok(out)
}

/// ORDER BY may name a select-list alias; table columns take precedence.
fn resolve_order_by(
    order_by: &[OrderByExpr],
    projection: &[(String, Expr)],
    def: &TableDef,
) -> Result<Vec<OrderByExpr>> {
    let mut resolved = Vec::with_capacity(order_by.len());
    for order in order_by {
        let expr = match &order.expr {
            Expr::Column(name) if def.get_column(name).is_none() => projection
                .iter()
                .find(|(alias, _)| alias == name)
                .map(|(_, expr)| expr.clone())
                .unwrap_or_else(|| order.expr.clone()),
            other => other.clone(),
        };
        ExprEvaluator::check(&expr, Some(def))?;
        resolved.push(OrderByExpr {
            expr,
            asc: order.asc,
        });
    }
    Ok(resolved)
}

fn check_predicate(predicate: &Expr, def: &TableDef, clause: &str) -> Result<()> {
    match ExprEvaluator::check(predicate, Some(def))? {
        Some(ColumnType::Text) => Err(EngineError::TypeMismatch(format!(
            "{} clause must be a boolean condition, found TEXT",
            clause
        ))),
        _ => Ok(()),
    }
}

/// An assignment whose type can never fit the column fails before any row
/// is read. INTEGER widens into REAL.
fn check_assignable(column: &ColumnDef, value_type: Option<ColumnType>) -> Result<()> {
    match value_type {
        None => Ok(()),
        Some(t) if t == column.col_type => Ok(()),
        Some(ColumnType::Integer) if column.col_type == ColumnType::Real => Ok(()),
        Some(t) => Err(EngineError::TypeMismatch(format!(
            "column '{}' expects {}, got {}",
            column.name,
            column.col_type.name(),
            t.name()
        ))),
    }
}

/// Names of the indexes that back PRIMARY KEY and UNIQUE columns.
fn constraint_indexes(def: &TableDef) -> Vec<String> {
    def.columns
        .iter()
        .filter_map(|c| {
            if c.primary_key {
                Some(format!("{}_pkey", def.name))
            } else if c.unique {
                Some(format!("{}_{}_key", def.name, c.name))
            } else {
                None
            }
        })
        .collect()
}

/// Remove duplicate rows, keeping the first occurrence.
fn apply_distinct(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    for row in rows {
        let key: Vec<IndexValue> = row.iter().cloned().map(IndexValue).collect();
        if seen.insert(key) {
            result.push(row);
        }
    }
    result
}

fn window(rows: Vec<Vec<Value>>, offset: Option<usize>, limit: Option<usize>) -> Vec<Vec<Value>> {
    rows.into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
