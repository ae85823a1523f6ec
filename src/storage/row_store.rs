//! Row Store - authoritative rows of one table plus their derived indexes
//!
//! Rows are keyed by a per-table id sequence and iterate in id order. The
//! indexes are always derivable from the rows: when maintenance finds an
//! index out of step, the store rebuilds every index from the rows before
//! serving anything else.

use crate::error::{EngineError, Result};
use crate::index::{ColumnValueIndex, IndexKey, IndexPredicate};
use crate::sql::ast::{BinaryOperator, Expr, OrderByExpr};
use crate::sql::evaluator::ExprEvaluator;
use crate::types::{Fields, IndexDef, Row, RowId, TableDef, Timestamp, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// How a predicate scan visits rows
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPlan {
    Full,
    Index {
        name: String,
        predicate: IndexPredicate,
    },
}

#[derive(Debug, Clone)]
pub struct RowStore {
    table_name: String,
    rows: BTreeMap<RowId, Row>,
    indexes: Vec<ColumnValueIndex>,
    next_id: RowId,
    needs_rebuild: bool,
}

impl RowStore {
    /// Empty store with one index per `IndexDef` of the table.
    pub fn new(def: &TableDef) -> Self {
        Self {
            table_name: def.name.clone(),
            rows: BTreeMap::new(),
            indexes: def.indexes.iter().cloned().map(ColumnValueIndex::new).collect(),
            next_id: 1,
            needs_rebuild: false,
        }
    }

    /// Store hydrated from persisted rows; indexes are built from them.
    pub fn from_rows(def: &TableDef, rows: Vec<Row>) -> Result<Self> {
        let mut store = Self::new(def);
        for row in rows {
            store.next_id = store.next_id.max(row.id + 1);
            store.rows.insert(row.id, row);
        }
        store.rebuild_indexes()?;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// All rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn index(&self, name: &str) -> Option<&ColumnValueIndex> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Rebuild every index from the rows.
    pub fn rebuild_indexes(&mut self) -> Result<()> {
        for index in &mut self.indexes {
            index.clear();
            for row in self.rows.values() {
                let key = index.key_for(&row.fields);
                index.insert(key, row.id)?;
            }
        }
        self.needs_rebuild = false;
        Ok(())
    }

    /// Rebuild first if an earlier operation left the indexes out of step.
    pub fn ensure_indexes(&mut self) -> Result<()> {
        if self.needs_rebuild {
            tracing::warn!(table = %self.table_name, "rebuilding indexes from rows");
            self.rebuild_indexes()?;
        }
        Ok(())
    }

    /// Build a new index from the current rows. Nothing is added when the
    /// rows violate a unique index.
    pub fn add_index(&mut self, def: IndexDef) -> Result<()> {
        self.ensure_indexes()?;
        let mut index = ColumnValueIndex::new(def);
        for row in self.rows.values() {
            let key = index.key_for(&row.fields);
            index.insert(key, row.id)?;
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name() != name);
        self.indexes.len() != before
    }

    // ----- Scans -----

    /// Ids of the rows matching `predicate`, ascending. Uses an index when
    /// one applies; the result is identical to a full scan.
    pub fn matching_ids(
        &mut self,
        predicate: Option<&Expr>,
        evaluator: &ExprEvaluator,
    ) -> Result<Vec<RowId>> {
        self.ensure_indexes()?;
        let plan = self.plan(predicate);
        self.scan_with_plan(predicate, &plan, evaluator)
    }

    pub fn scan_with_plan(
        &mut self,
        predicate: Option<&Expr>,
        plan: &ScanPlan,
        evaluator: &ExprEvaluator,
    ) -> Result<Vec<RowId>> {
        let candidates: Vec<RowId> = match plan {
            ScanPlan::Full => self.rows.keys().copied().collect(),
            ScanPlan::Index { name, predicate } => {
                let ids = match self.index(name) {
                    Some(index) => index.query(predicate),
                    None => self.rows.keys().copied().collect(),
                };
                if let Some(missing) = ids.iter().find(|id| !self.rows.contains_key(id)) {
                    let detail = format!("index '{}' points at missing row {}", name, missing);
                    return Err(self.drifted(detail));
                }
                ids
            }
        };

        let mut matched = Vec::with_capacity(candidates.len());
        for id in candidates {
            let row = match self.rows.get(&id) {
                Some(row) => row,
                None => continue,
            };
            let keep = match predicate {
                Some(expr) => evaluator.matches(expr, &row.fields)?,
                None => true,
            };
            if keep {
                matched.push(id);
            }
        }
        Ok(matched)
    }

    /// Matching rows, ordered by `order_by` (ties in id order), then
    /// windowed by `offset` and `limit`.
    pub fn scan(
        &mut self,
        predicate: Option<&Expr>,
        order_by: &[OrderByExpr],
        offset: usize,
        limit: Option<usize>,
        evaluator: &ExprEvaluator,
    ) -> Result<Vec<&Row>> {
        let ids = self.matching_ids(predicate, evaluator)?;
        let mut rows: Vec<&Row> = ids.iter().filter_map(|id| self.rows.get(id)).collect();

        if !order_by.is_empty() {
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let key = order_by
                    .iter()
                    .map(|o| evaluator.eval(&o.expr, &row.fields))
                    .collect::<Result<Vec<Value>>>()?;
                keyed.push((key, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, order_by));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Delete every row matching `predicate`.
    pub fn delete_where(
        &mut self,
        predicate: Option<&Expr>,
        evaluator: &ExprEvaluator,
    ) -> Result<Vec<Row>> {
        let ids = self.matching_ids(predicate, evaluator)?;
        self.delete_many(&ids)
    }

    /// Pick an index for the predicate's top-level AND conjuncts. A point
    /// lookup beats a range; ties go to the first declared index.
    pub fn plan(&self, predicate: Option<&Expr>) -> ScanPlan {
        let expr = match predicate {
            Some(expr) => expr,
            None => return ScanPlan::Full,
        };

        let mut conjuncts = Vec::new();
        collect_conjuncts(expr, &mut conjuncts);
        let usable: Vec<(&str, IndexPredicate)> =
            conjuncts.into_iter().filter_map(index_predicate).collect();

        let mut best: Option<(&ColumnValueIndex, IndexPredicate)> = None;
        for index in &self.indexes {
            let leading = match index.def().leading_column() {
                Some(col) => col,
                None => continue,
            };
            let on_column: Vec<&IndexPredicate> = usable
                .iter()
                .filter(|(col, _)| *col == leading)
                .map(|(_, p)| p)
                .collect();

            let point = on_column.iter().find(|p| p.is_point()).map(|p| (*p).clone());
            let candidate =
                point.or_else(|| on_column.into_iter().cloned().reduce(intersect_ranges));

            if let Some(candidate) = candidate {
                let better = match &best {
                    None => true,
                    Some((_, current)) => !current.is_point() && candidate.is_point(),
                };
                if better {
                    best = Some((index, candidate));
                }
            }
        }

        match best {
            Some((index, predicate)) => ScanPlan::Index {
                name: index.name().to_string(),
                predicate,
            },
            None => ScanPlan::Full,
        }
    }

    // ----- Mutations -----

    /// Insert new rows. Uniqueness is checked for the whole batch (against
    /// stored rows and within the batch) before anything is written.
    pub fn insert_many(&mut self, images: Vec<Fields>) -> Result<Vec<Row>> {
        self.ensure_indexes()?;
        let batch: Vec<(Option<RowId>, &Fields)> = images.iter().map(|f| (None, f)).collect();
        self.check_unique(&batch)?;

        let mut inserted = Vec::with_capacity(images.len());
        for fields in images {
            let id = self.next_id;
            self.next_id += 1;
            let row = Row::new(id, self.table_name.clone(), fields);
            for index in &mut self.indexes {
                let key = index.key_for(&row.fields);
                if let Err(e) = index.insert(key, id) {
                    tracing::warn!(table = %self.table_name, error = %e, "index insert failed");
                    self.needs_rebuild = true;
                }
            }
            inserted.push(row.clone());
            self.rows.insert(id, row);
        }
        Ok(inserted)
    }

    /// Replace the fields of existing rows. All new images are validated
    /// before any row or index changes.
    pub fn update_many(&mut self, changes: Vec<(RowId, Fields)>) -> Result<Vec<Row>> {
        self.ensure_indexes()?;
        let ids: Vec<RowId> = changes.iter().map(|(id, _)| *id).collect();
        self.verify_entries(&ids)?;
        let batch: Vec<(Option<RowId>, &Fields)> =
            changes.iter().map(|(id, f)| (Some(*id), f)).collect();
        self.check_unique(&batch)?;

        // Old keys go first so rows may trade unique values.
        let mut failed = false;
        for (id, fields) in &changes {
            if let Some(row) = self.rows.get(id) {
                for index in &mut self.indexes {
                    let old = index.key_for(&row.fields);
                    if old != index.key_for(fields) {
                        failed |= index.delete(&old, *id).is_err();
                    }
                }
            }
        }

        let now = Timestamp::now();
        let mut updated = Vec::with_capacity(changes.len());
        for (id, fields) in changes {
            let row = match self.rows.get_mut(&id) {
                Some(row) => row,
                None => continue,
            };
            for index in &mut self.indexes {
                let old = index.key_for(&row.fields);
                let new = index.key_for(&fields);
                if old != new {
                    failed |= index.insert(new, id).is_err();
                }
            }
            row.fields = fields;
            row.updated_at = now;
            updated.push(row.clone());
        }

        if failed {
            tracing::warn!(table = %self.table_name, "index maintenance failed during update");
            self.needs_rebuild = true;
        }
        Ok(updated)
    }

    /// Remove rows by id, returning the removed rows.
    pub fn delete_many(&mut self, ids: &[RowId]) -> Result<Vec<Row>> {
        self.ensure_indexes()?;
        self.verify_entries(ids)?;

        let mut failed = false;
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let row = match self.rows.remove(id) {
                Some(row) => row,
                None => continue,
            };
            for index in &mut self.indexes {
                let key = index.key_for(&row.fields);
                failed |= index.delete(&key, row.id).is_err();
            }
            removed.push(row);
        }

        if failed {
            tracing::warn!(table = %self.table_name, "index maintenance failed during delete");
            self.needs_rebuild = true;
        }
        Ok(removed)
    }

    /// Every row must exist and be present in every index before it is
    /// changed. Otherwise the indexes are rebuilt and the change is refused.
    fn verify_entries(&mut self, ids: &[RowId]) -> Result<()> {
        for id in ids {
            let row = match self.rows.get(id) {
                Some(row) => row,
                None => return Err(self.drifted(format!("row {} does not exist", id))),
            };
            let missing = self
                .indexes
                .iter()
                .find(|index| !index.contains(&index.key_for(&row.fields), *id))
                .map(|index| index.name().to_string());
            if let Some(name) = missing {
                return Err(self.drifted(format!("index '{}' has no entry for row {}", name, id)));
            }
        }
        Ok(())
    }

    /// Record index drift: rebuild now and report the inconsistency.
    fn drifted(&mut self, detail: String) -> EngineError {
        tracing::warn!(table = %self.table_name, %detail, "index drift detected");
        self.needs_rebuild = true;
        if let Err(e) = self.ensure_indexes() {
            tracing::warn!(table = %self.table_name, error = %e, "index rebuild failed");
        }
        EngineError::IndexConsistency {
            table: self.table_name.clone(),
            detail,
        }
    }

    fn check_unique(&self, batch: &[(Option<RowId>, &Fields)]) -> Result<()> {
        let changing: BTreeSet<RowId> = batch.iter().filter_map(|(id, _)| *id).collect();

        for index in self.indexes.iter().filter(|i| i.is_unique()) {
            let mut seen: BTreeSet<IndexKey> = BTreeSet::new();
            for (_, fields) in batch {
                let key = index.key_for(fields);
                if key.iter().any(|v| v.0.is_null()) {
                    continue;
                }
                let stored_clash = index
                    .rows_for_key(&key)
                    .is_some_and(|ids| ids.iter().any(|id| !changing.contains(id)));
                if stored_clash || seen.contains(&key) {
                    let shown: Vec<String> = key.iter().map(|v| v.0.to_string()).collect();
                    return Err(EngineError::ConstraintViolation(format!(
                        "duplicate key ({}) violates unique index '{}' on table '{}'",
                        shown.join(", "),
                        index.name(),
                        self.table_name
                    )));
                }
                seen.insert(key);
            }
        }
        Ok(())
    }

    /// Test hook: corrupt an index so drift handling can be exercised.
    #[cfg(test)]
    pub(crate) fn index_mut(&mut self, name: &str) -> Option<&mut ColumnValueIndex> {
        self.indexes.iter_mut().find(|i| i.name() == name)
    }
}

/// ORDER BY comparison: NULLs first ascending, last descending.
fn compare_sort_keys(a: &[Value], b: &[Value], order_by: &[OrderByExpr]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(order_by) {
        let ord = x.total_cmp(y);
        let ord = if order.asc { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// `col op literal`, `literal op col`, `col BETWEEN a AND b` or
/// `col IN (literals)` as an index lookup on `col`.
fn index_predicate(expr: &Expr) -> Option<(&str, IndexPredicate)> {
    match expr {
        Expr::BinaryOp { left, op, right } if op.is_comparison() => {
            let (column, op, value) = match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), Expr::Literal(v)) => (c, *op, v),
                (Expr::Literal(v), Expr::Column(c)) => (c, op.flipped(), v),
                _ => return None,
            };
            if value.is_null() {
                return None;
            }
            let v = value.clone();
            let predicate = match op {
                BinaryOperator::Eq => IndexPredicate::Eq(v),
                BinaryOperator::Lt => range(Bound::Unbounded, Bound::Excluded(v)),
                BinaryOperator::Le => range(Bound::Unbounded, Bound::Included(v)),
                BinaryOperator::Gt => range(Bound::Excluded(v), Bound::Unbounded),
                BinaryOperator::Ge => range(Bound::Included(v), Bound::Unbounded),
                _ => return None,
            };
            Some((column.as_str(), predicate))
        }
        Expr::Between {
            expr,
            low,
            high,
            negated: false,
        } => match (expr.as_ref(), low.as_ref(), high.as_ref()) {
            (Expr::Column(c), Expr::Literal(lo), Expr::Literal(hi))
                if !lo.is_null() && !hi.is_null() =>
            {
                Some((
                    c.as_str(),
                    range(Bound::Included(lo.clone()), Bound::Included(hi.clone())),
                ))
            }
            _ => None,
        },
        Expr::In {
            expr,
            list,
            negated: false,
        } => {
            let column = match expr.as_ref() {
                Expr::Column(c) => c,
                _ => return None,
            };
            let mut values = Vec::with_capacity(list.len());
            for item in list {
                match item {
                    Expr::Literal(Value::Null) => {}
                    Expr::Literal(v) => values.push(v.clone()),
                    _ => return None,
                }
            }
            Some((column.as_str(), IndexPredicate::In(values)))
        }
        _ => None,
    }
}

fn range(lower: Bound<Value>, upper: Bound<Value>) -> IndexPredicate {
    IndexPredicate::Range { lower, upper }
}

/// Narrow two ranges on the same column to their intersection.
fn intersect_ranges(a: IndexPredicate, b: IndexPredicate) -> IndexPredicate {
    match (a, b) {
        (
            IndexPredicate::Range {
                lower: la,
                upper: ua,
            },
            IndexPredicate::Range {
                lower: lb,
                upper: ub,
            },
        ) => range(
            tighter(la, lb, Ordering::Greater),
            tighter(ua, ub, Ordering::Less),
        ),
        (a, _) => a,
    }
}

/// The more restrictive bound: `prefer` is the ordering of the stricter
/// value (Greater for lower bounds, Less for upper bounds).
fn tighter(a: Bound<Value>, b: Bound<Value>, prefer: Ordering) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (a, b) => {
            let order = match (bound_value(&a), bound_value(&b)) {
                (Some(x), Some(y)) => x.total_cmp(y),
                _ => Ordering::Equal,
            };
            match order {
                Ordering::Equal if matches!(a, Bound::Excluded(_)) => a,
                Ordering::Equal => b,
                o if o == prefer => a,
                _ => b,
            }
        }
    }
}

fn bound_value(bound: &Bound<Value>) -> Option<&Value> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::Statement;
    use crate::sql::parser::parse_statement;
    use crate::types::{ColumnDef, ColumnType};

    fn users() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("age", ColumnType::Integer),
            ],
        )
        .unwrap()
    }

    fn fields(id: i64, name: &str, age: Option<i64>) -> Fields {
        let mut f = Fields::new();
        f.insert("id".into(), Value::Integer(id));
        f.insert("name".into(), Value::Text(name.into()));
        f.insert("age".into(), age.map(Value::Integer).unwrap_or(Value::Null));
        f
    }

    fn populated() -> RowStore {
        let def = users();
        let mut store = RowStore::new(&def);
        store
            .add_index(IndexDef::new("idx_age", "users", vec!["age".into()], false))
            .unwrap();
        store
            .insert_many(vec![
                fields(1, "Alice", Some(30)),
                fields(2, "Bob", Some(25)),
                fields(3, "Carol", None),
                fields(4, "Dave", Some(30)),
                fields(5, "Eve", Some(41)),
            ])
            .unwrap();
        store
    }

    fn predicate(where_sql: &str) -> Expr {
        match parse_statement(&format!("SELECT * FROM users WHERE {}", where_sql)).unwrap() {
            Statement::Select(s) => s.where_clause.unwrap(),
            _ => panic!("Expected SELECT"),
        }
    }

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let mut store = populated();
        let ids: Vec<RowId> = store.rows().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        store.delete_many(&[2]).unwrap();
        let new = store.insert_many(vec![fields(6, "Frank", None)]).unwrap();
        assert_eq!(new[0].id, 6);
    }

    #[test]
    fn test_plan_prefers_point_lookup() {
        let store = populated();
        let plan = store.plan(Some(&predicate("age > 20 AND id = 3")));
        assert_eq!(
            plan,
            ScanPlan::Index {
                name: "users_pkey".into(),
                predicate: IndexPredicate::Eq(Value::Integer(3)),
            }
        );

        let plan = store.plan(Some(&predicate("age > 20 AND age <= 30")));
        assert_eq!(
            plan,
            ScanPlan::Index {
                name: "idx_age".into(),
                predicate: range(
                    Bound::Excluded(Value::Integer(20)),
                    Bound::Included(Value::Integer(30))
                ),
            }
        );

        assert_eq!(store.plan(Some(&predicate("age > 20 OR id = 3"))), ScanPlan::Full);
        assert_eq!(store.plan(Some(&predicate("name = 'Bob'"))), ScanPlan::Full);
        assert_eq!(store.plan(None), ScanPlan::Full);
    }

    #[test]
    fn test_index_scan_matches_full_scan() {
        let evaluator = ExprEvaluator::default();
        let mut store = populated();
        for sql in [
            "id = 3",
            "3 = id",
            "age = 30",
            "age >= 30",
            "30 > age",
            "age BETWEEN 25 AND 30",
            "age IN (25, 41, NULL)",
            "age > 20 AND age < 41 AND name LIKE '%a%'",
            "id IN (1, 2) AND age IS NOT NULL",
            "age < 100",
            "age = 99",
        ] {
            let expr = predicate(sql);
            let chosen = store.matching_ids(Some(&expr), &evaluator).unwrap();
            let full = store
                .scan_with_plan(Some(&expr), &ScanPlan::Full, &evaluator)
                .unwrap();
            assert_eq!(chosen, full, "index and full scan differ for {}", sql);
        }
    }

    #[test]
    fn test_unique_checked_within_batch_and_against_rows() {
        let mut store = populated();
        let err = store
            .insert_many(vec![fields(9, "X", None), fields(9, "Y", None)])
            .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
        assert_eq!(store.len(), 5);

        let err = store.insert_many(vec![fields(1, "Again", None)]).unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_update_can_swap_unique_values() {
        let mut store = populated();
        store
            .update_many(vec![(1, fields(2, "Alice", Some(30))), (2, fields(1, "Bob", Some(25)))])
            .unwrap();
        assert_eq!(store.get(1).unwrap().get("id"), &Value::Integer(2));
        assert_eq!(store.index("users_pkey").unwrap().get(&Value::Integer(1)), vec![2]);

        let err = store
            .update_many(vec![(3, fields(1, "Carol", None))])
            .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
        assert_eq!(store.get(3).unwrap().get("id"), &Value::Integer(3));
    }

    #[test]
    fn test_add_unique_index_over_duplicates_fails() {
        let mut store = populated();
        let err = store
            .add_index(IndexDef::new("uniq_age", "users", vec!["age".into()], true))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
        assert!(store.index("uniq_age").is_none());
    }

    #[test]
    fn test_drift_is_reported_and_rebuilt() {
        let mut store = populated();
        let key = {
            let idx = store.index("idx_age").unwrap();
            idx.key_for(&store.get(2).unwrap().fields)
        };
        store.index_mut("idx_age").unwrap().delete(&key, 2).unwrap();

        let err = store.delete_many(&[2]).unwrap_err();
        assert!(matches!(err, EngineError::IndexConsistency { .. }));
        assert!(!store.needs_rebuild());
        assert_eq!(store.len(), 5);
        assert_eq!(store.index("idx_age").unwrap().get(&Value::Integer(25)), vec![2]);

        // the retried delete now succeeds against the rebuilt index
        assert_eq!(store.delete_many(&[2]).unwrap().len(), 1);
    }

    #[test]
    fn test_from_rows_continues_sequence() {
        let def = users();
        let rows = vec![
            Row::new(4, "users", fields(1, "A", None)),
            Row::new(9, "users", fields(2, "B", None)),
        ];
        let mut store = RowStore::from_rows(&def, rows).unwrap();
        assert_eq!(store.index("users_pkey").unwrap().len(), 2);
        let inserted = store.insert_many(vec![fields(3, "C", None)]).unwrap();
        assert_eq!(inserted[0].id, 10);
    }

    #[test]
    fn test_scan_orders_nulls_first_and_windows() {
        let evaluator = ExprEvaluator::default();
        let mut store = populated();
        let order = match parse_statement("SELECT * FROM users ORDER BY age, name DESC").unwrap() {
            Statement::Select(s) => s.order_by,
            _ => panic!("Expected SELECT"),
        };

        let names: Vec<&Value> = store
            .scan(None, &order, 0, None, &evaluator)
            .unwrap()
            .into_iter()
            .map(|r| r.get("name"))
            .collect();
        let expected: Vec<Value> = ["Carol", "Bob", "Dave", "Alice", "Eve"]
            .iter()
            .map(|n| Value::Text(n.to_string()))
            .collect();
        assert_eq!(names, expected.iter().collect::<Vec<_>>());

        let window = store.scan(None, &order, 1, Some(2), &evaluator).unwrap();
        assert_eq!(window.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn test_delete_where_uses_predicate() {
        let evaluator = ExprEvaluator::default();
        let mut store = populated();
        let removed = store
            .delete_where(Some(&predicate("age = 30")), &evaluator)
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 3);
        assert!(store.index("idx_age").unwrap().get(&Value::Integer(30)).is_empty());
    }
}
