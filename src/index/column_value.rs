//! Column Value Index - ordered index over one or more columns
//!
//! Provides fast lookups for WHERE conditions on the index's leading column:
//! - WHERE col = value (point query)
//! - WHERE col IN (a, b) (multi-point query)
//! - WHERE col >= start AND col <= end (range query)
//!
//! Keys are the indexed column values in declared order. Several rows may
//! share a key unless the index is unique; keys containing NULL never
//! conflict with each other.

use super::IndexPredicate;
use crate::error::{EngineError, Result};
use crate::types::{Fields, IndexDef, RowId, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// A `Value` ordered by `Value::total_cmp` so it can key a `BTreeMap`.
#[derive(Debug, Clone)]
pub struct IndexValue(pub Value);

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub type IndexKey = Vec<IndexValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub name: String,
    pub entries: usize,
    pub distinct_keys: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnValueIndex {
    def: IndexDef,
    entries: BTreeMap<IndexKey, BTreeSet<RowId>>,
    len: usize,
}

impl ColumnValueIndex {
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn is_unique(&self) -> bool {
        self.def.unique
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extract this index's key from a row's fields.
    pub fn key_for(&self, fields: &Fields) -> IndexKey {
        self.def
            .columns
            .iter()
            .map(|col| IndexValue(fields.get(col).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// Row already holding `key` under a unique index, other than `row_id`.
    pub fn conflict(&self, key: &[IndexValue], row_id: Option<RowId>) -> Option<RowId> {
        if !self.def.unique || key.iter().any(|v| v.0.is_null()) {
            return None;
        }
        self.entries
            .get(key)
            .and_then(|ids| ids.iter().copied().find(|id| Some(*id) != row_id))
    }

    pub fn rows_for_key(&self, key: &[IndexValue]) -> Option<&BTreeSet<RowId>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &[IndexValue], row_id: RowId) -> bool {
        self.entries.get(key).is_some_and(|ids| ids.contains(&row_id))
    }

    pub fn insert(&mut self, key: IndexKey, row_id: RowId) -> Result<()> {
        if let Some(existing) = self.conflict(&key, Some(row_id)) {
            return Err(EngineError::ConstraintViolation(format!(
                "duplicate key {} violates unique index '{}' (row {})",
                describe_key(&key),
                self.def.name,
                existing
            )));
        }
        if self.entries.entry(key).or_default().insert(row_id) {
            self.len += 1;
        }
        Ok(())
    }

    /// Remove one entry. A missing entry means the index has drifted from
    /// the rows.
    pub fn delete(&mut self, key: &[IndexValue], row_id: RowId) -> Result<()> {
        let removed = match self.entries.get_mut(key) {
            Some(ids) => {
                let removed = ids.remove(&row_id);
                if ids.is_empty() {
                    self.entries.remove(key);
                }
                removed
            }
            None => false,
        };

        if !removed {
            return Err(EngineError::IndexConsistency {
                table: self.def.table_name.clone(),
                detail: format!(
                    "index '{}' has no entry {} for row {}",
                    self.def.name,
                    describe_key(key),
                    row_id
                ),
            });
        }
        self.len -= 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }

    /// Candidate row ids for a predicate on the leading column, ascending.
    /// The set may be wider than the predicate; callers re-filter.
    pub fn query(&self, predicate: &IndexPredicate) -> Vec<RowId> {
        let mut ids: Vec<RowId> = match predicate {
            IndexPredicate::Eq(value) => self.get(value),
            IndexPredicate::In(values) => values.iter().flat_map(|v| self.get(v)).collect(),
            IndexPredicate::Range { lower, upper } => self.range(lower.as_ref(), upper.as_ref()),
        };
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Rows whose leading column equals `value`.
    pub fn get(&self, value: &Value) -> Vec<RowId> {
        if value.is_null() {
            return Vec::new();
        }
        self.range(Bound::Included(value), Bound::Included(value))
    }

    /// Rows whose leading column lies within the bounds. NULL keys are
    /// never returned.
    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> Vec<RowId> {
        let start = match lower {
            Bound::Included(v) | Bound::Excluded(v) => vec![IndexValue(v.clone())],
            // skip past NULL keys, which sort first
            Bound::Unbounded => vec![IndexValue(Value::Boolean(false))],
        };

        let mut ids = Vec::new();
        for (key, rows) in self.entries.range(start..) {
            let leading = match key.first() {
                Some(v) => &v.0,
                None => continue,
            };
            if leading.is_null() {
                continue;
            }
            if let Bound::Excluded(v) = lower {
                if leading.total_cmp(v) == Ordering::Equal {
                    continue;
                }
            }
            let within_upper = match upper {
                Bound::Included(v) => leading.total_cmp(v) != Ordering::Greater,
                Bound::Excluded(v) => leading.total_cmp(v) == Ordering::Less,
                Bound::Unbounded => true,
            };
            if !within_upper {
                break;
            }
            ids.extend(rows.iter().copied());
        }
        ids
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.def.name.clone(),
            entries: self.len,
            distinct_keys: self.entries.len(),
        }
    }
}

fn describe_key(key: &[IndexValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.0.to_string()).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(unique: bool) -> ColumnValueIndex {
        ColumnValueIndex::new(IndexDef::new("idx_age", "users", vec!["age".into()], unique))
    }

    fn key(v: Value) -> IndexKey {
        vec![IndexValue(v)]
    }

    #[test]
    fn test_point_and_range_queries() {
        let mut idx = index(false);
        for (id, age) in [(1, 30), (2, 25), (3, 30), (4, 40)] {
            idx.insert(key(Value::Integer(age)), id).unwrap();
        }
        idx.insert(key(Value::Null), 5).unwrap();

        assert_eq!(idx.get(&Value::Integer(30)), vec![1, 3]);
        assert!(idx.get(&Value::Null).is_empty());

        let ge_30 = idx.range(Bound::Excluded(&Value::Integer(25)), Bound::Unbounded);
        assert_eq!(ge_30, vec![1, 3, 4]);

        let lt_40 = idx.range(Bound::Unbounded, Bound::Excluded(&Value::Integer(40)));
        assert_eq!(lt_40, vec![2, 1, 3]);

        let between = idx.query(&IndexPredicate::Range {
            lower: Bound::Included(Value::Real(25.5)),
            upper: Bound::Included(Value::Integer(40)),
        });
        assert_eq!(between, vec![1, 3, 4]);

        let listed = idx.query(&IndexPredicate::In(vec![Value::Integer(40), Value::Integer(25)]));
        assert_eq!(listed, vec![2, 4]);
        assert_eq!(idx.stats().entries, 5);
        assert_eq!(idx.stats().distinct_keys, 4);
    }

    #[test]
    fn test_unique_conflicts_ignore_nulls() {
        let mut idx = index(true);
        idx.insert(key(Value::Integer(1)), 1).unwrap();
        idx.insert(key(Value::Null), 2).unwrap();
        idx.insert(key(Value::Null), 3).unwrap();

        assert_eq!(idx.conflict(&key(Value::Integer(1)), None), Some(1));
        assert_eq!(idx.conflict(&key(Value::Integer(1)), Some(1)), None);
        assert!(matches!(
            idx.insert(key(Value::Integer(1)), 9),
            Err(EngineError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_delete_missing_entry_is_consistency_error() {
        let mut idx = index(false);
        idx.insert(key(Value::Integer(1)), 1).unwrap();
        idx.delete(&key(Value::Integer(1)), 1).unwrap();
        assert!(idx.is_empty());

        let err = idx.delete(&key(Value::Integer(1)), 1).unwrap_err();
        assert!(matches!(err, EngineError::IndexConsistency { .. }));
    }

    #[test]
    fn test_composite_key_leading_column_lookup() {
        let def = IndexDef::new("idx_ab", "t", vec!["a".into(), "b".into()], false);
        let mut idx = ColumnValueIndex::new(def);
        let mut fields = Fields::new();
        for (id, a, b) in [(1, 1, "x"), (2, 1, "y"), (3, 2, "x")] {
            fields.insert("a".into(), Value::Integer(a));
            fields.insert("b".into(), Value::Text(b.into()));
            idx.insert(idx.key_for(&fields), id).unwrap();
        }
        assert_eq!(idx.get(&Value::Integer(1)), vec![1, 2]);
        assert_eq!(idx.get(&Value::Integer(2)), vec![3]);
    }
}
