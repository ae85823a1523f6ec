//! Persistence adapter
//!
//! Translates catalog and row store changes into backing store records and
//! loads a scope's catalog back on first use. Writes that the store rejects
//! stay queued, in order, until `retry_pending` gets them through; later
//! writes queue behind them so a retry can never overwrite newer state.

pub mod record;
pub mod store;

pub use record::{RowRecord, TableRecord};
pub use store::{BackingStore, JsonFileStore, MemoryStore};

use crate::catalog::{ScopeCatalog, TableEntry};
use crate::error::{EngineError, Result};
use crate::types::{OwnerScope, Row, RowId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// One durable effect of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    UpsertTable(TableRecord),
    DeleteTable(Uuid),
    UpsertRows(Vec<RowRecord>),
    DeleteRows { table_id: Uuid, ids: Vec<RowId> },
    Reassign { from: OwnerScope, to: OwnerScope },
}

impl PendingWrite {
    /// Write carrying a table's current schema.
    pub fn table(scope: &OwnerScope, entry: &TableEntry) -> Result<Self> {
        Ok(PendingWrite::UpsertTable(TableRecord::from_entry(scope, entry)?))
    }

    pub fn rows(scope: &OwnerScope, table_id: Uuid, rows: &[Row]) -> Result<Self> {
        let records = rows
            .iter()
            .map(|row| RowRecord::from_row(scope, table_id, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(PendingWrite::UpsertRows(records))
    }

    pub fn delete_rows(table_id: Uuid, rows: &[Row]) -> Self {
        PendingWrite::DeleteRows {
            table_id,
            ids: rows.iter().map(|r| r.id).collect(),
        }
    }

    fn apply(&self, store: &dyn BackingStore) -> Result<()> {
        match self {
            PendingWrite::UpsertTable(record) => store.upsert_table(record),
            PendingWrite::DeleteTable(id) => store.delete_table(*id),
            PendingWrite::UpsertRows(rows) => store.upsert_rows(rows),
            PendingWrite::DeleteRows { table_id, ids } => store.delete_rows(*table_id, ids),
            PendingWrite::Reassign { from, to } => store.reassign_scope(from, to).map(|_| ()),
        }
    }

    fn describe(&self) -> String {
        match self {
            PendingWrite::UpsertTable(record) => format!("upsert table '{}'", record.table_name),
            PendingWrite::DeleteTable(id) => format!("delete table record {}", id),
            PendingWrite::UpsertRows(rows) => format!("upsert {} row(s)", rows.len()),
            PendingWrite::DeleteRows { ids, .. } => format!("delete {} row(s)", ids.len()),
            PendingWrite::Reassign { from, to } => format!("reassign {} to {}", from, to),
        }
    }
}

/// Outcome of `PersistenceAdapter::retry_pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub applied: usize,
    pub remaining: usize,
}

pub struct PersistenceAdapter {
    store: Arc<dyn BackingStore>,
    pending: Mutex<VecDeque<PendingWrite>>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Apply a statement's writes in order.
    ///
    /// Returns the failure message when any write did not reach the store;
    /// that write and every later one are queued for `retry_pending`.
    pub fn submit(&self, writes: Vec<PendingWrite>) -> Option<String> {
        if writes.is_empty() {
            return None;
        }

        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            Self::drain(self.store.as_ref(), &mut pending);
        }
        if !pending.is_empty() {
            let blocked = pending.len();
            pending.extend(writes);
            return Some(format!(
                "{} earlier write(s) still pending; change queued for retry",
                blocked
            ));
        }

        let mut writes = writes.into_iter();
        while let Some(write) = writes.next() {
            if let Err(err) = write.apply(self.store.as_ref()) {
                tracing::warn!(
                    write = %write.describe(),
                    error = %err,
                    "backing store write failed, queued for retry"
                );
                pending.push_back(write);
                pending.extend(writes);
                return Some(err.to_string());
            }
        }
        None
    }

    /// Push queued writes to the store in order, stopping at the first
    /// failure.
    pub fn retry_pending(&self) -> RetryReport {
        let mut pending = self.pending.lock();
        let applied = Self::drain(self.store.as_ref(), &mut pending);
        RetryReport {
            applied,
            remaining: pending.len(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn drain(store: &dyn BackingStore, pending: &mut VecDeque<PendingWrite>) -> usize {
        let mut applied = 0;
        while let Some(write) = pending.front() {
            match write.apply(store) {
                Ok(()) => {
                    pending.pop_front();
                    applied += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        write = %write.describe(),
                        error = %err,
                        remaining = pending.len(),
                        "retry of pending write failed"
                    );
                    break;
                }
            }
        }
        applied
    }

    /// Build a scope's catalog from the backing store.
    pub fn load_scope(&self, scope: &OwnerScope) -> Result<ScopeCatalog> {
        let mut catalog = ScopeCatalog::new(scope.clone());
        let tables = self.store.load_tables(scope)?;
        let mut row_count = 0;

        for record in tables {
            let def = record.to_table_def()?;
            let rows = self
                .store
                .load_rows(record.id)?
                .into_iter()
                .map(|r| r.into_row(&record.table_name))
                .collect::<Result<Vec<_>>>()?;
            row_count += rows.len();

            let entry =
                TableEntry::hydrate(record.id, def, rows, record.created_at, record.updated_at)?;
            catalog.insert_entry(entry).map_err(|e| {
                EngineError::Persistence(format!(
                    "stored catalog for {} is inconsistent: {}",
                    scope, e
                ))
            })?;
        }

        tracing::info!(
            scope = %scope,
            tables = catalog.list_tables().len(),
            rows = row_count,
            "hydrated scope from backing store"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, ColumnType, Fields, TableDef, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(EngineError::Persistence("store unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    impl BackingStore for FlakyStore {
        fn upsert_table(&self, record: &TableRecord) -> Result<()> {
            self.check()?;
            self.inner.upsert_table(record)
        }
        fn delete_table(&self, table_id: Uuid) -> Result<()> {
            self.check()?;
            self.inner.delete_table(table_id)
        }
        fn upsert_rows(&self, rows: &[RowRecord]) -> Result<()> {
            self.check()?;
            self.inner.upsert_rows(rows)
        }
        fn delete_rows(&self, table_id: Uuid, ids: &[RowId]) -> Result<()> {
            self.check()?;
            self.inner.delete_rows(table_id, ids)
        }
        fn load_tables(&self, scope: &OwnerScope) -> Result<Vec<TableRecord>> {
            self.inner.load_tables(scope)
        }
        fn load_rows(&self, table_id: Uuid) -> Result<Vec<RowRecord>> {
            self.inner.load_rows(table_id)
        }
        fn reassign_scope(&self, from: &OwnerScope, to: &OwnerScope) -> Result<usize> {
            self.check()?;
            self.inner.reassign_scope(from, to)
        }
    }

    fn entry_with_rows() -> TableEntry {
        let def = TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
        .unwrap();
        let mut entry = TableEntry::new(def);
        let rows = (1..=3)
            .map(|i| {
                let mut fields = Fields::new();
                fields.insert("id".into(), Value::Integer(i));
                fields.insert("name".into(), Value::Text(format!("user{}", i)));
                fields
            })
            .collect();
        entry.store.insert_many(rows).unwrap();
        entry
    }

    fn writes_for(scope: &OwnerScope, entry: &TableEntry) -> Vec<PendingWrite> {
        let rows: Vec<Row> = entry.store.rows().cloned().collect();
        vec![
            PendingWrite::table(scope, entry).unwrap(),
            PendingWrite::rows(scope, entry.record_id, &rows).unwrap(),
        ]
    }

    #[test]
    fn test_load_scope_rebuilds_catalog() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(store);
        let scope = OwnerScope::session("s1");
        let entry = entry_with_rows();

        assert_eq!(adapter.submit(writes_for(&scope, &entry)), None);

        let catalog = adapter.load_scope(&scope).unwrap();
        let loaded = catalog.get_table("users").unwrap();
        assert_eq!(loaded.record_id, entry.record_id);
        assert_eq!(loaded.def, entry.def);
        assert_eq!(loaded.store.len(), 3);
        assert_eq!(
            loaded.store.index("users_pkey").unwrap().len(),
            3,
            "indexes are rebuilt from hydrated rows"
        );

        let other = adapter.load_scope(&OwnerScope::session("s2")).unwrap();
        assert!(other.list_tables().is_empty());
    }

    #[test]
    fn test_failed_writes_queue_in_order() {
        let store = Arc::new(FlakyStore::default());
        let adapter = PersistenceAdapter::new(store.clone());
        let scope = OwnerScope::session("s1");
        let entry = entry_with_rows();

        store.down.store(true, Ordering::SeqCst);
        let err = adapter.submit(writes_for(&scope, &entry));
        assert!(err.unwrap().contains("store unavailable"));
        assert_eq!(adapter.pending_count(), 2);

        let delete = PendingWrite::DeleteRows {
            table_id: entry.record_id,
            ids: vec![1],
        };
        assert!(adapter.submit(vec![delete]).is_some());
        assert_eq!(adapter.pending_count(), 3);

        assert_eq!(
            adapter.retry_pending(),
            RetryReport {
                applied: 0,
                remaining: 3
            }
        );

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(
            adapter.retry_pending(),
            RetryReport {
                applied: 3,
                remaining: 0
            }
        );
        let rows = store.load_rows(entry.record_id).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_submit_flushes_queue_first() {
        let store = Arc::new(FlakyStore::default());
        let adapter = PersistenceAdapter::new(store.clone());
        let scope = OwnerScope::user("u1");
        let entry = entry_with_rows();

        store.down.store(true, Ordering::SeqCst);
        adapter.submit(vec![PendingWrite::table(&scope, &entry).unwrap()]);
        store.down.store(false, Ordering::SeqCst);

        assert_eq!(adapter.submit(vec![PendingWrite::DeleteTable(entry.record_id)]), None);
        assert_eq!(adapter.pending_count(), 0);
        assert!(store.load_tables(&scope).unwrap().is_empty());
    }
}
