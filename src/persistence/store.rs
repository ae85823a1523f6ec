//! Backing stores
//!
//! `BackingStore` is the boundary to whatever durably holds table and row
//! records. Two implementations ship with the engine:
//!
//! - `MemoryStore`: records in process memory (default, tests)
//! - `JsonFileStore`: one JSON document under a data directory, rewritten
//!   through a temp file and an atomic rename on every change

use super::record::{RowRecord, TableRecord};
use crate::error::{EngineError, Result};
use crate::types::{OwnerScope, RowId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable home of table and row records, partitioned by owner scope.
///
/// Implementations apply each call as a whole or not at all.
pub trait BackingStore: Send + Sync {
    /// Insert or replace a table record (last write wins).
    fn upsert_table(&self, record: &TableRecord) -> Result<()>;

    /// Delete a table record together with all of its row records.
    fn delete_table(&self, table_id: Uuid) -> Result<()>;

    /// Insert or replace row records.
    fn upsert_rows(&self, rows: &[RowRecord]) -> Result<()>;

    fn delete_rows(&self, table_id: Uuid, ids: &[RowId]) -> Result<()>;

    /// Table records owned by `scope`.
    fn load_tables(&self, scope: &OwnerScope) -> Result<Vec<TableRecord>>;

    /// Row records of one table, in row id order.
    fn load_rows(&self, table_id: Uuid) -> Result<Vec<RowRecord>>;

    /// Re-own every table and row record of `from` to `to`.
    /// Returns the number of table records moved.
    fn reassign_scope(&self, from: &OwnerScope, to: &OwnerScope) -> Result<usize>;
}

/// Record set shared by the bundled stores.
#[derive(Debug, Clone, Default)]
struct StoreState {
    tables: BTreeMap<Uuid, TableRecord>,
    rows: BTreeMap<Uuid, BTreeMap<RowId, RowRecord>>,
}

/// On-disk shape of `StoreState`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    tables: Vec<TableRecord>,
    rows: Vec<RowRecord>,
}

impl StoreState {
    fn upsert_table(&mut self, record: &TableRecord) {
        self.tables.insert(record.id, record.clone());
    }

    fn delete_table(&mut self, table_id: Uuid) {
        self.tables.remove(&table_id);
        self.rows.remove(&table_id);
    }

    fn upsert_rows(&mut self, rows: &[RowRecord]) -> Result<()> {
        if let Some(orphan) = rows.iter().find(|r| !self.tables.contains_key(&r.table_id)) {
            return Err(EngineError::Persistence(format!(
                "row {} references missing table record {}",
                orphan.id, orphan.table_id
            )));
        }
        for row in rows {
            self.rows
                .entry(row.table_id)
                .or_default()
                .insert(row.id, row.clone());
        }
        Ok(())
    }

    fn delete_rows(&mut self, table_id: Uuid, ids: &[RowId]) {
        if let Some(rows) = self.rows.get_mut(&table_id) {
            for id in ids {
                rows.remove(id);
            }
        }
    }

    fn load_tables(&self, scope: &OwnerScope) -> Vec<TableRecord> {
        self.tables
            .values()
            .filter(|t| t.belongs_to(scope))
            .cloned()
            .collect()
    }

    fn load_rows(&self, table_id: Uuid) -> Vec<RowRecord> {
        self.rows
            .get(&table_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn reassign_scope(&mut self, from: &OwnerScope, to: &OwnerScope) -> usize {
        let mut moved = 0;
        for table in self.tables.values_mut().filter(|t| t.belongs_to(from)) {
            table.set_scope(to);
            if let Some(rows) = self.rows.get_mut(&table.id) {
                for row in rows.values_mut() {
                    row.set_scope(to);
                }
            }
            moved += 1;
        }
        moved
    }

    fn to_document(&self) -> StoreDocument {
        StoreDocument {
            tables: self.tables.values().cloned().collect(),
            rows: self
                .rows
                .values()
                .flat_map(|rows| rows.values().cloned())
                .collect(),
        }
    }

    fn from_document(doc: StoreDocument) -> Self {
        let mut state = StoreState::default();
        for table in doc.tables {
            state.tables.insert(table.id, table);
        }
        for row in doc.rows {
            state
                .rows
                .entry(row.table_id)
                .or_default()
                .insert(row.id, row);
        }
        state
    }
}

/// In-process backing store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_count(&self) -> usize {
        self.state.read().tables.len()
    }

    pub fn row_count(&self) -> usize {
        self.state.read().rows.values().map(BTreeMap::len).sum()
    }
}

impl BackingStore for MemoryStore {
    fn upsert_table(&self, record: &TableRecord) -> Result<()> {
        self.state.write().upsert_table(record);
        Ok(())
    }

    fn delete_table(&self, table_id: Uuid) -> Result<()> {
        self.state.write().delete_table(table_id);
        Ok(())
    }

    fn upsert_rows(&self, rows: &[RowRecord]) -> Result<()> {
        self.state.write().upsert_rows(rows)
    }

    fn delete_rows(&self, table_id: Uuid, ids: &[RowId]) -> Result<()> {
        self.state.write().delete_rows(table_id, ids);
        Ok(())
    }

    fn load_tables(&self, scope: &OwnerScope) -> Result<Vec<TableRecord>> {
        Ok(self.state.read().load_tables(scope))
    }

    fn load_rows(&self, table_id: Uuid) -> Result<Vec<RowRecord>> {
        Ok(self.state.read().load_rows(table_id))
    }

    fn reassign_scope(&self, from: &OwnerScope, to: &OwnerScope) -> Result<usize> {
        Ok(self.state.write().reassign_scope(from, to))
    }
}

const DOCUMENT_FILE: &str = "sandql.json";

/// Backing store kept as a single JSON document in `data_dir`.
///
/// Every change is applied to a copy of the state, written to
/// `sandql.json.tmp`, fsynced and renamed over `sandql.json`. The in-memory
/// state only advances once the rename succeeded.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Open (or create) the store in `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let path = data_dir.join(DOCUMENT_FILE);
        let state = if path.exists() {
            let file = File::open(&path)?;
            let doc: StoreDocument = serde_json::from_reader(std::io::BufReader::new(file))
                .map_err(|e| {
                    EngineError::Persistence(format!("corrupt store document {:?}: {}", path, e))
                })?;
            StoreState::from_document(doc)
        } else {
            StoreState::default()
        };

        tracing::debug!(
            path = ?path,
            tables = state.tables.len(),
            "opened json file store"
        );
        Ok(Self {
            data_dir,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENT_FILE)
    }

    fn commit<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        let out = change(&mut next)?;
        self.write_document(&next)?;
        *guard = next;
        Ok(out)
    }

    fn write_document(&self, state: &StoreState) -> Result<()> {
        let temp_path = self.data_dir.join(format!("{}.tmp", DOCUMENT_FILE));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &state.to_document())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        std::fs::rename(&temp_path, self.path())?;
        Ok(())
    }
}

impl BackingStore for JsonFileStore {
    fn upsert_table(&self, record: &TableRecord) -> Result<()> {
        self.commit(|state| {
            state.upsert_table(record);
            Ok(())
        })
    }

    fn delete_table(&self, table_id: Uuid) -> Result<()> {
        self.commit(|state| {
            state.delete_table(table_id);
            Ok(())
        })
    }

    fn upsert_rows(&self, rows: &[RowRecord]) -> Result<()> {
        self.commit(|state| state.upsert_rows(rows))
    }

    fn delete_rows(&self, table_id: Uuid, ids: &[RowId]) -> Result<()> {
        self.commit(|state| {
            state.delete_rows(table_id, ids);
            Ok(())
        })
    }

    fn load_tables(&self, scope: &OwnerScope) -> Result<Vec<TableRecord>> {
        Ok(self.state.read().load_tables(scope))
    }

    fn load_rows(&self, table_id: Uuid) -> Result<Vec<RowRecord>> {
        Ok(self.state.read().load_rows(table_id))
    }

    fn reassign_scope(&self, from: &OwnerScope, to: &OwnerScope) -> Result<usize> {
        self.commit(|state| Ok(state.reassign_scope(from, to)))
    }
}
