/// Table registry for managing table metadata per owner scope
use crate::error::{EngineError, Result};
use crate::storage::RowStore;
use crate::types::{IndexDef, OwnerScope, Row, TableDef, Timestamp};
use ahash::AHashMap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A table's schema, its rows and the identity of its backing record.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub record_id: Uuid,
    pub def: TableDef,
    pub store: RowStore,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TableEntry {
    pub fn new(def: TableDef) -> Self {
        let store = RowStore::new(&def);
        let now = Timestamp::now();
        Self {
            record_id: Uuid::new_v4(),
            def,
            store,
            created_at: now,
            updated_at: now,
        }
    }

    /// Entry rebuilt from persisted schema and rows.
    pub fn hydrate(
        record_id: Uuid,
        def: TableDef,
        rows: Vec<Row>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Result<Self> {
        let store = RowStore::from_rows(&def, rows)?;
        Ok(Self {
            record_id,
            def,
            store,
            created_at,
            updated_at,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// The catalog of one owner scope: table name -> entry.
#[derive(Debug)]
pub struct ScopeCatalog {
    scope: OwnerScope,
    tables: BTreeMap<String, TableEntry>,
    /// Index name -> table name; index names are unique within a scope
    index_map: AHashMap<String, String>,
}

impl ScopeCatalog {
    pub fn new(scope: OwnerScope) -> Self {
        Self {
            scope,
            tables: BTreeMap::new(),
            index_map: AHashMap::new(),
        }
    }

    pub fn scope(&self) -> &OwnerScope {
        &self.scope
    }

    /// Register a table. Fails if the table name or any of its index names
    /// is taken in this scope.
    pub fn define_table(&mut self, def: TableDef) -> Result<&mut TableEntry> {
        self.insert_entry(TableEntry::new(def))
    }

    /// Register an already-built entry (hydration, session claims).
    pub fn insert_entry(&mut self, entry: TableEntry) -> Result<&mut TableEntry> {
        let name = entry.def.name.clone();
        if self.tables.contains_key(&name) {
            return Err(EngineError::AlreadyExists(format!(
                "table '{}' already exists",
                name
            )));
        }
        if let Some(index) = entry
            .def
            .indexes
            .iter()
            .find(|i| self.index_map.contains_key(&i.name))
        {
            return Err(EngineError::AlreadyExists(format!(
                "index '{}' already exists",
                index.name
            )));
        }

        for index in &entry.def.indexes {
            self.index_map.insert(index.name.clone(), name.clone());
        }
        Ok(self.tables.entry(name).or_insert(entry))
    }

    /// Remove a table together with its rows and indexes.
    pub fn drop_table(&mut self, name: &str) -> Result<TableEntry> {
        let entry = self
            .tables
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(format!("table '{}' does not exist", name)))?;
        for index in &entry.def.indexes {
            self.index_map.remove(&index.name);
        }
        Ok(entry)
    }

    pub fn get_table(&self, name: &str) -> Result<&TableEntry> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("table '{}' does not exist", name)))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut TableEntry> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(format!("table '{}' does not exist", name)))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in sorted order.
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.values()
    }

    /// Add an index to an existing table, building it from the table's rows.
    pub fn add_index(&mut self, index: IndexDef) -> Result<()> {
        if self.index_map.contains_key(&index.name) {
            return Err(EngineError::AlreadyExists(format!(
                "index '{}' already exists",
                index.name
            )));
        }
        let entry = self.get_table_mut(&index.table_name)?;
        for column in &index.columns {
            entry.def.column(column)?;
        }

        entry.store.add_index(index.clone())?;
        entry.def.indexes.push(index.clone());
        entry.touch();
        self.index_map.insert(index.name, index.table_name);
        Ok(())
    }

    /// Drop an index, returning the name of the table it belonged to.
    pub fn drop_index(&mut self, name: &str) -> Result<String> {
        let table = self
            .index_map
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("index '{}' does not exist", name)))?;

        let entry = self.get_table_mut(&table)?;
        entry.def.indexes.retain(|i| i.name != name);
        entry.store.drop_index(name);
        entry.touch();
        self.index_map.remove(name);
        Ok(table)
    }

    pub fn get_index(&self, name: &str) -> Result<&IndexDef> {
        self.index_map
            .get(name)
            .and_then(|table| self.tables.get(table))
            .and_then(|entry| entry.def.get_index(name))
            .ok_or_else(|| EngineError::NotFound(format!("index '{}' does not exist", name)))
    }

    /// Take every entry out of this catalog.
    pub fn take_entries(&mut self) -> Vec<TableEntry> {
        self.index_map.clear();
        std::mem::take(&mut self.tables).into_values().collect()
    }
}

pub type SharedScope = Arc<Mutex<ScopeCatalog>>;

/// Registry of all scope catalogs. Each scope is locked independently, so
/// work in one scope never waits on another.
#[derive(Default)]
pub struct TableRegistry {
    scopes: DashMap<OwnerScope, SharedScope>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scope's catalog if it has been loaded.
    pub fn scope(&self, scope: &OwnerScope) -> Option<SharedScope> {
        self.scopes.get(scope).map(|entry| Arc::clone(entry.value()))
    }

    /// The scope's catalog, running `load` to build it on first use.
    pub fn scope_or_load<F>(&self, scope: &OwnerScope, load: F) -> Result<SharedScope>
    where
        F: FnOnce() -> Result<ScopeCatalog>,
    {
        match self.scopes.entry(scope.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let catalog = Arc::new(Mutex::new(load()?));
                entry.insert(Arc::clone(&catalog));
                Ok(catalog)
            }
        }
    }

    pub fn is_loaded(&self, scope: &OwnerScope) -> bool {
        self.scopes.contains_key(scope)
    }

    pub fn loaded_scopes(&self) -> Vec<OwnerScope> {
        self.scopes.iter().map(|entry| entry.key().clone()).collect()
    }
}
