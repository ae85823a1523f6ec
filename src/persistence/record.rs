//! Backing-store record shapes
//!
//! A table record carries its columns and indexes as opaque JSON; a row
//! record carries its fields as opaque JSON and points at its table record.
//! Exactly one of `session_id` / `user_id` is set on every record.

use crate::catalog::TableEntry;
use crate::error::{EngineError, Result};
use crate::types::{ColumnDef, Fields, IndexDef, OwnerScope, Row, RowId, TableDef, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: Uuid,
    pub table_name: String,
    pub columns: serde_json::Value,
    pub indexes: serde_json::Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TableRecord {
    pub fn from_entry(scope: &OwnerScope, entry: &TableEntry) -> Result<Self> {
        Ok(Self {
            id: entry.record_id,
            table_name: entry.def.name.clone(),
            columns: serde_json::to_value(&entry.def.columns)?,
            indexes: serde_json::to_value(&entry.def.indexes)?,
            session_id: scope.session_id().map(str::to_string),
            user_id: scope.user_id().map(str::to_string),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
    }

    pub fn owner_scope(&self) -> Result<OwnerScope> {
        scope_of(&self.session_id, &self.user_id, || {
            format!("table record {} ('{}')", self.id, self.table_name)
        })
    }

    pub fn belongs_to(&self, scope: &OwnerScope) -> bool {
        self.session_id.as_deref() == scope.session_id() && self.user_id.as_deref() == scope.user_id()
    }

    pub fn set_scope(&mut self, scope: &OwnerScope) {
        self.session_id = scope.session_id().map(str::to_string);
        self.user_id = scope.user_id().map(str::to_string);
    }

    pub fn to_table_def(&self) -> Result<TableDef> {
        let columns: Vec<ColumnDef> = serde_json::from_value(self.columns.clone())?;
        let indexes: Vec<IndexDef> = serde_json::from_value(self.indexes.clone())?;
        Ok(TableDef {
            name: self.table_name.clone(),
            columns,
            indexes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: RowId,
    pub table_id: Uuid,
    pub data: serde_json::Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RowRecord {
    pub fn from_row(scope: &OwnerScope, table_id: Uuid, row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.id,
            table_id,
            data: serde_json::to_value(&row.fields)?,
            session_id: scope.session_id().map(str::to_string),
            user_id: scope.user_id().map(str::to_string),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub fn set_scope(&mut self, scope: &OwnerScope) {
        self.session_id = scope.session_id().map(str::to_string);
        self.user_id = scope.user_id().map(str::to_string);
    }

    pub fn belongs_to(&self, scope: &OwnerScope) -> bool {
        self.session_id.as_deref() == scope.session_id() && self.user_id.as_deref() == scope.user_id()
    }

    pub fn into_row(self, table_name: &str) -> Result<Row> {
        let fields: Fields = serde_json::from_value(self.data)?;
        Ok(Row {
            id: self.id,
            table_name: table_name.to_string(),
            fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn scope_of(
    session_id: &Option<String>,
    user_id: &Option<String>,
    describe: impl FnOnce() -> String,
) -> Result<OwnerScope> {
    match (session_id, user_id) {
        (Some(session), None) => Ok(OwnerScope::session(session.clone())),
        (None, Some(user)) => Ok(OwnerScope::user(user.clone())),
        _ => Err(EngineError::Persistence(format!(
            "{} must have exactly one of session_id or user_id",
            describe()
        ))),
    }
}
