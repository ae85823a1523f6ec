//! Stored rows

use super::{Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row identifier, unique and stable within one table
pub type RowId = u64;

/// Column name -> value
pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub table_name: String,
    pub fields: Fields,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Row {
    pub fn new(id: RowId, table_name: impl Into<String>, fields: Fields) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            table_name: table_name.into(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Field value, NULL when the column is absent.
    pub fn get(&self, column: &str) -> &Value {
        self.fields.get(column).unwrap_or(&Value::Null)
    }
}
