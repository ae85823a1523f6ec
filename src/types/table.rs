/// Table metadata and schema definitions
use super::Value;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Text,
    Real,
    Boolean,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Check a value against this column and apply write-time coercion.
    ///
    /// INTEGER widens into REAL; nothing else converts.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self.col_type, value) {
            (_, Value::Null) => {
                if self.nullable {
                    Ok(Value::Null)
                } else {
                    Err(EngineError::ConstraintViolation(format!(
                        "column '{}' cannot be NULL",
                        self.name
                    )))
                }
            }
            (ColumnType::Integer, v @ Value::Integer(_)) => Ok(v),
            (ColumnType::Real, Value::Real(r)) if !r.is_finite() => Err(EngineError::TypeMismatch(
                format!("column '{}' cannot store non-finite REAL {}", self.name, r),
            )),
            (ColumnType::Real, v @ Value::Real(_)) => Ok(v),
            (ColumnType::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (ColumnType::Text, v @ Value::Text(_)) => Ok(v),
            (ColumnType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (expected, other) => Err(EngineError::TypeMismatch(format!(
                "column '{}' expects {}, got {} ({})",
                self.name,
                expected.name(),
                other.type_name(),
                other
            ))),
        }
    }
}

/// Index definition over an ordered list of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<String>,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns,
            unique,
        }
    }

    pub fn leading_column(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }
}

/// Table schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// Declared order is the default projection order.
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Build a table and its implicit indexes (primary key, UNIQUE columns).
    ///
    /// Fails on duplicate column names or more than one primary key.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(EngineError::ConstraintViolation(format!(
                "table '{}' must have at least one column",
                name
            )));
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(EngineError::AlreadyExists(format!(
                    "column '{}' declared twice in table '{}'",
                    col.name, name
                )));
            }
        }

        let pk: Vec<&ColumnDef> = columns.iter().filter(|c| c.primary_key).collect();
        if pk.len() > 1 {
            return Err(EngineError::ConstraintViolation(format!(
                "table '{}' declares more than one primary key",
                name
            )));
        }

        let mut indexes = Vec::new();
        if let Some(pk) = pk.first() {
            indexes.push(IndexDef::new(
                format!("{}_pkey", name),
                name.clone(),
                vec![pk.name.clone()],
                true,
            ));
        }
        for col in columns.iter().filter(|c| c.unique && !c.primary_key) {
            indexes.push(IndexDef::new(
                format!("{}_{}_key", name, col.name),
                name.clone(),
                vec![col.name.clone()],
                true,
            ));
        }

        Ok(Self {
            name,
            columns,
            indexes,
        })
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.get_column(name).ok_or_else(|| {
            EngineError::UnknownReference(format!(
                "column '{}' does not exist in table '{}'",
                name, self.name
            ))
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text).not_null(),
                ColumnDef::new("score", ColumnType::Real),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_primary_key_creates_unique_index() {
        let table = users();
        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].name, "users_pkey");
        assert!(table.indexes[0].unique);
        assert_eq!(table.primary_key().unwrap().name, "id");
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = TableDef::new(
            "t",
            vec![
                ColumnDef::new("a", ColumnType::Integer),
                ColumnDef::new("a", ColumnType::Text),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
    }

    #[test]
    fn test_coerce_rules() {
        let table = users();
        let score = table.column("score").unwrap();
        assert_eq!(score.coerce(Value::Integer(3)).unwrap(), Value::Real(3.0));

        let name = table.column("name").unwrap();
        assert!(matches!(
            name.coerce(Value::Null),
            Err(EngineError::ConstraintViolation(_))
        ));
        assert!(matches!(
            name.coerce(Value::Integer(1)),
            Err(EngineError::TypeMismatch(_))
        ));

        let id = table.column("id").unwrap();
        assert!(matches!(
            id.coerce(Value::Real(1.5)),
            Err(EngineError::TypeMismatch(_))
        ));

        for r in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert!(matches!(
                score.coerce(Value::Real(r)),
                Err(EngineError::TypeMismatch(_))
            ));
        }
    }

    #[test]
    fn test_unknown_column() {
        let err = users().column("email").unwrap_err();
        assert!(matches!(err, EngineError::UnknownReference(ref m) if m.contains("email")));
    }
}
