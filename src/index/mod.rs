//! Index layer implementation
//!
//! Secondary indexes derived from the row store. Every index is ordered on
//! its column tuple and answers lookups on its leading column.

pub mod column_value;

pub use column_value::{ColumnValueIndex, IndexKey, IndexStats, IndexValue};

use crate::types::Value;
use std::ops::Bound;

/// Lookup an index can answer on its leading column
#[derive(Debug, Clone, PartialEq)]
pub enum IndexPredicate {
    /// col = value
    Eq(Value),

    /// col IN (values)
    In(Vec<Value>),

    /// col between bounds (`<`, `<=`, `>`, `>=`, BETWEEN)
    Range {
        lower: Bound<Value>,
        upper: Bound<Value>,
    },
}

impl IndexPredicate {
    /// Point lookups are preferred over ranges when both are available.
    pub fn is_point(&self) -> bool {
        matches!(self, IndexPredicate::Eq(_) | IndexPredicate::In(_))
    }
}
