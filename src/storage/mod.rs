//! Storage layer implementation
//!
//! In-memory row storage, one `RowStore` per table

pub mod row_store;

pub use row_store::{RowStore, ScanPlan};
