//! Catalog: per-scope schema registry

pub mod registry;

pub use registry::{ScopeCatalog, SharedScope, TableEntry, TableRegistry};
