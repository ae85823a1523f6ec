//! sandql - embedded SQL engine for a learn-SQL sandbox
//!
//! Interprets untrusted SQL text against tables partitioned by owner scope
//! (an anonymous session or an authenticated user).
//!
//! ## Architecture
//! - SQL layer: lexer, quote-aware statement splitter, recursive-descent
//!   parser, expression evaluator, executor, highlighter
//! - Catalog: per-scope table registry, one lock per scope
//! - Storage: per-table row store with ordered column-tuple indexes
//! - Persistence: write-through adapter over a pluggable backing store
//!
//! ```
//! use sandql::{Engine, EngineConfig, OwnerScope};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let scope = OwnerScope::session("demo");
//! let batch = engine.execute_batch(&scope, "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1); SELECT * FROM t")?;
//! assert!(batch.all_succeeded());
//! assert_eq!(batch.outcomes[2].rows_returned, Some(1));
//! # Ok::<(), sandql::EngineError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod history;
pub mod index;
pub mod persistence;
pub mod sql;
pub mod storage;
pub mod types;

mod api;
mod error;

pub use api::Session;
pub use config::EngineConfig;
pub use engine::{BatchResult, CancelToken, ClaimSummary, Engine, StatementOutcome};
pub use error::{EngineError, ErrorKind, Result};
pub use history::QueryExecutionRecord;
pub use persistence::{BackingStore, JsonFileStore, MemoryStore, RetryReport, RowRecord, TableRecord};
pub use sql::{highlight, split_statements, tokenize, QueryResult};
pub use types::{ColumnType, OwnerScope, Value};
