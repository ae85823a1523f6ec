//! Engine facade
//!
//! Splits batch text into statements and runs them one by one against the
//! caller's scope. Each statement's failure stays in its own outcome; the
//! statements before it keep their effects and the ones after it still run.

use crate::catalog::{SharedScope, TableRegistry};
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorKind, Result};
use crate::history::{QueryExecutionRecord, QueryHistory};
use crate::persistence::{
    BackingStore, JsonFileStore, MemoryStore, PendingWrite, PersistenceAdapter, RetryReport,
};
use crate::sql::{parse_statement, split_statements, QueryExecutor, QueryResult, Statement};
use crate::types::{OwnerScope, Timestamp};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Host-side handle for abandoning a batch between statements.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What happened to one statement of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementOutcome {
    pub statement_text: String,
    pub success: bool,
    /// Statement verb, `None` when the text did not parse
    pub statement_kind: Option<&'static str>,
    pub rows_returned: Option<usize>,
    pub rows_affected: Option<usize>,
    pub execution_time_ms: f64,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Set when the statement took effect in memory but its durable write
    /// is still queued
    pub persistence_error: Option<String>,
    pub result: Option<QueryResult>,
}

impl StatementOutcome {
    fn failed(
        statement_text: String,
        kind: Option<&'static str>,
        err: &EngineError,
        ms: f64,
    ) -> Self {
        Self {
            statement_text,
            success: false,
            statement_kind: kind,
            rows_returned: None,
            rows_affected: None,
            execution_time_ms: ms,
            error_message: Some(err.to_string()),
            error_kind: Some(err.kind()),
            persistence_error: None,
            result: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_message.as_deref() == Some(&EngineError::Cancelled.to_string())
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<StatementOutcome>,
    pub total_time_ms: f64,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Result of moving a session's tables to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimSummary {
    pub tables: Vec<String>,
    pub persistence_error: Option<String>,
}

/// The embedded SQL engine. Share it as `Arc<Engine>`; scopes are locked
/// independently.
pub struct Engine {
    config: EngineConfig,
    registry: TableRegistry,
    persistence: PersistenceAdapter,
    executor: QueryExecutor,
    history: QueryHistory,
}

impl Engine {
    /// Engine over the JSON file store in `config.data_dir`, or over a
    /// memory store when no directory is configured.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store: Arc<dyn BackingStore> = match &config.data_dir {
            Some(dir) => Arc::new(JsonFileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: EngineConfig, store: Arc<dyn BackingStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: TableRegistry::new(),
            persistence: PersistenceAdapter::new(store),
            executor: QueryExecutor::new(&config),
            history: QueryHistory::new(config.history_capacity),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn execute_batch(&self, scope: &OwnerScope, text: &str) -> Result<BatchResult> {
        self.execute_batch_cancellable(scope, text, &CancelToken::new())
    }

    /// Run every statement of `text` in order. The token is checked before
    /// each statement; statements not started when it fires are reported
    /// as cancelled.
    ///
    /// Errors only when the batch as a whole is refused (size limits) or the
    /// scope cannot be loaded from the backing store.
    pub fn execute_batch_cancellable(
        &self,
        scope: &OwnerScope,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<BatchResult> {
        if text.len() > self.config.max_input_bytes {
            return Err(EngineError::LimitExceeded(format!(
                "batch is {} bytes, more than the limit of {}",
                text.len(),
                self.config.max_input_bytes
            )));
        }
        let statements = split_statements(text);
        if statements.len() > self.config.max_statements_per_batch {
            return Err(EngineError::LimitExceeded(format!(
                "batch has {} statements, more than the limit of {}",
                statements.len(),
                self.config.max_statements_per_batch
            )));
        }

        let started = Instant::now();
        let catalog = self.load_scope(scope)?;
        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            if cancel.is_cancelled() {
                outcomes.push(StatementOutcome::failed(
                    statement,
                    None,
                    &EngineError::Cancelled,
                    0.0,
                ));
                continue;
            }

            let outcome = self.run_statement(scope, &catalog, statement);
            self.history.append(QueryExecutionRecord {
                statement_text: outcome.statement_text.clone(),
                success: outcome.success,
                execution_time_ms: outcome.execution_time_ms,
                owner_scope: scope.clone(),
                timestamp: Timestamp::now(),
            });
            outcomes.push(outcome);
        }

        let result = BatchResult {
            outcomes,
            total_time_ms: elapsed_ms(started),
        };
        tracing::debug!(
            scope = %scope,
            statements = result.outcomes.len(),
            failed = result.failed(),
            total_ms = result.total_time_ms,
            "batch finished"
        );
        Ok(result)
    }

    fn run_statement(
        &self,
        scope: &OwnerScope,
        catalog: &SharedScope,
        statement_text: String,
    ) -> StatementOutcome {
        let started = Instant::now();
        let stmt = match parse_statement(&statement_text) {
            Ok(stmt) => stmt,
            Err(e) => {
                tracing::debug!(scope = %scope, error = %e, "statement rejected by parser");
                return StatementOutcome::failed(statement_text, None, &e, elapsed_ms(started));
            }
        };
        let verb = stmt.verb();

        let executed = self.execute_locked(catalog, stmt);
        let ms = elapsed_ms(started);

        match executed {
            Ok((result, persistence_error)) => {
                tracing::debug!(scope = %scope, verb, ms, "statement succeeded");
                let (rows_returned, rows_affected) = match &result {
                    QueryResult::Select { rows, .. } => (Some(rows.len()), None),
                    QueryResult::Modification { affected_rows } => (None, Some(*affected_rows)),
                    QueryResult::Definition { .. } => (None, None),
                };
                StatementOutcome {
                    statement_text,
                    success: true,
                    statement_kind: Some(verb),
                    rows_returned,
                    rows_affected,
                    execution_time_ms: ms,
                    error_message: None,
                    error_kind: None,
                    persistence_error,
                    result: Some(result),
                }
            }
            Err(e) => {
                if e.kind() == ErrorKind::IndexConsistency {
                    tracing::warn!(scope = %scope, error = %e, "statement hit index drift");
                } else {
                    tracing::debug!(scope = %scope, verb, error = %e, "statement failed");
                }
                StatementOutcome::failed(statement_text, Some(verb), &e, ms)
            }
        }
    }

    /// The scope stays locked until the statement's writes are submitted,
    /// so writes reach the store in statement order.
    fn execute_locked(
        &self,
        catalog: &SharedScope,
        stmt: Statement,
    ) -> Result<(QueryResult, Option<String>)> {
        let mut guard = catalog.lock();
        let execution = self.executor.execute(stmt, &mut guard)?;
        Ok((execution.result, self.persistence.submit(execution.writes)))
    }

    /// Run a single statement and return its result or its error.
    ///
    /// The statement is recorded in the history like a batch statement. A
    /// backing store failure is queued for retry and logged, not returned.
    pub fn execute(&self, scope: &OwnerScope, sql: &str) -> Result<QueryResult> {
        if sql.len() > self.config.max_input_bytes {
            return Err(EngineError::LimitExceeded(format!(
                "statement is {} bytes, more than the limit of {}",
                sql.len(),
                self.config.max_input_bytes
            )));
        }
        let started = Instant::now();
        let catalog = self.load_scope(scope)?;
        let executed = parse_statement(sql).and_then(|stmt| self.execute_locked(&catalog, stmt));

        self.history.append(QueryExecutionRecord {
            statement_text: sql.trim().to_string(),
            success: executed.is_ok(),
            execution_time_ms: elapsed_ms(started),
            owner_scope: scope.clone(),
            timestamp: Timestamp::now(),
        });
        executed.map(|(result, _)| result)
    }

    /// The scope's catalog, hydrated from the backing store on first use.
    fn load_scope(&self, scope: &OwnerScope) -> Result<SharedScope> {
        self.registry
            .scope_or_load(scope, || self.persistence.load_scope(scope))
    }

    /// Table names visible to `scope`, sorted.
    pub fn list_tables(&self, scope: &OwnerScope) -> Result<Vec<String>> {
        Ok(self.load_scope(scope)?.lock().list_tables())
    }

    /// Move every table of a session to the user that claimed it, in memory
    /// and in the backing store. Nothing changes if the user already has a
    /// table or index of the same name.
    pub fn claim_session(&self, session: &OwnerScope, user: &OwnerScope) -> Result<ClaimSummary> {
        if !session.is_session() || user.is_session() {
            return Err(EngineError::ConstraintViolation(format!(
                "a claim moves a session scope to a user scope, not {} to {}",
                session, user
            )));
        }

        let from = self.load_scope(session)?;
        let to = self.load_scope(user)?;
        // Session scopes order before user scopes; always lock in that order.
        let mut from = from.lock();
        let mut to = to.lock();

        for entry in from.entries() {
            if to.table_exists(&entry.def.name) {
                return Err(EngineError::AlreadyExists(format!(
                    "{} already has a table named '{}'",
                    user, entry.def.name
                )));
            }
            if let Some(index) = entry.def.indexes.iter().find(|i| to.get_index(&i.name).is_ok()) {
                return Err(EngineError::AlreadyExists(format!(
                    "{} already has an index named '{}'",
                    user, index.name
                )));
            }
        }

        let mut tables = Vec::new();
        for entry in from.take_entries() {
            tables.push(entry.def.name.clone());
            to.insert_entry(entry)?;
        }
        let persistence_error = self.persistence.submit(vec![PendingWrite::Reassign {
            from: session.clone(),
            to: user.clone(),
        }]);
        self.history.transfer(session, user);

        tracing::info!(
            session = %session,
            user = %user,
            tables = tables.len(),
            "session claimed"
        );
        Ok(ClaimSummary {
            tables,
            persistence_error,
        })
    }

    /// Execution records of `scope`, oldest first.
    pub fn history(&self, scope: &OwnerScope) -> Vec<QueryExecutionRecord> {
        self.history.records(scope)
    }

    /// Push queued backing store writes again.
    pub fn retry_pending_writes(&self) -> RetryReport {
        let report = self.persistence.retry_pending();
        if report.applied > 0 || report.remaining > 0 {
            tracing::info!(
                applied = report.applied,
                remaining = report.remaining,
                "retried pending writes"
            );
        }
        report
    }

    pub fn pending_writes(&self) -> usize {
        self.persistence.pending_count()
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let engine = engine();
        let scope = OwnerScope::session("s1");
        let batch = engine
            .execute_batch(
                &scope,
                "CREATE TABLE t (a INTEGER); INSERT INTO t VALUES ('x'); INSERT INTO t VALUES (1); SELEC 1",
            )
            .unwrap();

        let success: Vec<bool> = batch.outcomes.iter().map(|o| o.success).collect();
        assert_eq!(success, vec![true, false, true, false]);
        assert_eq!(batch.outcomes[1].error_kind, Some(ErrorKind::Semantic));
        assert_eq!(batch.outcomes[2].rows_affected, Some(1));
        assert_eq!(batch.outcomes[3].error_kind, Some(ErrorKind::Syntax));
        assert_eq!(batch.outcomes[3].statement_kind, None);
        assert_eq!(engine.history(&scope).len(), 4);
    }

    #[test]
    fn test_batch_limits() {
        let engine = engine();
        let scope = OwnerScope::session("s1");

        let huge = "x".repeat(engine.config().max_input_bytes + 1);
        assert!(matches!(
            engine.execute_batch(&scope, &huge),
            Err(EngineError::LimitExceeded(_))
        ));

        let many = "SELECT 1;".repeat(engine.config().max_statements_per_batch + 1);
        assert!(matches!(
            engine.execute_batch(&scope, &many),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_cancelled_batch_reports_remaining_statements() {
        let engine = engine();
        let scope = OwnerScope::session("s1");
        let token = CancelToken::new();
        token.cancel();

        let batch = engine
            .execute_batch_cancellable(&scope, "CREATE TABLE t (a INTEGER); SELECT 1", &token)
            .unwrap();
        assert_eq!(batch.outcomes.len(), 2);
        assert!(batch.outcomes.iter().all(|o| o.is_cancelled()));
        assert_eq!(batch.outcomes[0].error_kind, Some(ErrorKind::Resource));
        assert!(engine.list_tables(&scope).unwrap().is_empty());
        assert!(engine.history(&scope).is_empty());
    }

    #[test]
    fn test_scopes_do_not_see_each_other() {
        let engine = engine();
        let a = OwnerScope::session("a");
        let b = OwnerScope::user("b");

        engine.execute_batch(&a, "CREATE TABLE t (x INTEGER)").unwrap();
        let batch = engine.execute_batch(&b, "SELECT * FROM t").unwrap();
        assert!(!batch.outcomes[0].success);
        assert_eq!(engine.list_tables(&a).unwrap(), vec!["t"]);
        assert!(engine.list_tables(&b).unwrap().is_empty());
    }

    #[test]
    fn test_claim_rejects_wrong_direction() {
        let engine = engine();
        let err = engine
            .claim_session(&OwnerScope::user("u"), &OwnerScope::session("s"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }
}
