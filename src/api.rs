//! sandql Public API
//!
//! `Session` binds a shared `Engine` to one owner scope, so hosts and the
//! CLI do not repeat the scope on every call.

use crate::engine::{BatchResult, CancelToken, ClaimSummary, Engine};
use crate::history::QueryExecutionRecord;
use crate::sql::QueryResult;
use crate::types::{Fields, OwnerScope};
use crate::Result;
use std::sync::Arc;

/// A caller's view of the engine
///
/// # Quick start
///
/// ```
/// use sandql::{Engine, EngineConfig, OwnerScope, Session};
/// use std::sync::Arc;
///
/// let engine = Arc::new(Engine::new(EngineConfig::default())?);
/// let session = Session::new(engine, OwnerScope::session("tab-1"));
///
/// session.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
/// session.execute("INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob')")?;
/// let rows = session.query("SELECT name FROM users WHERE id = 2")?;
/// assert_eq!(rows[0]["name"], sandql::Value::Text("Bob".into()));
/// # Ok::<(), sandql::EngineError>(())
/// ```
#[derive(Clone)]
pub struct Session {
    engine: Arc<Engine>,
    scope: OwnerScope,
}

impl Session {
    pub fn new(engine: Arc<Engine>, scope: OwnerScope) -> Self {
        Self { engine, scope }
    }

    pub fn scope(&self) -> &OwnerScope {
        &self.scope
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Execute one statement.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.engine.execute(&self.scope, sql)
    }

    /// Execute one statement and return its rows as column -> value maps.
    pub fn query(&self, sql: &str) -> Result<Vec<Fields>> {
        Ok(self.execute(sql)?.rows_as_maps())
    }

    /// Execute a `;`-separated batch.
    pub fn batch(&self, text: &str) -> Result<BatchResult> {
        self.engine.execute_batch(&self.scope, text)
    }

    pub fn batch_cancellable(&self, text: &str, cancel: &CancelToken) -> Result<BatchResult> {
        self.engine
            .execute_batch_cancellable(&self.scope, text, cancel)
    }

    pub fn tables(&self) -> Result<Vec<String>> {
        self.engine.list_tables(&self.scope)
    }

    pub fn history(&self) -> Vec<QueryExecutionRecord> {
        self.engine.history(&self.scope)
    }

    /// Hand this session's tables to `user` and continue as that user.
    pub fn claim_for(&mut self, user: OwnerScope) -> Result<ClaimSummary> {
        let summary = self.engine.claim_session(&self.scope, &user)?;
        self.scope = user;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::Value;

    fn session(id: &str) -> Session {
        let engine = Arc::new(Engine::new(EngineConfig::for_testing()).unwrap());
        Session::new(engine, OwnerScope::session(id))
    }

    #[test]
    fn test_execute_returns_typed_errors() {
        let s = session("s1");
        s.execute("CREATE TABLE t (a INTEGER NOT NULL)").unwrap();
        let err = s.execute("INSERT INTO t VALUES (NULL)").unwrap_err();
        assert!(matches!(err, crate::EngineError::ConstraintViolation(_)));
        assert_eq!(s.history().len(), 2);
        assert!(!s.history()[1].success);
    }

    #[test]
    fn test_claim_for_switches_scope() {
        let mut s = session("anon");
        s.batch("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('hi')")
            .unwrap();

        let summary = s.claim_for(OwnerScope::user("alice")).unwrap();
        assert_eq!(summary.tables, vec!["notes"]);
        assert_eq!(s.scope(), &OwnerScope::user("alice"));
        assert_eq!(s.query("SELECT body FROM notes").unwrap()[0]["body"], Value::Text("hi".into()));

        let anon = Session::new(Arc::clone(s.engine()), OwnerScope::session("anon"));
        assert!(anon.tables().unwrap().is_empty());
    }
}
