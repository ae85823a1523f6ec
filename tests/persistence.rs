//! Write-through persistence: hydration from disk and retry of rejected writes

use sandql::types::RowId;
use sandql::{
    BackingStore, Engine, EngineConfig, EngineError, MemoryStore, OwnerScope, Result, RowRecord,
    Session, TableRecord, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

#[test]
fn test_json_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default().with_data_dir(dir.path());
    let scope = OwnerScope::user("reopen");

    {
        let engine = Arc::new(Engine::new(config.clone()).unwrap());
        let s = Session::new(engine, scope.clone());
        let batch = s
            .batch(
                "CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT, price REAL); \
                 CREATE INDEX idx_title ON books (title); \
                 INSERT INTO books VALUES (1, 'Dune', 9.5), (2, 'Emma', 4.0), (3, 'Ulysses', NULL); \
                 UPDATE books SET price = 5.0 WHERE id = 2; \
                 DELETE FROM books WHERE id = 3",
            )
            .unwrap();
        assert!(batch.all_succeeded());
        assert!(batch.outcomes.iter().all(|o| o.persistence_error.is_none()));
    }

    let engine = Arc::new(Engine::new(config).unwrap());
    let s = Session::new(engine, scope);
    let rows = s.query("SELECT id, title, price FROM books ORDER BY id").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["title"], Value::Text("Dune".into()));
    assert_eq!(rows[1]["price"], Value::Real(5.0));

    // Constraints and indexes come back with the table.
    let err = s.execute("INSERT INTO books VALUES (1, 'Again', 1.0)").unwrap_err();
    assert!(matches!(err, EngineError::ConstraintViolation(_)));
    let err = s.execute("CREATE INDEX idx_title ON books (price)").unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));

    let by_title = s.query("SELECT id FROM books WHERE title = 'Emma'").unwrap();
    assert_eq!(by_title[0]["id"], Value::Integer(2));
}

#[test]
fn test_reals_stay_finite_across_restart() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default().with_data_dir(dir.path());
    let scope = OwnerScope::session("reals");

    {
        let engine = Engine::new(config.clone()).unwrap();
        let batch = engine
            .execute_batch(
                &scope,
                "CREATE TABLE t (r REAL NOT NULL); \
                 INSERT INTO t VALUES (1e400); \
                 INSERT INTO t VALUES (1e308); \
                 UPDATE t SET r = r * 10; \
                 UPDATE t SET r = r - r * 2 - 1e308 * 2",
            )
            .unwrap();
        let flags: Vec<bool> = batch.outcomes.iter().map(|o| o.success).collect();
        assert_eq!(flags, vec![true, false, true, false, false]);
    }

    let engine = Engine::new(config).unwrap();
    let rows = engine
        .execute(&scope, "SELECT r FROM t")
        .unwrap()
        .rows_as_maps();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["r"], Value::Real(1e308));
}

#[test]
fn test_dropped_table_stays_dropped() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default().with_data_dir(dir.path());
    let scope = OwnerScope::session("drop");

    {
        let engine = Engine::new(config.clone()).unwrap();
        engine
            .execute_batch(
                &scope,
                "CREATE TABLE gone (x INTEGER); INSERT INTO gone VALUES (1); DROP TABLE gone",
            )
            .unwrap();
    }

    let engine = Engine::new(config).unwrap();
    assert!(engine.list_tables(&scope).unwrap().is_empty());
}

#[derive(Default)]
struct FlakyStore {
    inner: Arc<MemoryStore>,
    down: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(EngineError::Persistence("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl BackingStore for FlakyStore {
    fn upsert_table(&self, record: &TableRecord) -> Result<()> {
        self.check()?;
        self.inner.upsert_table(record)
    }
    fn delete_table(&self, table_id: Uuid) -> Result<()> {
        self.check()?;
        self.inner.delete_table(table_id)
    }
    fn upsert_rows(&self, rows: &[RowRecord]) -> Result<()> {
        self.check()?;
        self.inner.upsert_rows(rows)
    }
    fn delete_rows(&self, table_id: Uuid, ids: &[RowId]) -> Result<()> {
        self.check()?;
        self.inner.delete_rows(table_id, ids)
    }
    fn load_tables(&self, scope: &OwnerScope) -> Result<Vec<TableRecord>> {
        self.inner.load_tables(scope)
    }
    fn load_rows(&self, table_id: Uuid) -> Result<Vec<RowRecord>> {
        self.inner.load_rows(table_id)
    }
    fn reassign_scope(&self, from: &OwnerScope, to: &OwnerScope) -> Result<usize> {
        self.check()?;
        self.inner.reassign_scope(from, to)
    }
}

#[test]
fn test_rejected_writes_are_retried_in_order() {
    let store = Arc::new(FlakyStore::default());
    let engine = Engine::with_store(EngineConfig::default(), store.clone()).unwrap();
    let scope = OwnerScope::user("flaky");

    store.down.store(true, Ordering::SeqCst);
    let batch = engine
        .execute_batch(
            &scope,
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT); \
             INSERT INTO t VALUES (1, 'a'), (2, 'b'); \
             UPDATE t SET v = 'z' WHERE id = 1",
        )
        .unwrap();

    // The statements succeed in memory; the store failure is reported alongside.
    assert!(batch.all_succeeded());
    let first = batch.outcomes[0].persistence_error.as_deref().unwrap();
    assert!(first.contains("connection refused"));
    let later = batch.outcomes[2].persistence_error.as_deref().unwrap();
    assert!(later.contains("still pending"));
    assert_eq!(engine.pending_writes(), 3);
    assert_eq!(store.inner.table_count(), 0);

    let report = engine.retry_pending_writes();
    assert_eq!((report.applied, report.remaining), (0, 3));

    store.down.store(false, Ordering::SeqCst);
    let report = engine.retry_pending_writes();
    assert_eq!((report.applied, report.remaining), (3, 0));
    assert_eq!(engine.pending_writes(), 0);

    // A fresh engine over the same data sees the final state.
    let fresh = Engine::with_store(EngineConfig::default(), store.inner.clone()).unwrap();
    let result = fresh.execute(&scope, "SELECT v FROM t ORDER BY id").unwrap();
    let values: Vec<Value> = result.rows_as_maps().into_iter().map(|r| r["v"].clone()).collect();
    assert_eq!(values, vec![Value::Text("z".into()), Value::Text("b".into())]);
}

#[test]
fn test_claim_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let session = OwnerScope::session("anon-1");
    let user = OwnerScope::user("erin");

    let engine = Engine::with_store(EngineConfig::default(), store.clone()).unwrap();
    engine
        .execute_batch(&session, "CREATE TABLE drafts (body TEXT); INSERT INTO drafts VALUES ('hello')")
        .unwrap();
    engine.claim_session(&session, &user).unwrap();

    let fresh = Engine::with_store(EngineConfig::default(), store).unwrap();
    assert!(fresh.list_tables(&session).unwrap().is_empty());
    let rows = fresh
        .execute(&user, "SELECT body FROM drafts")
        .unwrap()
        .rows_as_maps();
    assert_eq!(rows[0]["body"], Value::Text("hello".into()));
}
