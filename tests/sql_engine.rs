//! End-to-end behaviour of the engine through its public API

use sandql::{
    split_statements, tokenize, Engine, EngineConfig, EngineError, ErrorKind, OwnerScope,
    QueryResult, Session, Value,
};
use std::sync::Arc;

fn session(id: &str) -> Session {
    let engine = Arc::new(Engine::new(EngineConfig::default()).unwrap());
    Session::new(engine, OwnerScope::session(id))
}

fn text(s: &str) -> Value {
    Value::Text(s.into())
}

#[test]
fn test_like_batch_returns_single_match() {
    let s = session("e2e");
    let batch = s
        .batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL); \
             INSERT INTO users (id, name) VALUES (1,'Alice'),(2,'Bob'); \
             SELECT * FROM users WHERE name LIKE '%o%'",
        )
        .unwrap();

    assert_eq!(batch.outcomes.len(), 3);
    assert!(batch.all_succeeded());
    assert_eq!(batch.outcomes[1].rows_affected, Some(2));

    let rows = batch.outcomes[2].result.as_ref().unwrap().rows_as_maps();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Integer(2));
    assert_eq!(rows[0]["name"], text("Bob"));
}

#[test]
fn test_batch_continues_past_failures() {
    let s = session("mixed");
    let batch = s
        .batch(
            "CREATE TABLE t (a INTEGER); \
             SELEC oops; \
             INSERT INTO missing VALUES (1); \
             INSERT INTO t VALUES (7); \
             SELECT a FROM t",
        )
        .unwrap();

    let flags: Vec<bool> = batch.outcomes.iter().map(|o| o.success).collect();
    assert_eq!(flags, vec![true, false, false, true, true]);
    assert_eq!(batch.outcomes[1].error_kind, Some(ErrorKind::Syntax));
    assert_eq!(batch.outcomes[2].error_kind, Some(ErrorKind::Semantic));
    assert_eq!(batch.outcomes[4].rows_returned, Some(1));
    assert_eq!(batch.succeeded(), 3);
    assert_eq!(batch.failed(), 2);
    assert_eq!(s.history().len(), 5);
}

#[test]
fn test_multi_row_insert_is_all_or_nothing() {
    let s = session("atomic");
    s.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
        .unwrap();
    s.execute("INSERT INTO t VALUES (1, 'one')").unwrap();

    let err = s
        .execute("INSERT INTO t VALUES (2, 'two'), (3, NULL), (4, 'four')")
        .unwrap_err();
    assert!(matches!(err, EngineError::ConstraintViolation(_)));

    let err = s
        .execute("INSERT INTO t VALUES (5, 'five'), (1, 'again')")
        .unwrap_err();
    assert!(matches!(err, EngineError::ConstraintViolation(_)));

    let rows = s.query("SELECT id FROM t ORDER BY id").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Integer(1));
}

#[test]
fn test_update_and_delete_report_affected_rows() {
    let s = session("dml");
    s.batch(
        "CREATE TABLE scores (player TEXT PRIMARY KEY, points INTEGER DEFAULT 0); \
         INSERT INTO scores (player) VALUES ('ann'), ('ben'), ('cat')",
    )
    .unwrap();

    let updated = s
        .execute("UPDATE scores SET points = points + 5 WHERE player IN ('ann', 'cat')")
        .unwrap();
    assert_eq!(updated.affected_rows(), Some(2));

    let deleted = s.execute("DELETE FROM scores WHERE points = 0").unwrap();
    assert_eq!(deleted.affected_rows(), Some(1));

    let rows = s
        .query("SELECT player, points FROM scores ORDER BY player DESC")
        .unwrap();
    let players: Vec<&Value> = rows.iter().map(|r| &r["player"]).collect();
    assert_eq!(players, vec![&text("cat"), &text("ann")]);
    assert!(rows.iter().all(|r| r["points"] == Value::Integer(5)));
}

#[test]
fn test_scopes_do_not_see_each_other() {
    let engine = Arc::new(Engine::new(EngineConfig::default()).unwrap());
    let alice = Session::new(Arc::clone(&engine), OwnerScope::user("alice"));
    let tab = Session::new(Arc::clone(&engine), OwnerScope::session("tab"));

    alice.execute("CREATE TABLE notes (body TEXT)").unwrap();
    tab.execute("CREATE TABLE notes (id INTEGER)").unwrap();
    alice.execute("INSERT INTO notes VALUES ('private')").unwrap();

    assert!(tab.query("SELECT * FROM notes").unwrap().is_empty());
    assert_eq!(alice.query("SELECT * FROM notes").unwrap().len(), 1);
}

#[test]
fn test_claim_moves_tables_and_rejects_collisions() {
    let engine = Arc::new(Engine::new(EngineConfig::default()).unwrap());
    let user = OwnerScope::user("dana");

    let mut first = Session::new(Arc::clone(&engine), OwnerScope::session("first"));
    first
        .batch("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('kept')")
        .unwrap();
    let summary = first.claim_for(user.clone()).unwrap();
    assert_eq!(summary.tables, vec!["notes".to_string()]);
    assert!(summary.persistence_error.is_none());

    let mut second = Session::new(Arc::clone(&engine), OwnerScope::session("second"));
    second
        .batch("CREATE TABLE notes (body TEXT); CREATE TABLE extra (x INTEGER)")
        .unwrap();
    let err = second.claim_for(user.clone()).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));

    // Nothing moved: the session still owns both tables.
    assert_eq!(second.scope(), &OwnerScope::session("second"));
    assert_eq!(second.tables().unwrap(), vec!["extra", "notes"]);
    assert_eq!(engine.list_tables(&user).unwrap(), vec!["notes"]);
}

#[test]
fn test_show_tables_and_describe() {
    let s = session("meta");
    s.batch("CREATE TABLE b (x INTEGER); CREATE TABLE a (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();

    match s.execute("SHOW TABLES").unwrap() {
        QueryResult::Select { rows, .. } => {
            assert_eq!(rows, vec![vec![text("a")], vec![text("b")]]);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let described = s.execute("DESCRIBE a").unwrap();
    assert_eq!(described.row_count(), 2);
}

#[test]
fn test_split_keeps_quoted_semicolons() {
    let statements =
        split_statements("INSERT INTO t VALUES ('a;b'); SELECT \"x;y\" FROM t ;; SELECT 1");
    assert_eq!(
        statements,
        vec![
            "INSERT INTO t VALUES ('a;b')".to_string(),
            "SELECT \"x;y\" FROM t".to_string(),
            "SELECT 1".to_string(),
        ]
    );
}

#[test]
fn test_batch_with_commented_apostrophes() {
    let s = session("comments");
    let batch = s
        .batch("SELECT 1; -- don't\nSELECT 2; /* it's */ SELECT 3")
        .unwrap();

    assert_eq!(batch.outcomes.len(), 3);
    assert!(batch.all_succeeded());
    let values: Vec<Value> = batch
        .outcomes
        .iter()
        .filter_map(|o| o.result.as_ref()?.select_rows().map(|(_, rows)| rows[0][0].clone()))
        .collect();
    assert_eq!(values, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn test_tokens_cover_input_exactly() {
    let inputs = [
        "SELECT * FROM users WHERE name LIKE '%o%';",
        "  insert into t (a,b) values (1, 'it''s')  -- trailing",
        "CREATE TABLE `odd name` (x REAL DEFAULT 1.5)\n",
        "SELECT 'unterminated",
        "@@ #",
    ];
    for input in inputs {
        let tokens = tokenize(input);
        let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, input);
        for pair in tokens.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }
}

#[test]
fn test_highlight_escapes_markup() {
    let html = sandql::highlight("SELECT '<b>' FROM t");
    assert!(html.contains("&lt;b&gt;"));
    assert!(!html.contains("<b>"));
    assert!(html.contains("sql-keyword"));
}
