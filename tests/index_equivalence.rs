//! Indexed lookups must return exactly what a full scan returns, whatever
//! mix of writes came before.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sandql::{Engine, EngineConfig, OwnerScope, QueryResult, Value};

fn run(engine: &Engine, scope: &OwnerScope, sql: &str) -> QueryResult {
    engine
        .execute(scope, sql)
        .unwrap_or_else(|e| panic!("{} failed: {}", sql, e))
}

/// Apply `template` to both tables, with `{t}` naming the table.
fn both(engine: &Engine, scope: &OwnerScope, template: &str) {
    for table in ["plain", "indexed"] {
        run(engine, scope, &template.replace("{t}", table));
    }
}

fn key_literal(rng: &mut StdRng) -> String {
    match rng.gen_range(0..12i64) {
        0 => "NULL".to_string(),
        n => (n - 6).to_string(),
    }
}

#[test]
fn test_index_lookups_match_full_scans() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let scope = OwnerScope::session("equivalence");

    run(&engine, &scope, "CREATE TABLE plain (id INTEGER, k INTEGER, tag TEXT)");
    run(&engine, &scope, "CREATE TABLE indexed (id INTEGER, k INTEGER, tag TEXT)");
    run(&engine, &scope, "CREATE INDEX idx_k ON indexed (k)");
    run(&engine, &scope, "CREATE INDEX idx_tag_k ON indexed (tag, k)");

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut next_id: u64 = 0;
    for _ in 0..400 {
        match rng.gen_range(0..10) {
            0..=5 => {
                next_id += 1;
                let k = key_literal(&mut rng);
                let tag = ["a", "b", "c"][rng.gen_range(0..3usize)];
                both(
                    &engine,
                    &scope,
                    &format!("INSERT INTO {{t}} VALUES ({}, {}, '{}')", next_id, k, tag),
                );
            }
            6 | 7 => {
                let k = key_literal(&mut rng);
                let id = rng.gen_range(0..=next_id);
                both(
                    &engine,
                    &scope,
                    &format!("UPDATE {{t}} SET k = {} WHERE id = {}", k, id),
                );
            }
            8 => {
                let k = key_literal(&mut rng);
                both(&engine, &scope, &format!("DELETE FROM {{t}} WHERE k = {}", k));
            }
            _ => {
                let low = rng.gen_range(-6..2i64);
                both(
                    &engine,
                    &scope,
                    &format!("UPDATE {{t}} SET tag = 'c' WHERE k BETWEEN {} AND {}", low, low + 2),
                );
            }
        }
    }

    let predicates = [
        "k = 3",
        "k = -6",
        "k IS NULL",
        "k > 0",
        "k >= -2 AND k < 4",
        "k > -5 AND k > 1 AND k <= 5",
        "k BETWEEN -3 AND 2",
        "3 < k",
        "k = 2 AND tag = 'a'",
        "tag = 'c' AND k < 0",
        "tag = 'b'",
        "k IN (1, 2, 3)",
        "k = 1 OR k = 4",
        "k <> 2",
    ];
    let mut non_empty = 0;
    for predicate in predicates {
        let query = |table: &str| {
            run(
                &engine,
                &scope,
                &format!("SELECT id, k, tag FROM {} WHERE {} ORDER BY id", table, predicate),
            )
        };
        let expected = query("plain");
        let actual = query("indexed");
        assert_eq!(actual, expected, "rows differ for WHERE {}", predicate);
        if expected.row_count() > 0 {
            non_empty += 1;
        }
    }
    assert!(non_empty > predicates.len() / 2);

    let count = |table: &str| {
        run(&engine, &scope, &format!("SELECT COUNT(*) FROM {}", table))
            .select_rows()
            .map(|(_, rows)| rows[0][0].clone())
    };
    assert_eq!(count("plain"), count("indexed"));
    assert_ne!(count("plain"), Some(Value::Integer(0)));
}
