//! SQL engine benchmarks for sandql.
//!
//! Benchmarks for:
//! - Tokenizing and highlighting
//! - Statement splitting
//! - Parsing
//! - Indexed and scanned execution

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sandql::sql::parse_statement;
use sandql::{highlight, split_statements, tokenize, Engine, EngineConfig, OwnerScope};

fn statements() -> Vec<(&'static str, &'static str)> {
    vec![
        ("select_literal", "SELECT 1 + 2 * 3"),
        (
            "select_where",
            "SELECT id, name FROM users WHERE age > 25 AND name LIKE '%a%' ORDER BY name LIMIT 10",
        ),
        (
            "insert_multi",
            "INSERT INTO users (id, name, age) VALUES (1, 'Alice', 30), (2, 'Bob', 41), (3, 'Cy', 19)",
        ),
        (
            "create_table",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER DEFAULT 0)",
        ),
    ]
}

fn bench_lex(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/lex");
    for (name, sql) in statements() {
        group.bench_with_input(BenchmarkId::new("tokenize", name), sql, |b, sql| {
            b.iter(|| black_box(tokenize(black_box(sql))))
        });
        group.bench_with_input(BenchmarkId::new("highlight", name), sql, |b, sql| {
            b.iter(|| black_box(highlight(black_box(sql))))
        });
    }
    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let batch: String = (0..50)
        .map(|i| format!("INSERT INTO t VALUES ({}, 'semi;colon {}');\n", i, i))
        .collect();
    c.bench_function("sql/split/50_statements", |b| {
        b.iter(|| black_box(split_statements(black_box(&batch))))
    });
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/parse");
    for (name, sql) in statements() {
        group.bench_with_input(BenchmarkId::from_parameter(name), sql, |b, sql| {
            b.iter(|| black_box(parse_statement(black_box(sql))))
        });
    }
    group.finish();
}

fn populated_engine(rows: usize) -> (Engine, OwnerScope) {
    let engine = Engine::new(EngineConfig::default()).expect("engine");
    let scope = OwnerScope::session("bench");
    engine
        .execute(&scope, "CREATE TABLE t (id INTEGER PRIMARY KEY, k INTEGER, v TEXT)")
        .expect("create");
    engine
        .execute(&scope, "CREATE INDEX idx_k ON t (k)")
        .expect("index");
    for chunk in (0..rows).collect::<Vec<_>>().chunks(100) {
        let values: Vec<String> = chunk
            .iter()
            .map(|i| format!("({}, {}, 'v{}')", i, i % 97, i))
            .collect();
        engine
            .execute(&scope, &format!("INSERT INTO t VALUES {}", values.join(", ")))
            .expect("insert");
    }
    (engine, scope)
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/execute");
    for rows in [1_000usize, 5_000] {
        let (engine, scope) = populated_engine(rows);
        group.bench_with_input(BenchmarkId::new("point_pk", rows), &rows, |b, _| {
            b.iter(|| black_box(engine.execute(&scope, "SELECT v FROM t WHERE id = 500")))
        });
        group.bench_with_input(BenchmarkId::new("point_secondary", rows), &rows, |b, _| {
            b.iter(|| black_box(engine.execute(&scope, "SELECT id FROM t WHERE k = 42")))
        });
        group.bench_with_input(BenchmarkId::new("full_scan_like", rows), &rows, |b, _| {
            b.iter(|| {
                black_box(engine.execute(&scope, "SELECT COUNT(*) FROM t WHERE v LIKE '%99%'"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lex, bench_split, bench_parse, bench_execute);
criterion_main!(benches);
