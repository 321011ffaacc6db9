//! Query Operations Benchmarks
//!
//! Benchmarks for tree capture, query evaluation, nested scopes and
//! resolution over synthetic applications of growing size.
//!
//! Run with: `cargo bench --bench query_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sondeo::prelude::*;
use sondeo::{objects_in, render_tree, resolve, Purpose, RenderOptions};

/// Application with `rows` table rows, each holding an entry and two buttons
fn table_app(rows: usize) -> (InMemoryDesktop, NodeId) {
    let d = InMemoryDesktop::new();
    let app = d.add_application("bench");
    let table = d
        .add_node(&app, NodeSpec::new(Role::Table).name("items"))
        .unwrap();
    for i in 0..rows {
        let row = d
            .add_node(&table, NodeSpec::new(Role::TableRow).name(format!("row{i}")))
            .unwrap();
        d.add_node(&row, NodeSpec::new(Role::Entry).text(format!("item {i}")))
            .unwrap();
        for name in ["Editar", "Borrar"] {
            d.add_node(
                &row,
                NodeSpec::new(Role::PushButton).name(name).action("click"),
            )
            .unwrap();
        }
    }
    (d, app)
}

fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");

    for rows in [10, 100, 1000] {
        let (d, app) = table_app(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &app, |bench, app| {
            bench.iter(|| {
                let handle = ElementHandle::capture(&d, black_box(app)).unwrap();
                black_box(handle);
            });
        });
    }

    group.finish();
}

fn bench_query_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_evaluation");

    let predicates = vec![
        ("role", by::role(Role::PushButton)),
        ("role_and_name", by::role(Role::PushButton) & by::name("Borrar")),
        ("text_contains", by::text_contains("item 9")),
        ("pattern", by::text_matching("item [0-9]+5").unwrap()),
        ("last_child", by::role(Role::PushButton) & by::nth(-1)),
        ("child_of", by::child_of(by::name("row42"))),
    ];

    let (d, app) = table_app(500);
    for (name, predicate) in predicates {
        let query = objects_in(app.clone(), predicate);
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |bench, q| {
            bench.iter(|| {
                let set = black_box(q).evaluate(&d).unwrap();
                black_box(set);
            });
        });
    }

    group.finish();
}

fn bench_nested_scopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_scopes");

    for rows in [10, 100, 500] {
        let (d, app) = table_app(rows);
        let query = objects_in(app.clone(), by::role(Role::TableRow))
            .objects_in(by::role(Role::PushButton))
            .objects_in(by::name("Borrar"));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &query, |bench, q| {
            bench.iter(|| {
                let set = q.evaluate(&d).unwrap();
                black_box(set);
            });
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    let (d, app) = table_app(1000);
    let set = objects_in(app, by::role(Role::PushButton))
        .evaluate(&d)
        .unwrap();
    for policy in [
        Cardinality::First,
        Cardinality::Any,
        Cardinality::All,
        Cardinality::ExactlyOne,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(policy.as_str()),
            &policy,
            |bench, &p| {
                bench.iter(|| {
                    let resolved = resolve(black_box(&set), p, Purpose::Action);
                    let _ = black_box(resolved);
                });
            },
        );
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let (d, app) = table_app(200);
    let handle = ElementHandle::capture(&d, &app).unwrap();
    let options = RenderOptions::default().with_states(true);

    c.bench_function("render_tree_200_rows", |bench| {
        bench.iter(|| {
            let text = render_tree(black_box(&handle), &options);
            black_box(text);
        });
    });
}

criterion_group!(
    benches,
    bench_capture,
    bench_query_evaluation,
    bench_nested_scopes,
    bench_resolution,
    bench_render
);
criterion_main!(benches);
