use std::collections::BTreeSet;
use std::sync::Arc;

use gravel::engine::{index_start_optimize, run};
use gravel::query::Statement;
use gravel::{
    expr, DataElement, Engine, EngineConfig, ExtensionContext, MemoryGraph, Query, QueryResult,
};
use tokio_util::sync::CancellationToken;

fn graph() -> Arc<MemoryGraph> {
    let g = MemoryGraph::new();
    for i in 1..=6 {
        let label = if i % 2 == 0 { "even" } else { "odd" };
        g.insert_vertex(DataElement::vertex(i.to_string(), label).with_property("n", i))
            .unwrap();
    }
    let edges = [
        ("e12", "1", "2"),
        ("e23", "2", "3"),
        ("e34", "3", "4"),
        ("e45", "4", "5"),
        ("e61", "6", "1"),
    ];
    for (id, from, to) in edges {
        g.insert_edge(DataElement::edge(id, "next", from, to)).unwrap();
    }
    Arc::new(g)
}

fn ids(results: &[QueryResult]) -> BTreeSet<String> {
    results
        .iter()
        .filter_map(|r| r.element().map(|e| e.id.clone()))
        .collect()
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<QueryResult>) -> Vec<QueryResult> {
    let mut out = Vec::new();
    while let Some(r) = rx.recv().await {
        out.push(r);
    }
    out
}

/// Runs a statement list exactly as written, bypassing the start rewrite.
async fn run_unoptimized(engine: &Engine, stmts: &[Statement]) -> Vec<QueryResult> {
    let pipeline = engine
        .compile_extension(stmts, &ExtensionContext::default())
        .unwrap();
    drain(run(&pipeline, CancellationToken::new(), None)).await
}

#[tokio::test]
async fn id_filter_rewrite_is_equivalent() {
    let engine = Engine::new(graph(), EngineConfig::default());
    let original = Query::all_vertices()
        .has(expr::within("$.gid", ["1", "2", "3"]))
        .out(Vec::<String>::new())
        .into_statements();
    let optimized = index_start_optimize(&original);
    assert_eq!(
        optimized,
        Query::v(["1", "2", "3"]).out(Vec::<String>::new()).into_statements()
    );

    let scanned = run_unoptimized(&engine, &original).await;
    let rewritten = engine.collect(&original).await.unwrap();
    let direct = engine
        .collect(&Query::v(["1", "2", "3"]).out(Vec::<String>::new()).into_statements())
        .await
        .unwrap();
    let expected: BTreeSet<String> = ["2", "3", "4"].into_iter().map(String::from).collect();
    assert_eq!(ids(&scanned), expected);
    assert_eq!(ids(&rewritten), expected);
    assert_eq!(ids(&direct), expected);
}

#[tokio::test]
async fn label_filter_rewrite_is_equivalent() {
    let engine = Engine::new(graph(), EngineConfig::default());
    let original = Query::all_vertices()
        .has_label(["even"])
        .has(expr::gt("n", 2))
        .into_statements();
    let optimized = index_start_optimize(&original);
    assert_eq!(optimized[0], Statement::LookupVertsIndex(vec!["even".into()]));
    assert_eq!(optimized.len(), 2);

    let scanned = run_unoptimized(&engine, &original).await;
    let rewritten = engine.collect(&original).await.unwrap();
    assert_eq!(ids(&scanned), ids(&rewritten));
    assert_eq!(ids(&rewritten).len(), 2);
}

#[test]
fn id_filter_wins_over_label_filter() {
    let original = Query::all_vertices()
        .has_label(["odd"])
        .has_id(["1", "2"])
        .into_statements();
    let optimized = index_start_optimize(&original);
    assert_eq!(
        optimized,
        vec![
            Statement::V(vec!["1".into(), "2".into()]),
            Statement::HasLabel(vec!["odd".into()]),
        ]
    );
}

#[tokio::test]
async fn precedence_keeps_label_filter_at_runtime() {
    let engine = Engine::new(graph(), EngineConfig::default());
    let stmts = Query::all_vertices()
        .has_label(["odd"])
        .has_id(["1", "2"])
        .into_statements();
    let out = engine.collect(&stmts).await.unwrap();
    assert_eq!(ids(&out), BTreeSet::from(["1".to_string()]));
}

#[test]
fn rewrite_is_idempotent() {
    let lists = [
        Query::all_vertices().has_id(["1"]).out(["next"]).into_statements(),
        Query::all_vertices().has_label(["even"]).into_statements(),
        Query::all_vertices()
            .has(expr::and(vec![expr::eq("_label", "odd"), expr::eq("n", 3)]))
            .into_statements(),
        Query::all_vertices().out(["next"]).has_id(["1"]).into_statements(),
        Query::v(["1"]).has_id(["1"]).into_statements(),
    ];
    for stmts in lists {
        let once = index_start_optimize(&stmts);
        assert_eq!(index_start_optimize(&once), once, "{stmts:?}");
    }
}

#[test]
fn only_a_leading_full_scan_is_rewritten() {
    let explicit = Query::v(["1"]).has_id(["1"]).into_statements();
    assert_eq!(index_start_optimize(&explicit), explicit);

    let later = Query::all_vertices().out(["next"]).has_id(["1"]).into_statements();
    assert_eq!(index_start_optimize(&later), later);
}
