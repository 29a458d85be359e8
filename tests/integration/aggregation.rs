use std::sync::Arc;

use gravel::{
    expr, AggregationResult, DataElement, Engine, EngineConfig, MemoryGraph, Query, QueryResult,
    Value,
};

/// Vertices tagged a x5, b x3, c x5 with scores 1..=13.
fn tagged() -> Engine {
    let g = MemoryGraph::new();
    let tags = std::iter::repeat("a")
        .take(5)
        .chain(std::iter::repeat("b").take(3))
        .chain(std::iter::repeat("c").take(5));
    for (i, tag) in tags.enumerate() {
        let score = i as i64 + 1;
        g.insert_vertex(
            DataElement::vertex(format!("v{i:02}"), "item")
                .with_property("tag", tag)
                .with_property("score", score),
        )
        .unwrap();
    }
    Engine::new(Arc::new(g), EngineConfig::default())
}

fn buckets(results: Vec<QueryResult>) -> Vec<AggregationResult> {
    results
        .into_iter()
        .map(|r| match r {
            QueryResult::Aggregation(b) => b,
            other => panic!("unexpected result {other:?}"),
        })
        .collect()
}

fn pairs(buckets: &[AggregationResult]) -> Vec<(Value, f64)> {
    buckets.iter().map(|b| (b.key.clone(), b.value)).collect()
}

#[tokio::test]
async fn term_orders_by_count_then_term() {
    let engine = tagged();
    let all = buckets(
        engine
            .collect(
                &Query::all_vertices()
                    .aggregate(vec![expr::term("tags", "tag", 0)])
                    .into_statements(),
            )
            .await
            .unwrap(),
    );
    assert_eq!(
        pairs(&all),
        vec![
            (Value::from("a"), 5.0),
            (Value::from("c"), 5.0),
            (Value::from("b"), 3.0),
        ]
    );
    assert!(all.iter().all(|b| b.name == "tags"));

    let top = buckets(
        engine
            .collect(
                &Query::all_vertices()
                    .aggregate(vec![expr::term("tags", "tag", 1)])
                    .into_statements(),
            )
            .await
            .unwrap(),
    );
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].value, 5.0);
}

#[tokio::test]
async fn histogram_buckets_cover_the_range() {
    let engine = tagged();
    let out = buckets(
        engine
            .collect(
                &Query::all_vertices()
                    .aggregate(vec![expr::histogram("scores", "score", 5.0)])
                    .into_statements(),
            )
            .await
            .unwrap(),
    );
    assert_eq!(
        pairs(&out),
        vec![
            (Value::Float(0.0), 4.0),
            (Value::Float(5.0), 5.0),
            (Value::Float(10.0), 4.0),
        ]
    );
}

#[tokio::test]
async fn histogram_emits_empty_gap_buckets() {
    let g = MemoryGraph::new();
    for (id, n) in [("x", 1.5), ("y", 42.0)] {
        g.insert_vertex(DataElement::vertex(id, "m").with_property("n", n)).unwrap();
    }
    let engine = Engine::new(Arc::new(g), EngineConfig::default());
    let out = buckets(
        engine
            .collect(
                &Query::all_vertices()
                    .aggregate(vec![expr::histogram("h", "n", 10.0)])
                    .into_statements(),
            )
            .await
            .unwrap(),
    );
    let counts: Vec<f64> = out.iter().map(|b| b.value).collect();
    assert_eq!(counts, vec![1.0, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(out[4].key, Value::Float(40.0));
}

#[tokio::test]
async fn percentiles_estimate_quantiles() {
    let engine = tagged();
    let out = buckets(
        engine
            .collect(
                &Query::all_vertices()
                    .aggregate(vec![expr::percentile("p", "score", vec![0.0, 50.0, 100.0])])
                    .into_statements(),
            )
            .await
            .unwrap(),
    );
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].key, Value::Float(0.0));
    assert_eq!(out[0].value, 1.0);
    assert!((out[1].value - 7.0).abs() <= 1.0, "median {}", out[1].value);
    assert_eq!(out[2].value, 13.0);
}

#[tokio::test]
async fn several_aggregations_share_one_pass() {
    let engine = tagged();
    let stmts = Query::all_vertices()
        .has(expr::neq("tag", "b"))
        .aggregate(vec![
            expr::count("n"),
            expr::term("tags", "tag", 0),
            expr::percentile("top", "score", vec![100.0]),
        ])
        .into_statements();
    let out = buckets(engine.collect(&stmts).await.unwrap());
    let names: Vec<&str> = out.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["n", "tags", "tags", "top"]);
    assert_eq!(out[0].value, 10.0);
    assert_eq!(out[3].value, 13.0);
}

#[tokio::test]
async fn empty_stream_aggregates_to_nothing_but_count() {
    let engine = tagged();
    let stmts = Query::all_vertices()
        .has_label(["missing"])
        .aggregate(vec![expr::term("t", "tag", 0), expr::count("n")])
        .into_statements();
    let out = buckets(engine.collect(&stmts).await.unwrap());
    assert_eq!(pairs(&out), vec![(Value::from("count"), 0.0)]);
}

#[tokio::test]
async fn histograms_ignore_infinities_and_refuse_huge_ranges() {
    let g = MemoryGraph::new();
    for (id, n) in [("x", 1.5), ("inf", f64::INFINITY), ("ninf", f64::NEG_INFINITY)] {
        g.insert_vertex(DataElement::vertex(id, "m").with_property("n", n)).unwrap();
    }
    let engine = Engine::new(Arc::new(g), EngineConfig::default());
    let stmts = Query::all_vertices()
        .aggregate(vec![expr::histogram("h", "n", 1.0)])
        .into_statements();
    let out = buckets(engine.collect(&stmts).await.unwrap());
    assert_eq!(pairs(&out), vec![(Value::Float(1.0), 1.0)]);

    let g = MemoryGraph::new();
    for (id, n) in [("lo", 0.0), ("hi", 1e15)] {
        g.insert_vertex(DataElement::vertex(id, "m").with_property("n", n)).unwrap();
    }
    let engine = Engine::new(Arc::new(g), EngineConfig::default());
    let stmts = Query::all_vertices()
        .aggregate(vec![expr::histogram("h", "n", 1.0), expr::count("n")])
        .into_statements();
    let out = buckets(engine.collect(&stmts).await.unwrap());
    assert_eq!(pairs(&out), vec![(Value::from("count"), 2.0)]);
}
