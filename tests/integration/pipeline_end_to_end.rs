use std::sync::Arc;

use gravel::model::{PathStep, Payload};
use gravel::query::{Adjacency, Statement};
use gravel::{
    expr, DataElement, Engine, EngineConfig, GraphBackend, MemoryGraph, Query, QueryResult,
    Traveler, Value,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn company_graph() -> Arc<MemoryGraph> {
    gravel::telemetry::init_tracing("gravel=debug");
    let g = MemoryGraph::new();
    g.insert_vertex(DataElement::vertex("A", "person").with_property("name", "ann"))
        .unwrap();
    g.insert_vertex(DataElement::vertex("B", "person").with_property("name", "bob"))
        .unwrap();
    g.insert_vertex(DataElement::vertex("C", "company").with_property("name", "acme"))
        .unwrap();
    g.insert_edge(DataElement::edge("AC", "works_at", "A", "C").with_property("since", 2019))
        .unwrap();
    Arc::new(g)
}

fn ids(results: &[QueryResult]) -> Vec<Option<String>> {
    results
        .iter()
        .map(|r| match r {
            QueryResult::Vertex(el) | QueryResult::Edge(el) => el.as_ref().map(|e| e.id.clone()),
            other => panic!("unexpected result {other:?}"),
        })
        .collect()
}

fn some(ids: &[&str]) -> Vec<Option<String>> {
    ids.iter().map(|id| Some(id.to_string())).collect()
}

#[tokio::test]
async fn people_to_employers() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let employers = Query::all_vertices().has_label(["person"]).out(["works_at"]);
    let out = engine.collect(employers.statements()).await.unwrap();
    assert_eq!(ids(&out), some(&["C"]));
    assert_eq!(out[0].element().unwrap().data["name"], Value::from("acme"));

    let counted = engine.collect(&employers.count().into_statements()).await.unwrap();
    assert_eq!(counted, vec![QueryResult::Count(1)]);
}

#[tokio::test]
async fn edges_and_their_endpoints() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let edges = engine
        .collect(&Query::v(["A"]).out_e(Vec::<String>::new()).into_statements())
        .await
        .unwrap();
    assert!(matches!(
        &edges[0],
        QueryResult::Edge(Some(e)) if e.id == "AC" && e.data["since"] == Value::Int(2019)
    ));

    let back = engine
        .collect(&Query::e(["AC"]).in_(Vec::<String>::new()).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&back), some(&["A"]));

    let both = engine
        .collect(&Query::v(["C"]).both(Vec::<String>::new()).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&both), some(&["A"]));
}

#[tokio::test]
async fn emit_null_yields_one_empty_traveler() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let with_null = engine
        .collect(&Query::v(["B"]).out_null(["works_at"]).into_statements())
        .await
        .unwrap();
    assert_eq!(with_null, vec![QueryResult::Vertex(None)]);

    let without = engine
        .collect(&Query::v(["B"]).out(["works_at"]).into_statements())
        .await
        .unwrap();
    assert!(without.is_empty());

    let matched = engine
        .collect(&Query::v(["A"]).out_null(["works_at"]).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&matched), some(&["C"]));
}

#[tokio::test]
async fn both_emits_null_only_when_no_direction_matches() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let any = || Adjacency::labels(Vec::<String>::new()).or_null();
    let both = |id: &str| {
        Query::v([id])
            .then(Statement::Both(any()))
            .into_statements()
    };
    let both_e = |id: &str| {
        Query::v([id])
            .then(Statement::BothE(any()))
            .into_statements()
    };

    assert_eq!(ids(&engine.collect(&both("A")).await.unwrap()), some(&["C"]));
    assert_eq!(ids(&engine.collect(&both("C")).await.unwrap()), some(&["A"]));
    assert_eq!(
        engine.collect(&both("B")).await.unwrap(),
        vec![QueryResult::Vertex(None)]
    );
    assert_eq!(ids(&engine.collect(&both_e("A")).await.unwrap()), some(&["AC"]));
    assert_eq!(
        engine.collect(&both_e("B")).await.unwrap(),
        vec![QueryResult::Edge(None)]
    );
}

#[tokio::test]
async fn limit_stops_the_scan_early() {
    let g = MemoryGraph::new();
    for i in 0..10_000 {
        g.insert_vertex(DataElement::vertex(format!("v{i:05}"), "n")).unwrap();
    }
    let g = Arc::new(g);
    let engine = Engine::new(g.clone(), EngineConfig::low_latency());
    let out = engine
        .collect(&Query::all_vertices().limit(5).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["v00000", "v00001", "v00002", "v00003", "v00004"]));
    assert!(g.scanned() < 500, "scanned {}", g.scanned());
}

#[tokio::test]
async fn range_windows_the_stream() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let out = engine
        .collect(&Query::all_vertices().range(1, 2).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["B"]));
    let out = engine
        .collect(&Query::all_vertices().skip(2).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["C"]));
}

#[tokio::test]
async fn distinct_keeps_first_occurrences() {
    let g = MemoryGraph::new();
    let cities = [Some("oslo"), Some("rome"), None, Some("oslo"), None, Some("rome"), Some("lima")];
    for (i, city) in cities.iter().enumerate() {
        let mut v = DataElement::vertex(format!("p{i}"), "person");
        if let Some(city) = city {
            v = v.with_property("city", *city);
        }
        g.insert_vertex(v).unwrap();
    }
    let engine = Engine::new(Arc::new(g), EngineConfig::default());
    let out = engine
        .collect(&Query::all_vertices().distinct(["city"]).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["p0", "p1", "p2", "p4", "p6"]));
}

#[tokio::test]
async fn between_is_half_open() {
    let g = MemoryGraph::new();
    for (id, age) in [("lo", 10), ("mid", 15), ("hi", 20)] {
        g.insert_vertex(DataElement::vertex(id, "person").with_property("age", age))
            .unwrap();
    }
    let engine = Engine::new(Arc::new(g), EngineConfig::default());
    let out = engine
        .collect(&Query::all_vertices().has(expr::between("age", 10, 20)).into_statements())
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["lo", "mid"]));

    let out = engine
        .collect(&Query::all_vertices().has(expr::gt("age", "12")).into_statements())
        .await
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn marks_select_and_render() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let out = engine
        .collect(
            &Query::all_vertices()
                .has_label(["person"])
                .mark("p")
                .out(["works_at"])
                .select(["p"])
                .into_statements(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&out), some(&["A"]));
    assert_eq!(out[0].element().unwrap().data["name"], Value::from("ann"));

    let template: Value = serde_json::from_str(r#"{"who": "$p.name", "at": "$.name"}"#).unwrap();
    let out = engine
        .collect(
            &Query::v(["A"])
                .mark("p")
                .out(["works_at"])
                .render(template)
                .into_statements(),
        )
        .await
        .unwrap();
    let expected: Value = serde_json::from_str(r#"{"who": "ann", "at": "acme"}"#).unwrap();
    assert_eq!(out, vec![QueryResult::Render(expected)]);

    let out = engine
        .collect(
            &Query::v(["A"])
                .out_e(["works_at"])
                .out(Vec::<String>::new())
                .path()
                .into_statements(),
        )
        .await
        .unwrap();
    assert_eq!(
        out,
        vec![QueryResult::Path(vec![
            PathStep::Vertex("A".into()),
            PathStep::Edge("AC".into()),
            PathStep::Vertex("C".into()),
        ])]
    );
}

#[tokio::test]
async fn extension_pipelines_pass_signals_through() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let base = engine.compile(&Query::all_vertices().into_statements()).unwrap();
    let ext = base.extension_context();

    let (tx, rx) = mpsc::channel(8);
    let at = |id: &str| Traveler::new().with_current(Some(DataElement::vertex(id, "person")));
    for t in [Traveler::signal(1), at("A"), Traveler::signal(2), at("B"), Traveler::signal(3)] {
        tx.send(t).await.unwrap();
    }
    drop(tx);

    // Raw stage output keeps signals in place.
    let tail = engine
        .compile_extension(&Query::extend(vec![]).out_null(["works_at"]).into_statements(), &ext)
        .unwrap();
    let (raw_tx, raw_rx) = mpsc::channel(8);
    for t in [Traveler::signal(7), at("A")] {
        raw_tx.send(t).await.unwrap();
    }
    drop(raw_tx);
    let mut running = gravel::engine::start(&tail, &CancellationToken::new(), Some(raw_rx));
    let mut raw = Vec::new();
    while let Some(t) = running.next().await {
        raw.push(t);
    }
    running.finish().await;
    let signals: Vec<u64> = raw.iter().filter_map(|t| t.get_signal()).map(|s| s.id).collect();
    assert_eq!(signals, vec![7]);
    assert_eq!(raw.iter().filter(|t| !t.is_signal()).count(), 1);

    let mut results = engine
        .query_extension(
            &Query::extend(vec![]).out_null(["works_at"]).into_statements(),
            &ext,
            rx,
            CancellationToken::new(),
        )
        .unwrap();
    let mut out = Vec::new();
    while let Some(r) = results.recv().await {
        out.push(r);
    }
    let mut got = ids(&out);
    got.sort();
    assert_eq!(got, vec![None, Some("C".to_string())]);
}

#[tokio::test]
async fn count_payload_reaches_raw_output() {
    let engine = Engine::new(company_graph(), EngineConfig::default());
    let pipeline = engine.compile(&Query::all_vertices().count().into_statements()).unwrap();
    let mut running = gravel::engine::start(&pipeline, &CancellationToken::new(), None);
    let t = running.next().await.unwrap();
    assert_eq!(t.payload(), Some(&Payload::Count(3)));
    assert!(running.next().await.is_none());
    running.finish().await;
}

#[tokio::test]
async fn mutations_apply_to_copies() {
    let g = company_graph();
    let engine = Engine::new(g.clone(), EngineConfig::default());
    let out = engine
        .collect(
            &Query::v(["A"])
                .set("city", "oslo")
                .increment("visits", 2)
                .increment("visits", 3)
                .into_statements(),
        )
        .await
        .unwrap();
    let el = out[0].element().unwrap();
    assert_eq!(el.data["city"], Value::from("oslo"));
    assert_eq!(el.data["visits"], Value::Int(5));
    let stored = g.get_vertex("A", true).await.unwrap().unwrap();
    assert!(!stored.data.contains_key("city"));
}
