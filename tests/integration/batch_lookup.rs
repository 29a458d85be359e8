use std::sync::Arc;
use std::time::Duration;

use gravel::backend::{batch_lookups, resolve_batches, LookupTarget};
use gravel::model::ElementLookup;
use gravel::{DataElement, GraphBackend, GraphError, MemoryGraph, Traveler};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn graph() -> Arc<MemoryGraph> {
    let g = MemoryGraph::new();
    for id in ["a", "b", "c"] {
        g.insert_vertex(DataElement::vertex(id, "node")).unwrap();
    }
    g.insert_edge(DataElement::edge("ab", "link", "a", "b")).unwrap();
    g.insert_edge(DataElement::edge("ac", "link", "a", "c")).unwrap();
    Arc::new(g)
}

/// Request whose back-reference sits on a vertex named after `tag`.
fn request(id: &str, tag: &str) -> ElementLookup {
    let reference = Traveler::new().with_current(Some(DataElement::vertex(tag, "ref")));
    ElementLookup::new(id, reference)
}

fn tag(lookup: &ElementLookup) -> String {
    lookup
        .reference
        .current()
        .map(|el| el.id.clone())
        .unwrap_or_default()
}

async fn drain(mut rx: mpsc::Receiver<ElementLookup>) -> Vec<ElementLookup> {
    let mut out = Vec::new();
    while let Some(item) = rx.recv().await {
        out.push(item);
    }
    out
}

async fn feed(requests: Vec<ElementLookup>) -> mpsc::Receiver<ElementLookup> {
    let (tx, rx) = mpsc::channel(requests.len().max(1));
    for req in requests {
        tx.send(req).await.unwrap();
    }
    rx
}

#[tokio::test]
async fn duplicates_each_get_their_own_answer() {
    let g = graph();
    let cancel = CancellationToken::new();
    let requests = vec![
        request("a", "r1"),
        request("b", "r2"),
        request("a", "r3"),
        request("missing", "r4"),
        request("a", "r5"),
    ];
    let batches = batch_lookups(cancel.clone(), feed(requests).await, 2, Duration::from_millis(1));
    let out = drain(Arc::clone(&g).vertex_channel(cancel, batches, true, false)).await;

    let mut got: Vec<(String, String)> = out
        .iter()
        .map(|l| (tag(l), l.vertex.as_ref().unwrap().id.clone()))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            ("r1".to_string(), "a".to_string()),
            ("r2".to_string(), "b".to_string()),
            ("r3".to_string(), "a".to_string()),
            ("r5".to_string(), "a".to_string()),
        ]
    );
}

#[tokio::test]
async fn neighbors_fan_out_per_request() {
    let g = graph();
    let cancel = CancellationToken::new();
    let batches = batch_lookups(
        cancel.clone(),
        feed(vec![request("a", "r1"), request("a", "r2"), request("b", "r3")]).await,
        10,
        Duration::from_millis(1),
    );
    let out = drain(Arc::clone(&g).out_channel(cancel, batches, false, true, vec![])).await;

    let mut got: Vec<(String, Option<String>)> = out
        .iter()
        .map(|l| (tag(l), l.vertex.as_ref().map(|v| v.id.clone())))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            ("r1".to_string(), Some("b".to_string())),
            ("r1".to_string(), Some("c".to_string())),
            ("r2".to_string(), Some("b".to_string())),
            ("r2".to_string(), Some("c".to_string())),
            ("r3".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn signals_survive_batching_in_order() {
    let cancel = CancellationToken::new();
    let requests = vec![
        request("a", "r1"),
        ElementLookup::signal(Traveler::signal(1)),
        request("b", "r2"),
        ElementLookup::signal(Traveler::signal(2)),
    ];
    let mut batches = batch_lookups(cancel, feed(requests).await, 100, Duration::from_secs(60));
    let first = batches.recv().await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first[1].is_signal());
    let second = batches.recv().await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second[1].is_signal());
}

#[tokio::test]
async fn resolver_errors_end_the_stream() {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);
    tx.send(vec![request("ok", "r1"), request("bad", "r2"), request("ok", "r3")])
        .await
        .unwrap();
    drop(tx);
    let out = drain(resolve_batches(cancel, rx, false, 4, LookupTarget::Edge, |id| async move {
        if id == "bad" {
            return Err(GraphError::InvalidArgument("bad id".into()));
        }
        Ok(vec![DataElement::edge(id, "l", "x", "y")])
    }))
    .await;
    assert_eq!(out.len(), 1);
    assert_eq!(tag(&out[0]), "r1");
    assert_eq!(out[0].edge.as_ref().unwrap().id, "ok");
}
