//! In-memory graph backend.
//!
//! Keeps vertices and edges in ordered maps with adjacency and label indexes.
//! Scans walk the maps in chunks under a short read lock so a cancelled
//! pipeline stops producing after at most one chunk.
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::{
    resolve_batches, send_or_cancel, Direction, GraphBackend, LookupBatches,
    LookupResults, LookupTarget,
};
use crate::error::{GraphError, Result};
use crate::model::{DataElement, Edge, GraphElement, Vertex};

const SCAN_CHUNK: usize = 64;

#[derive(Debug, Default)]
struct GraphState {
    vertices: BTreeMap<String, Vertex>,
    edges: BTreeMap<String, Edge>,
    out_edges: FxHashMap<String, Vec<String>>,
    in_edges: FxHashMap<String, Vec<String>>,
    labels: BTreeMap<String, BTreeSet<String>>,
}

impl GraphState {
    fn put_vertex(&mut self, vertex: Vertex) {
        if let Some(old) = self.vertices.get(&vertex.id) {
            if old.label != vertex.label {
                let old_label = old.label.clone();
                self.unindex_label(&old_label, &vertex.id);
            }
        }
        self.labels
            .entry(vertex.label.clone())
            .or_default()
            .insert(vertex.id.clone());
        self.vertices.insert(vertex.id.clone(), vertex);
    }

    fn unindex_label(&mut self, label: &str, id: &str) {
        if let Some(ids) = self.labels.get_mut(label) {
            ids.remove(id);
            if ids.is_empty() {
                self.labels.remove(label);
            }
        }
    }

    fn put_edge(&mut self, edge: Edge) {
        self.remove_edge(&edge.id);
        let (Some(from), Some(to)) = (edge.from.clone(), edge.to.clone()) else {
            return;
        };
        self.out_edges.entry(from).or_default().push(edge.id.clone());
        self.in_edges.entry(to).or_default().push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
    }

    fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let edge = self.edges.remove(id)?;
        if let Some(from) = &edge.from {
            detach(&mut self.out_edges, from, id);
        }
        if let Some(to) = &edge.to {
            detach(&mut self.in_edges, to, id);
        }
        Some(edge)
    }

    fn remove_vertex(&mut self, id: &str) -> Option<Vertex> {
        let vertex = self.vertices.remove(id)?;
        self.unindex_label(&vertex.label, id);
        let mut incident = self.out_edges.remove(id).unwrap_or_default();
        incident.extend(self.in_edges.remove(id).unwrap_or_default());
        for edge_id in incident {
            self.remove_edge(&edge_id);
        }
        Some(vertex)
    }

    fn neighbors(
        &self,
        id: &str,
        direction: Direction,
        target: LookupTarget,
        labels: &[String],
        load: bool,
    ) -> Vec<DataElement> {
        let adjacency = match direction {
            Direction::Out => &self.out_edges,
            Direction::In => &self.in_edges,
        };
        let Some(edge_ids) = adjacency.get(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for edge in edge_ids.iter().filter_map(|eid| self.edges.get(eid)) {
            if !labels.is_empty() && !labels.iter().any(|l| *l == edge.label) {
                continue;
            }
            match target {
                LookupTarget::Edge => out.push(shape(edge, load)),
                LookupTarget::Vertex => {
                    let other = match direction {
                        Direction::Out => edge.to.as_deref(),
                        Direction::In => edge.from.as_deref(),
                    };
                    if let Some(v) = other.and_then(|o| self.vertices.get(o)) {
                        out.push(shape(v, load));
                    }
                }
            }
        }
        out
    }
}

fn detach(index: &mut FxHashMap<String, Vec<String>>, vertex: &str, edge: &str) {
    if let Some(ids) = index.get_mut(vertex) {
        ids.retain(|e| e != edge);
        if ids.is_empty() {
            index.remove(vertex);
        }
    }
}

fn shape(element: &DataElement, load: bool) -> DataElement {
    if load {
        element.clone()
    } else {
        element.stub()
    }
}

/// Graph held entirely in memory.
#[derive(Debug)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
    buffer: usize,
    scanned: AtomicU64,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// Empty graph whose output channels hold 100 items.
    pub fn new() -> Self {
        Self::with_buffer(100)
    }

    /// Empty graph with a custom output channel capacity.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            buffer: buffer.max(1),
            scanned: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces a vertex.
    pub fn insert_vertex(&self, vertex: Vertex) -> Result<()> {
        vertex.validate_vertex()?;
        self.state.write().put_vertex(vertex);
        Ok(())
    }

    /// Inserts or replaces an edge.
    pub fn insert_edge(&self, edge: Edge) -> Result<()> {
        edge.validate_edge()?;
        self.state.write().put_edge(edge);
        Ok(())
    }

    /// Number of stored vertices.
    pub fn vertex_count(&self) -> usize {
        self.state.read().vertices.len()
    }

    /// Number of stored edges.
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    /// Elements handed out by full scans since creation.
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    fn scan<F>(self: Arc<Self>, cancel: CancellationToken, chunk: F) -> mpsc::Receiver<DataElement>
    where
        F: Fn(&GraphState, Bound<String>) -> Vec<DataElement> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(async move {
            let mut cursor = Bound::Unbounded;
            loop {
                let items = chunk(&self.state.read(), cursor.clone());
                let Some(last) = items.last() else {
                    return;
                };
                cursor = Bound::Excluded(last.id.clone());
                for item in items {
                    self.scanned.fetch_add(1, Ordering::Relaxed);
                    if !send_or_cancel(&tx, item, &cancel).await {
                        return;
                    }
                }
            }
        });
        rx
    }

    #[allow(clippy::too_many_arguments)]
    fn adjacency_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
        direction: Direction,
        target: LookupTarget,
    ) -> LookupResults {
        let buffer = self.buffer;
        let labels: Arc<[String]> = edge_labels.into();
        resolve_batches(cancel, reqs, emit_null, buffer, target, move |id| {
            let graph = Arc::clone(&self);
            let labels = Arc::clone(&labels);
            async move { Ok(graph.state.read().neighbors(&id, direction, target, &labels, load)) }
        })
    }
}

fn chunk_after(
    map: &BTreeMap<String, DataElement>,
    cursor: Bound<String>,
    load: bool,
) -> Vec<DataElement> {
    map.range((cursor, Bound::Unbounded))
        .take(SCAN_CHUNK)
        .map(|(_, el)| shape(el, load))
        .collect()
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    async fn get_vertex(&self, id: &str, load: bool) -> Result<Option<Vertex>> {
        Ok(self.state.read().vertices.get(id).map(|v| shape(v, load)))
    }

    async fn get_edge(&self, id: &str, load: bool) -> Result<Option<Edge>> {
        Ok(self.state.read().edges.get(id).map(|e| shape(e, load)))
    }

    fn vertex_stream(
        self: Arc<Self>,
        cancel: CancellationToken,
        load: bool,
    ) -> mpsc::Receiver<Vertex> {
        self.scan(cancel, move |st, cursor| chunk_after(&st.vertices, cursor, load))
    }

    fn edge_stream(self: Arc<Self>, cancel: CancellationToken, load: bool) -> mpsc::Receiver<Edge> {
        self.scan(cancel, move |st, cursor| chunk_after(&st.edges, cursor, load))
    }

    fn vertex_label_scan(
        self: Arc<Self>,
        cancel: CancellationToken,
        label: String,
    ) -> mpsc::Receiver<String> {
        let ids: Vec<String> = self
            .state
            .read()
            .labels
            .get(&label)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(async move {
            for id in ids {
                if !send_or_cancel(&tx, id, &cancel).await {
                    return;
                }
            }
        });
        rx
    }

    fn vertex_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
    ) -> LookupResults {
        let buffer = self.buffer;
        resolve_batches(cancel, reqs, emit_null, buffer, LookupTarget::Vertex, move |id| {
            let graph = Arc::clone(&self);
            async move {
                let st = graph.state.read();
                Ok(st.vertices.get(&id).map(|v| shape(v, load)).into_iter().collect())
            }
        })
    }

    fn edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
    ) -> LookupResults {
        let buffer = self.buffer;
        resolve_batches(cancel, reqs, emit_null, buffer, LookupTarget::Edge, move |id| {
            let graph = Arc::clone(&self);
            async move {
                let st = graph.state.read();
                Ok(st.edges.get(&id).map(|e| shape(e, load)).into_iter().collect())
            }
        })
    }

    fn out_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults {
        self.adjacency_channel(
            cancel,
            reqs,
            load,
            emit_null,
            edge_labels,
            Direction::Out,
            LookupTarget::Vertex,
        )
    }

    fn in_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults {
        self.adjacency_channel(
            cancel,
            reqs,
            load,
            emit_null,
            edge_labels,
            Direction::In,
            LookupTarget::Vertex,
        )
    }

    fn out_edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults {
        self.adjacency_channel(
            cancel,
            reqs,
            load,
            emit_null,
            edge_labels,
            Direction::Out,
            LookupTarget::Edge,
        )
    }

    fn in_edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults {
        self.adjacency_channel(
            cancel,
            reqs,
            load,
            emit_null,
            edge_labels,
            Direction::In,
            LookupTarget::Edge,
        )
    }

    async fn list_vertex_labels(&self) -> Result<Vec<String>> {
        Ok(self.state.read().labels.keys().cloned().collect())
    }

    async fn list_edge_labels(&self) -> Result<Vec<String>> {
        let st = self.state.read();
        let labels: BTreeSet<&String> = st.edges.values().map(|e| &e.label).collect();
        Ok(labels.into_iter().cloned().collect())
    }

    async fn add_vertices(&self, vertices: Vec<Vertex>) -> Result<()> {
        for v in &vertices {
            v.validate_vertex()?;
        }
        let mut st = self.state.write();
        for v in vertices {
            st.put_vertex(v);
        }
        Ok(())
    }

    async fn add_edges(&self, edges: Vec<Edge>) -> Result<()> {
        for e in &edges {
            e.validate_edge()?;
        }
        let mut st = self.state.write();
        for e in edges {
            st.put_edge(e);
        }
        Ok(())
    }

    async fn delete_vertex(&self, id: &str) -> Result<()> {
        self.state
            .write()
            .remove_vertex(id)
            .map(|_| ())
            .ok_or_else(|| GraphError::NotFound {
                kind: "vertex",
                id: id.to_owned(),
            })
    }

    async fn delete_edge(&self, id: &str) -> Result<()> {
        self.state
            .write()
            .remove_edge(id)
            .map(|_| ())
            .ok_or_else(|| GraphError::NotFound {
                kind: "edge",
                id: id.to_owned(),
            })
    }

    async fn bulk_add(&self, mut elements: mpsc::Receiver<GraphElement>) -> Result<u64> {
        let mut stored = 0u64;
        while let Some(element) = elements.recv().await {
            let outcome = match element {
                GraphElement::Vertex(v) => self.insert_vertex(v),
                GraphElement::Edge(e) => self.insert_edge(e),
            };
            match outcome {
                Ok(()) => stored += 1,
                Err(err) => warn!(error = %err, "backend.memory.bulk_add_skipped"),
            }
        }
        Ok(stored)
    }
}
