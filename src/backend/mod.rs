#![forbid(unsafe_code)]

//! Data-access contract every storage backend implements.
//!
//! The engine never touches storage directly. Point lookups and mutations are
//! plain async calls; scans and batched lookups are channel based so a backend
//! can stream results while the pipeline consumes them. Every channel-producing
//! method receives the pipeline's [`CancellationToken`] and must stop at the
//! next blocking send once it fires.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::{Edge, ElementLookup, GraphElement, Vertex};

pub mod batch;
pub mod memory;

pub use batch::{batch_lookups, resolve_batches, LookupTarget};
pub use memory::MemoryGraph;

/// Stream of lookup batches handed to a backend.
pub type LookupBatches = mpsc::Receiver<Vec<ElementLookup>>;

/// Stream of resolved lookups returned by a backend.
pub type LookupResults = mpsc::Receiver<ElementLookup>;

/// Edge direction followed by an adjacency lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From source to destination.
    Out,
    /// From destination to source.
    In,
}

/// Storage backend consumed by the engine.
///
/// Batched lookup channels follow one protocol: every non-signal request is
/// answered once per match, correlated through its back-reference; requests
/// without a match are dropped, or returned unresolved when `emit_null` is
/// set; signal requests pass through untouched; `load == false` allows
/// returning identity-only elements.
#[async_trait]
pub trait GraphBackend: Send + Sync + fmt::Debug + 'static {
    /// Fetches one vertex.
    async fn get_vertex(&self, id: &str, load: bool) -> Result<Option<Vertex>>;

    /// Fetches one edge.
    async fn get_edge(&self, id: &str, load: bool) -> Result<Option<Edge>>;

    /// Streams every vertex, in no particular order.
    fn vertex_stream(
        self: Arc<Self>,
        cancel: CancellationToken,
        load: bool,
    ) -> mpsc::Receiver<Vertex>;

    /// Streams every edge, in no particular order.
    fn edge_stream(self: Arc<Self>, cancel: CancellationToken, load: bool) -> mpsc::Receiver<Edge>;

    /// Streams ids of vertices carrying `label`.
    fn vertex_label_scan(
        self: Arc<Self>,
        cancel: CancellationToken,
        label: String,
    ) -> mpsc::Receiver<String>;

    /// Resolves request ids as vertex ids.
    fn vertex_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
    ) -> LookupResults;

    /// Resolves request ids as edge ids.
    fn edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
    ) -> LookupResults;

    /// Resolves the destination vertices of edges leaving each request id.
    fn out_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults;

    /// Resolves the source vertices of edges entering each request id.
    fn in_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults;

    /// Resolves edges leaving each request id.
    fn out_edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults;

    /// Resolves edges entering each request id.
    fn in_edge_channel(
        self: Arc<Self>,
        cancel: CancellationToken,
        reqs: LookupBatches,
        load: bool,
        emit_null: bool,
        edge_labels: Vec<String>,
    ) -> LookupResults;

    /// Distinct vertex labels.
    async fn list_vertex_labels(&self) -> Result<Vec<String>>;

    /// Distinct edge labels.
    async fn list_edge_labels(&self) -> Result<Vec<String>>;

    /// Inserts or replaces vertices.
    async fn add_vertices(&self, vertices: Vec<Vertex>) -> Result<()>;

    /// Inserts or replaces edges.
    async fn add_edges(&self, edges: Vec<Edge>) -> Result<()>;

    /// Removes a vertex and its incident edges.
    async fn delete_vertex(&self, id: &str) -> Result<()>;

    /// Removes an edge.
    async fn delete_edge(&self, id: &str) -> Result<()>;

    /// Inserts everything received on `elements`; returns the number stored.
    async fn bulk_add(&self, elements: mpsc::Receiver<GraphElement>) -> Result<u64>;
}

/// Sends `item` unless the token fires first. Returns false when the item was
/// not delivered, either through cancellation or a closed receiver.
pub async fn send_or_cancel<T: Send>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Receives the next item unless the token fires first.
pub async fn recv_or_cancel<T: Send>(
    rx: &mut mpsc::Receiver<T>,
    cancel: &CancellationToken,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}
