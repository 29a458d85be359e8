//! Start and adjacency stages.
//!
//! Adjacency stages turn every traveler into an [`ElementLookup`] keyed by
//! the id to resolve, group lookups through the batcher and hand the batches
//! to one of the backend's resolution channels. A feeder task produces the
//! lookups while the stage task drains the resolved ones, so batching never
//! stalls the stage's input.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{
    batch_lookups, recv_or_cancel, send_or_cancel, Direction, GraphBackend, LookupBatches,
    LookupResults,
};
use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::model::{DataElement, ElementLookup, Traveler};

/// Starts from vertices by id, or from every vertex.
#[derive(Debug, Clone)]
pub struct LookupVerts {
    ids: Vec<String>,
    load: bool,
}

impl LookupVerts {
    /// Stage resolving `ids`; an empty list scans every vertex.
    pub fn new(ids: Vec<String>, load: bool) -> Self {
        Self { ids, load }
    }
}

#[async_trait]
impl Processor for LookupVerts {
    fn name(&self) -> &'static str {
        "LookupVerts"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            if t.is_signal() {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            if self.ids.is_empty() {
                let mut scan = Arc::clone(&ctx.graph).vertex_stream(ctx.cancel.clone(), self.load);
                while let Some(v) = recv_or_cancel(&mut scan, &ctx.cancel).await {
                    if !emit(&ctx, &output, t.with_current(Some(v))).await {
                        return;
                    }
                }
                continue;
            }
            for id in &self.ids {
                match ctx.graph.get_vertex(id, self.load).await {
                    Ok(Some(v)) => {
                        if !emit(&ctx, &output, t.with_current(Some(v))).await {
                            return;
                        }
                    }
                    Ok(None) => debug!(id = %id, "engine.lookup.vertex_missing"),
                    Err(err) => {
                        warn!(error = %err, id = %id, "engine.lookup.vertex_failed");
                        return;
                    }
                }
            }
        }
    }
}

/// Starts from edges by id, or from every edge.
#[derive(Debug, Clone)]
pub struct LookupEdges {
    ids: Vec<String>,
    load: bool,
}

impl LookupEdges {
    /// Stage resolving `ids`; an empty list scans every edge.
    pub fn new(ids: Vec<String>, load: bool) -> Self {
        Self { ids, load }
    }
}

#[async_trait]
impl Processor for LookupEdges {
    fn name(&self) -> &'static str {
        "LookupEdges"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            if t.is_signal() {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            if self.ids.is_empty() {
                let mut scan = Arc::clone(&ctx.graph).edge_stream(ctx.cancel.clone(), self.load);
                while let Some(e) = recv_or_cancel(&mut scan, &ctx.cancel).await {
                    if !emit(&ctx, &output, t.with_current(Some(e))).await {
                        return;
                    }
                }
                continue;
            }
            for id in &self.ids {
                match ctx.graph.get_edge(id, self.load).await {
                    Ok(Some(e)) => {
                        if !emit(&ctx, &output, t.with_current(Some(e))).await {
                            return;
                        }
                    }
                    Ok(None) => debug!(id = %id, "engine.lookup.edge_missing"),
                    Err(err) => {
                        warn!(error = %err, id = %id, "engine.lookup.edge_failed");
                        return;
                    }
                }
            }
        }
    }
}

/// Drains resolved lookups back into travelers. Signal lookups yield their
/// traveler untouched; unresolved ones yield a traveler with no current
/// element.
async fn drain(
    ctx: &ProcessContext,
    mut results: LookupResults,
    output: &mpsc::Sender<Traveler>,
    edges: bool,
) {
    while let Some(lookup) = recv_or_cancel(&mut results, &ctx.cancel).await {
        let traveler = if lookup.is_signal() {
            lookup.reference
        } else {
            let found = resolved(&lookup, edges);
            lookup.reference.with_current(found)
        };
        if !emit(ctx, output, traveler).await {
            return;
        }
    }
}

fn resolved(lookup: &ElementLookup, edges: bool) -> Option<DataElement> {
    if edges {
        lookup.edge.clone()
    } else {
        lookup.vertex.clone()
    }
}

/// Groups requests with the configured batch size and idle timeout.
fn batched(ctx: &ProcessContext, requests: mpsc::Receiver<ElementLookup>) -> LookupBatches {
    batch_lookups(
        ctx.cancel.clone(),
        requests,
        ctx.config.lookup_batch_size,
        ctx.config.lookup_batch_timeout,
    )
}

/// Starts from every vertex carrying one of the labels, read through the
/// backend's label index.
#[derive(Debug, Clone)]
pub struct LookupVertsIndex {
    labels: Vec<String>,
    load: bool,
}

impl LookupVertsIndex {
    /// Stage scanning the label index for `labels`.
    pub fn new(labels: Vec<String>, load: bool) -> Self {
        Self { labels, load }
    }
}

#[async_trait]
impl Processor for LookupVertsIndex {
    fn name(&self) -> &'static str {
        "LookupVertsIndex"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(ctx.config.buffer_size.max(1));
        let feeder_ctx = ctx.clone();
        let labels = self.labels.clone();
        tokio::spawn(async move {
            let ctx = feeder_ctx;
            while let Some(t) = recv(&ctx, &mut input).await {
                if t.is_signal() {
                    if !send_or_cancel(&req_tx, ElementLookup::signal(t), &ctx.cancel).await {
                        return;
                    }
                    continue;
                }
                for label in &labels {
                    let mut ids = Arc::clone(&ctx.graph)
                        .vertex_label_scan(ctx.cancel.clone(), label.clone());
                    while let Some(id) = recv_or_cancel(&mut ids, &ctx.cancel).await {
                        let lookup = ElementLookup::new(id, t.clone());
                        if !send_or_cancel(&req_tx, lookup, &ctx.cancel).await {
                            return;
                        }
                    }
                }
            }
        });
        let batches = batched(&ctx, req_rx);
        let results =
            Arc::clone(&ctx.graph).vertex_channel(ctx.cancel.clone(), batches, self.load, false);
        drain(&ctx, results, &output, false).await;
    }
}

/// What an adjacency stage moves the traveler onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hop {
    /// Vertices across edges of the given direction.
    Neighbor(Direction),
    /// Edges of the given direction.
    IncidentEdge(Direction),
    /// An endpoint of the current edge: `Out` reaches the destination, `In`
    /// the source.
    Endpoint(Direction),
}

/// Single-direction adjacency stage.
#[derive(Debug, Clone)]
pub struct AdjacencyLookup {
    hop: Hop,
    labels: Vec<String>,
    load: bool,
    emit_null: bool,
}

impl AdjacencyLookup {
    /// Stage following `hop` over edges labelled with one of `labels` (all
    /// edges when empty).
    pub fn new(hop: Hop, labels: Vec<String>, load: bool, emit_null: bool) -> Self {
        Self {
            hop,
            labels,
            load,
            emit_null,
        }
    }

    /// Id to resolve for `t`, or `None` when the traveler cannot move.
    fn lookup_key(&self, t: &Traveler) -> Option<String> {
        let current = t.current()?;
        match self.hop {
            Hop::Neighbor(_) | Hop::IncidentEdge(_) => Some(current.id.clone()),
            Hop::Endpoint(direction) => {
                if !self.labels.is_empty() && !self.labels.contains(&current.label) {
                    return None;
                }
                match direction {
                    Direction::Out => current.to.clone(),
                    Direction::In => current.from.clone(),
                }
            }
        }
    }

    fn resolve(&self, ctx: &ProcessContext, batches: LookupBatches) -> LookupResults {
        let graph: Arc<dyn GraphBackend> = Arc::clone(&ctx.graph);
        let cancel = ctx.cancel.clone();
        let labels = self.labels.clone();
        match self.hop {
            Hop::Neighbor(Direction::Out) => {
                graph.out_channel(cancel, batches, self.load, self.emit_null, labels)
            }
            Hop::Neighbor(Direction::In) => {
                graph.in_channel(cancel, batches, self.load, self.emit_null, labels)
            }
            Hop::IncidentEdge(Direction::Out) => {
                graph.out_edge_channel(cancel, batches, self.load, self.emit_null, labels)
            }
            Hop::IncidentEdge(Direction::In) => {
                graph.in_edge_channel(cancel, batches, self.load, self.emit_null, labels)
            }
            Hop::Endpoint(_) => graph.vertex_channel(cancel, batches, self.load, self.emit_null),
        }
    }
}

#[async_trait]
impl Processor for AdjacencyLookup {
    fn name(&self) -> &'static str {
        match self.hop {
            Hop::Neighbor(Direction::Out) => "Out",
            Hop::Neighbor(Direction::In) => "In",
            Hop::IncidentEdge(Direction::Out) => "OutE",
            Hop::IncidentEdge(Direction::In) => "InE",
            Hop::Endpoint(Direction::Out) => "EdgeTo",
            Hop::Endpoint(Direction::In) => "EdgeFrom",
        }
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(ctx.config.buffer_size.max(1));
        let feeder_ctx = ctx.clone();
        let feeder_out = output.clone();
        let stage = self.clone();
        tokio::spawn(async move {
            let ctx = feeder_ctx;
            while let Some(t) = recv(&ctx, &mut input).await {
                let lookup = if t.is_signal() {
                    ElementLookup::signal(t)
                } else {
                    match stage.lookup_key(&t) {
                        Some(id) => ElementLookup::new(id, t),
                        None => {
                            if stage.emit_null
                                && !emit(&ctx, &feeder_out, t.with_current(None)).await
                            {
                                return;
                            }
                            continue;
                        }
                    }
                };
                if !send_or_cancel(&req_tx, lookup, &ctx.cancel).await {
                    return;
                }
            }
        });
        let batches = batched(&ctx, req_rx);
        let results = self.resolve(&ctx, batches);
        let edges = matches!(self.hop, Hop::IncidentEdge(_));
        drain(&ctx, results, &output, edges).await;
    }
}

/// Follows both directions at once. The branches run concurrently and their
/// outputs interleave in no particular order.
///
/// With `emit_null` a traveler yields one unresolved copy only when neither
/// direction matches. Outbound misses are replayed through a second inbound
/// resolver that emits nothing but those nulls, so no per-traveler state is
/// kept.
#[derive(Debug, Clone)]
pub struct BothLookup {
    out: AdjacencyLookup,
    inbound: AdjacencyLookup,
    fallback: AdjacencyLookup,
}

impl BothLookup {
    /// Both-direction stage; `edges` selects incident edges, `on_edge`
    /// selects the endpoints of an edge instead of vertex neighbors.
    pub fn new(
        edges: bool,
        on_edge: bool,
        labels: Vec<String>,
        load: bool,
        emit_null: bool,
    ) -> Self {
        let hop = |direction| match (edges, on_edge) {
            (true, _) => Hop::IncidentEdge(direction),
            (false, true) => Hop::Endpoint(direction),
            (false, false) => Hop::Neighbor(direction),
        };
        Self {
            out: AdjacencyLookup::new(hop(Direction::Out), labels.clone(), load, emit_null),
            inbound: AdjacencyLookup::new(hop(Direction::In), labels.clone(), load, false),
            fallback: AdjacencyLookup::new(hop(Direction::In), labels, false, true),
        }
    }

    fn edges(&self) -> bool {
        matches!(self.out.hop, Hop::IncidentEdge(_))
    }

    /// Handles a traveler the outbound branch could not move: it is retried
    /// inbound when it has an inbound key, otherwise its null is final.
    async fn outbound_miss(
        &self,
        ctx: &ProcessContext,
        miss_tx: &mpsc::Sender<ElementLookup>,
        output: &mpsc::Sender<Traveler>,
        t: Traveler,
    ) -> bool {
        match self.fallback.lookup_key(&t) {
            Some(id) => send_or_cancel(miss_tx, ElementLookup::new(id, t), &ctx.cancel).await,
            None => emit(ctx, output, t.with_current(None)).await,
        }
    }
}

#[async_trait]
impl Processor for BothLookup {
    fn name(&self) -> &'static str {
        match self.out.hop {
            Hop::IncidentEdge(_) => "BothE",
            Hop::Endpoint(_) => "EdgeBoth",
            Hop::Neighbor(_) => "Both",
        }
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let buffer = ctx.config.buffer_size.max(1);
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        let (miss_tx, miss_rx) = mpsc::channel(buffer);
        let mut out_results = self.out.resolve(&ctx, batched(&ctx, out_rx));
        let in_results = self.inbound.resolve(&ctx, batched(&ctx, in_rx));
        let mut miss_results = self.fallback.resolve(&ctx, batched(&ctx, miss_rx));
        let edges = self.edges();
        let emit_null = self.out.emit_null;

        let split_miss_tx = miss_tx.clone();
        let splitter = async {
            while let Some(t) = recv(&ctx, &mut input).await {
                if t.is_signal() {
                    if !send_or_cancel(&out_tx, ElementLookup::signal(t), &ctx.cancel).await {
                        break;
                    }
                    continue;
                }
                if let Some(id) = self.inbound.lookup_key(&t) {
                    let lookup = ElementLookup::new(id, t.clone());
                    if !send_or_cancel(&in_tx, lookup, &ctx.cancel).await {
                        break;
                    }
                }
                let sent = match self.out.lookup_key(&t) {
                    Some(id) => {
                        send_or_cancel(&out_tx, ElementLookup::new(id, t), &ctx.cancel).await
                    }
                    None if emit_null => {
                        self.outbound_miss(&ctx, &split_miss_tx, &output, t).await
                    }
                    None => true,
                };
                if !sent {
                    break;
                }
            }
            drop(out_tx);
            drop(in_tx);
            drop(split_miss_tx);
        };

        let outward = async {
            while let Some(lookup) = recv_or_cancel(&mut out_results, &ctx.cancel).await {
                let sent = if lookup.is_signal() {
                    // Signals trail the outbound misses issued before them.
                    send_or_cancel(&miss_tx, lookup, &ctx.cancel).await
                } else {
                    match resolved(&lookup, edges) {
                        Some(found) => {
                            emit(&ctx, &output, lookup.reference.with_current(Some(found))).await
                        }
                        None => self.outbound_miss(&ctx, &miss_tx, &output, lookup.reference).await,
                    }
                };
                if !sent {
                    break;
                }
            }
            drop(miss_tx);
        };

        let misses = async {
            while let Some(lookup) = recv_or_cancel(&mut miss_results, &ctx.cancel).await {
                let traveler = if lookup.is_signal() {
                    lookup.reference
                } else if resolved(&lookup, edges).is_none() {
                    lookup.reference.with_current(None)
                } else {
                    // The inbound branch already emitted this match.
                    continue;
                };
                if !emit(&ctx, &output, traveler).await {
                    break;
                }
            }
        };

        tokio::join!(
            splitter,
            outward,
            drain(&ctx, in_results, &output, edges),
            misses,
        );
    }
}
