//! Lookup batching on the engine side and batch resolution on the backend
//! side.
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{recv_or_cancel, send_or_cancel, LookupBatches, LookupResults};
use crate::error::Result;
use crate::model::{DataElement, ElementLookup};

/// Which slot of an [`ElementLookup`] a resolver fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupTarget {
    /// Resolved elements are vertices.
    Vertex,
    /// Resolved elements are edges.
    Edge,
}

/// Groups lookups into batches of at most `size`, flushing a partial batch
/// after `timeout` without new input. A signal flushes the batch it closes so
/// it never waits behind the timer.
pub fn batch_lookups(
    cancel: CancellationToken,
    mut input: mpsc::Receiver<ElementLookup>,
    size: usize,
    timeout: Duration,
) -> LookupBatches {
    let size = size.max(1);
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut batch: Vec<ElementLookup> = Vec::with_capacity(size);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                item = input.recv() => item,
                _ = tokio::time::sleep(timeout), if !batch.is_empty() => {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(size));
                    if !send_or_cancel(&tx, full, &cancel).await {
                        return;
                    }
                    continue;
                }
            };
            let Some(lookup) = next else {
                break;
            };
            let flush = lookup.is_signal();
            batch.push(lookup);
            if flush || batch.len() >= size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(size));
                if !send_or_cancel(&tx, full, &cancel).await {
                    return;
                }
            }
        }
        if !batch.is_empty() {
            send_or_cancel(&tx, batch, &cancel).await;
        }
    });
    rx
}

/// Builds a batch resolution channel from a per-id resolver.
///
/// Every request is resolved independently, so duplicate ids each receive
/// their own answers. A resolver error is logged and ends the stream.
pub fn resolve_batches<F, Fut>(
    cancel: CancellationToken,
    mut batches: LookupBatches,
    emit_null: bool,
    buffer: usize,
    target: LookupTarget,
    resolve: F,
) -> LookupResults
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<DataElement>>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        while let Some(batch) = recv_or_cancel(&mut batches, &cancel).await {
            debug!(size = batch.len(), "backend.batch.resolve");
            for req in batch {
                if req.is_signal() {
                    if !send_or_cancel(&tx, req, &cancel).await {
                        return;
                    }
                    continue;
                }
                let found = match resolve(req.id.clone()).await {
                    Ok(found) => found,
                    Err(err) => {
                        warn!(error = %err, id = %req.id, "backend.batch.resolve_failed");
                        return;
                    }
                };
                if found.is_empty() {
                    if emit_null && !send_or_cancel(&tx, req, &cancel).await {
                        return;
                    }
                    continue;
                }
                for element in found {
                    let resolved = match target {
                        LookupTarget::Vertex => req.with_vertex(element),
                        LookupTarget::Edge => req.with_edge(element),
                    };
                    if !send_or_cancel(&tx, resolved, &cancel).await {
                        return;
                    }
                }
            }
        }
    });
    rx
}
