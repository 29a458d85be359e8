//! Pipeline stages.
//!
//! Every stage runs as its own task, reading travelers from a bounded queue
//! and writing to the next one. A stage returns once its input is exhausted
//! or its cancellation token fires; returning drops the output sender, which
//! closes the queue for the stage downstream. Signal travelers are forwarded
//! untouched by every stage.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{recv_or_cancel, send_or_cancel, GraphBackend};
use crate::config::EngineConfig;
use crate::engine::manager::Manager;
use crate::engine::profile::StageStats;
use crate::model::Traveler;

pub mod aggregate;
pub mod control;
pub mod filter;
pub mod lookup;
pub mod marks;
pub mod project;

pub use aggregate::Aggregate;
pub use control::{CountStage, Range};
pub use filter::{Distinct, Filter, Predicate};
pub use lookup::{AdjacencyLookup, BothLookup, Hop, LookupEdges, LookupVerts, LookupVertsIndex};
pub use marks::{Jump, Mark, Select};
pub use project::{Fields, Increment, PathStage, Render, Set, Unwind};

/// Everything a stage needs besides its queues.
#[derive(Clone)]
pub struct ProcessContext {
    /// Backend the pipeline reads from.
    pub graph: Arc<dyn GraphBackend>,
    /// Fires when this stage must stop.
    pub cancel: CancellationToken,
    /// Token of the stage feeding this one. Cancelling it stops every
    /// upstream stage while leaving this one and everything downstream
    /// running.
    pub upstream: CancellationToken,
    /// Scratch storage scoped to this execution.
    pub manager: Manager,
    /// Engine settings.
    pub config: Arc<EngineConfig>,
    /// Profiling counters, when enabled.
    pub stats: Option<Arc<StageStats>>,
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("manager", &self.manager)
            .field("profiled", &self.stats.is_some())
            .finish()
    }
}

/// One stage of a compiled pipeline.
#[async_trait]
pub trait Processor: Send + Sync + fmt::Debug {
    /// Stage name used in logs and profiles.
    fn name(&self) -> &'static str;

    /// Runs the stage to completion.
    async fn process(
        &self,
        ctx: ProcessContext,
        input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    );
}

/// Next input traveler, or `None` once the input is closed or the stage is
/// cancelled.
pub(crate) async fn recv(
    ctx: &ProcessContext,
    input: &mut mpsc::Receiver<Traveler>,
) -> Option<Traveler> {
    recv_or_cancel(input, &ctx.cancel).await
}

/// Hands a traveler downstream. Returns false when the stage must stop.
pub(crate) async fn emit(
    ctx: &ProcessContext,
    output: &mpsc::Sender<Traveler>,
    traveler: Traveler,
) -> bool {
    let sent = send_or_cancel(output, traveler, &ctx.cancel).await;
    if sent {
        if let Some(stats) = &ctx.stats {
            stats.record_emit();
        }
    }
    sent
}
