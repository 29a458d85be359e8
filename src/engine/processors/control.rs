//! Positional and counting stages.
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::model::{Payload, Traveler};

/// Forwards travelers at positions `start..stop`.
///
/// Once `stop` is reached the upstream stages are cancelled so they stop
/// producing, and the stage returns. Signals are forwarded and take no
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: u64,
    stop: Option<u64>,
    kind: &'static str,
}

impl Range {
    /// `Limit(n)`.
    pub fn limit(n: u64) -> Self {
        Self {
            start: 0,
            stop: Some(n),
            kind: "Limit",
        }
    }

    /// `Skip(n)`.
    pub fn skip(n: u64) -> Self {
        Self {
            start: n,
            stop: None,
            kind: "Skip",
        }
    }

    /// `Range(start, stop)`; a negative stop is unbounded.
    pub fn new(start: u64, stop: i64) -> Self {
        Self {
            start,
            stop: u64::try_from(stop).ok(),
            kind: "Range",
        }
    }
}

#[async_trait]
impl Processor for Range {
    fn name(&self) -> &'static str {
        self.kind
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let mut position = 0u64;
        loop {
            if self.stop.is_some_and(|stop| position >= stop) {
                debug!(stage = self.kind, position, "engine.range.upstream_cancelled");
                ctx.upstream.cancel();
                return;
            }
            let Some(t) = recv(&ctx, &mut input).await else {
                return;
            };
            if t.is_signal() {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            let forward = position >= self.start;
            position += 1;
            if forward && !emit(&ctx, &output, t).await {
                return;
            }
        }
    }
}

/// Replaces the stream with the number of travelers it carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountStage;

#[async_trait]
impl Processor for CountStage {
    fn name(&self) -> &'static str {
        "Count"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let mut count = 0u64;
        while let Some(t) = recv(&ctx, &mut input).await {
            if t.is_signal() {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            count += 1;
        }
        if ctx.cancel.is_cancelled() {
            return;
        }
        emit(&ctx, &output, Traveler::new().with_payload(Payload::Count(count))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryGraph;
    use crate::engine::processors::testing::{at, context, run_stage};
    use crate::model::DataElement;
    use std::sync::Arc;

    fn inputs(n: usize) -> Vec<Traveler> {
        (0..n)
            .map(|i| at(DataElement::vertex(i.to_string(), "v")))
            .collect()
    }

    fn ids(out: &[Traveler]) -> Vec<String> {
        out.iter()
            .filter_map(|t| t.current().map(|c| c.id.clone()))
            .collect()
    }

    #[tokio::test]
    async fn limit_cancels_upstream_once_reached() {
        let ctx = context(Arc::new(MemoryGraph::new()));
        let out = run_stage(&Range::limit(2), ctx.clone(), inputs(5)).await;
        assert_eq!(ids(&out), vec!["0", "1"]);
        assert!(ctx.upstream.is_cancelled());
        assert!(!ctx.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn skip_and_range_windows() {
        let ctx = || context(Arc::new(MemoryGraph::new()));
        let out = run_stage(&Range::skip(3), ctx(), inputs(5)).await;
        assert_eq!(ids(&out), vec!["3", "4"]);

        let c = ctx();
        let out = run_stage(&Range::new(1, 3), c.clone(), inputs(5)).await;
        assert_eq!(ids(&out), vec!["1", "2"]);
        assert!(c.upstream.is_cancelled());

        let c = ctx();
        let out = run_stage(&Range::new(2, -1), c.clone(), inputs(4)).await;
        assert_eq!(ids(&out), vec!["2", "3"]);
        assert!(!c.upstream.is_cancelled());
    }

    #[tokio::test]
    async fn count_ignores_signals() {
        let ctx = context(Arc::new(MemoryGraph::new()));
        let mut input = inputs(3);
        input.insert(1, Traveler::signal(4));
        let out = run_stage(&CountStage, ctx, input).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_signal());
        assert_eq!(out[1].payload(), Some(&Payload::Count(3)));
    }
}
