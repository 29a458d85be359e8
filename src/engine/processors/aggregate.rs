//! Aggregation stage.
//!
//! Travelers are buffered into batches and every batch is shared with one
//! task per aggregation. Each task owns its own term index or digest, so the
//! tasks never contend. Once the input is exhausted the buckets are emitted
//! aggregation by aggregation, in statement order.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tdigest::TDigest;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::send_or_cancel;
use crate::engine::manager::TempKv;
use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::error::{GraphError, Result};
use crate::index::TermIndex;
use crate::model::path::FieldPath;
use crate::model::{AggregationResult, Payload, Traveler, Value};
use crate::query::{Aggregation, AggregationKind};

type Batch = Arc<[Traveler]>;

/// Widest histogram a single aggregation may produce.
pub const MAX_HISTOGRAM_BUCKETS: u64 = 65_536;

const DIGEST_SIZE: usize = 100;

/// Computes a set of named aggregations over the stream.
#[derive(Debug, Clone)]
pub struct Aggregate {
    aggregations: Vec<Aggregation>,
}

impl Aggregate {
    /// Stage computing `aggregations`.
    pub fn new(aggregations: Vec<Aggregation>) -> Self {
        Self { aggregations }
    }
}

fn field_values<'a>(
    batch: &'a [Traveler],
    field: &'a FieldPath,
) -> impl Iterator<Item = Value> + 'a {
    batch.iter().filter_map(move |t| t.resolve(field))
}

fn numbers(value: &Value, out: &mut impl FnMut(f64)) {
    match value {
        Value::List(items) => {
            for item in items {
                numbers(item, out);
            }
        }
        other => {
            if let Some(n) = other.as_f64().filter(|n| n.is_finite()) {
                out(n);
            }
        }
    }
}

fn bucket(name: &str, key: Value, value: f64) -> AggregationResult {
    AggregationResult {
        name: name.to_owned(),
        key,
        value,
    }
}

/// Fixed-width buckets from `floor(min / interval) * interval` through the
/// maximum, including empty buckets between populated ones. Fails when the
/// range would need more than [`MAX_HISTOGRAM_BUCKETS`] buckets.
fn histogram_buckets(
    name: &str,
    interval: f64,
    counts: &[(f64, u64)],
) -> Result<Vec<AggregationResult>> {
    let (Some(&(min, _)), Some(&(max, _))) = (counts.first(), counts.last()) else {
        return Ok(Vec::new());
    };
    let start = (min / interval).floor() * interval;
    let last = ((max - start) / interval).floor();
    if !last.is_finite() || last >= MAX_HISTOGRAM_BUCKETS as f64 {
        return Err(GraphError::InvalidArgument(format!(
            "histogram {name} over [{min}, {max}] with interval {interval} exceeds \
             {MAX_HISTOGRAM_BUCKETS} buckets"
        )));
    }
    let steps = last as u64 + 1;
    let mut out = Vec::with_capacity(steps as usize);
    let mut pending = counts.iter().peekable();
    for step in 0..steps {
        let low = start + step as f64 * interval;
        let high = low + interval;
        let mut count = 0u64;
        while let Some(&&(value, n)) = pending.peek() {
            if value >= high && step + 1 < steps {
                break;
            }
            count += n;
            pending.next();
        }
        out.push(bucket(name, Value::Float(low), count as f64));
    }
    Ok(out)
}

async fn run_aggregation(
    agg: Aggregation,
    kv: Arc<dyn TempKv>,
    mut batches: mpsc::Receiver<Batch>,
) -> Result<Vec<AggregationResult>> {
    let name = agg.name.as_str();
    match &agg.kind {
        AggregationKind::Term { field, size } => {
            let field = FieldPath::parse(field);
            let mut index = TermIndex::new(kv);
            while let Some(batch) = batches.recv().await {
                for value in field_values(&batch, &field) {
                    index.add(&value)?;
                }
            }
            let mut terms = index.term_counts()?;
            if *size > 0 {
                terms.truncate(*size as usize);
            }
            Ok(terms
                .into_iter()
                .map(|(term, count)| bucket(name, term, count as f64))
                .collect())
        }
        AggregationKind::Histogram { field, interval } => {
            let field = FieldPath::parse(field);
            let mut index = TermIndex::new(kv);
            while let Some(batch) = batches.recv().await {
                for value in field_values(&batch, &field) {
                    index.add(&value)?;
                }
            }
            histogram_buckets(name, *interval, &index.numeric_counts()?)
        }
        AggregationKind::Percentile { field, percents } => {
            let field = FieldPath::parse(field);
            let mut digest = TDigest::new_with_size(DIGEST_SIZE);
            while let Some(batch) = batches.recv().await {
                let mut values = Vec::with_capacity(batch.len());
                for value in field_values(&batch, &field) {
                    numbers(&value, &mut |n| values.push(n));
                }
                if !values.is_empty() {
                    digest = digest.merge_unsorted(values);
                }
            }
            if digest.is_empty() {
                return Ok(Vec::new());
            }
            Ok(percents
                .iter()
                .map(|p| bucket(name, Value::Float(*p), digest.estimate_quantile(p / 100.0)))
                .collect())
        }
        AggregationKind::Count => {
            let mut count = 0u64;
            while let Some(batch) = batches.recv().await {
                count += batch.len() as u64;
            }
            Ok(vec![bucket(name, Value::from("count"), count as f64)])
        }
    }
}

#[async_trait]
impl Processor for Aggregate {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let mut senders = Vec::with_capacity(self.aggregations.len());
        let mut tasks: Vec<(String, JoinHandle<Result<Vec<AggregationResult>>>)> =
            Vec::with_capacity(self.aggregations.len());
        for agg in &self.aggregations {
            let (tx, rx) = mpsc::channel::<Batch>(4);
            senders.push(tx);
            let kv = ctx.manager.open_kv();
            tasks.push((agg.name.clone(), tokio::spawn(run_aggregation(agg.clone(), kv, rx))));
        }

        let size = ctx.config.aggregation_batch_size.max(1);
        let mut batch = Vec::with_capacity(size);
        let mut fed = 0u64;
        loop {
            let next = recv(&ctx, &mut input).await;
            let flush = match &next {
                None => !batch.is_empty(),
                Some(_) => batch.len() >= size,
            };
            if flush {
                let shared: Batch = std::mem::replace(&mut batch, Vec::with_capacity(size)).into();
                fed += shared.len() as u64;
                for tx in &senders {
                    // A closed receiver means that aggregation already failed.
                    if !send_or_cancel(tx, Arc::clone(&shared), &ctx.cancel).await
                        && ctx.cancel.is_cancelled()
                    {
                        return;
                    }
                }
            }
            match next {
                None => break,
                Some(t) if t.is_signal() => {
                    if !emit(&ctx, &output, t).await {
                        return;
                    }
                }
                Some(t) => batch.push(t),
            }
        }
        drop(senders);
        debug!(travelers = fed, aggregations = tasks.len(), "engine.aggregate.indexed");

        for (name, task) in tasks {
            let buckets = match task.await {
                Ok(Ok(buckets)) => buckets,
                Ok(Err(err)) => {
                    warn!(error = %err, aggregation = %name, "engine.aggregate.index_failed");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, aggregation = %name, "engine.aggregate.task_failed");
                    continue;
                }
            };
            if ctx.cancel.is_cancelled() {
                return;
            }
            for b in buckets {
                let traveler = Traveler::new().with_payload(Payload::Aggregation(b));
                if !emit(&ctx, &output, traveler).await {
                    return;
                }
            }
        }
    }
}
