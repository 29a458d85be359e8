//! Wires compiled stages into running tasks and drains their output.
//!
//! Every stage gets its own task and its own cancellation token. The tokens
//! form a chain from the last stage back to the first: a stage's token is a
//! child of the token of the stage after it, so cancelling a stage stops it
//! and everything upstream while leaving the downstream stages running. The
//! token of the last stage is a child of the caller's token.
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{recv_or_cancel, send_or_cancel, GraphBackend};
use crate::engine::compiler::Pipeline;
use crate::engine::manager::Manager;
use crate::engine::processors::ProcessContext;
use crate::engine::profile::{profiling_enabled, PipelineProfile, StageProfile};
use crate::engine::state::DataType;
use crate::error::Result;
use crate::model::{DataElement, Payload, QueryResult, Traveler};

/// Stages of one pipeline execution, running in the background.
#[derive(Debug)]
pub struct RunningPipeline {
    output: mpsc::Receiver<Traveler>,
    tasks: Vec<JoinHandle<()>>,
    root: CancellationToken,
    manager: Manager,
    profile: Option<PipelineProfile>,
}

impl RunningPipeline {
    /// Next traveler leaving the last stage, signals included.
    pub async fn next(&mut self) -> Option<Traveler> {
        self.output.recv().await
    }

    /// Stops every stage. Already emitted travelers stay readable.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// Per-stage counters, when profiling is on.
    pub fn profile(&self) -> Option<Vec<StageProfile>> {
        self.profile.as_ref().map(PipelineProfile::snapshot)
    }

    /// Stops whatever is still running, waits for every stage task and
    /// releases the execution's scratch stores.
    pub async fn finish(self) {
        let RunningPipeline {
            output,
            tasks,
            root,
            manager,
            profile,
        } = self;
        drop(output);
        root.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "engine.pipeline.stage_panicked");
            }
        }
        if let Some(profile) = &profile {
            profile.log();
        }
        manager.cleanup();
    }
}

/// Spawns one task per stage.
///
/// Without `input` the first stage receives a single empty traveler;
/// extension pipelines pass the output of the pipeline they continue.
pub fn start(
    pipeline: &Pipeline,
    cancel: &CancellationToken,
    input: Option<mpsc::Receiver<Traveler>>,
) -> RunningPipeline {
    let mut input = input.unwrap_or_else(|| {
        let (tx, rx) = mpsc::channel(1);
        // A fresh channel always has room for one item.
        let _ = tx.try_send(Traveler::new());
        rx
    });

    let root = cancel.child_token();
    let count = pipeline.processors.len();
    let mut tokens: Vec<CancellationToken> = Vec::with_capacity(count);
    let mut next = root.clone();
    for _ in 0..count {
        let token = next.child_token();
        tokens.push(token.clone());
        next = token;
    }
    tokens.reverse();

    let manager = Manager::new();
    let mut profile =
        (pipeline.config.profile || profiling_enabled()).then(PipelineProfile::default);
    let buffer = pipeline.config.buffer_size.max(1);
    let mut tasks = Vec::with_capacity(count);

    for (index, processor) in pipeline.processors.iter().enumerate() {
        let (tx, rx) = mpsc::channel(buffer);
        let upstream = match index {
            0 => tokens[0].child_token(),
            _ => tokens[index - 1].clone(),
        };
        let stats = profile.as_mut().map(|p| p.stage(processor.name()));
        let ctx = ProcessContext {
            graph: Arc::clone(&pipeline.graph),
            cancel: tokens[index].clone(),
            upstream,
            manager: manager.clone(),
            config: Arc::clone(&pipeline.config),
            stats: stats.clone(),
        };
        let processor = Arc::clone(processor);
        let stage_input = std::mem::replace(&mut input, rx);
        tasks.push(tokio::spawn(async move {
            processor.process(ctx, stage_input, tx).await;
            if let Some(stats) = stats {
                stats.finish();
            }
            debug!(index, stage = processor.name(), "engine.pipeline.stage_done");
        }));
    }

    debug!(stages = count, data_type = pipeline.data_type.name(), "engine.pipeline.started");
    RunningPipeline {
        output: input,
        tasks,
        root,
        manager,
        profile,
    }
}

/// Fetches full properties for an element the stages left unloaded.
async fn materialize(
    graph: &dyn GraphBackend,
    data_type: DataType,
    element: &DataElement,
) -> Result<Option<DataElement>> {
    if element.loaded {
        return Ok(Some(element.clone()));
    }
    match data_type {
        DataType::Edge => graph.get_edge(&element.id, true).await,
        _ => graph.get_vertex(&element.id, true).await,
    }
}

/// Result record for a traveler, tagged by the pipeline's data type.
async fn to_result(
    graph: &dyn GraphBackend,
    data_type: DataType,
    t: &Traveler,
) -> Result<Option<QueryResult>> {
    let result = match data_type {
        DataType::Vertex | DataType::Edge => {
            let element = match t.current() {
                None => None,
                Some(el) => match materialize(graph, data_type, el).await? {
                    Some(el) => Some(el),
                    None => {
                        debug!(id = %el.id, "engine.pipeline.element_vanished");
                        return Ok(None);
                    }
                },
            };
            match data_type {
                DataType::Edge => QueryResult::Edge(element),
                _ => QueryResult::Vertex(element),
            }
        }
        _ => match t.payload() {
            Some(Payload::Count(n)) => QueryResult::Count(*n),
            Some(Payload::Render(doc)) => QueryResult::Render(doc.clone()),
            Some(Payload::Path(steps)) => QueryResult::Path(steps.clone()),
            Some(Payload::Selection(sel)) => QueryResult::Selection(sel.clone()),
            Some(Payload::Aggregation(bucket)) => QueryResult::Aggregation(bucket.clone()),
            None => {
                debug!(data_type = data_type.name(), "engine.pipeline.missing_payload");
                return Ok(None);
            }
        },
    };
    Ok(Some(result))
}

/// Starts `pipeline` and converts its output into result records.
///
/// Signals never become results. A backend failure while materializing
/// elements ends the stream early and is logged. Dropping the receiver stops
/// the pipeline.
pub fn run(
    pipeline: &Pipeline,
    cancel: CancellationToken,
    input: Option<mpsc::Receiver<Traveler>>,
) -> mpsc::Receiver<QueryResult> {
    let mut running = start(pipeline, &cancel, input);
    let graph = Arc::clone(&pipeline.graph);
    let data_type = pipeline.data_type;
    let (tx, rx) = mpsc::channel(pipeline.config.result_buffer.max(1));

    tokio::spawn(async move {
        let mut sent = 0u64;
        while let Some(t) = recv_or_cancel(&mut running.output, &cancel).await {
            if t.is_signal() {
                continue;
            }
            let result = match to_result(graph.as_ref(), data_type, &t).await {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, results = sent, "engine.pipeline.truncated");
                    break;
                }
            };
            if !send_or_cancel(&tx, result, &cancel).await {
                break;
            }
            sent += 1;
        }
        running.finish().await;
        debug!(results = sent, "engine.pipeline.finished");
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryGraph;
    use crate::config::EngineConfig;
    use crate::engine::compiler::Compiler;
    use crate::model::Value;
    use crate::query::Query;

    fn graph() -> Arc<MemoryGraph> {
        let g = MemoryGraph::new();
        for (id, label) in [("a", "person"), ("b", "person"), ("c", "company")] {
            g.insert_vertex(DataElement::vertex(id, label).with_property("name", id))
                .unwrap();
        }
        g.insert_edge(DataElement::edge("ac", "works_at", "a", "c")).unwrap();
        Arc::new(g)
    }

    async fn drain(mut rx: mpsc::Receiver<QueryResult>) -> Vec<QueryResult> {
        let mut out = Vec::new();
        while let Some(r) = rx.recv().await {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn results_are_loaded_elements() {
        let g = graph();
        let compiler = Compiler::new(g, Arc::new(EngineConfig::default()));
        let pipeline = compiler
            .compile(&Query::v(["a"]).out(["works_at"]).into_statements(), None)
            .unwrap();
        let out = drain(run(&pipeline, CancellationToken::new(), None)).await;
        assert_eq!(out.len(), 1);
        let el = out[0].element().unwrap();
        assert_eq!(el.id, "c");
        assert!(el.loaded);
        assert_eq!(el.data["name"], Value::from("c"));
    }

    #[tokio::test]
    async fn extension_input_skips_signals() {
        let g = graph();
        let compiler = Compiler::new(g.clone(), Arc::new(EngineConfig::default()));
        let base = compiler.compile(&Query::all_vertices().into_statements(), None).unwrap();
        let ext = base.extension_context();
        let tail = compiler
            .compile(&Query::extend(vec![]).out(["works_at"]).into_statements(), Some(&ext))
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(Traveler::signal(1)).await.unwrap();
        tx.send(Traveler::new().with_current(Some(DataElement::vertex("a", "person"))))
            .await
            .unwrap();
        tx.send(Traveler::signal(2)).await.unwrap();
        drop(tx);

        let out = drain(run(&tail, CancellationToken::new(), Some(rx))).await;
        let ids: Vec<_> = out.iter().map(|r| r.element().unwrap().id.clone()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn raw_stages_forward_signals_and_profile() {
        let g = graph();
        let mut config = EngineConfig::default();
        config.profile = true;
        let compiler = Compiler::new(g, Arc::new(config));
        let pipeline = compiler
            .compile(&Query::all_vertices().has_label(["person"]).into_statements(), None)
            .unwrap();
        let mut running = start(&pipeline, &CancellationToken::new(), None);
        let mut seen = 0;
        while running.next().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
        let profile = running.profile().unwrap();
        assert_eq!(profile.len(), pipeline.processors.len());
        assert_eq!(profile.last().unwrap().emitted, 2);
        running.finish().await;
    }

    #[tokio::test]
    async fn caller_cancellation_ends_the_stream() {
        let g = graph();
        let compiler = Compiler::new(g, Arc::new(EngineConfig::default()));
        let pipeline = compiler.compile(&Query::all_vertices().into_statements(), None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = drain(run(&pipeline, cancel, None)).await;
        assert!(out.is_empty());
    }
}
