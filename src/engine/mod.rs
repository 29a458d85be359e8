//! Query engine: validation, optimization, compilation and execution.
//!
//! [`Engine`] is the entry point most callers need. The pieces it bundles
//! are public for callers that drive pipelines by hand, e.g. to chain an
//! extension pipeline onto the raw output of another one.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::GraphBackend;
use crate::config::EngineConfig;
use crate::error::{CompileError, Result};
use crate::model::{QueryResult, Traveler};
use crate::query::Statement;

pub mod compiler;
pub mod eval;
pub mod inspect;
pub mod manager;
pub mod optimizer;
pub mod processors;
pub mod profile;
pub mod runner;
pub mod state;

pub use compiler::{validate, Compiler, Pipeline};
pub use manager::{Manager, MemoryKv, TempKv};
pub use optimizer::index_start_optimize;
pub use profile::{PipelineProfile, StageProfile};
pub use runner::{run, start, RunningPipeline};
pub use state::{DataType, ExtensionContext, TypeState};

/// Vertex and edge labels known to a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Labels {
    /// Vertex labels.
    pub vertex: Vec<String>,
    /// Edge labels.
    pub edge: Vec<String>,
}

/// Compiles and runs statement lists against one backend.
#[derive(Clone, Debug)]
pub struct Engine {
    graph: Arc<dyn GraphBackend>,
    compiler: Compiler,
    config: Arc<EngineConfig>,
}

impl Engine {
    /// Engine over `graph`.
    pub fn new(graph: Arc<dyn GraphBackend>, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            compiler: Compiler::new(Arc::clone(&graph), Arc::clone(&config)),
            graph,
            config,
        }
    }

    /// Backend the engine queries.
    pub fn graph(&self) -> &Arc<dyn GraphBackend> {
        &self.graph
    }

    /// Settings every pipeline runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiles a standalone query.
    pub fn compile(&self, stmts: &[Statement]) -> std::result::Result<Pipeline, CompileError> {
        self.compiler.compile(stmts, None)
    }

    /// Compiles statements continuing a pipeline described by `ext`.
    pub fn compile_extension(
        &self,
        stmts: &[Statement],
        ext: &ExtensionContext,
    ) -> std::result::Result<Pipeline, CompileError> {
        self.compiler.compile(stmts, Some(ext))
    }

    /// Compiles and starts a query. Results arrive on the returned receiver;
    /// cancelling `cancel` or dropping the receiver stops the pipeline.
    pub fn query(
        &self,
        stmts: &[Statement],
        cancel: CancellationToken,
    ) -> std::result::Result<mpsc::Receiver<QueryResult>, CompileError> {
        let pipeline = self.compile(stmts)?;
        Ok(run(&pipeline, cancel, None))
    }

    /// Runs an extension pipeline over travelers produced elsewhere.
    pub fn query_extension(
        &self,
        stmts: &[Statement],
        ext: &ExtensionContext,
        input: mpsc::Receiver<Traveler>,
        cancel: CancellationToken,
    ) -> std::result::Result<mpsc::Receiver<QueryResult>, CompileError> {
        let pipeline = self.compile_extension(stmts, ext)?;
        Ok(run(&pipeline, cancel, Some(input)))
    }

    /// Runs a query to completion and gathers every result.
    pub async fn collect(&self, stmts: &[Statement]) -> Result<Vec<QueryResult>> {
        let mut rx = self.query(stmts, CancellationToken::new())?;
        let mut out = Vec::new();
        while let Some(result) = rx.recv().await {
            out.push(result);
        }
        debug!(results = out.len(), "engine.collect.done");
        Ok(out)
    }

    /// Vertex and edge labels, sorted.
    pub async fn list_labels(&self) -> Result<Labels> {
        let mut vertex = self.graph.list_vertex_labels().await?;
        let mut edge = self.graph.list_edge_labels().await?;
        vertex.sort();
        edge.sort();
        Ok(Labels { vertex, edge })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryGraph;
    use crate::error::GraphError;
    use crate::model::DataElement;
    use crate::query::Query;

    fn engine() -> Engine {
        let g = MemoryGraph::new();
        g.insert_vertex(DataElement::vertex("a", "person")).unwrap();
        g.insert_vertex(DataElement::vertex("b", "city")).unwrap();
        g.insert_edge(DataElement::edge("ab", "lives_in", "a", "b")).unwrap();
        Engine::new(Arc::new(g), EngineConfig::default())
    }

    #[tokio::test]
    async fn collect_counts() {
        let out = engine()
            .collect(&Query::all_vertices().count().into_statements())
            .await
            .unwrap();
        assert_eq!(out, vec![QueryResult::Count(2)]);
    }

    #[tokio::test]
    async fn compile_errors_surface_through_collect() {
        let err = engine().collect(&[]).await.unwrap_err();
        assert!(matches!(err, GraphError::Compile(CompileError::EmptyQuery)));
    }

    #[tokio::test]
    async fn labels_are_listed() {
        let labels = engine().list_labels().await.unwrap();
        assert_eq!(labels.vertex, vec!["city", "person"]);
        assert_eq!(labels.edge, vec!["lives_in"]);
    }
}
