//! Statement list to pipeline compilation.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{Direction, GraphBackend};
use crate::config::EngineConfig;
use crate::engine::optimizer::index_start_optimize;
use crate::engine::processors::{
    AdjacencyLookup, Aggregate, BothLookup, CountStage, Distinct, Fields, Filter, Hop, Increment,
    Jump, LookupEdges, LookupVerts, LookupVertsIndex, Mark, PathStage, Predicate, Processor, Range,
    Render, Select, Set, Unwind,
};
use crate::engine::state::{CompileState, DataType, ExtensionContext, TypeState};
use crate::error::CompileError;
use crate::query::{Adjacency, Statement};

/// Compiled, runnable pipeline.
#[derive(Clone)]
pub struct Pipeline {
    /// Backend the stages read from.
    pub graph: Arc<dyn GraphBackend>,
    /// Stages in execution order.
    pub processors: Vec<Arc<dyn Processor>>,
    /// Data type of the travelers leaving the last stage.
    pub data_type: DataType,
    /// Data type of every mark declared by the pipeline.
    pub mark_types: BTreeMap<String, DataType>,
    /// Engine settings the pipeline runs with.
    pub config: Arc<EngineConfig>,
}

impl Pipeline {
    /// Context for compiling a pipeline that continues this one.
    pub fn extension_context(&self) -> ExtensionContext {
        ExtensionContext {
            starting_type: Some(self.data_type),
            mark_types: self.mark_types.clone(),
        }
    }

    /// Stage names, in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("data_type", &self.data_type)
            .field("mark_types", &self.mark_types)
            .finish()
    }
}

fn statement_error(
    index: usize,
    stmt: &Statement,
    reason: crate::error::StatementError,
) -> CompileError {
    CompileError::Statement {
        index,
        statement: stmt.kind(),
        reason,
    }
}

/// Checks a statement list against the type-state rules and returns the
/// final state. Errors name the statement's position in `stmts`.
pub fn validate(
    stmts: &[Statement],
    ext: Option<&ExtensionContext>,
) -> Result<TypeState, CompileError> {
    if stmts.is_empty() {
        return Err(CompileError::EmptyQuery);
    }
    let mut state = TypeState::new(ext);
    for (index, stmt) in stmts.iter().enumerate() {
        state
            .advance(stmt)
            .map_err(|reason| statement_error(index, stmt, reason))?;
    }
    Ok(state)
}

/// Builds pipelines for one backend.
#[derive(Clone)]
pub struct Compiler {
    graph: Arc<dyn GraphBackend>,
    config: Arc<EngineConfig>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler").field("config", &self.config).finish()
    }
}

impl Compiler {
    /// Compiler over `graph`.
    pub fn new(graph: Arc<dyn GraphBackend>, config: Arc<EngineConfig>) -> Self {
        Self { graph, config }
    }

    /// Validates, optimizes and compiles a statement list.
    ///
    /// The index-start rewrite only applies to standalone queries; a
    /// pipeline extending another one keeps its statements as written.
    pub fn compile(
        &self,
        stmts: &[Statement],
        ext: Option<&ExtensionContext>,
    ) -> Result<Pipeline, CompileError> {
        validate(stmts, ext)?;
        let stmts = match ext {
            None => index_start_optimize(stmts),
            Some(_) => stmts.to_vec(),
        };
        let mut state = CompileState::new(&stmts, ext, self.config.store_marks);
        let mut processors: Vec<Arc<dyn Processor>> = Vec::with_capacity(stmts.len());
        for (index, stmt) in stmts.iter().enumerate() {
            state.cur_step = index;
            let load = state.step_load_data();
            let before = state.types.last_type;
            state
                .types
                .advance(stmt)
                .map_err(|reason| statement_error(index, stmt, reason))?;
            processors.push(build(stmt, before, load));
        }
        let pipeline = Pipeline {
            graph: Arc::clone(&self.graph),
            processors,
            data_type: state.types.last_type,
            mark_types: state.types.mark_types,
            config: Arc::clone(&self.config),
        };
        debug!(
            stages = ?pipeline.stage_names(),
            data_type = pipeline.data_type.name(),
            "engine.compile.done"
        );
        Ok(pipeline)
    }
}

fn adjacency(adj: &Adjacency, hop: Hop, load: bool) -> Arc<dyn Processor> {
    Arc::new(AdjacencyLookup::new(hop, adj.labels.clone(), load, adj.emit_null))
}

fn both(adj: &Adjacency, edges: bool, on_edge: bool, load: bool) -> Arc<dyn Processor> {
    let labels = adj.labels.clone();
    Arc::new(BothLookup::new(edges, on_edge, labels, load, adj.emit_null))
}

/// Processor for one statement, given the data type flowing into it.
fn build(stmt: &Statement, input: DataType, load: bool) -> Arc<dyn Processor> {
    let on_edge = input == DataType::Edge;
    match stmt {
        Statement::V(ids) => Arc::new(LookupVerts::new(ids.clone(), load)),
        Statement::E(ids) => Arc::new(LookupEdges::new(ids.clone(), load)),
        Statement::LookupVertsIndex(labels) => {
            Arc::new(LookupVertsIndex::new(labels.clone(), load))
        }
        Statement::Out(adj) if on_edge => adjacency(adj, Hop::Endpoint(Direction::Out), load),
        Statement::Out(adj) => adjacency(adj, Hop::Neighbor(Direction::Out), load),
        Statement::In(adj) if on_edge => adjacency(adj, Hop::Endpoint(Direction::In), load),
        Statement::In(adj) => adjacency(adj, Hop::Neighbor(Direction::In), load),
        Statement::Both(adj) => both(adj, false, on_edge, load),
        Statement::OutE(adj) => adjacency(adj, Hop::IncidentEdge(Direction::Out), load),
        Statement::InE(adj) => adjacency(adj, Hop::IncidentEdge(Direction::In), load),
        Statement::BothE(adj) => both(adj, true, false, load),
        Statement::Has(expr) => Arc::new(Filter::new(Predicate::Expr(expr.clone()))),
        Statement::HasLabel(labels) => Arc::new(Filter::new(Predicate::Label(labels.clone()))),
        Statement::HasKey(keys) => Arc::new(Filter::new(Predicate::Key(keys.clone()))),
        Statement::HasId(ids) => Arc::new(Filter::new(Predicate::Id(ids.clone()))),
        Statement::Limit(n) => Arc::new(Range::limit(*n)),
        Statement::Skip(n) => Arc::new(Range::skip(*n)),
        Statement::Range { start, stop } => Arc::new(Range::new(*start, *stop)),
        Statement::Count => Arc::new(CountStage),
        Statement::Distinct(fields) => Arc::new(Distinct::new(fields)),
        Statement::As(name) => Arc::new(Mark::new(name.clone())),
        Statement::Jump {
            mark,
            condition,
            emit,
        } => Arc::new(Jump::new(mark.clone(), condition.clone(), *emit)),
        Statement::Select(marks) => Arc::new(Select::new(marks.clone())),
        Statement::Render(template) => Arc::new(Render::new(template.clone())),
        Statement::Path => Arc::new(PathStage),
        Statement::Fields(fields) => Arc::new(Fields::new(fields)),
        Statement::Aggregate(aggs) => Arc::new(Aggregate::new(aggs.clone())),
        Statement::Unwind(field) => Arc::new(Unwind::new(field)),
        Statement::Set { field, value } => Arc::new(Set::new(field, value.clone())),
        Statement::Increment { field, amount } => Arc::new(Increment::new(field, *amount)),
    }
}
