//! Gravel compiles property-graph traversals into streaming pipelines.
//!
//! A query is an ordered list of [`Statement`]s. The [`Engine`] validates the
//! list against the type-state rules, rewrites an index-friendly start,
//! compiles every statement into a stage and runs the stages as concurrent
//! tasks connected by bounded queues. Storage sits behind the
//! [`GraphBackend`] trait; [`MemoryGraph`] implements it in memory.
//!
//! ```no_run
//! # async fn demo() -> gravel::Result<()> {
//! use std::sync::Arc;
//! use gravel::{Engine, EngineConfig, MemoryGraph, Query};
//!
//! let engine = Engine::new(Arc::new(MemoryGraph::new()), EngineConfig::default());
//! let stmts = Query::all_vertices().has_label(["person"]).out(["works_at"]).into_statements();
//! let results = engine.collect(&stmts).await?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod query;
pub mod telemetry;

pub use backend::{Direction, GraphBackend, MemoryGraph};
pub use config::EngineConfig;
pub use engine::{DataType, Engine, ExtensionContext, Labels, Pipeline, RunningPipeline};
pub use error::{CompileError, ConfigError, GraphError, Result, StatementError};
pub use model::{AggregationResult, DataElement, QueryResult, Traveler, Value};
pub use query::{expr, HasExpression, Query, Statement};
