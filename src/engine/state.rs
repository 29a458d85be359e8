//! Compile-time type-state.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::StatementError;
use crate::model::path::CURRENT;
use crate::query::{AggregationKind, Statement};

/// Kind of value a pipeline stage emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Nothing produced yet.
    NoData,
    /// Vertices.
    Vertex,
    /// Edges.
    Edge,
    /// A scalar count.
    Count,
    /// Mark selections.
    Selection,
    /// Rendered documents.
    Render,
    /// Traversal paths.
    Path,
    /// Aggregation buckets.
    Aggregation,
}

impl DataType {
    /// Lower-case name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::NoData => "no",
            DataType::Vertex => "vertex",
            DataType::Edge => "edge",
            DataType::Count => "count",
            DataType::Selection => "selection",
            DataType::Render => "render",
            DataType::Path => "path",
            DataType::Aggregation => "aggregation",
        }
    }

    /// True for vertex and edge data.
    pub fn is_element(&self) -> bool {
        matches!(self, DataType::Vertex | DataType::Edge)
    }
}

/// Type information carried over from a prior pipeline that this one
/// extends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionContext {
    /// Data type of the travelers fed into the extension.
    pub starting_type: Option<DataType>,
    /// Marks captured by the prior pipeline.
    pub mark_types: BTreeMap<String, DataType>,
}

/// Current data type plus the types of the marks declared so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeState {
    /// Data type emitted by the last statement.
    pub last_type: DataType,
    /// Data type of each declared mark.
    pub mark_types: BTreeMap<String, DataType>,
}

const ELEMENTS: &[DataType] = &[DataType::Vertex, DataType::Edge];
const ANY_DATA: &[DataType] = &[
    DataType::Vertex,
    DataType::Edge,
    DataType::Count,
    DataType::Selection,
    DataType::Render,
    DataType::Path,
    DataType::Aggregation,
];

impl TypeState {
    /// Initial state, optionally seeded by an extension context.
    pub fn new(ext: Option<&ExtensionContext>) -> Self {
        match ext {
            Some(ext) => Self {
                last_type: ext.starting_type.unwrap_or(DataType::NoData),
                mark_types: ext.mark_types.clone(),
            },
            None => Self {
                last_type: DataType::NoData,
                mark_types: BTreeMap::new(),
            },
        }
    }

    fn require(
        &self,
        stmt: &Statement,
        allowed: &[DataType],
        expected: &'static str,
    ) -> Result<(), StatementError> {
        if allowed.contains(&self.last_type) {
            return Ok(());
        }
        if self.last_type == DataType::NoData {
            return Err(StatementError::InvalidStart);
        }
        Err(StatementError::TypeMismatch {
            statement: stmt.kind(),
            found: self.last_type.name(),
            expected,
        })
    }

    fn mark_type(&self, name: &str) -> Result<DataType, StatementError> {
        self.mark_types
            .get(name)
            .copied()
            .ok_or_else(|| StatementError::UnknownMark {
                name: name.to_owned(),
            })
    }

    /// Applies one statement to the state, or explains why it is illegal
    /// here.
    pub fn advance(&mut self, stmt: &Statement) -> Result<(), StatementError> {
        let next = match stmt {
            Statement::V(_) | Statement::E(_) | Statement::LookupVertsIndex(_) => {
                if self.last_type != DataType::NoData {
                    return Err(StatementError::TypeMismatch {
                        statement: stmt.kind(),
                        found: self.last_type.name(),
                        expected: "no",
                    });
                }
                match stmt {
                    Statement::E(_) => DataType::Edge,
                    Statement::LookupVertsIndex(labels) => {
                        non_empty(stmt, labels)?;
                        DataType::Vertex
                    }
                    _ => DataType::Vertex,
                }
            }
            Statement::In(_) | Statement::Out(_) | Statement::Both(_) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                DataType::Vertex
            }
            Statement::InE(_) | Statement::OutE(_) | Statement::BothE(_) => {
                self.require(stmt, &[DataType::Vertex], "vertex")?;
                DataType::Edge
            }
            Statement::HasLabel(items) | Statement::HasKey(items) | Statement::HasId(items) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                non_empty(stmt, items)?;
                self.last_type
            }
            Statement::Has(_)
            | Statement::Distinct(_)
            | Statement::Fields(_)
            | Statement::Unwind(_)
            | Statement::Set { .. }
            | Statement::Increment { .. } => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                self.last_type
            }
            Statement::Limit(_) | Statement::Skip(_) => {
                self.require(stmt, ANY_DATA, "any")?;
                self.last_type
            }
            Statement::Range { start, stop } => {
                self.require(stmt, ANY_DATA, "any")?;
                if *stop >= 0 && (*stop as u64) < *start {
                    return Err(StatementError::InvalidRange {
                        start: *start,
                        stop: *stop,
                    });
                }
                self.last_type
            }
            Statement::Count => {
                self.require(stmt, ANY_DATA, "any")?;
                DataType::Count
            }
            Statement::As(name) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                validate_mark_name(name)?;
                self.mark_types.insert(name.clone(), self.last_type);
                self.last_type
            }
            Statement::Select(marks) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                non_empty(stmt, marks)?;
                let mut types = Vec::with_capacity(marks.len());
                for mark in marks {
                    types.push(self.mark_type(mark)?);
                }
                match types.as_slice() {
                    [single] => *single,
                    _ => DataType::Selection,
                }
            }
            Statement::Jump {
                mark,
                condition,
                emit,
            } => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                let target = self.mark_type(mark)?;
                // Unjumped travelers keep flowing with the current type.
                let passes_through = *emit || condition.is_some();
                if passes_through && target != self.last_type {
                    return Err(StatementError::TypeMismatch {
                        statement: stmt.kind(),
                        found: self.last_type.name(),
                        expected: target.name(),
                    });
                }
                target
            }
            Statement::Render(_) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                DataType::Render
            }
            Statement::Path => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                DataType::Path
            }
            Statement::Aggregate(aggs) => {
                self.require(stmt, ELEMENTS, "vertex or edge")?;
                non_empty(stmt, aggs)?;
                let mut names = BTreeSet::new();
                for agg in aggs {
                    if !names.insert(agg.name.as_str()) {
                        return Err(StatementError::DuplicateAggregation {
                            name: agg.name.clone(),
                        });
                    }
                    match &agg.kind {
                        AggregationKind::Histogram { interval, .. }
                            if !(interval.is_finite() && *interval > 0.0) =>
                        {
                            return Err(StatementError::InvalidInterval {
                                name: agg.name.clone(),
                            });
                        }
                        AggregationKind::Percentile { percents, .. }
                            if percents.is_empty()
                                || percents.iter().any(|p| !(0.0..=100.0).contains(p)) =>
                        {
                            return Err(StatementError::InvalidPercentile {
                                name: agg.name.clone(),
                            });
                        }
                        _ => {}
                    }
                }
                DataType::Aggregation
            }
        };
        self.last_type = next;
        Ok(())
    }
}

fn non_empty<T>(stmt: &Statement, items: &[T]) -> Result<(), StatementError> {
    if items.is_empty() {
        Err(StatementError::EmptyArguments {
            statement: stmt.kind(),
        })
    } else {
        Ok(())
    }
}

fn validate_mark_name(name: &str) -> Result<(), StatementError> {
    if name.is_empty() {
        return Err(StatementError::EmptyMarkName);
    }
    if name == CURRENT {
        return Err(StatementError::ReservedMarkName {
            name: name.to_owned(),
        });
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(StatementError::InvalidMarkName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Mutable context threaded through statement compilation.
#[derive(Clone, Debug)]
pub struct CompileState {
    /// Type-state after the statements compiled so far.
    pub types: TypeState,
    /// Step id of every statement.
    pub steps: Vec<String>,
    /// Fields each step's output must carry.
    pub step_outputs: BTreeMap<String, BTreeSet<String>>,
    /// Index of the statement being compiled.
    pub cur_step: usize,
}

impl CompileState {
    /// Seeds the state for a statement list.
    pub fn new(stmts: &[Statement], ext: Option<&ExtensionContext>, store_marks: bool) -> Self {
        let steps = crate::engine::inspect::pipeline_steps(stmts);
        let step_outputs = crate::engine::inspect::pipeline_step_outputs(stmts, store_marks);
        Self {
            types: TypeState::new(ext),
            steps,
            step_outputs,
            cur_step: 0,
        }
    }

    /// Whether the statement being compiled must fetch full properties.
    ///
    /// False only when nothing downstream reads the step's element, or reads
    /// nothing but its label.
    pub fn step_load_data(&self) -> bool {
        let Some(step) = self.steps.get(self.cur_step) else {
            return true;
        };
        match self.step_outputs.get(step) {
            None => false,
            Some(fields) => !(fields.len() == 1 && fields.contains("_label")),
        }
    }
}
