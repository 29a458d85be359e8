#![forbid(unsafe_code)]

//! Error types shared across the crate.
use std::io;

use thiserror::Error;

pub use crate::config::ConfigError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Runtime failures raised by backends and the engine facade.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The requested element does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// `"vertex"` or `"edge"`.
        kind: &'static str,
        /// Requested id.
        id: String,
    },
    /// Caller supplied malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A channel or store was used after it was shut down.
    #[error("{0} closed")]
    Closed(&'static str),
    /// Statement list failed validation.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}

/// Reason a single statement was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// The first statement does not produce vertex or edge data.
    #[error("pipeline must begin with a vertex or edge lookup")]
    InvalidStart,
    /// The statement cannot follow the current data type.
    #[error("{statement} cannot follow {found} data (expects {expected})")]
    TypeMismatch {
        /// Statement kind.
        statement: &'static str,
        /// Data type produced by the previous statement.
        found: &'static str,
        /// Human readable list of accepted data types.
        expected: &'static str,
    },
    /// A mark name was empty.
    #[error("mark name is empty")]
    EmptyMarkName,
    /// A mark used the reserved current-element name.
    #[error("mark name '{name}' is reserved")]
    ReservedMarkName {
        /// Offending name.
        name: String,
    },
    /// A mark name contained characters that break path addressing.
    #[error("mark name '{name}' may only contain letters, digits and '_'")]
    InvalidMarkName {
        /// Offending name.
        name: String,
    },
    /// A referenced mark was never declared.
    #[error("unknown mark '{name}'")]
    UnknownMark {
        /// Offending name.
        name: String,
    },
    /// A statement requiring at least one argument received none.
    #[error("{statement} requires at least one argument")]
    EmptyArguments {
        /// Statement kind.
        statement: &'static str,
    },
    /// Two aggregations in one statement share a name.
    #[error("duplicate aggregation name '{name}'")]
    DuplicateAggregation {
        /// Offending name.
        name: String,
    },
    /// A histogram interval was zero, negative or not finite.
    #[error("histogram '{name}' interval must be positive")]
    InvalidInterval {
        /// Aggregation name.
        name: String,
    },
    /// A percentile was outside `[0, 100]`.
    #[error("percentile '{name}' values must lie in [0, 100]")]
    InvalidPercentile {
        /// Aggregation name.
        name: String,
    },
    /// A range statement had its stop before its start.
    #[error("range stop {stop} precedes start {start}")]
    InvalidRange {
        /// Lower bound.
        start: u64,
        /// Upper bound.
        stop: i64,
    },
}

impl StatementError {
    /// Stable machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            StatementError::InvalidStart => "InvalidStart",
            StatementError::TypeMismatch { .. } => "TypeMismatch",
            StatementError::EmptyMarkName => "EmptyMarkName",
            StatementError::ReservedMarkName { .. } => "ReservedMarkName",
            StatementError::InvalidMarkName { .. } => "InvalidMarkName",
            StatementError::UnknownMark { .. } => "UnknownMark",
            StatementError::EmptyArguments { .. } => "EmptyArguments",
            StatementError::DuplicateAggregation { .. } => "DuplicateAggregation",
            StatementError::InvalidInterval { .. } => "InvalidInterval",
            StatementError::InvalidPercentile { .. } => "InvalidPercentile",
            StatementError::InvalidRange { .. } => "InvalidRange",
        }
    }
}

/// Failure to turn a statement list into a pipeline.
///
/// Returned before any backend work happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// No statements were supplied.
    #[error("query contains no statements")]
    EmptyQuery,
    /// A statement was rejected.
    #[error("statement {index} ({statement}): {reason}")]
    Statement {
        /// Zero-based position in the submitted list.
        index: usize,
        /// Statement kind.
        statement: &'static str,
        /// Why it was rejected.
        reason: StatementError,
    },
}

impl CompileError {
    /// Stable machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::EmptyQuery => "EmptyQuery",
            CompileError::Statement { reason, .. } => reason.code(),
        }
    }

    /// Index of the offending statement, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            CompileError::EmptyQuery => None,
            CompileError::Statement { index, .. } => Some(*index),
        }
    }
}
