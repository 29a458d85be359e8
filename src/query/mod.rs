#![forbid(unsafe_code)]

//! Statement AST and its builder.

/// Traversal statements and filter expressions.
///
/// Closed sum types consumed by the compiler.
pub mod ast;

/// Fluent construction of statement lists.
pub mod builder;

pub use ast::{
    Adjacency, Aggregation, AggregationKind, Condition, HasExpression, Operator, Statement,
};
pub use builder::{expr, Query};
