//! Traversal statements.
//!
//! A query is an ordered list of [`Statement`]s. The list is validated and
//! compiled as a whole; individual statements are plain immutable values.

use serde::{Deserialize, Serialize};

use crate::model::Value;

/// Arguments shared by the adjacency statements.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjacency {
    /// Edge labels to follow; empty follows every edge.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Emit a traveler with a null current element when nothing matches.
    #[serde(default)]
    pub emit_null: bool,
}

impl Adjacency {
    /// Adjacency over the given labels.
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            emit_null: false,
        }
    }

    /// Same adjacency with null emission switched on.
    pub fn or_null(mut self) -> Self {
        self.emit_null = true;
        self
    }
}

/// Comparison operator of a leaf condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Deep equality.
    Eq,
    /// Deep inequality.
    Neq,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Lte,
    /// Open interval `(low, high)`.
    Inside,
    /// Outside the open interval `(low, high)`.
    Outside,
    /// Half-open interval `[low, high)`.
    Between,
    /// Member of the right-hand list.
    Within,
    /// Not a member of the right-hand list.
    Without,
    /// Left-hand list contains the value.
    Contains,
}

/// Leaf predicate comparing a traveler field against a value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field path (see [`crate::model::path`]).
    pub key: String,
    /// Right-hand operand. Strings starting with `$` are resolved as paths.
    pub value: Value,
    /// Operator.
    pub condition: Operator,
}

/// Boolean filter expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasExpression {
    /// All sub-expressions hold.
    And(Vec<HasExpression>),
    /// At least one sub-expression holds.
    Or(Vec<HasExpression>),
    /// The sub-expression does not hold.
    Not(Box<HasExpression>),
    /// Leaf condition.
    Condition(Condition),
}

/// One named aggregation inside an [`Statement::Aggregate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Name reported with every bucket.
    pub name: String,
    /// What to compute.
    #[serde(flatten)]
    pub kind: AggregationKind,
}

/// Aggregation variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AggregationKind {
    /// Most frequent values of a field.
    Term {
        /// Field path.
        field: String,
        /// Buckets to keep; 0 keeps all.
        #[serde(default)]
        size: u32,
    },
    /// Fixed-width numeric buckets.
    Histogram {
        /// Field path.
        field: String,
        /// Bucket width, positive.
        interval: f64,
    },
    /// Estimated percentiles of a numeric field.
    Percentile {
        /// Field path.
        field: String,
        /// Requested percentiles in `[0, 100]`.
        percents: Vec<f64>,
    },
    /// Number of travelers.
    Count,
}

impl AggregationKind {
    /// Field read by the aggregation, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            AggregationKind::Term { field, .. }
            | AggregationKind::Histogram { field, .. }
            | AggregationKind::Percentile { field, .. } => Some(field),
            AggregationKind::Count => None,
        }
    }
}

/// A traversal statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Start from vertices by id; empty scans every vertex.
    V(Vec<String>),
    /// Start from edges by id; empty scans every edge.
    E(Vec<String>),
    /// Start from every vertex carrying one of the labels, via the label index.
    LookupVertsIndex(Vec<String>),
    /// Step to vertices over incoming edges.
    In(Adjacency),
    /// Step to vertices over outgoing edges.
    Out(Adjacency),
    /// Step to vertices over edges in either direction.
    Both(Adjacency),
    /// Step onto incoming edges.
    InE(Adjacency),
    /// Step onto outgoing edges.
    OutE(Adjacency),
    /// Step onto edges in either direction.
    BothE(Adjacency),
    /// Keep travelers matching the expression.
    Has(HasExpression),
    /// Keep elements carrying one of the labels.
    HasLabel(Vec<String>),
    /// Keep elements carrying every one of the property keys.
    HasKey(Vec<String>),
    /// Keep elements whose id is listed.
    HasId(Vec<String>),
    /// Forward at most n travelers.
    Limit(u64),
    /// Drop the first n travelers.
    Skip(u64),
    /// Forward travelers at positions `start..stop`; a negative stop is
    /// unbounded.
    Range {
        /// First position forwarded.
        start: u64,
        /// Position at which forwarding stops.
        stop: i64,
    },
    /// Replace the stream with its length.
    Count,
    /// Drop travelers whose field tuple was already seen; empty uses the id.
    Distinct(Vec<String>),
    /// Capture the current element under a name.
    As(String),
    /// Move the current position to a marked element.
    Jump {
        /// Mark to move to.
        mark: String,
        /// Only travelers matching this expression jump.
        #[serde(default)]
        condition: Option<HasExpression>,
        /// Also forward the traveler before the jump.
        #[serde(default)]
        emit: bool,
    },
    /// Replace the current element with one or more marks.
    Select(Vec<String>),
    /// Build a document from a template.
    Render(Value),
    /// Emit the traversal path.
    Path,
    /// Keep (or with a `-` prefix, drop) properties.
    Fields(Vec<String>),
    /// Compute aggregations over the stream.
    Aggregate(Vec<Aggregation>),
    /// Fan a list-valued field out into one traveler per item.
    Unwind(String),
    /// Write a property.
    Set {
        /// Field path.
        field: String,
        /// Value to write.
        value: Value,
    },
    /// Add to an integer property.
    Increment {
        /// Field path.
        field: String,
        /// Amount to add.
        amount: i64,
    },
}

impl Statement {
    /// Stable name of the statement kind, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::V(_) => "V",
            Statement::E(_) => "E",
            Statement::LookupVertsIndex(_) => "LookupVertsIndex",
            Statement::In(_) => "In",
            Statement::Out(_) => "Out",
            Statement::Both(_) => "Both",
            Statement::InE(_) => "InE",
            Statement::OutE(_) => "OutE",
            Statement::BothE(_) => "BothE",
            Statement::Has(_) => "Has",
            Statement::HasLabel(_) => "HasLabel",
            Statement::HasKey(_) => "HasKey",
            Statement::HasId(_) => "HasId",
            Statement::Limit(_) => "Limit",
            Statement::Skip(_) => "Skip",
            Statement::Range { .. } => "Range",
            Statement::Count => "Count",
            Statement::Distinct(_) => "Distinct",
            Statement::As(_) => "As",
            Statement::Jump { .. } => "Jump",
            Statement::Select(_) => "Select",
            Statement::Render(_) => "Render",
            Statement::Path => "Path",
            Statement::Fields(_) => "Fields",
            Statement::Aggregate(_) => "Aggregate",
            Statement::Unwind(_) => "Unwind",
            Statement::Set { .. } => "Set",
            Statement::Increment { .. } => "Increment",
        }
    }
}
