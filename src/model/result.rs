//! Records handed to callers at the end of a pipeline.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{DataElement, PathStep, Value};

/// One aggregation bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Name of the aggregation inside its statement.
    pub name: String,
    /// Bucket key: a term, a histogram bucket start or a percentile.
    pub key: Value,
    /// Bucket value: a count or an estimated quantile.
    pub value: f64,
}

/// Result record, tagged by the pipeline's final data type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    /// Vertex, or `None` from an emit-null step.
    Vertex(Option<DataElement>),
    /// Edge, or `None` from an emit-null step.
    Edge(Option<DataElement>),
    /// Scalar count.
    Count(u64),
    /// Rendered document.
    Render(Value),
    /// Traversal path.
    Path(Vec<PathStep>),
    /// Elements captured under the selected marks.
    Selection(BTreeMap<String, Option<DataElement>>),
    /// Aggregation bucket.
    Aggregation(AggregationResult),
}

impl QueryResult {
    /// Vertex or edge carried by the record.
    pub fn element(&self) -> Option<&DataElement> {
        match self {
            QueryResult::Vertex(el) | QueryResult::Edge(el) => el.as_ref(),
            _ => None,
        }
    }
}
