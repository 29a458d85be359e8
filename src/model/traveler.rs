//! Per-record tokens flowing through a pipeline.
//!
//! Travelers are immutable. Marks and the traversal path live in `Arc`-linked
//! chains so deriving a traveler only allocates the new link; every older
//! traveler keeps seeing exactly what it saw before.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::path::{Field, FieldPath, Namespace};
use crate::model::{AggregationResult, DataElement, Value};

/// One hop of a traversal path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    /// Visited vertex id.
    Vertex(String),
    /// Visited edge id.
    Edge(String),
}

/// Terminal payload attached by value-producing stages.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Number of travelers counted.
    Count(u64),
    /// Rendered document.
    Render(Value),
    /// Elements captured under the selected marks.
    Selection(BTreeMap<String, Option<DataElement>>),
    /// Snapshot of the traversal path.
    Path(Vec<PathStep>),
    /// One aggregation bucket.
    Aggregation(AggregationResult),
}

/// Pass-through marker separating batches in extension pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal {
    /// Caller-chosen identifier.
    pub id: u64,
}

struct MarkNode {
    name: String,
    element: Option<Arc<DataElement>>,
    parent: Option<Arc<MarkNode>>,
}

struct PathNode {
    step: PathStep,
    parent: Option<Arc<PathNode>>,
}

/// Immutable token carrying the current element, captured marks, the
/// traversal path and an optional terminal payload.
#[derive(Clone, Default)]
pub struct Traveler {
    current: Option<Arc<DataElement>>,
    marks: Option<Arc<MarkNode>>,
    path: Option<Arc<PathNode>>,
    payload: Option<Arc<Payload>>,
    signal: Option<Signal>,
}

impl Traveler {
    /// Empty traveler used to kick off a pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal traveler; stages forward it untouched.
    pub fn signal(id: u64) -> Self {
        Self {
            signal: Some(Signal { id }),
            ..Self::default()
        }
    }

    /// Signal carried by this traveler, if any.
    pub fn get_signal(&self) -> Option<Signal> {
        self.signal
    }

    /// True for signal travelers.
    pub fn is_signal(&self) -> bool {
        self.signal.is_some()
    }

    /// Current element, `None` after an emit-null miss or before any lookup.
    pub fn current(&self) -> Option<&DataElement> {
        self.current.as_deref()
    }

    /// Moves the traveler onto a new element, extending the path.
    pub fn with_current(&self, element: Option<DataElement>) -> Self {
        let mut next = self.clone();
        if let Some(el) = &element {
            let step = if el.is_edge() {
                PathStep::Edge(el.id.clone())
            } else {
                PathStep::Vertex(el.id.clone())
            };
            next.path = Some(Arc::new(PathNode {
                step,
                parent: self.path.clone(),
            }));
        }
        next.current = element.map(Arc::new);
        next
    }

    /// Replaces the current element without recording a path step, used when
    /// a stage edits the element in place (set, unwind, projection).
    pub fn with_current_updated(&self, element: DataElement) -> Self {
        let mut next = self.clone();
        next.current = Some(Arc::new(element));
        next
    }

    fn with_shared_current(&self, element: Option<Arc<DataElement>>) -> Self {
        let mut next = self.clone();
        next.current = element;
        next
    }

    /// Captures the current element under `name`.
    pub fn with_mark(&self, name: &str) -> Self {
        self.with_mark_element(name, self.current.clone())
    }

    fn with_mark_element(&self, name: &str, element: Option<Arc<DataElement>>) -> Self {
        let mut next = self.clone();
        next.marks = Some(Arc::new(MarkNode {
            name: name.to_owned(),
            element,
            parent: self.marks.clone(),
        }));
        next
    }

    fn mark_node(&self, name: &str) -> Option<&MarkNode> {
        let mut node = self.marks.as_deref();
        while let Some(n) = node {
            if n.name == name {
                return Some(n);
            }
            node = n.parent.as_deref();
        }
        None
    }

    /// True if a mark named `name` was captured, even with a null element.
    pub fn has_mark(&self, name: &str) -> bool {
        self.mark_node(name).is_some()
    }

    /// Element captured under `name`.
    pub fn mark(&self, name: &str) -> Option<&DataElement> {
        self.mark_node(name).and_then(|n| n.element.as_deref())
    }

    /// All visible marks; later captures shadow earlier ones of the same name.
    pub fn marks(&self) -> BTreeMap<String, Option<&DataElement>> {
        let mut out = BTreeMap::new();
        let mut node = self.marks.as_deref();
        while let Some(n) = node {
            out.entry(n.name.clone()).or_insert(n.element.as_deref());
            node = n.parent.as_deref();
        }
        out
    }

    /// Moves the current element to the one captured under `name`, leaving
    /// the marks untouched. Returns `None` when the mark does not exist.
    pub fn jump_to(&self, name: &str) -> Option<Self> {
        let node = self.mark_node(name)?;
        Some(self.with_shared_current(node.element.clone()))
    }

    /// Traversal path, oldest step first.
    pub fn path(&self) -> Vec<PathStep> {
        let mut steps = Vec::new();
        let mut node = self.path.as_deref();
        while let Some(n) = node {
            steps.push(n.step.clone());
            node = n.parent.as_deref();
        }
        steps.reverse();
        steps
    }

    /// Attaches a terminal payload.
    pub fn with_payload(&self, payload: Payload) -> Self {
        let mut next = self.clone();
        next.payload = Some(Arc::new(payload));
        next
    }

    /// Terminal payload, if a value-producing stage ran.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_deref()
    }

    /// Element addressed by a namespace.
    pub fn element(&self, namespace: &Namespace) -> Option<&DataElement> {
        match namespace {
            Namespace::Current => self.current(),
            Namespace::Mark(name) => self.mark(name),
        }
    }

    /// Resolves a field path. Missing namespaces or fields yield `None`.
    pub fn resolve(&self, path: &FieldPath) -> Option<Value> {
        let el = self.element(&path.namespace)?;
        match &path.field {
            Field::Element => Some(el.to_value()),
            Field::Id => Some(Value::String(el.id.clone())),
            Field::Label => Some(Value::String(el.label.clone())),
            Field::From => el.from.clone().map(Value::String),
            Field::To => el.to.clone().map(Value::String),
            Field::Data(segs) if segs.is_empty() => Some(Value::Map(el.data.clone())),
            Field::Data(segs) => el.get_path(segs).cloned(),
        }
    }

    /// Returns a traveler whose addressed element has `value` written at the
    /// property path. Only property paths are writable.
    pub fn with_field(&self, path: &FieldPath, value: Value) -> Option<Self> {
        let Field::Data(segs) = &path.field else {
            return None;
        };
        let mut el = self.element(&path.namespace)?.clone();
        if !el.set_path(segs, value) {
            return None;
        }
        Some(self.with_element(&path.namespace, el))
    }

    /// Replaces the element addressed by `namespace`.
    pub fn with_element(&self, namespace: &Namespace, element: DataElement) -> Self {
        match namespace {
            Namespace::Current => self.with_current_updated(element),
            Namespace::Mark(name) => self.with_mark_element(name, Some(Arc::new(element))),
        }
    }
}

impl fmt::Debug for Traveler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traveler")
            .field("current", &self.current.as_ref().map(|c| &c.id))
            .field("marks", &self.marks().keys().collect::<Vec<_>>())
            .field("payload", &self.payload)
            .field("signal", &self.signal)
            .finish()
    }
}
