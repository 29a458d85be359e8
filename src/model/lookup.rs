//! Batched request envelopes exchanged with storage backends.
use crate::model::{DataElement, Traveler};

/// Correlates an id to resolve with the traveler that asked for it.
///
/// Backends fill in `vertex` or `edge`; the back-reference is returned
/// untouched so results stay correlated even when a batch resolves out of
/// order or the same id appears more than once.
#[derive(Clone, Debug)]
pub struct ElementLookup {
    /// Id to resolve.
    pub id: String,
    /// Traveler that issued the request.
    pub reference: Traveler,
    /// Resolved vertex.
    pub vertex: Option<DataElement>,
    /// Resolved edge.
    pub edge: Option<DataElement>,
}

impl ElementLookup {
    /// Unresolved request for `id`.
    pub fn new(id: impl Into<String>, reference: Traveler) -> Self {
        Self {
            id: id.into(),
            reference,
            vertex: None,
            edge: None,
        }
    }

    /// Signal envelope wrapping a signal traveler.
    pub fn signal(reference: Traveler) -> Self {
        Self::new(String::new(), reference)
    }

    /// True when the back-reference is a signal traveler.
    pub fn is_signal(&self) -> bool {
        self.reference.is_signal()
    }

    /// Copy of the request resolved to a vertex.
    pub fn with_vertex(&self, vertex: DataElement) -> Self {
        Self {
            id: self.id.clone(),
            reference: self.reference.clone(),
            vertex: Some(vertex),
            edge: None,
        }
    }

    /// Copy of the request resolved to an edge.
    pub fn with_edge(&self, edge: DataElement) -> Self {
        Self {
            id: self.id.clone(),
            reference: self.reference.clone(),
            vertex: None,
            edge: Some(edge),
        }
    }
}
