//! Vertex and edge snapshots.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::Value;

/// Snapshot of a vertex or an edge as seen by one traveler.
///
/// `loaded == false` means only identity and label (plus edge endpoints) were
/// fetched; `data` must then be treated as incomplete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    /// Element identifier, never empty for a materialized element.
    pub id: String,
    /// Element label, never empty for a materialized element.
    pub label: String,
    /// Source vertex id, edges only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Destination vertex id, edges only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Property document.
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    /// Whether `data` holds the full property set.
    #[serde(default = "loaded_default")]
    pub loaded: bool,
}

fn loaded_default() -> bool {
    true
}

/// Vertex snapshot.
pub type Vertex = DataElement;
/// Edge snapshot.
pub type Edge = DataElement;

impl DataElement {
    /// Creates a loaded vertex with no properties.
    pub fn vertex(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            from: None,
            to: None,
            data: BTreeMap::new(),
            loaded: true,
        }
    }

    /// Creates a loaded edge with no properties.
    pub fn edge(
        id: impl Into<String>,
        label: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            from: Some(from.into()),
            to: Some(to.into()),
            data: BTreeMap::new(),
            loaded: true,
        }
    }

    /// Adds a property, builder style.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// True when the element carries edge endpoints.
    pub fn is_edge(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Identity-only copy: properties dropped, `loaded` cleared.
    pub fn stub(&self) -> Self {
        Self {
            id: self.id.clone(),
            label: self.label.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            data: BTreeMap::new(),
            loaded: false,
        }
    }

    /// Checks the identity invariants of a vertex.
    pub fn validate_vertex(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(GraphError::InvalidArgument("vertex id is empty".into()));
        }
        if self.label.is_empty() {
            return Err(GraphError::InvalidArgument(format!(
                "vertex '{}' has an empty label",
                self.id
            )));
        }
        Ok(())
    }

    /// Checks the identity invariants of an edge.
    pub fn validate_edge(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(GraphError::InvalidArgument("edge id is empty".into()));
        }
        if self.label.is_empty() {
            return Err(GraphError::InvalidArgument(format!(
                "edge '{}' has an empty label",
                self.id
            )));
        }
        match (self.from.as_deref(), self.to.as_deref()) {
            (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => Ok(()),
            _ => Err(GraphError::InvalidArgument(format!(
                "edge '{}' is missing an endpoint",
                self.id
            ))),
        }
    }

    /// Follows a nested property path. List elements are addressed by index.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.data.get(first)?;
        for seg in rest {
            cur = match cur {
                Value::Map(map) => map.get(seg)?,
                Value::List(items) => items.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Writes a value at a nested property path, creating intermediate maps.
    ///
    /// Returns false when an intermediate segment exists but is not a map.
    pub fn set_path(&mut self, path: &[String], value: Value) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let mut map = &mut self.data;
        for seg in parents {
            let slot = map
                .entry(seg.clone())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            match slot {
                Value::Map(inner) => map = inner,
                _ => return false,
            }
        }
        map.insert(last.clone(), value);
        true
    }

    /// Removes the value at a nested property path.
    pub fn remove_path(&mut self, path: &[String]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut map = &mut self.data;
        for seg in parents {
            match map.get_mut(seg)? {
                Value::Map(inner) => map = inner,
                _ => return None,
            }
        }
        map.remove(last)
    }

    /// Renders the element as a document with reserved `_gid`, `_label`,
    /// `_from`, `_to` keys next to its properties.
    pub fn to_value(&self) -> Value {
        let mut doc = self.data.clone();
        doc.insert("_gid".into(), Value::String(self.id.clone()));
        doc.insert("_label".into(), Value::String(self.label.clone()));
        if let Some(from) = &self.from {
            doc.insert("_from".into(), Value::String(from.clone()));
        }
        if let Some(to) = &self.to {
            doc.insert("_to".into(), Value::String(to.clone()));
        }
        Value::Map(doc)
    }
}

/// Element submitted through the bulk loading entry point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphElement {
    /// Vertex to insert or replace.
    Vertex(Vertex),
    /// Edge to insert or replace.
    Edge(Edge),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_owned).collect()
    }

    #[test]
    fn nested_paths_read_write_and_remove() {
        let mut v = DataElement::vertex("1", "person").with_property("tags", vec!["a", "b"]);
        assert!(v.set_path(&path("address.city"), Value::from("Oslo")));
        assert_eq!(v.get_path(&path("address.city")), Some(&Value::from("Oslo")));
        assert_eq!(v.get_path(&path("tags.1")), Some(&Value::from("b")));
        assert_eq!(v.get_path(&path("tags.x")), None);
        assert!(!v.set_path(&path("tags.inner"), Value::Null));
        assert_eq!(v.remove_path(&path("address.city")), Some(Value::from("Oslo")));
        assert_eq!(v.get_path(&path("address.city")), None);
    }

    #[test]
    fn validation_rejects_missing_identity() {
        assert!(DataElement::vertex("", "x").validate_vertex().is_err());
        assert!(DataElement::vertex("1", "").validate_vertex().is_err());
        assert!(DataElement::vertex("1", "x").validate_edge().is_err());
        assert!(DataElement::edge("e", "knows", "1", "2").validate_edge().is_ok());
    }

    #[test]
    fn stub_drops_properties() {
        let v = DataElement::vertex("1", "person").with_property("name", "ann");
        let stub = v.stub();
        assert!(!stub.loaded);
        assert!(stub.data.is_empty());
        assert_eq!(stub.label, "person");
    }
}
