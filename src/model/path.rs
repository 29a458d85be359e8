//! Field path addressing.
//!
//! A path selects a namespace (the current element or a named mark) and then a
//! field inside that element:
//!
//! * `name`, `address.city` - properties of the current element
//! * `_gid`, `_label`, `_from`, `_to` - reserved identity fields
//! * `$.name`, `$.address.city` - explicit current namespace
//! * `$person.name`, `$person._gid` - properties of the element marked `person`
//! * `$person`, `$` - the whole element
//!
//! Inside an explicit namespace the short identity names `gid`, `label`,
//! `from`, `to` are accepted as aliases, and `data.` prefixes a property path.

/// Reserved name standing for the traveler's current element.
pub const CURRENT: &str = "_current";

/// Which element of the traveler a path reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The traveler's current element.
    Current,
    /// The element captured under a mark.
    Mark(String),
}

/// Field selected within the addressed element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// The whole element.
    Element,
    /// Element id.
    Id,
    /// Element label.
    Label,
    /// Edge source id.
    From,
    /// Edge destination id.
    To,
    /// Property path. Empty selects the whole property document.
    Data(Vec<String>),
}

/// Parsed field path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    /// Addressed element.
    pub namespace: Namespace,
    /// Field within the element.
    pub field: Field,
}

impl FieldPath {
    /// Parses a path expression. Parsing never fails; unknown shapes resolve to
    /// property paths which simply yield nothing at runtime.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('$') {
            let (ns, field) = match rest.split_once('.') {
                Some((ns, field)) => (ns, Some(field)),
                None => (rest, None),
            };
            let namespace = if ns.is_empty() || ns == CURRENT {
                Namespace::Current
            } else {
                Namespace::Mark(ns.to_owned())
            };
            let field = match field {
                None | Some("") => Field::Element,
                Some(f) => parse_field(f, true),
            };
            return Self { namespace, field };
        }
        Self {
            namespace: Namespace::Current,
            field: parse_field(raw, false),
        }
    }

    /// Path addressing a property of the current element.
    pub fn property(path: &str) -> Self {
        Self {
            namespace: Namespace::Current,
            field: Field::Data(split(path)),
        }
    }

    /// True when the path reads the id of the current element.
    pub fn is_current_id(&self) -> bool {
        self.namespace == Namespace::Current && self.field == Field::Id
    }

    /// True when the path reads the label of the current element.
    pub fn is_current_label(&self) -> bool {
        self.namespace == Namespace::Current && self.field == Field::Label
    }

    /// Mark name when the path reads a marked element.
    pub fn mark(&self) -> Option<&str> {
        match &self.namespace {
            Namespace::Mark(name) => Some(name),
            Namespace::Current => None,
        }
    }
}

fn split(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_field(field: &str, namespaced: bool) -> Field {
    let (head, tail) = match field.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (field, None),
    };
    if tail.is_none() {
        match head {
            "_gid" => return Field::Id,
            "_label" => return Field::Label,
            "_from" => return Field::From,
            "_to" => return Field::To,
            "_data" => return Field::Data(Vec::new()),
            _ => {}
        }
        if namespaced {
            match head {
                "gid" => return Field::Id,
                "label" => return Field::Label,
                "from" => return Field::From,
                "to" => return Field::To,
                "data" => return Field::Data(Vec::new()),
                _ => {}
            }
        }
    } else if head == "_data" || (namespaced && head == "data") {
        return Field::Data(split(tail.unwrap_or_default()));
    }
    Field::Data(split(field))
}
