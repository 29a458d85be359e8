#![forbid(unsafe_code)]

//! Data model shared by the compiler, the processors and the backends.

mod element;
mod lookup;
pub mod path;
mod result;
mod traveler;
mod value;

pub use element::{DataElement, Edge, GraphElement, Vertex};
pub use lookup::ElementLookup;
pub use path::{Field, FieldPath, Namespace};
pub use result::{AggregationResult, QueryResult};
pub use traveler::{PathStep, Payload, Signal, Traveler};
pub use value::Value;
