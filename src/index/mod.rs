#![forbid(unsafe_code)]

//! Auxiliary indexes built while a pipeline runs.

pub mod term_index;

pub use term_index::TermIndex;
