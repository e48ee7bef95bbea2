//! Fuzzy object search.

pub mod fuzzy;

pub use fuzzy::{FuzzyMatcher, Ranked, Searchable};
