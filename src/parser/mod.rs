//! Dependency extraction from routine definitions.

pub mod dependency;

pub use dependency::{DependencyParser, TableReference, TableVerifier};
