//! Service layer shared by every MCP tool.
//!
//! [`MetadataService`] owns one connector per configured database and adds
//! filtering, fan-out across schemas, fuzzy search and read-through caching
//! on top of the raw connector contract.

pub mod metadata;

pub use metadata::{DEFAULT_SEARCH_LIMIT, MAX_DEPENDENCY_SCAN, MetadataService};
