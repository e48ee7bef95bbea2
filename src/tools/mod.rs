//! MCP tool implementations.
//!
//! This module contains the metadata tool handlers:
//! - `metadata`: inputs, outputs and the handler behind every tool
//! - `format`: table and markdown rendering of tool outputs

pub mod format;
pub mod metadata;

pub use format::OutputFormat;
pub use metadata::{MetadataToolHandler, detect_object_types};
