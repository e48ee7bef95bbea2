//! Data models for the metadata server.
//!
//! This module re-exports all model types used throughout the application.

pub mod metadata;
pub mod query;

// Re-export commonly used types
pub use metadata::{
    ColumnInfo, DatabaseMetadataResponse, DatabaseSummary, HealthReport, HealthStatus, IndexInfo,
    MetadataSuggestion, ObjectKind, ObjectSummary, ParameterDirection, ParameterInfo,
    RelationshipInfo, SchemaOverview, StoredProcedureMetadata, TableDependency,
    TableDependencyReport, TableMetadata,
};
pub use query::{QueryParam, Row, RowExt};
