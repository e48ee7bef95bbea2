//! DB Metadata Server Library
//!
//! This library extracts, normalizes and searches metadata (tables, views,
//! stored procedures, functions and their dependencies) from SQL Server,
//! PostgreSQL, DB2, MySQL and Oracle, and exposes it as MCP tools.

pub mod cache;
pub mod config;
pub mod connectors;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod parser;
pub mod search;
pub mod service;
pub mod tools;
pub mod transport;

pub use config::{Config, Settings};
pub use connectors::{ConnectorRegistry, EngineConnector};
pub use error::{ConnectorError, ConnectorResult};
pub use mcp::MetadataMcpService;
pub use service::MetadataService;
