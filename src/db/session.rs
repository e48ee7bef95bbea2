//! Driver-neutral query session.
//!
//! Every engine connector talks to its database through a [`QuerySession`].
//! The sqlx sessions (PostgreSQL, MySQL) and the ODBC session (SQL Server,
//! DB2, Oracle) all return rows as [`Row`] maps so catalog parsing is shared.

use crate::config::DatabaseConfig;
use crate::error::ConnectorResult;
use crate::models::{QueryParam, Row};
use async_trait::async_trait;
use std::sync::Arc;

/// An open, pooled or dedicated, connection to one database.
#[async_trait]
pub trait QuerySession: Send + Sync {
    /// Run a read query and collect every row.
    async fn fetch(&self, sql: &str, params: &[QueryParam]) -> ConnectorResult<Vec<Row>>;

    /// Release the underlying connection(s). Further calls fail.
    async fn close(&self);

    /// Driver label reported in health checks.
    fn driver(&self) -> &'static str;
}

/// Opens sessions for a database configuration.
///
/// Connectors own an opener rather than a driver so tests can substitute a
/// scripted session without a live database.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(&self, config: &DatabaseConfig) -> ConnectorResult<Arc<dyn QuerySession>>;
}
