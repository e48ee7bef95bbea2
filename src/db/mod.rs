//! Database access layer.
//!
//! This module provides the driver side of metadata extraction:
//! - The [`QuerySession`] abstraction every connector queries through
//! - sqlx-backed sessions for PostgreSQL and MySQL
//! - A thread-hosted ODBC session for SQL Server, DB2 and Oracle
//! - Row decoding and parameter binding

pub mod odbc;
pub mod params;
pub mod session;
pub mod sqlx_session;
pub mod types;

pub use odbc::OdbcOpener;
pub use session::{QuerySession, SessionOpener};
pub use sqlx_session::{MySqlOpener, PostgresOpener};
