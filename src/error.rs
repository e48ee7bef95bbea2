//! Error types for the metadata server.
//!
//! Driver errors (sqlx, ODBC) are translated into [`ConnectorError`] before they
//! leave a connector, so the service and transport layers only ever see this
//! taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed during {operation}: {message}")]
    Query { operation: String, message: String },

    #[error("Unsupported database engine '{engine}'. Supported engines: {}", .supported.join(", "))]
    UnsupportedEngine {
        engine: String,
        supported: Vec<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Database '{database}' not found: {hint}")]
    DatabaseNotFound { database: String, hint: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error naming the failing operation.
    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_engine(engine: impl Into<String>, supported: Vec<String>) -> Self {
        Self::UnsupportedEngine {
            engine: engine.into(),
            supported,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(database: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
            hint: hint.into(),
        }
    }

    /// Create a not found error for a catalog object (table, procedure, schema).
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Re-label a query error with the operation that was running.
    ///
    /// Connection, timeout and other variants pass through untouched.
    pub fn in_operation(self, operation: &str) -> Self {
        match self {
            Self::Query { message, .. } => Self::query(operation, message),
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::DatabaseNotFound { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Check if this error is retryable on the next request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to ConnectorError.
impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ConnectorError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let message = match db_err.code() {
                    Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                    None => db_err.message().to_string(),
                };
                ConnectorError::query("execute", message)
            }
            sqlx::Error::PoolTimedOut => ConnectorError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => ConnectorError::connection(
                "Connection pool is closed",
                "Reconnect to the database",
            ),
            sqlx::Error::Io(io_err) => ConnectorError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ConnectorError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ConnectorError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                ConnectorError::query("decode", format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => ConnectorError::query(
                "decode",
                format!("Failed to decode column {}: {}", index, source),
            ),
            sqlx::Error::Decode(source) => {
                ConnectorError::query("decode", format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => ConnectorError::internal("Database worker crashed"),
            _ => ConnectorError::query("execute", err.to_string()),
        }
    }
}

#[cfg(feature = "odbc")]
impl From<odbc_api::Error> for ConnectorError {
    fn from(err: odbc_api::Error) -> Self {
        ConnectorError::query("execute", err.to_string())
    }
}

/// Result type alias for connector and service operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert ConnectorError to MCP ErrorData for semantic error categorization.
impl From<ConnectorError> for rmcp::ErrorData {
    fn from(err: ConnectorError) -> Self {
        match &err {
            ConnectorError::InvalidInput { .. } | ConnectorError::Config { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), None)
            }
            ConnectorError::UnsupportedEngine { supported, .. } => {
                let hint = format!("Use one of: {}", supported.join(", "));
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(Some(&hint)))
            }

            ConnectorError::NotFound { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(Some(
                    "Use search_database_objects to find the exact object name",
                )),
            ),
            ConnectorError::DatabaseNotFound { hint, .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), suggestion_data(Some(hint)))
            }

            ConnectorError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            ConnectorError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some(
                    "Consider increasing connection_timeout for this database",
                )),
            ),
            ConnectorError::Query { .. }
            | ConnectorError::Cache { .. }
            | ConnectorError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectorError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_unsupported_engine_lists_registered_ids() {
        let err = ConnectorError::unsupported_engine(
            "sybase",
            vec!["mysql".to_string(), "postgresql".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("sybase"));
        assert!(msg.contains("mysql, postgresql"));
    }

    #[test]
    fn test_in_operation_relabels_query_errors_only() {
        let err = ConnectorError::query("execute", "boom").in_operation("get_schemas");
        assert!(matches!(err, ConnectorError::Query { ref operation, .. } if operation == "get_schemas"));

        let err = ConnectorError::timeout("connect", 5).in_operation("get_schemas");
        assert!(matches!(err, ConnectorError::Timeout { .. }));
    }

    #[test]
    fn test_error_retryable() {
        assert!(ConnectorError::timeout("connect", 30).is_retryable());
        assert!(ConnectorError::connection("err", "sugg").is_retryable());
        assert!(!ConnectorError::query("get_tables", "bad").is_retryable());
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = ConnectorError::invalid_input("bad input").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_unsupported_engine_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData =
            ConnectorError::unsupported_engine("x", vec!["db2".to_string()]).into();
        assert_eq!(mcp_err.code.0, -32602);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "Use one of: db2");
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = ConnectorError::not_found("Table", "dbo.Missing").into();
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_database_not_found_includes_hint_in_data() {
        let err = ConnectorError::database_not_found("mydb", "Available: main, dw");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32002);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "Available: main, dw");
    }

    #[test]
    fn test_connection_maps_to_internal_error_with_suggestion() {
        let mcp_err: rmcp::ErrorData = ConnectorError::connection("failed", "try again").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "try again");
    }

    #[test]
    fn test_query_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = ConnectorError::query("get_tables", "syntax").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert!(mcp_err.message.contains("get_tables"));
    }
}
