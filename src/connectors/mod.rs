//! Engine connectors.
//!
//! Each supported engine implements [`EngineConnector`] by translating its
//! catalog views into the canonical model. Connection handling, filters and
//! health reporting are shared through [`ConnectorCore`] and the trait's
//! default methods, so an engine only supplies its catalog queries.

pub mod db2;
pub mod filter;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod registry;
pub mod sql;
pub mod sqlserver;

pub use db2::Db2Connector;
pub use mysql::MySqlConnector;
pub use oracle::OracleConnector;
pub use postgres::PostgresConnector;
pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use sqlserver::SqlServerConnector;

use crate::config::DatabaseConfig;
use crate::db::{QuerySession, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ColumnInfo, HealthReport, HealthStatus, IndexInfo, ObjectKind, ObjectSummary,
    ParameterDirection, ParameterInfo, QueryParam, Row, RowExt, StoredProcedureMetadata,
    TableMetadata,
};
use crate::parser::TableVerifier;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The capability set every engine connector provides.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Registry identifier (`sqlserver`, `postgresql`, ...).
    fn engine(&self) -> &'static str;

    fn driver_name(&self) -> &'static str;

    /// Schema used when a lookup does not name one.
    fn default_schema(&self) -> String;

    fn core(&self) -> &ConnectorCore;

    fn config(&self) -> &DatabaseConfig {
        self.core().config()
    }

    /// Establish the handle. A no-op when already connected.
    async fn connect(&self) -> ConnectorResult<()> {
        self.core().connect(self.engine()).await
    }

    async fn disconnect(&self) {
        self.core().disconnect().await
    }

    async fn is_connected(&self) -> bool {
        self.core().is_connected().await
    }

    /// Trivial round trip on the current handle. Never fails.
    async fn test_connection(&self) -> bool {
        self.core().test_connection().await
    }

    /// Non-system schemas allowed by `include_schemas`, ascending.
    async fn get_schemas(&self) -> ConnectorResult<Vec<String>>;

    /// Tables and views, optionally limited to one schema.
    async fn get_tables(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>>;

    async fn get_table_metadata(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<TableMetadata>;

    async fn get_stored_procedures(
        &self,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>>;

    async fn get_stored_procedure_metadata(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<StoredProcedureMetadata>;

    async fn get_functions(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>>;

    /// Run a query on this database, connecting first if needed.
    async fn execute_query(&self, sql: &str, params: &[QueryParam]) -> ConnectorResult<Vec<Row>> {
        self.core().execute_query(self.engine(), sql, params).await
    }

    fn should_include_schema(&self, schema: &str) -> bool {
        filter::schema_allowed(self.config().include_schemas(), schema)
    }

    fn should_exclude_object(&self, name: &str) -> bool {
        filter::is_excluded(self.config().exclude_patterns(), name)
    }

    async fn health_check(&self) -> HealthReport {
        let is_connected = self.test_connection().await;
        HealthReport {
            database: self.config().name.clone(),
            engine: self.engine().to_string(),
            driver: self.driver_name().to_string(),
            status: if is_connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            is_connected,
            connection_string: Some(self.config().masked_connection_string()),
            error: None,
            checked_at: Utc::now(),
        }
    }
}

/// Connection state shared by all connectors.
///
/// Holds at most one session. `connect` takes a mutex and re-checks, so
/// concurrent first requests open a single handle.
pub struct ConnectorCore {
    config: DatabaseConfig,
    opener: Arc<dyn SessionOpener>,
    probe_sql: &'static str,
    session: RwLock<Option<Arc<dyn QuerySession>>>,
    connect_lock: Mutex<()>,
}

impl ConnectorCore {
    pub fn new(
        config: DatabaseConfig,
        opener: Arc<dyn SessionOpener>,
        probe_sql: &'static str,
    ) -> Self {
        Self {
            config,
            opener,
            probe_sql,
            session: RwLock::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn current(&self) -> Option<Arc<dyn QuerySession>> {
        self.session.read().await.clone()
    }

    pub async fn connect(&self, engine: &str) -> ConnectorResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        let _guard = self.connect_lock.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        info!(
            database = %self.config.name,
            engine = engine,
            connection = %self.config.masked_connection_string(),
            "Connecting"
        );
        let wait = self.config.connection_timeout_duration();
        let session = match timeout(wait, self.opener.open(&self.config)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectorError::timeout("connect", wait.as_secs())),
        };
        *self.session.write().await = Some(session);
        info!(database = %self.config.name, engine = engine, "Connected");
        Ok(())
    }

    pub async fn disconnect(&self) {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            session.close().await;
            info!(database = %self.config.name, "Disconnected");
        }
    }

    pub async fn execute_query(
        &self,
        engine: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> ConnectorResult<Vec<Row>> {
        let session = match self.current().await {
            Some(session) => session,
            None => {
                self.connect(engine).await?;
                self.current().await.ok_or_else(|| {
                    ConnectorError::connection(
                        format!("Connection to '{}' was closed", self.config.name),
                        "Retry the request",
                    )
                })?
            }
        };
        session.fetch(sql, params).await
    }

    /// Catalog query whose failures are reported under `operation`.
    pub async fn fetch(
        &self,
        engine: &str,
        operation: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> ConnectorResult<Vec<Row>> {
        let rows = self
            .execute_query(engine, sql, params)
            .await
            .map_err(|e| e.in_operation(operation))?;
        debug!(
            database = %self.config.name,
            operation = operation,
            rows = rows.len(),
            "Catalog query finished"
        );
        Ok(rows)
    }

    pub async fn test_connection(&self) -> bool {
        let Some(session) = self.current().await else {
            return false;
        };
        match session.fetch(self.probe_sql, &[]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(database = %self.config.name, error = %e, "Connection test failed");
                false
            }
        }
    }

    /// The schema a detail lookup runs against: the explicit one or the
    /// engine default, which must pass `include_schemas`.
    pub fn resolve_schema(&self, schema: Option<&str>, default: &str) -> ConnectorResult<String> {
        let schema = schema
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default);
        if !filter::schema_allowed(self.config.include_schemas(), schema) {
            return Err(ConnectorError::not_found("Schema", schema));
        }
        Ok(schema.to_string())
    }
}

/// Existence check used to verify parsed table references.
pub(crate) struct CatalogVerifier<'a> {
    pub core: &'a ConnectorCore,
    pub engine: &'static str,
    /// Query returning a `table_count` column for `(schema, table)`.
    pub sql: &'static str,
    /// Fold names to lowercase before binding, for catalogs that store
    /// unquoted identifiers folded.
    pub fold_lowercase: bool,
}

#[async_trait]
impl TableVerifier for CatalogVerifier<'_> {
    async fn table_exists(&self, schema: &str, table: &str) -> ConnectorResult<bool> {
        let params = if self.fold_lowercase {
            [QueryParam::from(schema.to_lowercase()), QueryParam::from(table.to_lowercase())]
        } else {
            [QueryParam::from(schema), QueryParam::from(table)]
        };
        let rows = self
            .core
            .fetch(self.engine, "verify table", self.sql, &params)
            .await?;
        Ok(rows
            .first()
            .and_then(|r| r.get_i64("table_count"))
            .is_some_and(|n| n > 0))
    }
}

// =============================================================================
// Catalog row mapping
// =============================================================================
//
// Engines alias their catalog columns to the names below so the mapping is
// shared: schema_name, object_name, object_type, routine_type, created_date,
// modified_date for listings; column_name, data_type, is_nullable,
// column_default, max_length, numeric_precision, numeric_scale,
// is_primary_key for columns; index_name, column_name, is_unique,
// is_clustered for indexes; parameter_name, data_type, parameter_default,
// position for parameters.

/// Listing rows to summaries, dropping excluded names.
pub(crate) fn object_summaries(
    rows: &[Row],
    default_kind: ObjectKind,
    exclude: &[String],
) -> Vec<ObjectSummary> {
    rows.iter()
        .filter_map(|row| {
            let schema = row.get_trimmed("schema_name")?;
            let name = row.get_trimmed("object_name")?;
            if filter::is_excluded(exclude, &name) {
                return None;
            }
            let kind = row
                .get_str("object_type")
                .and_then(|t| t.parse().ok())
                .unwrap_or(default_kind);
            Some(
                ObjectSummary::new(schema, name, kind)
                    .with_routine_type(row.get_trimmed("routine_type"))
                    .with_dates(
                        row.get_trimmed("created_date"),
                        row.get_trimmed("modified_date"),
                    ),
            )
        })
        .collect()
}

/// Column rows in catalog order.
pub(crate) fn column_infos(rows: &[Row]) -> Vec<ColumnInfo> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get_trimmed("column_name")?;
            let mut column = ColumnInfo::new(name, row.get_trimmed("data_type").unwrap_or_default());
            column.nullable = row.get_bool("is_nullable");
            column.primary_key = row.get_bool("is_primary_key");
            column.default_value = row.get_str("column_default");
            column.max_length = row.get_i64("max_length");
            column.precision = row.get_i64("numeric_precision");
            column.scale = row.get_i64("numeric_scale");
            Some(column)
        })
        .collect()
}

/// Index rows (one per member column) grouped by index, keeping the order in
/// which indexes and their columns arrive.
pub(crate) fn index_infos(rows: &[Row]) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.get_trimmed("index_name"), row.get_trimmed("column_name"))
        else {
            continue;
        };
        match indexes.iter_mut().find(|idx| idx.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexInfo {
                name,
                columns: vec![column],
                unique: row.get_bool("is_unique"),
                clustered: row.get_bool("is_clustered"),
            }),
        }
    }
    indexes
}

/// Parameter rows in ordinal order; `direction` decodes the engine's mode.
pub(crate) fn parameter_infos(
    rows: &[Row],
    direction: impl Fn(&Row) -> ParameterDirection,
) -> Vec<ParameterInfo> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let position = row
                .get_i64("position")
                .and_then(|p| usize::try_from(p).ok())
                .filter(|p| *p > 0)
                .unwrap_or(idx + 1);
            let name = row.get_str("parameter_name");
            let mut param = ParameterInfo::new(
                name.as_deref(),
                position,
                row.get_trimmed("data_type").unwrap_or_default(),
                direction(row),
            );
            param.default_value = row.get_str("parameter_default");
            if row.value("is_nullable").is_some() {
                param.nullable = row.get_bool("is_nullable");
            }
            param
        })
        .collect()
}

/// Kind column of the first row, if the lookup found the object at all.
pub(crate) fn found_kind(rows: &[Row], default_kind: ObjectKind) -> Option<ObjectKind> {
    let row = rows.first()?;
    Some(
        row.get_str("object_type")
            .and_then(|t| t.parse().ok())
            .unwrap_or(default_kind),
    )
}

/// Concatenated `definition` column; catalogs that store source by line
/// return several rows.
pub(crate) fn definition_text(rows: &[Row]) -> Option<String> {
    let text: String = rows.iter().filter_map(|r| r.get_str("definition")).collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_object_summaries_kind_and_exclude() {
        let r = rows(json!([
            {"schema_name": "dbo", "object_name": "Orders", "object_type": "table"},
            {"schema_name": "dbo", "object_name": "vOrders", "object_type": "view"},
            {"schema_name": "dbo", "object_name": "tmp_x", "object_type": "table"},
            {"schema_name": "dbo", "object_name": null}
        ]));
        let excluded = vec!["tmp_*".to_string()];
        let list = object_summaries(&r, ObjectKind::Table, &excluded);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].full_name, "dbo.Orders");
        assert_eq!(list[1].kind, ObjectKind::View);
    }

    #[test]
    fn test_column_infos_order_and_flags() {
        let r = rows(json!([
            {"column_name": "id", "data_type": "int", "is_nullable": "NO", "is_primary_key": 1},
            {"column_name": "name", "data_type": "varchar", "is_nullable": "YES",
             "is_primary_key": 0, "max_length": "50"}
        ]));
        let cols = column_infos(&r);
        assert_eq!(cols[0].name, "id");
        assert!(cols[0].primary_key);
        assert!(!cols[0].nullable);
        assert_eq!(cols[1].name, "name");
        assert!(!cols[1].primary_key);
        assert!(cols[1].nullable);
        assert_eq!(cols[1].max_length, Some(50));
    }

    #[test]
    fn test_index_infos_groups_in_order() {
        let r = rows(json!([
            {"index_name": "IX_b", "column_name": "last", "is_unique": 0, "is_clustered": 0},
            {"index_name": "IX_b", "column_name": "first", "is_unique": 0, "is_clustered": 0},
            {"index_name": "PK", "column_name": "id", "is_unique": 1, "is_clustered": 1}
        ]));
        let idx = index_infos(&r);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx[0].columns, vec!["last", "first"]);
        assert!(idx[1].unique && idx[1].clustered);
    }

    #[test]
    fn test_parameter_infos_synthesizes_names() {
        let r = rows(json!([
            {"parameter_name": "@id", "data_type": "int", "position": 1},
            {"parameter_name": null, "data_type": "varchar", "position": 2}
        ]));
        let params = parameter_infos(&r, |_| ParameterDirection::In);
        assert_eq!(params[0].name, "@id");
        assert_eq!(params[1].name, "param_2");
    }

    struct SlowOpener;

    #[async_trait]
    impl SessionOpener for SlowOpener {
        async fn open(&self, _config: &DatabaseConfig) -> ConnectorResult<Arc<dyn QuerySession>> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(ConnectorError::internal("unreachable"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out() {
        let mut config = DatabaseConfig::new("slow", "postgresql", "postgres://h/db");
        config.connection_timeout = 1;
        let core = ConnectorCore::new(config, Arc::new(SlowOpener), "SELECT 1");
        let err = core.connect("postgresql").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Timeout { elapsed_secs: 1, .. }));
        assert!(!core.is_connected().await);
    }

    #[tokio::test]
    async fn test_execute_query_connects_once() {
        let (_, opener) = testing::opener(testing::ScriptedSession::new());
        let config = DatabaseConfig::new("a", "mysql", "mysql://h/a");
        let core = ConnectorCore::new(config, opener, "SELECT 1");
        assert!(!core.test_connection().await);
        core.execute_query("mysql", "SELECT 1", &[]).await.unwrap();
        assert!(core.is_connected().await);
        assert!(core.test_connection().await);
        core.disconnect().await;
        assert!(!core.is_connected().await);
    }

    #[tokio::test]
    async fn test_probe_failure_reports_false() {
        let (_, opener) = testing::opener(testing::ScriptedSession::new().fail("DUAL"));
        let config = DatabaseConfig::new("a", "oracle", "DSN=a");
        let core = ConnectorCore::new(config, opener, "SELECT 1 FROM DUAL");
        core.connect("oracle").await.unwrap();
        assert!(!core.test_connection().await);
    }

    #[test]
    fn test_resolve_schema() {
        let (_, opener) = testing::opener(testing::ScriptedSession::new());
        let config = DatabaseConfig::new("a", "sqlserver", "DSN=a").with_include_schemas(&["sales"]);
        let core = ConnectorCore::new(config, opener, "SELECT 1");
        assert_eq!(core.resolve_schema(Some("sales"), "dbo").unwrap(), "sales");
        assert!(core.resolve_schema(None, "dbo").is_err());
        assert!(core.resolve_schema(Some("  "), "dbo").is_err());
    }

    #[test]
    fn test_definition_text_joins_lines() {
        let r = rows(json!([{"definition": "PROCEDURE p IS\n"}, {"definition": "BEGIN NULL; END;"}]));
        assert_eq!(
            definition_text(&r).as_deref(),
            Some("PROCEDURE p IS\nBEGIN NULL; END;")
        );
        assert_eq!(definition_text(&[]), None);
    }
}
