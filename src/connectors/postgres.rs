//! PostgreSQL connector.
//!
//! Listings come from `information_schema`; indexes and routine source come
//! from `pg_catalog`, which has no standard equivalent.

use super::sql::{ParamStyle, SqlBuilder};
use super::{
    CatalogVerifier, ConnectorCore, EngineConnector, column_infos, definition_text, found_kind,
    index_infos, object_summaries, parameter_infos,
};
use crate::config::DatabaseConfig;
use crate::db::{PostgresOpener, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ObjectKind, ObjectSummary, ParameterDirection, QueryParam, RowExt, StoredProcedureMetadata,
    TableMetadata,
};
use crate::parser::DependencyParser;
use async_trait::async_trait;
use std::sync::Arc;

const ENGINE: &str = "postgresql";
const DRIVER: &str = "sqlx-postgres";
const DEFAULT_SCHEMA: &str = "public";

mod queries {
    pub const PROBE: &str = "SELECT 1";

    pub const SCHEMAS: &str = r#"
        SELECT schema_name::text AS schema_name
        FROM information_schema.schemata
        WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
          AND schema_name NOT LIKE 'pg_temp_%'
          AND schema_name NOT LIKE 'pg_toast_temp_%'
        ORDER BY schema_name
    "#;

    pub const TABLES: &str = r#"
        SELECT
            table_schema::text AS schema_name,
            table_name::text AS object_name,
            CASE WHEN table_type = 'BASE TABLE' THEN 'table' ELSE 'view' END AS object_type
        FROM information_schema.tables
        WHERE table_type IN ('BASE TABLE', 'VIEW')
          AND table_schema NOT IN ('information_schema', 'pg_catalog')
    "#;

    pub const TABLE_KIND: &str = r#"
        SELECT table_type::text AS object_type
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_name = $2
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            c.character_maximum_length::int8 AS max_length,
            c.numeric_precision::int8 AS numeric_precision,
            c.numeric_scale::int8 AS numeric_scale,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage ku
                    ON tc.constraint_name = ku.constraint_name
                   AND tc.table_schema = ku.table_schema
                   AND tc.table_name = ku.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema = c.table_schema
                  AND tc.table_name = c.table_name
                  AND ku.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        WHERE c.table_schema = $1 AND c.table_name = $2
        ORDER BY c.ordinal_position
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            i.relname::text AS index_name,
            a.attname::text AS column_name,
            ix.indisunique AS is_unique,
            ix.indisclustered AS is_clustered
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1 AND t.relname = $2
        ORDER BY i.relname, k.ord
    "#;

    /// Every routine, procedures and functions alike.
    pub const PROCEDURES: &str = r#"
        SELECT DISTINCT
            routine_schema::text AS schema_name,
            routine_name::text AS object_name,
            'stored_procedure' AS object_type,
            routine_type::text AS routine_type
        FROM information_schema.routines
        WHERE routine_schema NOT IN ('information_schema', 'pg_catalog')
    "#;

    pub const FUNCTIONS: &str = r#"
        SELECT DISTINCT
            routine_schema::text AS schema_name,
            routine_name::text AS object_name,
            'function' AS object_type,
            routine_type::text AS routine_type
        FROM information_schema.routines
        WHERE routine_type = 'FUNCTION'
          AND routine_schema NOT IN ('information_schema', 'pg_catalog')
    "#;

    pub const ROUTINE_KIND: &str = r#"
        SELECT routine_type::text AS object_type
        FROM information_schema.routines
        WHERE routine_schema = $1 AND routine_name = $2
        ORDER BY specific_name
        LIMIT 1
    "#;

    /// Parameters of the first overload only.
    pub const PARAMETERS: &str = r#"
        SELECT
            p.parameter_name::text AS parameter_name,
            p.data_type::text AS data_type,
            p.parameter_mode::text AS parameter_mode,
            p.parameter_default::text AS parameter_default,
            p.ordinal_position::int8 AS position
        FROM information_schema.parameters p
        WHERE p.specific_schema = $1
          AND p.specific_name = (
              SELECT r.specific_name
              FROM information_schema.routines r
              WHERE r.routine_schema = $1 AND r.routine_name = $2
              ORDER BY r.specific_name
              LIMIT 1
          )
        ORDER BY p.ordinal_position
    "#;

    pub const DEFINITION: &str = r#"
        SELECT pg_get_functiondef(p.oid)::text AS definition
        FROM pg_proc p
        JOIN pg_namespace n ON p.pronamespace = n.oid
        WHERE n.nspname = $1 AND p.proname = $2 AND p.prokind IN ('f', 'p')
        ORDER BY p.oid
        LIMIT 1
    "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*)::int8 AS table_count
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_name = $2
    "#;
}

pub struct PostgresConnector {
    core: ConnectorCore,
    parser: DependencyParser,
}

impl PostgresConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_opener(config, Arc::new(PostgresOpener))
    }

    pub fn with_opener(config: DatabaseConfig, opener: Arc<dyn SessionOpener>) -> Self {
        Self {
            core: ConnectorCore::new(config, opener, queries::PROBE),
            parser: DependencyParser::new(),
        }
    }

    fn object_params(schema: &str, name: &str) -> [QueryParam; 2] {
        [QueryParam::from(schema), QueryParam::from(name)]
    }

    async fn list(
        &self,
        operation: &str,
        base: &str,
        schema_column: &str,
        order: &str,
        schema: Option<&str>,
        default_kind: ObjectKind,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        let (sql, params) = SqlBuilder::new(base, ParamStyle::Dollar)
            .and_eq(schema_column, schema)
            .and_in(schema_column, self.config().include_schemas())
            .order_by(order)
            .build();
        let rows = self.core.fetch(ENGINE, operation, &sql, &params).await?;
        Ok(object_summaries(&rows, default_kind, self.config().exclude_patterns()))
    }
}

#[async_trait]
impl EngineConnector for PostgresConnector {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn driver_name(&self) -> &'static str {
        DRIVER
    }

    fn default_schema(&self) -> String {
        DEFAULT_SCHEMA.to_string()
    }

    fn core(&self) -> &ConnectorCore {
        &self.core
    }

    async fn get_schemas(&self) -> ConnectorResult<Vec<String>> {
        let rows = self
            .core
            .fetch(ENGINE, "get_schemas", queries::SCHEMAS, &[])
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_trimmed("schema_name"))
            .filter(|s| self.should_include_schema(s))
            .collect())
    }

    async fn get_tables(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_tables",
            queries::TABLES,
            "table_schema",
            "table_schema, table_name",
            schema,
            ObjectKind::Table,
        )
        .await
    }

    async fn get_table_metadata(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<TableMetadata> {
        let schema = self.core.resolve_schema(schema, DEFAULT_SCHEMA)?;
        let params = Self::object_params(&schema, table);
        let operation = "get_table_metadata";

        let kind_rows = self
            .core
            .fetch(ENGINE, operation, queries::TABLE_KIND, &params)
            .await?;
        let kind = match found_kind(&kind_rows, ObjectKind::Table) {
            Some(kind) if !self.should_exclude_object(table) => kind,
            _ => return Err(ConnectorError::not_found("Table", format!("{schema}.{table}"))),
        };

        let columns = self
            .core
            .fetch(ENGINE, operation, queries::COLUMNS, &params)
            .await?;
        let indexes = self
            .core
            .fetch(ENGINE, operation, queries::INDEXES, &params)
            .await?;

        Ok(TableMetadata {
            name: table.to_string(),
            schema_name: schema,
            kind,
            columns: column_infos(&columns),
            indexes: index_infos(&indexes),
            relationships: Vec::new(),
        })
    }

    async fn get_stored_procedures(
        &self,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_stored_procedures",
            queries::PROCEDURES,
            "routine_schema",
            "schema_name, object_name",
            schema,
            ObjectKind::StoredProcedure,
        )
        .await
    }

    async fn get_stored_procedure_metadata(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<StoredProcedureMetadata> {
        let schema = self.core.resolve_schema(schema, DEFAULT_SCHEMA)?;
        let params = Self::object_params(&schema, name);
        let operation = "get_stored_procedure_metadata";

        let kind_rows = self
            .core
            .fetch(ENGINE, operation, queries::ROUTINE_KIND, &params)
            .await?;
        let kind = match found_kind(&kind_rows, ObjectKind::StoredProcedure) {
            Some(kind) if !self.should_exclude_object(name) => kind,
            _ => {
                return Err(ConnectorError::not_found(
                    "Stored procedure",
                    format!("{schema}.{name}"),
                ));
            }
        };

        let param_rows = self
            .core
            .fetch(ENGINE, operation, queries::PARAMETERS, &params)
            .await?;
        let parameters = parameter_infos(&param_rows, |row| {
            ParameterDirection::from_mode(&row.get_str("parameter_mode").unwrap_or_default())
        });

        let definition_rows = self
            .core
            .fetch(ENGINE, operation, queries::DEFINITION, &params)
            .await?;
        let definition = definition_text(&definition_rows);

        let related_tables = match &definition {
            Some(text) => {
                let verifier = CatalogVerifier {
                    core: &self.core,
                    engine: ENGINE,
                    sql: queries::TABLE_EXISTS,
                    fold_lowercase: true,
                };
                self.parser.resolve(text, &schema, &verifier).await
            }
            None => Vec::new(),
        };

        Ok(StoredProcedureMetadata {
            name: name.to_string(),
            schema_name: schema,
            kind,
            parameters,
            returns: Vec::new(),
            related_tables,
            definition,
        })
    }

    async fn get_functions(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_functions",
            queries::FUNCTIONS,
            "routine_schema",
            "schema_name, object_name",
            schema,
            ObjectKind::Function,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{ScriptedSession, opener};
    use serde_json::json;

    fn connector(session: ScriptedSession) -> (Arc<ScriptedSession>, PostgresConnector) {
        let (session, opener) = opener(session);
        let config = DatabaseConfig::new("pg", "postgresql", "postgres://u:p@h/app")
            .with_include_schemas(&["public", "sales"]);
        (session, PostgresConnector::with_opener(config, opener))
    }

    #[tokio::test]
    async fn test_listing_uses_dollar_placeholders() {
        let session = ScriptedSession::new().on(
            "information_schema.tables",
            json!([{"schema_name": "sales", "object_name": "orders", "object_type": "table"}]),
        );
        let (session, c) = connector(session);
        let tables = c.get_tables(Some("sales")).await.unwrap();
        assert_eq!(tables[0].full_name, "sales.orders");

        let (sql, params) = session.calls().pop().unwrap();
        assert!(sql.contains("AND table_schema = $1 AND table_schema IN ($2, $3)"));
        assert_eq!(params.len(), 3);
    }

    #[tokio::test]
    async fn test_procedures_include_functions() {
        let session = ScriptedSession::new().on(
            "information_schema.routines",
            json!([
                {"schema_name": "public", "object_name": "refresh", "object_type": "stored_procedure", "routine_type": "PROCEDURE"},
                {"schema_name": "public", "object_name": "total", "object_type": "stored_procedure", "routine_type": "FUNCTION"}
            ]),
        );
        let (_, c) = connector(session);
        let procs = c.get_stored_procedures(None).await.unwrap();
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[1].routine_type.as_deref(), Some("FUNCTION"));
    }

    #[tokio::test]
    async fn test_function_metadata_modes_and_kind() {
        let session = ScriptedSession::new()
            .on("SELECT routine_type::text AS object_type", json!([{"object_type": "FUNCTION"}]))
            .on(
                "information_schema.parameters",
                json!([
                    {"parameter_name": "customer_id", "data_type": "integer", "parameter_mode": "IN", "position": 1},
                    {"parameter_name": null, "data_type": "numeric", "parameter_mode": "INOUT", "position": 2}
                ]),
            )
            .on(
                "pg_get_functiondef",
                json!([{"definition": "CREATE FUNCTION public.total() AS $$ SELECT sum(x) FROM orders $$"}]),
            )
            .on("COUNT(*)::int8 AS table_count", json!([{"table_count": 0}]));
        let (_, c) = connector(session);
        let f = c.get_stored_procedure_metadata("total", None).await.unwrap();
        assert_eq!(f.kind, ObjectKind::Function);
        assert_eq!(f.schema_name, "public");
        assert_eq!(f.parameters[1].name, "param_2");
        assert_eq!(f.parameters[1].direction, ParameterDirection::InOut);
        assert!(f.related_tables.is_empty());
        assert!(f.returns.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_case_reference_verified_against_folded_name() {
        let session = ScriptedSession::new()
            .on("SELECT routine_type::text AS object_type", json!([{"object_type": "FUNCTION"}]))
            .on(
                "pg_get_functiondef",
                json!([{"definition": "CREATE FUNCTION public.total() AS $$ SELECT sum(x) FROM Orders $$"}]),
            )
            .on_params(
                "COUNT(*)::int8 AS table_count",
                &["public", "orders"],
                json!([{"table_count": 1}]),
            );
        let (session, c) = connector(session);
        let f = c.get_stored_procedure_metadata("total", None).await.unwrap();
        assert_eq!(f.related_tables, vec!["public.Orders".to_string()]);

        let (_, params) = session
            .calls()
            .into_iter()
            .find(|(sql, _)| sql.contains("table_count"))
            .unwrap();
        assert_eq!(params, vec![QueryParam::from("public"), QueryParam::from("orders")]);
    }

    #[tokio::test]
    async fn test_view_kind_from_catalog() {
        let session = ScriptedSession::new()
            .on("SELECT table_type::text AS object_type", json!([{"object_type": "VIEW"}]));
        let (_, c) = connector(session);
        let view = c.get_table_metadata("active_orders", Some("sales")).await.unwrap();
        assert_eq!(view.kind, ObjectKind::View);
        assert!(view.columns.is_empty());
    }
}
