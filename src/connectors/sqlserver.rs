//! Microsoft SQL Server connector.
//!
//! Reads INFORMATION_SCHEMA for tables and columns and the `sys` catalog for
//! indexes, routines and result-set descriptions. Connects through ODBC.

use super::sql::{ParamStyle, SqlBuilder};
use super::{
    CatalogVerifier, ConnectorCore, EngineConnector, column_infos, definition_text, found_kind,
    index_infos, object_summaries, parameter_infos,
};
use crate::config::DatabaseConfig;
use crate::db::{OdbcOpener, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ColumnInfo, ObjectKind, ObjectSummary, ParameterDirection, QueryParam, RowExt,
    StoredProcedureMetadata, TableMetadata,
};
use crate::parser::DependencyParser;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const ENGINE: &str = "sqlserver";
const DRIVER: &str = "SQL Server ODBC Driver";
const DEFAULT_SCHEMA: &str = "dbo";

mod queries {
    pub const PROBE: &str = "SELECT 1";

    pub const SCHEMAS: &str = r#"
        SELECT DISTINCT SCHEMA_NAME AS schema_name
        FROM INFORMATION_SCHEMA.SCHEMATA
        WHERE SCHEMA_NAME NOT IN ('information_schema', 'INFORMATION_SCHEMA', 'sys', 'guest')
        ORDER BY SCHEMA_NAME
    "#;

    pub const TABLES: &str = r#"
        SELECT
            TABLE_SCHEMA AS schema_name,
            TABLE_NAME AS object_name,
            CASE WHEN TABLE_TYPE = 'BASE TABLE' THEN 'table' ELSE 'view' END AS object_type
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_TYPE IN ('BASE TABLE', 'VIEW')
          AND TABLE_SCHEMA NOT IN ('information_schema', 'INFORMATION_SCHEMA', 'sys', 'guest')
    "#;

    pub const TABLE_KIND: &str = r#"
        SELECT TABLE_TYPE AS object_type
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.COLUMN_NAME AS column_name,
            c.DATA_TYPE AS data_type,
            c.IS_NULLABLE AS is_nullable,
            c.COLUMN_DEFAULT AS column_default,
            c.CHARACTER_MAXIMUM_LENGTH AS max_length,
            c.NUMERIC_PRECISION AS numeric_precision,
            c.NUMERIC_SCALE AS numeric_scale,
            CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS is_primary_key
        FROM INFORMATION_SCHEMA.COLUMNS c
        LEFT JOIN (
            SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
               AND tc.CONSTRAINT_SCHEMA = ku.CONSTRAINT_SCHEMA
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        ) pk
            ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
           AND pk.TABLE_NAME = c.TABLE_NAME
           AND pk.COLUMN_NAME = c.COLUMN_NAME
        WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
        ORDER BY c.ORDINAL_POSITION
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            i.name AS index_name,
            c.name AS column_name,
            CAST(i.is_unique AS int) AS is_unique,
            CASE WHEN i.type_desc = 'CLUSTERED' THEN 1 ELSE 0 END AS is_clustered
        FROM sys.indexes i
        JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
        JOIN sys.objects o ON i.object_id = o.object_id
        JOIN sys.schemas s ON o.schema_id = s.schema_id
        WHERE s.name = ? AND o.name = ? AND i.type > 0 AND ic.is_included_column = 0
        ORDER BY i.name, ic.key_ordinal
    "#;

    pub const PROCEDURES: &str = r#"
        SELECT
            s.name AS schema_name,
            p.name AS object_name,
            'stored_procedure' AS object_type,
            CONVERT(varchar(33), p.create_date, 126) AS created_date,
            CONVERT(varchar(33), p.modify_date, 126) AS modified_date
        FROM sys.procedures p
        JOIN sys.schemas s ON p.schema_id = s.schema_id
        WHERE s.name NOT IN ('information_schema', 'sys', 'guest')
    "#;

    pub const FUNCTIONS: &str = r#"
        SELECT
            s.name AS schema_name,
            o.name AS object_name,
            'function' AS object_type,
            o.type_desc AS routine_type,
            CONVERT(varchar(33), o.create_date, 126) AS created_date,
            CONVERT(varchar(33), o.modify_date, 126) AS modified_date
        FROM sys.objects o
        JOIN sys.schemas s ON o.schema_id = s.schema_id
        WHERE o.type IN ('FN', 'IF', 'TF')
          AND s.name NOT IN ('information_schema', 'sys', 'guest')
    "#;

    pub const ROUTINE_KIND: &str = r#"
        SELECT CASE WHEN o.type = 'P' THEN 'stored_procedure' ELSE 'function' END AS object_type
        FROM sys.objects o
        JOIN sys.schemas s ON o.schema_id = s.schema_id
        WHERE s.name = ? AND o.name = ? AND o.type IN ('P', 'FN', 'IF', 'TF')
    "#;

    pub const PARAMETERS: &str = r#"
        SELECT
            p.name AS parameter_name,
            t.name AS data_type,
            p.parameter_id AS position,
            CAST(p.is_output AS int) AS is_output,
            CAST(p.is_nullable AS int) AS is_nullable
        FROM sys.parameters p
        JOIN sys.types t ON p.user_type_id = t.user_type_id
        JOIN sys.objects o ON p.object_id = o.object_id
        JOIN sys.schemas s ON o.schema_id = s.schema_id
        WHERE s.name = ? AND o.name = ? AND p.parameter_id > 0
        ORDER BY p.parameter_id
    "#;

    pub const RESULT_SET: &str = r#"
        SELECT
            name AS column_name,
            system_type_name AS data_type,
            CAST(is_nullable AS int) AS is_nullable,
            max_length AS max_length,
            [precision] AS numeric_precision,
            [scale] AS numeric_scale
        FROM sys.dm_exec_describe_first_result_set_for_object(
            OBJECT_ID(QUOTENAME(?) + '.' + QUOTENAME(?)), 0)
        WHERE is_hidden = 0
        ORDER BY column_ordinal
    "#;

    pub const DEFINITION: &str = r#"
        SELECT m.definition AS definition
        FROM sys.sql_modules m
        JOIN sys.objects o ON m.object_id = o.object_id
        JOIN sys.schemas s ON o.schema_id = s.schema_id
        WHERE s.name = ? AND o.name = ?
    "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*) AS table_count
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    "#;
}

pub struct SqlServerConnector {
    core: ConnectorCore,
    parser: DependencyParser,
}

impl SqlServerConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_opener(config, Arc::new(OdbcOpener::new(DRIVER)))
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
        let (sql, params) = SqlBuilder::new(base, ParamStyle::Question)
            .and_eq(schema_column, schema)
            .and_in(schema_column, self.config().include_schemas())
            .order_by(order)
            .build();
        let rows = self.core.fetch(ENGINE, operation, &sql, &params).await?;
        Ok(object_summaries(&rows, default_kind, self.config().exclude_patterns()))
    }

    /// Columns of the first result set, or empty when the server cannot
    /// describe it (temp tables, dynamic SQL).
    async fn result_columns(&self, schema: &str, name: &str) -> Vec<ColumnInfo> {
        match self
            .core
            .fetch(
                ENGINE,
                "describe result set",
                queries::RESULT_SET,
                &Self::object_params(schema, name),
            )
            .await
        {
            Ok(rows) => column_infos(&rows),
            Err(e) => {
                warn!(routine = %format!("{schema}.{name}"), error = %e, "Cannot describe result set");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl EngineConnector for SqlServerConnector {
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
            "TABLE_SCHEMA",
            "TABLE_SCHEMA, TABLE_NAME",
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

        let kind_rows = self
            .core
            .fetch(ENGINE, "get_table_metadata", queries::TABLE_KIND, &params)
            .await?;
        let kind = match found_kind(&kind_rows, ObjectKind::Table) {
            Some(kind) if !self.should_exclude_object(table) => kind,
            _ => return Err(ConnectorError::not_found("Table", format!("{schema}.{table}"))),
        };

        let columns = self
            .core
            .fetch(ENGINE, "get_table_metadata", queries::COLUMNS, &params)
            .await?;
        let indexes = self
            .core
            .fetch(ENGINE, "get_table_metadata", queries::INDEXES, &params)
            .await?;

        debug!(table = %format!("{schema}.{table}"), columns = columns.len(), "Loaded table metadata");
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
            "s.name",
            "s.name, p.name",
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
            if row.get_bool("is_output") {
                ParameterDirection::Out
            } else {
                ParameterDirection::In
            }
        });

        let returns = self.result_columns(&schema, name).await;

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
                    fold_lowercase: false,
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
            returns,
            related_tables,
            definition,
        })
    }

    async fn get_functions(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_functions",
            queries::FUNCTIONS,
            "s.name",
            "s.name, o.name",
            schema,
            ObjectKind::Function,
        )
        .await
    }
}
