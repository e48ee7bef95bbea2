//! MySQL connector over `information_schema`.
//!
//! MySQL has no schemas inside a database: a schema is a database. The
//! default schema is the database named in the connection URL.

use super::sql::{ParamStyle, SqlBuilder};
use super::{
    CatalogVerifier, ConnectorCore, EngineConnector, column_infos, definition_text, found_kind,
    index_infos, object_summaries, parameter_infos,
};
use crate::config::DatabaseConfig;
use crate::db::{MySqlOpener, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ColumnInfo, ObjectKind, ObjectSummary, ParameterDirection, QueryParam, RelationshipInfo, Row,
    RowExt, StoredProcedureMetadata, TableMetadata,
};
use crate::parser::DependencyParser;
use async_trait::async_trait;
use std::sync::Arc;

const ENGINE: &str = "mysql";
const DRIVER: &str = "sqlx-mysql";

mod queries {
    pub const PROBE: &str = "SELECT 1";

    pub const SCHEMAS: &str = r#"
        SELECT SCHEMA_NAME AS schema_name
        FROM information_schema.SCHEMATA
        WHERE SCHEMA_NAME NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
        ORDER BY SCHEMA_NAME
    "#;

    pub const TABLES: &str = r#"
        SELECT
            TABLE_SCHEMA AS schema_name,
            TABLE_NAME AS object_name,
            CASE WHEN TABLE_TYPE = 'VIEW' THEN 'view' ELSE 'table' END AS object_type,
            CAST(CREATE_TIME AS CHAR) AS created_date,
            CAST(UPDATE_TIME AS CHAR) AS modified_date
        FROM information_schema.TABLES
        WHERE TABLE_TYPE IN ('BASE TABLE', 'VIEW')
          AND TABLE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
    "#;

    pub const TABLE_KIND: &str = r#"
        SELECT TABLE_TYPE AS object_type
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            COLUMN_NAME AS column_name,
            COLUMN_TYPE AS data_type,
            IS_NULLABLE AS is_nullable,
            COLUMN_DEFAULT AS column_default,
            CHARACTER_MAXIMUM_LENGTH AS max_length,
            NUMERIC_PRECISION AS numeric_precision,
            NUMERIC_SCALE AS numeric_scale,
            CASE WHEN COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS is_primary_key
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            INDEX_NAME AS index_name,
            COLUMN_NAME AS column_name,
            CASE WHEN NON_UNIQUE = 0 THEN 1 ELSE 0 END AS is_unique,
            CASE WHEN INDEX_NAME = 'PRIMARY' THEN 1 ELSE 0 END AS is_clustered
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
    "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            COLUMN_NAME AS column_name,
            REFERENCED_TABLE_SCHEMA AS referenced_schema,
            REFERENCED_TABLE_NAME AS referenced_table,
            REFERENCED_COLUMN_NAME AS referenced_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
    "#;

    pub const PROCEDURES: &str = r#"
        SELECT
            ROUTINE_SCHEMA AS schema_name,
            ROUTINE_NAME AS object_name,
            'stored_procedure' AS object_type,
            CAST(CREATED AS CHAR) AS created_date,
            CAST(LAST_ALTERED AS CHAR) AS modified_date
        FROM information_schema.ROUTINES
        WHERE ROUTINE_TYPE = 'PROCEDURE'
          AND ROUTINE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
    "#;

    pub const FUNCTIONS: &str = r#"
        SELECT
            ROUTINE_SCHEMA AS schema_name,
            ROUTINE_NAME AS object_name,
            'function' AS object_type,
            DATA_TYPE AS routine_type,
            CAST(CREATED AS CHAR) AS created_date,
            CAST(LAST_ALTERED AS CHAR) AS modified_date
        FROM information_schema.ROUTINES
        WHERE ROUTINE_TYPE = 'FUNCTION'
          AND ROUTINE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
    "#;

    pub const ROUTINE_KIND: &str = r#"
        SELECT LOWER(ROUTINE_TYPE) AS object_type
        FROM information_schema.ROUTINES
        WHERE ROUTINE_SCHEMA = ? AND ROUTINE_NAME = ?
        LIMIT 1
    "#;

    /// Position 0 is a function's return value.
    pub const PARAMETERS: &str = r#"
        SELECT
            PARAMETER_NAME AS parameter_name,
            DTD_IDENTIFIER AS data_type,
            PARAMETER_MODE AS parameter_mode,
            ORDINAL_POSITION AS position
        FROM information_schema.PARAMETERS
        WHERE SPECIFIC_SCHEMA = ? AND SPECIFIC_NAME = ? AND ORDINAL_POSITION > 0
        ORDER BY ORDINAL_POSITION
    "#;

    pub const DEFINITION: &str = r#"
        SELECT ROUTINE_DEFINITION AS definition
        FROM information_schema.ROUTINES
        WHERE ROUTINE_SCHEMA = ? AND ROUTINE_NAME = ?
        LIMIT 1
    "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*) AS table_count
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    "#;
}

pub struct MySqlConnector {
    core: ConnectorCore,
    parser: DependencyParser,
    default_schema: String,
}

impl MySqlConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_opener(config, Arc::new(MySqlOpener))
    }

    pub fn with_opener(config: DatabaseConfig, opener: Arc<dyn SessionOpener>) -> Self {
        let default_schema = config
            .url_database_name()
            .unwrap_or_else(|| config.name.clone());
        Self {
            core: ConnectorCore::new(config, opener, queries::PROBE),
            parser: DependencyParser::new(),
            default_schema,
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
}

/// Attach foreign-key rows to the columns they constrain and return the
/// matching relationships.
fn apply_foreign_keys(columns: &mut [ColumnInfo], rows: &[Row]) -> Vec<RelationshipInfo> {
    let mut relationships = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(local), Some(schema), Some(table), Some(column)) = (
            row.get_trimmed("column_name"),
            row.get_trimmed("referenced_schema"),
            row.get_trimmed("referenced_table"),
            row.get_trimmed("referenced_column"),
        ) else {
            continue;
        };
        let foreign_table = format!("{schema}.{table}");
        if let Some(col) = columns.iter_mut().find(|c| c.name == local) {
            col.foreign_key = Some(format!("{foreign_table}.{column}"));
        }
        relationships.push(RelationshipInfo::many_to_one(local, foreign_table, column));
    }
    relationships
}

#[async_trait]
impl EngineConnector for MySqlConnector {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn driver_name(&self) -> &'static str {
        DRIVER
    }

    fn default_schema(&self) -> String {
        self.default_schema.clone()
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
        let schema = self.core.resolve_schema(schema, &self.default_schema)?;
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

        let column_rows = self
            .core
            .fetch(ENGINE, operation, queries::COLUMNS, &params)
            .await?;
        let index_rows = self
            .core
            .fetch(ENGINE, operation, queries::INDEXES, &params)
            .await?;
        let fk_rows = self
            .core
            .fetch(ENGINE, operation, queries::FOREIGN_KEYS, &params)
            .await?;

        let mut columns = column_infos(&column_rows);
        let relationships = apply_foreign_keys(&mut columns, &fk_rows);

        Ok(TableMetadata {
            name: table.to_string(),
            schema_name: schema,
            kind,
            columns,
            indexes: index_infos(&index_rows),
            relationships,
        })
    }

    async fn get_stored_procedures(
        &self,
        schema: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_stored_procedures",
            queries::PROCEDURES,
            "ROUTINE_SCHEMA",
            "ROUTINE_SCHEMA, ROUTINE_NAME",
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
        let schema = self.core.resolve_schema(schema, &self.default_schema)?;
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
            returns: Vec::new(),
            related_tables,
            definition,
        })
    }

    async fn get_functions(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list(
            "get_functions",
            queries::FUNCTIONS,
            "ROUTINE_SCHEMA",
            "ROUTINE_SCHEMA, ROUTINE_NAME",
            schema,
            ObjectKind::Function,
        )
        .await
    }
}
