//! Oracle connector over the `ALL_*` dictionary views.
//!
//! Only objects visible to the connected user are reported. Unquoted
//! identifiers are stored upper-case, so lookups upper-case their input.

use super::sql::{ParamStyle, SqlBuilder};
use super::{
    CatalogVerifier, ConnectorCore, EngineConnector, column_infos, definition_text, found_kind,
    index_infos, object_summaries, parameter_infos,
};
use crate::config::DatabaseConfig;
use crate::db::{OdbcOpener, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ObjectKind, ObjectSummary, ParameterDirection, QueryParam, RowExt, StoredProcedureMetadata,
    TableMetadata,
};
use crate::parser::DependencyParser;
use async_trait::async_trait;
use std::sync::Arc;

const ENGINE: &str = "oracle";
const DRIVER: &str = "Oracle ODBC Driver";
const DEFAULT_SCHEMA: &str = "SYSTEM";

/// Oracle-maintained accounts, excluded from every listing.
macro_rules! system_owners {
    () => {
        "('SYS', 'SYSTEM', 'OUTLN', 'DIP', 'ORACLE_OCM', 'DBSNMP', 'APPQOSSYS', 'WMSYS', \
         'EXFSYS', 'CTXSYS', 'XDB', 'ANONYMOUS', 'XS$NULL', 'GSMADMIN_INTERNAL', 'MDDATA', \
         'SYSBACKUP', 'SYSDG', 'SYSKM', 'SYSMAN', 'MGMT_VIEW', 'FLOWS_FILES', 'MDSYS', \
         'ORDSYS', 'ORDDATA', 'ORDPLUGINS', 'OLAPSYS', 'SI_INFORMTN_SCHEMA', \
         'SPATIAL_CSW_ADMIN_USR', 'SPATIAL_WFS_ADMIN_USR', 'LBACSYS', 'OWBSYS', 'OWBSYS_AUDIT', \
         'AUDSYS', 'DBSFWUSER', 'GGSYS', 'GSMCATUSER', 'GSMUSER', 'OJVMSYS', 'REMOTE_SCHEDULER_AGENT', \
         'SYSRAC', 'DVSYS', 'DVF')"
    };
}

mod queries {
    pub const PROBE: &str = "SELECT 1 FROM DUAL";

    pub const SCHEMAS: &str = concat!(
        "SELECT username AS schema_name FROM all_users WHERE username NOT IN ",
        system_owners!(),
        " ORDER BY username"
    );

    pub const TABLES: &str = concat!(
        r#"
        SELECT
            owner AS schema_name,
            object_name AS object_name,
            LOWER(object_type) AS object_type,
            TO_CHAR(created, 'YYYY-MM-DD"T"HH24:MI:SS') AS created_date,
            TO_CHAR(last_ddl_time, 'YYYY-MM-DD"T"HH24:MI:SS') AS modified_date
        FROM all_objects
        WHERE object_type IN ('TABLE', 'VIEW')
          AND object_name NOT LIKE 'BIN$%'
          AND owner NOT IN "#,
        system_owners!()
    );

    pub const TABLE_KIND: &str = r#"
        SELECT LOWER(object_type) AS object_type
        FROM all_objects
        WHERE owner = ? AND object_name = ? AND object_type IN ('TABLE', 'VIEW')
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.column_name AS column_name,
            c.data_type AS data_type,
            c.nullable AS is_nullable,
            c.data_default AS column_default,
            CASE WHEN c.data_type IN ('CHAR', 'VARCHAR2', 'NCHAR', 'NVARCHAR2')
                 THEN c.char_length END AS max_length,
            c.data_precision AS numeric_precision,
            c.data_scale AS numeric_scale,
            CASE WHEN EXISTS (
                SELECT 1
                FROM all_constraints k
                JOIN all_cons_columns kc
                    ON kc.owner = k.owner AND kc.constraint_name = k.constraint_name
                WHERE k.constraint_type = 'P'
                  AND k.owner = c.owner
                  AND k.table_name = c.table_name
                  AND kc.column_name = c.column_name
            ) THEN 1 ELSE 0 END AS is_primary_key
        FROM all_tab_columns c
        WHERE c.owner = ? AND c.table_name = ?
        ORDER BY c.column_id
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            i.index_name AS index_name,
            ic.column_name AS column_name,
            CASE WHEN i.uniqueness = 'UNIQUE' THEN 1 ELSE 0 END AS is_unique,
            CASE WHEN i.index_type = 'IOT - TOP' THEN 1 ELSE 0 END AS is_clustered
        FROM all_indexes i
        JOIN all_ind_columns ic
            ON ic.index_owner = i.owner AND ic.index_name = i.index_name
        WHERE i.table_owner = ? AND i.table_name = ?
        ORDER BY i.index_name, ic.column_position
    "#;

    pub const PROCEDURES: &str = concat!(
        r#"
        SELECT
            owner AS schema_name,
            object_name AS object_name,
            'stored_procedure' AS object_type,
            object_type AS routine_type,
            TO_CHAR(created, 'YYYY-MM-DD"T"HH24:MI:SS') AS created_date,
            TO_CHAR(last_ddl_time, 'YYYY-MM-DD"T"HH24:MI:SS') AS modified_date
        FROM all_objects
        WHERE object_type IN ('PROCEDURE', 'PACKAGE')
          AND owner NOT IN "#,
        system_owners!()
    );

    pub const FUNCTIONS: &str = concat!(
        r#"
        SELECT
            owner AS schema_name,
            object_name AS object_name,
            'function' AS object_type,
            object_type AS routine_type,
            TO_CHAR(created, 'YYYY-MM-DD"T"HH24:MI:SS') AS created_date,
            TO_CHAR(last_ddl_time, 'YYYY-MM-DD"T"HH24:MI:SS') AS modified_date
        FROM all_objects
        WHERE object_type = 'FUNCTION'
          AND owner NOT IN "#,
        system_owners!()
    );

    pub const ROUTINE_KIND: &str = r#"
        SELECT CASE object_type WHEN 'FUNCTION' THEN 'function' ELSE 'stored_procedure' END AS object_type
        FROM all_objects
        WHERE owner = ? AND object_name = ?
          AND object_type IN ('PROCEDURE', 'FUNCTION', 'PACKAGE')
          AND ROWNUM = 1
    "#;

    /// Top-level arguments of a standalone routine; position 0 is a
    /// function's return value.
    pub const PARAMETERS: &str = r#"
        SELECT
            argument_name AS parameter_name,
            data_type AS data_type,
            in_out AS parameter_mode,
            position AS position
        FROM all_arguments
        WHERE owner = ? AND object_name = ?
          AND package_name IS NULL
          AND position > 0
          AND data_level = 0
        ORDER BY position
    "#;

    pub const DEFINITION: &str = r#"
        SELECT text AS definition
        FROM all_source
        WHERE owner = ? AND name = ?
          AND type IN ('PROCEDURE', 'FUNCTION', 'PACKAGE', 'PACKAGE BODY')
        ORDER BY type, line
    "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*) AS table_count
        FROM all_objects
        WHERE owner = UPPER(?) AND object_name = UPPER(?)
          AND object_type IN ('TABLE', 'VIEW')
    "#;
}

pub struct OracleConnector {
    core: ConnectorCore,
    parser: DependencyParser,
}

impl OracleConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_opener(config, Arc::new(OdbcOpener::new(DRIVER)))
    }

    pub fn with_opener(config: DatabaseConfig, opener: Arc<dyn SessionOpener>) -> Self {
        Self {
            core: ConnectorCore::new(config, opener, queries::PROBE),
            parser: DependencyParser::new(),
        }
    }

    fn target(&self, name: &str, schema: Option<&str>) -> ConnectorResult<(String, String)> {
        let schema = schema.map(str::to_uppercase);
        let schema = self.core.resolve_schema(schema.as_deref(), DEFAULT_SCHEMA)?;
        Ok((schema, name.trim().to_uppercase()))
    }

    async fn list(
        &self,
        operation: &str,
        base: &str,
        schema: Option<&str>,
        default_kind: ObjectKind,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        let schema = schema.map(str::to_uppercase);
        let (sql, params) = SqlBuilder::new(base, ParamStyle::Question)
            .and_eq("owner", schema.as_deref())
            .and_in("owner", self.config().include_schemas())
            .order_by("owner, object_name")
            .build();
        let rows = self.core.fetch(ENGINE, operation, &sql, &params).await?;
        Ok(object_summaries(&rows, default_kind, self.config().exclude_patterns()))
    }
}

#[async_trait]
impl EngineConnector for OracleConnector {
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
        self.list("get_tables", queries::TABLES, schema, ObjectKind::Table)
            .await
    }

    async fn get_table_metadata(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<TableMetadata> {
        let (schema, table) = self.target(table, schema)?;
        let params = [QueryParam::from(schema.as_str()), QueryParam::from(table.as_str())];
        let operation = "get_table_metadata";

        let kind_rows = self
            .core
            .fetch(ENGINE, operation, queries::TABLE_KIND, &params)
            .await?;
        let kind = match found_kind(&kind_rows, ObjectKind::Table) {
            Some(kind) if !self.should_exclude_object(&table) => kind,
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
            name: table,
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
        let (schema, name) = self.target(name, schema)?;
        let params = [QueryParam::from(schema.as_str()), QueryParam::from(name.as_str())];
        let operation = "get_stored_procedure_metadata";

        let kind_rows = self
            .core
            .fetch(ENGINE, operation, queries::ROUTINE_KIND, &params)
            .await?;
        let kind = match found_kind(&kind_rows, ObjectKind::StoredProcedure) {
            Some(kind) if !self.should_exclude_object(&name) => kind,
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
            name,
            schema_name: schema,
            kind,
            parameters,
            returns: Vec::new(),
            related_tables,
            definition,
        })
    }

    async fn get_functions(&self, schema: Option<&str>) -> ConnectorResult<Vec<ObjectSummary>> {
        self.list("get_functions", queries::FUNCTIONS, schema, ObjectKind::Function)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{ScriptedSession, opener};
    use serde_json::json;

    fn connector(session: ScriptedSession) -> (Arc<ScriptedSession>, OracleConnector) {
        let (session, opener) = opener(session);
        let config = DatabaseConfig::new("erp", "oracle", "DSN=erp;UID=app;PWD=tiger");
        (session, OracleConnector::with_opener(config, opener))
    }

    #[test]
    fn test_system_owner_list_is_spliced() {
        assert!(queries::SCHEMAS.contains("'SYS', 'SYSTEM'"));
        assert!(queries::TABLES.trim_end().ends_with("'DVF')"));
    }

    #[tokio::test]
    async fn test_listing_filters_by_owner() {
        let session = ScriptedSession::new().on(
            "FROM all_objects",
            json!([{"schema_name": "APP", "object_name": "ORDERS", "object_type": "table"}]),
        );
        let (session, c) = connector(session);
        let tables = c.get_tables(Some("app")).await.unwrap();
        assert_eq!(tables[0].full_name, "APP.ORDERS");

        let (sql, params) = session.calls().pop().unwrap();
        assert!(sql.ends_with("AND owner = ? ORDER BY owner, object_name"));
        assert_eq!(params, vec![QueryParam::from("APP")]);
    }

    #[tokio::test]
    async fn test_definition_lines_are_joined() {
        let session = ScriptedSession::new()
            .on("SELECT CASE object_type", json!([{"object_type": "stored_procedure"}]))
            .on(
                "all_arguments",
                json!([{"parameter_name": "P_ID", "data_type": "NUMBER", "parameter_mode": "IN/OUT", "position": 1}]),
            )
            .on(
                "all_source",
                json!([
                    {"definition": "PROCEDURE close_order(p_id IN OUT NUMBER) IS\n"},
                    {"definition": "BEGIN UPDATE orders SET status = 'C' WHERE id = p_id; END;\n"}
                ]),
            )
            .on("COUNT(*) AS table_count", json!([{"table_count": 1}]));
        let (_, c) = connector(session);
        let proc = c.get_stored_procedure_metadata("close_order", Some("app")).await.unwrap();
        assert_eq!(proc.full_name(), "APP.CLOSE_ORDER");
        assert_eq!(proc.parameters[0].direction, ParameterDirection::InOut);
        assert!(proc.definition.unwrap().contains("BEGIN UPDATE"));
        assert_eq!(proc.related_tables, vec!["APP.orders"]);
    }
}
