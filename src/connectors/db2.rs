//! IBM DB2 (LUW) connector over the SYSCAT views.
//!
//! DB2 folds unquoted identifiers to upper case, so names given by callers
//! are upper-cased before they reach the catalog.

use super::sql::{ParamStyle, SqlBuilder};
use super::{
    CatalogVerifier, ConnectorCore, EngineConnector, column_infos, definition_text, found_kind,
    object_summaries, parameter_infos,
};
use crate::config::DatabaseConfig;
use crate::db::{OdbcOpener, SessionOpener};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    IndexInfo, ObjectKind, ObjectSummary, ParameterDirection, QueryParam, Row, RowExt,
    StoredProcedureMetadata, TableMetadata,
};
use crate::parser::DependencyParser;
use async_trait::async_trait;
use std::sync::Arc;

const ENGINE: &str = "db2";
const DRIVER: &str = "IBM DB2 ODBC Driver";
const DEFAULT_SCHEMA: &str = "DB2INST1";

mod queries {
    pub const PROBE: &str = "SELECT 1 FROM SYSIBM.SYSDUMMY1";

    pub const SCHEMAS: &str = r#"
        SELECT DISTINCT RTRIM(SCHEMANAME) AS schema_name
        FROM SYSCAT.SCHEMATA
        WHERE SCHEMANAME NOT LIKE 'SYS%'
          AND SCHEMANAME NOT IN ('INFORMATION_SCHEMA', 'NULLID', 'SQLJ')
        ORDER BY schema_name
    "#;

    pub const TABLES: &str = r#"
        SELECT
            RTRIM(TABSCHEMA) AS schema_name,
            TABNAME AS object_name,
            CASE TYPE WHEN 'V' THEN 'view' ELSE 'table' END AS object_type,
            VARCHAR(CREATE_TIME) AS created_date,
            VARCHAR(ALTER_TIME) AS modified_date
        FROM SYSCAT.TABLES
        WHERE TYPE IN ('T', 'V')
          AND TABSCHEMA NOT LIKE 'SYS%'
    "#;

    pub const TABLE_KIND: &str = r#"
        SELECT CASE TYPE WHEN 'V' THEN 'view' ELSE 'table' END AS object_type
        FROM SYSCAT.TABLES
        WHERE TABSCHEMA = ? AND TABNAME = ? AND TYPE IN ('T', 'V')
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.COLNAME AS column_name,
            c.TYPENAME AS data_type,
            c.NULLS AS is_nullable,
            c.DEFAULT AS column_default,
            CASE WHEN c.TYPENAME IN ('CHARACTER', 'VARCHAR', 'GRAPHIC', 'VARGRAPHIC', 'CLOB', 'BLOB', 'DBCLOB')
                 THEN c.LENGTH END AS max_length,
            CASE WHEN c.TYPENAME IN ('DECIMAL', 'NUMERIC') THEN c.LENGTH END AS numeric_precision,
            CASE WHEN c.TYPENAME IN ('DECIMAL', 'NUMERIC') THEN c.SCALE END AS numeric_scale,
            CASE WHEN EXISTS (
                SELECT 1
                FROM SYSCAT.TABCONST tc
                JOIN SYSCAT.KEYCOLUSE k
                    ON k.CONSTNAME = tc.CONSTNAME
                   AND k.TABSCHEMA = tc.TABSCHEMA
                   AND k.TABNAME = tc.TABNAME
                WHERE tc.TYPE = 'P'
                  AND tc.TABSCHEMA = c.TABSCHEMA
                  AND tc.TABNAME = c.TABNAME
                  AND k.COLNAME = c.COLNAME
            ) THEN 1 ELSE 0 END AS is_primary_key
        FROM SYSCAT.COLUMNS c
        WHERE c.TABSCHEMA = ? AND c.TABNAME = ?
        ORDER BY c.COLNO
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            INDNAME AS index_name,
            COLNAMES AS column_names,
            CASE WHEN UNIQUERULE IN ('U', 'P') THEN 1 ELSE 0 END AS is_unique,
            CASE WHEN INDEXTYPE = 'CLUS' THEN 1 ELSE 0 END AS is_clustered
        FROM SYSCAT.INDEXES
        WHERE TABSCHEMA = ? AND TABNAME = ?
        ORDER BY INDNAME
    "#;

    pub const PROCEDURES: &str = r#"
        SELECT
            RTRIM(ROUTINESCHEMA) AS schema_name,
            ROUTINENAME AS object_name,
            'stored_procedure' AS object_type,
            VARCHAR(CREATE_TIME) AS created_date,
            VARCHAR(ALTER_TIME) AS modified_date
        FROM SYSCAT.ROUTINES
        WHERE ROUTINETYPE = 'P'
          AND ROUTINESCHEMA NOT LIKE 'SYS%'
    "#;

    pub const FUNCTIONS: &str = r#"
        SELECT
            RTRIM(ROUTINESCHEMA) AS schema_name,
            ROUTINENAME AS object_name,
            'function' AS object_type,
            CASE FUNCTIONTYPE
                WHEN 'S' THEN 'SCALAR'
                WHEN 'T' THEN 'TABLE'
                WHEN 'R' THEN 'ROW'
                WHEN 'C' THEN 'COLUMN'
            END AS routine_type,
            VARCHAR(CREATE_TIME) AS created_date,
            VARCHAR(ALTER_TIME) AS modified_date
        FROM SYSCAT.ROUTINES
        WHERE ROUTINETYPE = 'F'
          AND ROUTINESCHEMA NOT LIKE 'SYS%'
    "#;

    pub const ROUTINE_KIND: &str = r#"
        SELECT CASE ROUTINETYPE WHEN 'P' THEN 'stored_procedure' ELSE 'function' END AS object_type
        FROM SYSCAT.ROUTINES
        WHERE ROUTINESCHEMA = ? AND ROUTINENAME = ? AND ROUTINETYPE IN ('P', 'F')
        ORDER BY SPECIFICNAME
        FETCH FIRST 1 ROWS ONLY
    "#;

    /// Parameters of the first overload; result and return rows are skipped.
    pub const PARAMETERS: &str = r#"
        SELECT
            p.PARMNAME AS parameter_name,
            p.TYPENAME AS data_type,
            p.ROWTYPE AS row_type,
            p.ORDINAL AS position
        FROM SYSCAT.ROUTINEPARMS p
        WHERE p.ROUTINESCHEMA = ?
          AND p.SPECIFICNAME = (
              SELECT MIN(r.SPECIFICNAME)
              FROM SYSCAT.ROUTINES r
              WHERE r.ROUTINESCHEMA = ? AND r.ROUTINENAME = ?
          )
          AND p.ROWTYPE NOT IN ('C', 'R')
        ORDER BY p.ORDINAL
    "#;

    pub const DEFINITION: &str = r#"
        SELECT TEXT AS definition
        FROM SYSCAT.ROUTINES
        WHERE ROUTINESCHEMA = ? AND ROUTINENAME = ?
        ORDER BY SPECIFICNAME
        FETCH FIRST 1 ROWS ONLY
    "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*) AS table_count
        FROM SYSCAT.TABLES
        WHERE TABSCHEMA = UPPER(?) AND TABNAME = UPPER(?)
    "#;
}

pub struct Db2Connector {
    core: ConnectorCore,
    parser: DependencyParser,
}

impl Db2Connector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_opener(config, Arc::new(OdbcOpener::new(DRIVER)))
    }

    pub fn with_opener(config: DatabaseConfig, opener: Arc<dyn SessionOpener>) -> Self {
        Self {
            core: ConnectorCore::new(config, opener, queries::PROBE),
            parser: DependencyParser::new(),
        }
    }

    /// Effective upper-cased schema and object name for a detail lookup.
    fn target(&self, name: &str, schema: Option<&str>) -> ConnectorResult<(String, String)> {
        let schema = schema.map(str::to_uppercase);
        let schema = self.core.resolve_schema(schema.as_deref(), DEFAULT_SCHEMA)?;
        Ok((schema, name.trim().to_uppercase()))
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
        let schema = schema.map(str::to_uppercase);
        let (sql, params) = SqlBuilder::new(base, ParamStyle::Question)
            .and_eq(schema_column, schema.as_deref())
            .and_in(schema_column, self.config().include_schemas())
            .order_by(order)
            .build();
        let rows = self.core.fetch(ENGINE, operation, &sql, &params).await?;
        Ok(object_summaries(&rows, default_kind, self.config().exclude_patterns()))
    }
}

/// `COLNAMES` lists key columns as `+COL1-COL2`, the sign giving the sort
/// direction.
fn split_colnames(colnames: &str) -> Vec<String> {
    colnames
        .split(['+', '-'])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

fn db2_index_infos(rows: &[Row]) -> Vec<IndexInfo> {
    rows.iter()
        .filter_map(|row| {
            Some(IndexInfo {
                name: row.get_trimmed("index_name")?,
                columns: split_colnames(&row.get_str("column_names").unwrap_or_default()),
                unique: row.get_bool("is_unique"),
                clustered: row.get_bool("is_clustered"),
            })
        })
        .collect()
}

fn db2_direction(row: &Row) -> ParameterDirection {
    match row.get_trimmed("row_type").as_deref() {
        Some("O") => ParameterDirection::Out,
        Some("B") => ParameterDirection::InOut,
        _ => ParameterDirection::In,
    }
}

#[async_trait]
impl EngineConnector for Db2Connector {
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
            "TABSCHEMA",
            "TABSCHEMA, TABNAME",
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
            indexes: db2_index_infos(&indexes),
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
            "ROUTINESCHEMA",
            "ROUTINESCHEMA, ROUTINENAME",
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
            .fetch(
                ENGINE,
                operation,
                queries::PARAMETERS,
                &[
                    QueryParam::from(schema.as_str()),
                    QueryParam::from(schema.as_str()),
                    QueryParam::from(name.as_str()),
                ],
            )
            .await?;
        let parameters = parameter_infos(&param_rows, db2_direction);

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
        self.list(
            "get_functions",
            queries::FUNCTIONS,
            "ROUTINESCHEMA",
            "ROUTINESCHEMA, ROUTINENAME",
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

    fn connector(session: ScriptedSession) -> (Arc<ScriptedSession>, Db2Connector) {
        let (session, opener) = opener(session);
        let config = DatabaseConfig::new("warehouse", "db2", "DATABASE=sample;UID=db2inst1;PWD=pw");
        (session, Db2Connector::with_opener(config, opener))
    }

    #[test]
    fn test_split_colnames() {
        assert_eq!(split_colnames("+LASTNAME-FIRSTNAME"), vec!["LASTNAME", "FIRSTNAME"]);
        assert_eq!(split_colnames("+ID"), vec!["ID"]);
        assert!(split_colnames("").is_empty());
    }

    #[test]
    fn test_direction_letters() {
        let row = |t: &str| json!({"row_type": t}).as_object().cloned().unwrap();
        assert_eq!(db2_direction(&row("P")), ParameterDirection::In);
        assert_eq!(db2_direction(&row("O")), ParameterDirection::Out);
        assert_eq!(db2_direction(&row("B")), ParameterDirection::InOut);
    }

    #[tokio::test]
    async fn test_table_metadata_uppercases_names() {
        let session = ScriptedSession::new()
            .on("SELECT CASE TYPE WHEN 'V'", json!([{"object_type": "table"}]))
            .on(
                "SYSCAT.COLUMNS",
                json!([
                    {"column_name": "EMPNO", "data_type": "CHARACTER", "is_nullable": "N",
                     "max_length": "6", "is_primary_key": "1"},
                    {"column_name": "SALARY", "data_type": "DECIMAL", "is_nullable": "Y",
                     "numeric_precision": "9", "numeric_scale": "2", "is_primary_key": "0"}
                ]),
            )
            .on(
                "SYSCAT.INDEXES",
                json!([{"index_name": "PK_EMP", "column_names": "+EMPNO", "is_unique": "1", "is_clustered": "0"}]),
            );
        let (session, c) = connector(session);
        let table = c.get_table_metadata("employee", None).await.unwrap();
        assert_eq!(table.full_name(), "DB2INST1.EMPLOYEE");
        assert_eq!(table.primary_key_columns(), vec!["EMPNO"]);
        assert_eq!(table.columns[1].precision, Some(9));
        assert!(table.columns[1].nullable);
        assert_eq!(table.indexes[0].columns, vec!["EMPNO"]);

        let (_, params) = &session.calls()[0];
        assert_eq!(params[1], QueryParam::from("EMPLOYEE"));
    }

    #[tokio::test]
    async fn test_procedure_parameters() {
        let session = ScriptedSession::new()
            .on("SELECT CASE ROUTINETYPE", json!([{"object_type": "stored_procedure"}]))
            .on(
                "SYSCAT.ROUTINEPARMS",
                json!([
                    {"parameter_name": "EMPNO", "data_type": "CHARACTER", "row_type": "P", "position": "1"},
                    {"parameter_name": "RATING", "data_type": "INTEGER", "row_type": "O", "position": "2"}
                ]),
            );
        let (_, c) = connector(session);
        let proc = c.get_stored_procedure_metadata("raise_salary", Some("hr")).await.unwrap();
        assert_eq!(proc.full_name(), "HR.RAISE_SALARY");
        assert_eq!(proc.parameters.len(), 2);
        assert_eq!(proc.parameters[1].direction, ParameterDirection::Out);
    }
}
