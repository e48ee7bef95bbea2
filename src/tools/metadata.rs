//! Metadata tools.
//!
//! Input and output types for every MCP tool plus [`MetadataToolHandler`],
//! which turns tool calls into [`MetadataService`] calls and attaches a
//! rendered view when the caller asks for `table` or `markdown`.

use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    DatabaseMetadataResponse, DatabaseSummary, HealthReport, MetadataSuggestion, ObjectKind,
    ObjectSummary, StoredProcedureMetadata, TableDependency, TableMetadata,
};
use crate::service::MetadataService;
use crate::tools::format::{OutputFormat, TextTable, cell, render, yes_no};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const PROCEDURE_HINTS: [&str; 7] = ["proc", "procedure", "sp_", "usp_", "stored", "exec", "execute"];
const FUNCTION_HINTS: [&str; 4] = ["func", "function", "fn_", "ufn_"];
const VIEW_HINTS: [&str; 2] = ["view", "vw_"];
const TABLE_HINTS: [&str; 2] = ["table", "tbl_"];

/// Guess which object kinds a free-text query is after.
///
/// Naming hints (`sp_`, `fn_`, `vw_`, `tbl_`, `proc`, ...) anywhere in the
/// query select their kind; the short `v_` and `t_` hints only count as a
/// prefix. Without any hint every kind is searched.
pub fn detect_object_types(query: &str) -> Vec<ObjectKind> {
    let query = query.trim().to_lowercase();
    let hinted = |hints: &[&str]| hints.iter().any(|h| query.contains(h));

    let mut kinds = Vec::new();
    if hinted(&PROCEDURE_HINTS) {
        kinds.push(ObjectKind::StoredProcedure);
    }
    if hinted(&FUNCTION_HINTS) {
        kinds.push(ObjectKind::Function);
    }
    if hinted(&VIEW_HINTS) || query.starts_with("v_") {
        kinds.push(ObjectKind::View);
    }
    if hinted(&TABLE_HINTS) || query.starts_with("t_") {
        kinds.push(ObjectKind::Table);
    }
    if kinds.is_empty() {
        kinds = ObjectKind::ALL.to_vec();
    }
    kinds
}

/// Parse caller-supplied kind names, accepting catalog spellings.
fn parse_kinds(names: &[String]) -> ConnectorResult<Vec<ObjectKind>> {
    let mut kinds = Vec::new();
    for name in names {
        let kind: ObjectKind = name.parse().map_err(ConnectorError::invalid_input)?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Input for the list_databases tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListDatabasesInput {
    /// Output format: json (default), table or markdown
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    pub databases: Vec<DatabaseSummary>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the get_database_overview tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DatabaseOverviewInput {
    /// Configured database name. Uses the default database when omitted.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DatabaseOverviewOutput {
    #[serde(flatten)]
    pub overview: DatabaseMetadataResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the search_database_objects tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SearchObjectsInput {
    /// Text to look for in object names. Prefixes such as `sp_`, `fn_` or
    /// `vw_` narrow the search to that kind of object.
    pub query: String,
    /// Object types to search: table, view, stored_procedure, function.
    /// Detected from the query when omitted.
    #[serde(default)]
    pub types: Option<Vec<String>>,
    /// Restrict the search to one schema
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Maximum number of results. Default: 50
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchHit {
    #[serde(flatten)]
    pub object: ObjectSummary,
    /// Fuzzy relevance in `[0, 1]`.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchObjectsOutput {
    pub query: String,
    /// Object types that were searched
    pub searched_types: Vec<ObjectKind>,
    pub results: Vec<SearchHit>,
    pub count: usize,
    /// Closest names when nothing contains the query text.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<MetadataSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the get_table_schema tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TableSchemaInput {
    pub table_name: String,
    /// Schema name. Uses the engine's default schema when omitted.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableSchemaOutput {
    #[serde(flatten)]
    pub table: TableMetadata,
    pub primary_key: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the get_stored_procedure_details tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ProcedureDetailsInput {
    pub procedure_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Include the routine source text. Default: true
    #[serde(default = "default_true")]
    pub include_definition: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProcedureDetailsOutput {
    #[serde(flatten)]
    pub procedure: StoredProcedureMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the analyze_table_dependencies tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TableDependenciesInput {
    pub table_name: String,
    /// Match only `schema.table_name` references when given
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableDependenciesOutput {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub procedures_scanned: usize,
    pub dependencies: Vec<TableDependency>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the check_database_health tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct HealthInput {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HealthOutput {
    #[serde(flatten)]
    pub report: HealthReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the list_supported_engines tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SupportedEnginesInput {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SupportedEnginesOutput {
    pub engines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for the clear_cache tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ClearCacheInput {
    /// Clear only this database's entries. All databases when omitted.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ClearCacheOutput {
    /// Cache backend in use (`memory`, `redis` or `disabled`)
    pub backend: String,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Handler behind every metadata tool.
pub struct MetadataToolHandler {
    service: Arc<MetadataService>,
}

impl MetadataToolHandler {
    pub fn new(service: Arc<MetadataService>) -> Self {
        Self { service }
    }

    pub async fn list_databases(&self, input: ListDatabasesInput) -> ListDatabasesOutput {
        let databases = self.service.list_databases().await;
        let mut table = TextTable::new(&["name", "type", "default", "connected"]);
        for db in &databases {
            table.push(vec![
                db.name.clone(),
                db.engine.clone(),
                yes_no(db.is_default),
                yes_no(db.is_connected),
            ]);
        }
        ListDatabasesOutput {
            count: databases.len(),
            formatted: render(input.format, "Configured databases", &[("Databases", &table)]),
            databases,
        }
    }

    pub async fn database_overview(
        &self,
        input: DatabaseOverviewInput,
    ) -> ConnectorResult<DatabaseOverviewOutput> {
        let overview = self
            .service
            .get_database_overview(input.database.as_deref())
            .await?;

        let mut schemas = TextTable::new(&["schema", "tables", "procedures", "functions"]);
        let mut objects = TextTable::new(&["schema", "name", "type"]);
        for schema in &overview.schemas {
            schemas.push(vec![
                schema.schema_name.clone(),
                schema.table_count.to_string(),
                schema.procedure_count.to_string(),
                schema.function_count.to_string(),
            ]);
            for object in schema
                .tables
                .iter()
                .chain(&schema.procedures)
                .chain(&schema.functions)
            {
                objects.push(vec![
                    object.schema.clone(),
                    object.name.clone(),
                    object.kind.to_string(),
                ]);
            }
        }
        let title = format!(
            "Database overview: {} ({}), {} objects",
            overview.database_name, overview.database_type, overview.total_objects
        );
        let formatted = render(
            input.format,
            &title,
            &[("Schemas", &schemas), ("Objects", &objects)],
        );
        Ok(DatabaseOverviewOutput {
            overview,
            formatted,
        })
    }

    pub async fn search_objects(
        &self,
        input: SearchObjectsInput,
    ) -> ConnectorResult<SearchObjectsOutput> {
        let query = input.query.trim().to_string();
        let kinds = match input.types.as_deref() {
            Some(names) if !names.is_empty() => parse_kinds(names)?,
            _ => detect_object_types(&query),
        };
        let database = input.database.as_deref();

        let ranked = self
            .service
            .search_objects(&query, &kinds, input.schema.as_deref(), database, input.limit)
            .await?;
        let results: Vec<SearchHit> = ranked
            .into_iter()
            .map(|r| SearchHit {
                object: r.item,
                score: r.score / 100.0,
            })
            .collect();

        let suggestions = if results.is_empty() {
            self.service.suggest(&query, &kinds, database).await?
        } else {
            Vec::new()
        };
        info!(
            query = %query,
            results = results.len(),
            suggestions = suggestions.len(),
            "Searched database objects"
        );

        let mut hits = TextTable::new(&["name", "schema", "type", "score"]);
        for hit in &results {
            hits.push(vec![
                hit.object.name.clone(),
                hit.object.schema.clone(),
                hit.object.kind.to_string(),
                format!("{:.2}", hit.score),
            ]);
        }
        let mut close = TextTable::new(&["name", "schema", "type", "score"]);
        for s in &suggestions {
            close.push(vec![
                s.name.clone(),
                s.schema_name.clone(),
                s.kind.to_string(),
                format!("{:.2}", s.score),
            ]);
        }
        let title = format!("Search results for '{query}'");
        let formatted = if suggestions.is_empty() {
            render(input.format, &title, &[("Results", &hits)])
        } else {
            render(
                input.format,
                &title,
                &[("Results", &hits), ("Did you mean", &close)],
            )
        };

        Ok(SearchObjectsOutput {
            query,
            searched_types: kinds,
            count: results.len(),
            results,
            suggestions,
            formatted,
        })
    }

    pub async fn table_schema(&self, input: TableSchemaInput) -> ConnectorResult<TableSchemaOutput> {
        let table = self
            .service
            .get_table_metadata(
                &input.table_name,
                input.schema.as_deref(),
                input.database.as_deref(),
            )
            .await?;

        let mut columns = TextTable::new(&["column", "type", "nullable", "key", "default"]);
        for c in &table.columns {
            let key = match (c.primary_key, &c.foreign_key) {
                (true, _) => "PK".to_string(),
                (false, Some(target)) => format!("FK -> {target}"),
                (false, None) => String::new(),
            };
            columns.push(vec![
                c.name.clone(),
                c.data_type.clone(),
                yes_no(c.nullable),
                key,
                cell(c.default_value.as_deref()),
            ]);
        }
        let mut indexes = TextTable::new(&["index", "columns", "unique", "clustered"]);
        for i in &table.indexes {
            indexes.push(vec![
                i.name.clone(),
                i.columns.join(", "),
                yes_no(i.unique),
                yes_no(i.clustered),
            ]);
        }
        let mut relationships = TextTable::new(&["column", "references"]);
        for r in &table.relationships {
            relationships.push(vec![
                r.local_column.clone(),
                format!("{}.{}", r.foreign_table, r.foreign_column),
            ]);
        }

        let title = format!("{} {}", table.kind, table.full_name());
        let formatted = render(
            input.format,
            &title,
            &[
                ("Columns", &columns),
                ("Indexes", &indexes),
                ("Relationships", &relationships),
            ],
        );
        Ok(TableSchemaOutput {
            primary_key: table
                .primary_key_columns()
                .into_iter()
                .map(str::to_string)
                .collect(),
            table,
            formatted,
        })
    }

    pub async fn procedure_details(
        &self,
        input: ProcedureDetailsInput,
    ) -> ConnectorResult<ProcedureDetailsOutput> {
        let mut procedure = self
            .service
            .get_stored_procedure_metadata(
                &input.procedure_name,
                input.schema.as_deref(),
                input.database.as_deref(),
            )
            .await?;
        if !input.include_definition {
            procedure.definition = None;
        }

        let mut parameters = TextTable::new(&["parameter", "type", "direction", "default"]);
        for p in &procedure.parameters {
            parameters.push(vec![
                p.name.clone(),
                p.data_type.clone(),
                p.direction.to_string(),
                cell(p.default_value.as_deref()),
            ]);
        }
        let mut returns = TextTable::new(&["column", "type", "nullable"]);
        for c in &procedure.returns {
            returns.push(vec![c.name.clone(), c.data_type.clone(), yes_no(c.nullable)]);
        }
        let mut related = TextTable::new(&["table"]);
        for t in &procedure.related_tables {
            related.push(vec![t.clone()]);
        }

        let title = format!("{} {}", procedure.kind, procedure.full_name());
        let formatted = render(
            input.format,
            &title,
            &[
                ("Parameters", &parameters),
                ("Result columns", &returns),
                ("Related tables", &related),
            ],
        );
        Ok(ProcedureDetailsOutput {
            procedure,
            formatted,
        })
    }

    pub async fn table_dependencies(
        &self,
        input: TableDependenciesInput,
    ) -> ConnectorResult<TableDependenciesOutput> {
        let report = self
            .service
            .find_table_dependencies(
                &input.table_name,
                input.schema.as_deref(),
                input.database.as_deref(),
            )
            .await?;

        let mut table = TextTable::new(&["procedure", "schema", "parameters", "related tables"]);
        for dep in &report.dependencies {
            table.push(vec![
                dep.procedure_name.clone(),
                dep.procedure_schema.clone(),
                dep.parameters.len().to_string(),
                dep.related_tables.join(", "),
            ]);
        }
        let target = match &report.schema {
            Some(schema) => format!("{schema}.{}", report.table_name),
            None => report.table_name.clone(),
        };
        let title = format!(
            "Procedures referencing {target} ({} scanned)",
            report.procedures_scanned
        );
        Ok(TableDependenciesOutput {
            formatted: render(input.format, &title, &[("Dependencies", &table)]),
            count: report.dependencies.len(),
            table_name: report.table_name,
            schema: report.schema,
            procedures_scanned: report.procedures_scanned,
            dependencies: report.dependencies,
        })
    }

    pub async fn health(&self, input: HealthInput) -> HealthOutput {
        let report = self.service.health_check(input.database.as_deref()).await;

        let mut table = TextTable::new(&["field", "value"]);
        table.push(vec!["database".into(), report.database.clone()]);
        table.push(vec!["type".into(), report.engine.clone()]);
        table.push(vec!["driver".into(), report.driver.clone()]);
        table.push(vec!["status".into(), report.status.to_string()]);
        table.push(vec!["connected".into(), yes_no(report.is_connected)]);
        table.push(vec![
            "connection".into(),
            cell(report.connection_string.as_deref()),
        ]);
        table.push(vec!["error".into(), cell(report.error.as_deref())]);
        table.push(vec!["checked at".into(), report.checked_at.to_rfc3339()]);

        HealthOutput {
            formatted: render(input.format, "Database health", &[("Status", &table)]),
            report,
        }
    }

    pub fn supported_engines(&self, input: SupportedEnginesInput) -> SupportedEnginesOutput {
        let engines = self.service.supported_engines();
        let mut table = TextTable::new(&["engine"]);
        for engine in &engines {
            table.push(vec![engine.clone()]);
        }
        SupportedEnginesOutput {
            formatted: render(input.format, "Supported engines", &[("Engines", &table)]),
            engines,
        }
    }

    pub async fn clear_cache(&self, input: ClearCacheInput) -> ConnectorResult<ClearCacheOutput> {
        let removed = self.service.clear_cache(input.database.as_deref()).await?;
        let backend = self.service.cache().backend_name().to_string();

        let mut table = TextTable::new(&["backend", "removed"]);
        table.push(vec![backend.clone(), removed.to_string()]);
        Ok(ClearCacheOutput {
            formatted: render(input.format, "Metadata cache", &[("Cleared", &table)]),
            backend,
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_procedure_hints() {
        assert_eq!(detect_object_types("sp_GetUser"), vec![ObjectKind::StoredProcedure]);
        assert_eq!(detect_object_types("usp_orders"), vec![ObjectKind::StoredProcedure]);
        assert_eq!(
            detect_object_types("exec billing"),
            vec![ObjectKind::StoredProcedure]
        );
    }

    #[test]
    fn test_detect_function_view_table() {
        assert_eq!(detect_object_types("fn_total"), vec![ObjectKind::Function]);
        assert_eq!(detect_object_types("vw_sales"), vec![ObjectKind::View]);
        assert_eq!(detect_object_types("v_sales"), vec![ObjectKind::View]);
        assert_eq!(detect_object_types("tbl_users"), vec![ObjectKind::Table]);
    }

    #[test]
    fn test_short_hints_only_as_prefix() {
        assert_eq!(detect_object_types("dev_user"), ObjectKind::ALL.to_vec());
        assert_eq!(detect_object_types("last_t_login"), ObjectKind::ALL.to_vec());
    }

    #[test]
    fn test_detect_without_hint_searches_everything() {
        assert_eq!(detect_object_types("customers"), ObjectKind::ALL.to_vec());
    }

    #[test]
    fn test_detect_multiple_hints_in_fixed_order() {
        assert_eq!(
            detect_object_types("table_function"),
            vec![ObjectKind::Function, ObjectKind::Table]
        );
    }

    #[test]
    fn test_parse_kinds_dedups_and_rejects() {
        let kinds = parse_kinds(&["procedure".into(), "stored_procedure".into(), "VIEW".into()])
            .unwrap();
        assert_eq!(kinds, vec![ObjectKind::StoredProcedure, ObjectKind::View]);

        let err = parse_kinds(&["sequence".into()]).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidInput { .. }));
    }
}
