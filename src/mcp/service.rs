//! MCP service implementation using rmcp.
//!
//! This module defines the MetadataMcpService struct with all metadata tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::service::MetadataService;
use crate::tools::metadata::{
    ClearCacheInput, ClearCacheOutput, DatabaseOverviewInput, DatabaseOverviewOutput,
    HealthInput, HealthOutput, ListDatabasesInput, ListDatabasesOutput, MetadataToolHandler,
    ProcedureDetailsInput, ProcedureDetailsOutput, SearchObjectsInput, SearchObjectsOutput,
    SupportedEnginesInput, SupportedEnginesOutput, TableDependenciesInput,
    TableDependenciesOutput, TableSchemaInput, TableSchemaOutput,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct MetadataMcpService {
    /// Shared metadata service for all databases
    service: Arc<MetadataService>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl MetadataMcpService {
    pub fn new(service: Arc<MetadataService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    fn handler(&self) -> MetadataToolHandler {
        MetadataToolHandler::new(self.service.clone())
    }
}

#[tool_router]
impl MetadataMcpService {
    #[tool(
        description = "List configured databases.\nReturns names, engine types, which one is the default, and connection state."
    )]
    async fn list_databases(
        &self,
        Parameters(input): Parameters<ListDatabasesInput>,
    ) -> Json<ListDatabasesOutput> {
        Json(self.handler().list_databases(input).await)
    }

    #[tool(
        description = "Get a metadata overview of a database: every schema with its tables, views, stored procedures and functions, plus totals.\nUses the default database when `database` is omitted."
    )]
    async fn get_database_overview(
        &self,
        Parameters(input): Parameters<DatabaseOverviewInput>,
    ) -> Result<Json<DatabaseOverviewOutput>, McpError> {
        self.handler()
            .database_overview(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Search tables, views, stored procedures and functions by name.\nObject types are detected from the query: 'sp_'/'proc' for procedures, 'fn_'/'func' for functions, 'vw_'/'view' for views, 'tbl_'/'table' for tables.\nResults are ranked by fuzzy relevance; close matches are suggested when nothing contains the query."
    )]
    async fn search_database_objects(
        &self,
        Parameters(input): Parameters<SearchObjectsInput>,
    ) -> Result<Json<SearchObjectsOutput>, McpError> {
        self.handler()
            .search_objects(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Get the schema of a table or view: columns with types, nullability and keys, indexes, and foreign-key relationships where the engine reports them."
    )]
    async fn get_table_schema(
        &self,
        Parameters(input): Parameters<TableSchemaInput>,
    ) -> Result<Json<TableSchemaOutput>, McpError> {
        self.handler()
            .table_schema(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Get details of a stored procedure or function: parameters with directions, result columns, source definition, and the tables its definition references."
    )]
    async fn get_stored_procedure_details(
        &self,
        Parameters(input): Parameters<ProcedureDetailsInput>,
    ) -> Result<Json<ProcedureDetailsOutput>, McpError> {
        self.handler()
            .procedure_details(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Find stored procedures whose definitions reference a table.\nScans up to 50 procedures and reports their parameters and related tables."
    )]
    async fn analyze_table_dependencies(
        &self,
        Parameters(input): Parameters<TableDependenciesInput>,
    ) -> Result<Json<TableDependenciesOutput>, McpError> {
        self.handler()
            .table_dependencies(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Check connectivity of a database.\nAlways returns a report; failures are reported with status 'error' instead of failing the call."
    )]
    async fn check_database_health(
        &self,
        Parameters(input): Parameters<HealthInput>,
    ) -> Json<HealthOutput> {
        Json(self.handler().health(input).await)
    }

    #[tool(description = "List the database engine types this server can connect to.")]
    async fn list_supported_engines(
        &self,
        Parameters(input): Parameters<SupportedEnginesInput>,
    ) -> Json<SupportedEnginesOutput> {
        Json(self.handler().supported_engines(input))
    }

    #[tool(
        description = "Clear cached metadata for one database, or for all databases when `database` is omitted.\nUse after schema changes."
    )]
    async fn clear_cache(
        &self,
        Parameters(input): Parameters<ClearCacheInput>,
    ) -> Result<Json<ClearCacheOutput>, McpError> {
        self.handler()
            .clear_cache(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for MetadataMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-metadata-server".to_owned(),
                title: Some("DB Metadata Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only metadata tools for SQL Server, PostgreSQL, DB2, MySQL and Oracle databases.\n\
                \n\
                ## Workflow\n\
                1. Call `list_databases` to see the configured databases\n\
                2. Call `get_database_overview` or `search_database_objects` to find objects\n\
                3. Use `get_table_schema` and `get_stored_procedure_details` for details\n\
                4. Use `analyze_table_dependencies` to see which procedures use a table\n\
                \n\
                ## Notes\n\
                - Every tool takes an optional `database`; the first configured database is the default.\n\
                - `format` may be `json` (default), `table` or `markdown`.\n\
                - Metadata is cached; call `clear_cache` after schema changes."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLayer;
    use crate::config::{DatabaseConfig, FuzzyConfig};
    use crate::connectors::ConnectorRegistry;

    fn create_test_service() -> MetadataMcpService {
        let service = MetadataService::new(
            vec![DatabaseConfig::new("main", "postgresql", "postgres://localhost/main")],
            ConnectorRegistry::with_default_engines(),
            CacheLayer::disabled(),
            FuzzyConfig::default(),
        );
        MetadataMcpService::new(Arc::new(service))
    }

    #[test]
    fn test_service_creation() {
        let _service = create_test_service();
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-metadata-server");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("list_databases"));
    }

    #[test]
    fn test_all_tools_routed() {
        let service = create_test_service();
        let names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for tool in [
            "list_databases",
            "get_database_overview",
            "search_database_objects",
            "get_table_schema",
            "get_stored_procedure_details",
            "analyze_table_dependencies",
            "check_database_health",
            "list_supported_engines",
            "clear_cache",
        ] {
            assert!(names.iter().any(|n| n == tool), "missing tool {tool}");
        }
    }

    #[tokio::test]
    async fn test_list_supported_engines_tool() {
        let service = create_test_service();
        let Json(output) = service
            .list_supported_engines(Parameters(SupportedEnginesInput::default()))
            .await;
        assert_eq!(
            output.engines,
            vec!["db2", "mysql", "oracle", "postgresql", "sqlserver"]
        );
        assert!(output.formatted.is_none());
    }
}
