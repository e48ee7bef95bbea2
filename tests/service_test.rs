//! End-to-end tests of MetadataService against an in-memory MySQL catalog.

mod common;

use common::{FakeCatalog, mysql_fixture, sales_db};
use db_metadata_server::error::ConnectorError;
use db_metadata_server::models::{HealthStatus, ObjectKind};
use serde_json::json;

const SCHEMAS: &str = "FROM information_schema.SCHEMATA";
const TABLES: &str = "CASE WHEN TABLE_TYPE = 'VIEW'";
const TABLE_KIND: &str = "SELECT TABLE_TYPE AS object_type";
const COLUMNS: &str = "FROM information_schema.COLUMNS";
const PROCEDURES: &str = "'stored_procedure' AS object_type";
const ROUTINE_KIND: &str = "LOWER(ROUTINE_TYPE)";
const DEFINITION: &str = "ROUTINE_DEFINITION AS definition";
const TABLE_EXISTS: &str = "COUNT(*) AS table_count";

#[tokio::test]
async fn test_table_columns_keep_declared_order() {
    let catalog = FakeCatalog::new()
        .on(TABLE_KIND, json!([{"object_type": "BASE TABLE"}]))
        .on(
            COLUMNS,
            json!([
                {"column_name": "id", "data_type": "int", "is_nullable": "NO", "is_primary_key": 1},
                {"column_name": "name", "data_type": "varchar(50)", "is_nullable": "YES",
                 "is_primary_key": 0, "max_length": 50}
            ]),
        );
    let fx = mysql_fixture(catalog, vec![sales_db()]);

    let table = fx
        .service
        .get_table_metadata("customers", None, None)
        .await
        .unwrap();

    assert_eq!(table.schema_name, "sales");
    assert_eq!(table.kind, ObjectKind::Table);
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name"]);
    assert!(table.columns[0].primary_key && !table.columns[0].nullable);
    assert!(!table.columns[1].primary_key && table.columns[1].nullable);
    assert_eq!(table.columns[1].max_length, Some(50));
    assert_eq!(table.primary_key_columns(), ["id"]);
}

#[tokio::test]
async fn test_missing_table_is_not_found() {
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db()]);
    let err = fx
        .service
        .get_table_metadata("ghost", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::NotFound { ref name, .. } if name == "sales.ghost"));
}

#[tokio::test]
async fn test_include_schemas_hides_other_schemas() {
    let catalog = FakeCatalog::new().on(
        SCHEMAS,
        json!([{"schema_name": "hr"}, {"schema_name": "sales"}]),
    );
    let fx = mysql_fixture(catalog, vec![sales_db().with_include_schemas(&["sales"])]);

    let schemas = fx.service.list_schemas(None).await.unwrap();
    assert_eq!(schemas, ["sales"]);

    let err = fx
        .service
        .get_table_metadata("employees", Some("hr"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::NotFound { .. }));
}

#[tokio::test]
async fn test_exclude_patterns_filter_listings() {
    let catalog = FakeCatalog::new().on(
        TABLES,
        json!([
            {"schema_name": "sales", "object_name": "tmp_orders", "object_type": "table"},
            {"schema_name": "sales", "object_name": "orders_tmp", "object_type": "table"},
            {"schema_name": "sales", "object_name": "orders_bak", "object_type": "table"}
        ]),
    );
    let fx = mysql_fixture(
        catalog,
        vec![sales_db().with_exclude_objects(&["tmp_*", "*_bak"])],
    );

    let tables = fx.service.list_tables(Some("sales"), None).await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["orders_tmp"]);
}

#[tokio::test]
async fn test_repeated_requests_open_one_connection() {
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db()]);

    let connector = fx.service.connector(None).await.unwrap();
    connector.connect().await.unwrap();
    connector.connect().await.unwrap();
    fx.service.list_schemas(None).await.unwrap();
    fx.service.list_tables(None, Some("sales")).await.unwrap();

    assert!(connector.is_connected().await);
    assert_eq!(fx.opener.opens(), 1);
}

#[tokio::test]
async fn test_concurrent_first_requests_share_connection() {
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db()]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = fx.service.clone();
        handles.push(tokio::spawn(async move {
            service.list_schemas(None).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(fx.opener.opens(), 1);
}

#[tokio::test]
async fn test_empty_catalog_overview() {
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db()]);
    let overview = fx.service.get_database_overview(None).await.unwrap();

    assert_eq!(overview.database_name, "sales");
    assert_eq!(overview.database_type, "mysql");
    assert_eq!(overview.total_tables, 0);
    assert_eq!(overview.total_objects, 0);
    assert!(overview.schemas.is_empty());
}

#[tokio::test]
async fn test_overview_counts_objects_per_schema() {
    let catalog = FakeCatalog::new()
        .on(SCHEMAS, json!([{"schema_name": "sales"}]))
        .on(
            TABLES,
            json!([
                {"schema_name": "sales", "object_name": "orders", "object_type": "table"},
                {"schema_name": "sales", "object_name": "v_orders", "object_type": "view"}
            ]),
        )
        .on(
            PROCEDURES,
            json!([{"schema_name": "sales", "object_name": "close_month"}]),
        );
    let fx = mysql_fixture(catalog, vec![sales_db()]);

    let overview = fx.service.get_database_overview(Some("sales")).await.unwrap();
    assert_eq!(overview.total_schemas, 1);
    assert_eq!(overview.schemas[0].table_count, 2);
    assert_eq!(overview.schemas[0].procedure_count, 1);
    assert_eq!(overview.total_objects, 3);
}

#[tokio::test]
async fn test_procedure_related_tables_are_verified() {
    let catalog = FakeCatalog::new()
        .on(ROUTINE_KIND, json!([{"object_type": "procedure"}]))
        .on(
            DEFINITION,
            json!([{"definition":
                "BEGIN SELECT * FROM sales.orders o JOIN sales.customers c ON o.cid = c.id; \
                 DELETE FROM sales.ghost WHERE 1 = 0; END"}]),
        )
        .on_param(TABLE_EXISTS, "orders", json!([{"table_count": 1}]))
        .on_param(TABLE_EXISTS, "customers", json!([{"table_count": 1}]))
        .on(TABLE_EXISTS, json!([{"table_count": 0}]));
    let fx = mysql_fixture(catalog, vec![sales_db()]);

    let procedure = fx
        .service
        .get_stored_procedure_metadata("close_month", None, None)
        .await
        .unwrap();
    assert_eq!(procedure.related_tables, ["sales.customers", "sales.orders"]);
    assert!(procedure.definition.unwrap().contains("sales.ghost"));
}

#[tokio::test]
async fn test_table_dependencies_find_referencing_procedures() {
    let catalog = FakeCatalog::new()
        .on(
            PROCEDURES,
            json!([
                {"schema_name": "sales", "object_name": "close_month"},
                {"schema_name": "sales", "object_name": "purge_logs"}
            ]),
        )
        .on(ROUTINE_KIND, json!([{"object_type": "procedure"}]))
        .on_param(
            DEFINITION,
            "close_month",
            json!([{"definition": "UPDATE orders SET closed = 1"}]),
        )
        .on_param(
            DEFINITION,
            "purge_logs",
            json!([{"definition": "DELETE FROM audit_log"}]),
        )
        .on(TABLE_EXISTS, json!([{"table_count": 1}]));
    let fx = mysql_fixture(catalog, vec![sales_db()]);

    let report = fx
        .service
        .find_table_dependencies("orders", None, None)
        .await
        .unwrap();
    assert_eq!(report.procedures_scanned, 2);
    assert_eq!(report.dependencies.len(), 1);
    assert_eq!(report.dependencies[0].procedure_name, "close_month");
    assert_eq!(report.dependencies[0].related_tables, ["sales.orders"]);

    let scoped = fx
        .service
        .find_table_dependencies("orders", Some("hr"), None)
        .await
        .unwrap();
    assert!(scoped.dependencies.is_empty());
}

#[tokio::test]
async fn test_query_errors_name_the_operation() {
    let catalog = FakeCatalog::new().fail(SCHEMAS);
    let fx = mysql_fixture(catalog, vec![sales_db()]);

    let err = fx.service.list_schemas(None).await.unwrap_err();
    match err {
        ConnectorError::Query { operation, .. } => assert_eq!(operation, "get_schemas"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unsupported_engine_is_reported() {
    let oracle = db_metadata_server::config::DatabaseConfig::new("erp", "oracle", "DSN=erp");
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db(), oracle]);

    let err = fx.service.list_schemas(Some("erp")).await.unwrap_err();
    match err {
        ConnectorError::UnsupportedEngine { engine, supported } => {
            assert_eq!(engine, "oracle");
            assert_eq!(supported, ["mysql"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let health = fx.service.health_check(Some("erp")).await;
    assert_eq!(health.status, HealthStatus::Error);
    assert!(!health.is_connected);
}

#[tokio::test]
async fn test_health_check_masks_credentials() {
    let fx = mysql_fixture(FakeCatalog::new(), vec![sales_db()]);
    let health = fx.service.health_check(None).await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.engine, "mysql");
    let shown = health.connection_string.unwrap();
    assert!(!shown.contains("secret"));
}

#[tokio::test]
async fn test_search_suggests_close_procedure_names() {
    use db_metadata_server::tools::MetadataToolHandler;
    use db_metadata_server::tools::metadata::SearchObjectsInput;

    let catalog = FakeCatalog::new()
        .on(SCHEMAS, json!([{"schema_name": "sales"}]))
        .on(
            PROCEDURES,
            json!([
                {"schema_name": "sales", "object_name": "GetUser"},
                {"schema_name": "sales", "object_name": "CloseMonth"}
            ]),
        );
    let fx = mysql_fixture(catalog, vec![sales_db()]);
    let handler = MetadataToolHandler::new(fx.service.clone());

    let output = handler
        .search_objects(SearchObjectsInput {
            query: "sp_getuser".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(output.count, 0);
    assert_eq!(output.suggestions[0].name, "GetUser");
    assert_eq!(output.suggestions[0].kind, ObjectKind::StoredProcedure);
    assert!(output.suggestions[0].score > 0.8);
    assert!(output.suggestions.iter().all(|s| s.name != "CloseMonth"));
}

#[tokio::test]
async fn test_search_ranks_substring_hits() {
    use db_metadata_server::tools::MetadataToolHandler;
    use db_metadata_server::tools::metadata::SearchObjectsInput;

    let catalog = FakeCatalog::new()
        .on(SCHEMAS, json!([{"schema_name": "sales"}]))
        .on(
            TABLES,
            json!([
                {"schema_name": "sales", "object_name": "order_archive", "object_type": "table"},
                {"schema_name": "sales", "object_name": "orders", "object_type": "table"},
                {"schema_name": "sales", "object_name": "customers", "object_type": "table"}
            ]),
        );
    let fx = mysql_fixture(catalog, vec![sales_db()]);
    let handler = MetadataToolHandler::new(fx.service.clone());

    let output = handler
        .search_objects(SearchObjectsInput {
            query: "orders".to_string(),
            types: Some(vec!["table".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(output.count, 1);
    assert_eq!(output.results[0].object.name, "orders");
    assert!((output.results[0].score - 1.0).abs() < f64::EPSILON);
    assert!(output.suggestions.is_empty());
}

#[tokio::test]
async fn test_suggestions_respect_requested_types() {
    use db_metadata_server::tools::MetadataToolHandler;
    use db_metadata_server::tools::metadata::SearchObjectsInput;

    // Eleven tables tie the procedure at the score cap and come first.
    let tables: Vec<_> = (1..=11)
        .map(|i| {
            json!({"schema_name": "sales", "object_name": format!("GetUser_{i:02}"), "object_type": "table"})
        })
        .collect();
    let catalog = FakeCatalog::new()
        .on(SCHEMAS, json!([{"schema_name": "sales"}]))
        .on(TABLES, json!(tables))
        .on(
            PROCEDURES,
            json!([{"schema_name": "sales", "object_name": "GetUser_99"}]),
        );
    let fx = mysql_fixture(catalog, vec![sales_db()]);
    let handler = MetadataToolHandler::new(fx.service.clone());

    let output = handler
        .search_objects(SearchObjectsInput {
            query: "sp_getuser".to_string(),
            types: Some(vec!["stored_procedure".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(output.count, 0);
    assert!(!output.suggestions.is_empty());
    assert_eq!(output.suggestions[0].name, "GetUser_99");
    assert!(
        output
            .suggestions
            .iter()
            .all(|s| s.kind == ObjectKind::StoredProcedure)
    );
}
