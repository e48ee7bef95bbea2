//! Table reference extraction verified against a fixed set of known tables.

use async_trait::async_trait;
use db_metadata_server::error::{ConnectorError, ConnectorResult};
use db_metadata_server::parser::{DependencyParser, TableVerifier};
use std::collections::HashSet;

struct KnownTables(HashSet<String>);

impl KnownTables {
    fn new(tables: &[&str]) -> Self {
        Self(tables.iter().map(|t| t.to_lowercase()).collect())
    }
}

#[async_trait]
impl TableVerifier for KnownTables {
    async fn table_exists(&self, schema: &str, table: &str) -> ConnectorResult<bool> {
        Ok(self.0.contains(&format!("{schema}.{table}").to_lowercase()))
    }
}

struct BrokenCatalog;

#[async_trait]
impl TableVerifier for BrokenCatalog {
    async fn table_exists(&self, _schema: &str, _table: &str) -> ConnectorResult<bool> {
        Err(ConnectorError::timeout("verify table", 30))
    }
}

#[tokio::test]
async fn test_join_references_resolve() {
    let known = KnownTables::new(&["dbo.Orders", "dbo.Customers"]);
    let tables = DependencyParser::new()
        .resolve(
            "SELECT * FROM dbo.Orders o JOIN dbo.Customers c ON o.CustomerId = c.Id",
            "dbo",
            &known,
        )
        .await;
    assert_eq!(tables, ["dbo.Customers", "dbo.Orders"]);
}

#[tokio::test]
async fn test_unknown_tables_are_omitted() {
    let known = KnownTables::new(&["dbo.Orders"]);
    let tables = DependencyParser::new()
        .resolve(
            "INSERT INTO dbo.Orders (Id) SELECT Id FROM #staging; UPDATE dbo.Phantom SET x = 1",
            "dbo",
            &known,
        )
        .await;
    assert_eq!(tables, ["dbo.Orders"]);
}

#[tokio::test]
async fn test_unqualified_names_use_default_schema() {
    let known = KnownTables::new(&["sales.orders", "sales.audit_log"]);
    let tables = DependencyParser::new()
        .resolve(
            "BEGIN\n  DELETE FROM orders WHERE closed = 1;\n  INSERT INTO audit_log VALUES (1);\nEND",
            "sales",
            &known,
        )
        .await;
    assert_eq!(tables, ["sales.audit_log", "sales.orders"]);
}

#[tokio::test]
async fn test_system_catalogs_are_ignored() {
    let known = KnownTables::new(&["information_schema.tables", "sys.objects", "dbo.Orders"]);
    let tables = DependencyParser::new()
        .resolve(
            "SELECT * FROM INFORMATION_SCHEMA.TABLES; SELECT * FROM sys.objects; SELECT 1 FROM dbo.Orders",
            "dbo",
            &known,
        )
        .await;
    assert_eq!(tables, ["dbo.Orders"]);
}

#[tokio::test]
async fn test_verification_errors_keep_candidates() {
    let tables = DependencyParser::new()
        .resolve("SELECT * FROM hr.Employees", "dbo", &BrokenCatalog)
        .await;
    assert_eq!(tables, ["hr.Employees"]);
}

#[tokio::test]
async fn test_definition_without_tables() {
    let known = KnownTables::new(&["dbo.Orders"]);
    let tables = DependencyParser::new()
        .resolve("BEGIN RETURN 42; END", "dbo", &known)
        .await;
    assert!(tables.is_empty());
}
