//! Engine identifier to connector factory mapping.

use super::{
    Db2Connector, EngineConnector, MySqlConnector, OracleConnector, PostgresConnector,
    SqlServerConnector,
};
use crate::config::DatabaseConfig;
use crate::error::{ConnectorError, ConnectorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a connector for one database configuration.
pub type ConnectorFactory = Arc<dyn Fn(DatabaseConfig) -> Arc<dyn EngineConnector> + Send + Sync>;

/// Registry of connector factories keyed by lower-cased engine id.
///
/// Registration happens at startup; afterwards the registry is only read.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the five built-in engines.
    pub fn with_default_engines() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, ConnectorFactory); 5] = [
            (
                "sqlserver",
                Arc::new(|c| Arc::new(SqlServerConnector::new(c)) as Arc<dyn EngineConnector>),
            ),
            (
                "postgresql",
                Arc::new(|c| Arc::new(PostgresConnector::new(c)) as Arc<dyn EngineConnector>),
            ),
            (
                "db2",
                Arc::new(|c| Arc::new(Db2Connector::new(c)) as Arc<dyn EngineConnector>),
            ),
            (
                "mysql",
                Arc::new(|c| Arc::new(MySqlConnector::new(c)) as Arc<dyn EngineConnector>),
            ),
            (
                "oracle",
                Arc::new(|c| Arc::new(OracleConnector::new(c)) as Arc<dyn EngineConnector>),
            ),
        ];
        for (engine, factory) in builtins {
            registry.factories.insert(engine.to_string(), factory);
        }
        registry
    }

    /// Register (or replace) the factory for `engine`.
    pub fn register(&mut self, engine: &str, factory: ConnectorFactory) -> ConnectorResult<()> {
        let key = engine.trim().to_lowercase();
        if key.is_empty() {
            return Err(ConnectorError::invalid_input("engine id must not be empty"));
        }
        if self.factories.insert(key.clone(), factory).is_some() {
            debug!(engine = %key, "Replaced connector factory");
        }
        Ok(())
    }

    /// Build a connector for `config.engine`.
    pub fn resolve(&self, config: DatabaseConfig) -> ConnectorResult<Arc<dyn EngineConnector>> {
        let key = config.engine.trim().to_lowercase();
        match self.factories.get(&key) {
            Some(factory) => Ok(factory(config)),
            None => Err(ConnectorError::unsupported_engine(
                config.engine,
                self.list_supported(),
            )),
        }
    }

    pub fn is_supported(&self, engine: &str) -> bool {
        self.factories.contains_key(&engine.trim().to_lowercase())
    }

    /// Registered engine ids, ascending.
    pub fn list_supported(&self) -> Vec<String> {
        let mut engines: Vec<String> = self.factories.keys().cloned().collect();
        engines.sort();
        engines
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("engines", &self.list_supported())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engines() {
        let registry = ConnectorRegistry::with_default_engines();
        assert_eq!(
            registry.list_supported(),
            vec!["db2", "mysql", "oracle", "postgresql", "sqlserver"]
        );
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = ConnectorRegistry::with_default_engines();
        let config = DatabaseConfig::new("main", "PostgreSQL", "postgres://u:p@h/db");
        let connector = registry.resolve(config).unwrap();
        assert_eq!(connector.engine(), "postgresql");
        assert_eq!(connector.default_schema(), "public");
    }

    #[test]
    fn test_resolve_unknown_engine() {
        let registry = ConnectorRegistry::with_default_engines();
        let config = DatabaseConfig::new("main", "sybase", "x");
        let err = registry.resolve(config).err().unwrap();
        match err {
            ConnectorError::UnsupportedEngine { engine, supported } => {
                assert_eq!(engine, "sybase");
                assert_eq!(supported.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_register_rejects_empty_id() {
        let mut registry = ConnectorRegistry::new();
        let factory: ConnectorFactory =
            Arc::new(|c| Arc::new(MySqlConnector::new(c)) as Arc<dyn EngineConnector>);
        assert!(registry.register("  ", factory).is_err());
        assert!(registry.list_supported().is_empty());
    }

    #[test]
    fn test_register_alias() {
        let mut registry = ConnectorRegistry::new();
        let factory: ConnectorFactory =
            Arc::new(|c| Arc::new(PostgresConnector::new(c)) as Arc<dyn EngineConnector>);
        registry.register("Postgres", factory).unwrap();
        assert!(registry.is_supported("postgres"));
        assert!(!registry.is_supported("postgresql"));
    }
}
