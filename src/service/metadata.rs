//! Metadata orchestration across configured databases.

use crate::cache::{CacheLayer, DETAILS_TTL, OVERVIEW_TTL, cache_key};
use crate::config::{DatabaseConfig, FuzzyConfig, Settings};
use crate::connectors::{ConnectorRegistry, EngineConnector};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    DatabaseMetadataResponse, DatabaseSummary, HealthReport, HealthStatus, MetadataSuggestion,
    ObjectKind, ObjectSummary, SchemaOverview, StoredProcedureMetadata, TableDependency,
    TableDependencyReport, TableMetadata,
};
use crate::search::{FuzzyMatcher, Ranked};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Result cap of `search_objects` when the caller gives none.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Procedures inspected by `find_table_dependencies`.
pub const MAX_DEPENDENCY_SCAN: usize = 50;

/// Holds one connector per configured database name.
///
/// Connectors are resolved through the registry on first use and reconnected
/// whenever a request finds them disconnected. Creation is serialized so two
/// concurrent first requests share one connector.
pub struct MetadataService {
    databases: Vec<DatabaseConfig>,
    registry: ConnectorRegistry,
    connectors: RwLock<HashMap<String, Arc<dyn EngineConnector>>>,
    create_lock: Mutex<()>,
    cache: CacheLayer,
    fuzzy: FuzzyConfig,
}

impl MetadataService {
    pub fn new(
        databases: Vec<DatabaseConfig>,
        registry: ConnectorRegistry,
        cache: CacheLayer,
        fuzzy: FuzzyConfig,
    ) -> Self {
        Self {
            databases,
            registry,
            connectors: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
            cache,
            fuzzy,
        }
    }

    pub fn from_settings(settings: &Settings, registry: ConnectorRegistry, cache: CacheLayer) -> Self {
        Self::new(
            settings.databases.clone(),
            registry,
            cache,
            settings.fuzzy.clone(),
        )
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn database_names(&self) -> Vec<&str> {
        self.databases.iter().map(|c| c.name.as_str()).collect()
    }

    /// The named configuration, or the first one when `database` is empty.
    fn config_for(&self, database: Option<&str>) -> ConnectorResult<&DatabaseConfig> {
        match database.map(str::trim).filter(|d| !d.is_empty()) {
            None => self
                .databases
                .first()
                .ok_or_else(|| ConnectorError::config("no databases configured")),
            Some(name) => self
                .databases
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| {
                    ConnectorError::database_not_found(
                        name,
                        format!("Available databases: {}", self.database_names().join(", ")),
                    )
                }),
        }
    }

    /// Existing connector for `config`, or a new one from the registry.
    async fn handle(&self, config: &DatabaseConfig) -> ConnectorResult<Arc<dyn EngineConnector>> {
        if let Some(connector) = self.connectors.read().await.get(&config.name) {
            return Ok(connector.clone());
        }
        let _guard = self.create_lock.lock().await;
        if let Some(connector) = self.connectors.read().await.get(&config.name) {
            return Ok(connector.clone());
        }

        let connector = self.registry.resolve(config.clone())?;
        debug!(
            database = %config.name,
            engine = connector.engine(),
            "Created connector"
        );
        self.connectors
            .write()
            .await
            .insert(config.name.clone(), connector.clone());
        Ok(connector)
    }

    /// A connected connector for `database` (default database when `None`).
    pub async fn connector(
        &self,
        database: Option<&str>,
    ) -> ConnectorResult<Arc<dyn EngineConnector>> {
        let config = self.config_for(database)?;
        let connector = self.handle(config).await?;
        if !connector.is_connected().await {
            connector.connect().await?;
        }
        Ok(connector)
    }

    pub async fn list_databases(&self) -> Vec<DatabaseSummary> {
        let connectors = self.connectors.read().await;
        let mut summaries = Vec::with_capacity(self.databases.len());
        for (index, config) in self.databases.iter().enumerate() {
            let is_connected = match connectors.get(&config.name) {
                Some(connector) => connector.is_connected().await,
                None => false,
            };
            summaries.push(DatabaseSummary {
                name: config.name.clone(),
                engine: config.engine.clone(),
                is_default: index == 0,
                is_connected,
            });
        }
        summaries
    }

    pub async fn list_schemas(&self, database: Option<&str>) -> ConnectorResult<Vec<String>> {
        let connector = self.connector(database).await?;
        visible_schemas(connector.as_ref()).await
    }

    pub async fn list_tables(
        &self,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        let connector = self.connector(database).await?;
        let tables = connector.get_tables(schema).await?;
        Ok(visible_objects(connector.as_ref(), tables))
    }

    pub async fn list_procedures(
        &self,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        let connector = self.connector(database).await?;
        let procedures = connector.get_stored_procedures(schema).await?;
        Ok(visible_objects(connector.as_ref(), procedures))
    }

    pub async fn list_functions(
        &self,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<Vec<ObjectSummary>> {
        let connector = self.connector(database).await?;
        let functions = connector.get_functions(schema).await?;
        Ok(visible_objects(connector.as_ref(), functions))
    }

    /// Every visible schema with its tables, procedures and functions.
    pub async fn get_database_overview(
        &self,
        database: Option<&str>,
    ) -> ConnectorResult<DatabaseMetadataResponse> {
        let connector = self.connector(database).await?;
        let config = connector.config();
        let key = cache_key(&config.name, "overview", &[]);

        self.cache
            .read_through(&key, OVERVIEW_TTL, || async {
                let mut overviews = Vec::new();
                for schema in visible_schemas(connector.as_ref()).await? {
                    let tables = connector.get_tables(Some(&schema)).await?;
                    let procedures = connector.get_stored_procedures(Some(&schema)).await?;
                    let functions = connector.get_functions(Some(&schema)).await?;
                    overviews.push(SchemaOverview::new(
                        schema,
                        visible_objects(connector.as_ref(), tables),
                        visible_objects(connector.as_ref(), procedures),
                        visible_objects(connector.as_ref(), functions),
                    ));
                }
                let response =
                    DatabaseMetadataResponse::new(&config.name, connector.engine(), overviews);
                info!(
                    database = %config.name,
                    schemas = response.total_schemas,
                    objects = response.total_objects,
                    "Built database overview"
                );
                Ok(response)
            })
            .await
    }

    pub async fn get_table_metadata(
        &self,
        table: &str,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<TableMetadata> {
        let table = required("table_name", table)?;
        let connector = self.connector(database).await?;
        let schema = effective_schema(connector.as_ref(), schema);
        let key = cache_key(&connector.config().name, "table", &[&schema, table]);
        self.cache
            .read_through(&key, DETAILS_TTL, || {
                connector.get_table_metadata(table, Some(&schema))
            })
            .await
    }

    pub async fn get_stored_procedure_metadata(
        &self,
        name: &str,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<StoredProcedureMetadata> {
        let name = required("procedure_name", name)?;
        let connector = self.connector(database).await?;
        let schema = effective_schema(connector.as_ref(), schema);
        let key = cache_key(&connector.config().name, "procedure", &[&schema, name]);
        self.cache
            .read_through(&key, DETAILS_TTL, || {
                connector.get_stored_procedure_metadata(name, Some(&schema))
            })
            .await
    }

    /// Substring search over object names, re-ranked by fuzzy score.
    ///
    /// Schemas are walked in ascending order and, inside each schema, tables
    /// and views come before procedures and functions. The walk stops as soon
    /// as `limit` hits are collected, so truncation is deterministic.
    pub async fn search_objects(
        &self,
        term: &str,
        kinds: &[ObjectKind],
        schema: Option<&str>,
        database: Option<&str>,
        limit: Option<usize>,
    ) -> ConnectorResult<Vec<Ranked<ObjectSummary>>> {
        let term = required("search_term", term)?;
        let needle = term.to_lowercase();
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
        let kinds: &[ObjectKind] = if kinds.is_empty() {
            &ObjectKind::ALL
        } else {
            kinds
        };
        let connector = self.connector(database).await?;

        let mut schemas = match schema.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if connector.should_include_schema(s) => vec![s.to_string()],
            Some(_) => Vec::new(),
            None => visible_schemas(connector.as_ref()).await?,
        };
        schemas.sort();

        let wants = |kind: ObjectKind| kinds.contains(&kind);
        let mut hits = Vec::new();
        'schemas: for schema in &schemas {
            let mut candidates = Vec::new();
            if wants(ObjectKind::Table) || wants(ObjectKind::View) {
                candidates.extend(connector.get_tables(Some(schema)).await?);
            }
            if wants(ObjectKind::StoredProcedure) {
                candidates.extend(connector.get_stored_procedures(Some(schema)).await?);
            }
            if wants(ObjectKind::Function) {
                candidates.extend(connector.get_functions(Some(schema)).await?);
            }

            for object in visible_objects(connector.as_ref(), candidates) {
                if wants(object.kind) && object.name.to_lowercase().contains(&needle) {
                    hits.push(object);
                    if hits.len() >= limit {
                        break 'schemas;
                    }
                }
            }
        }

        debug!(
            database = %connector.config().name,
            term = term,
            hits = hits.len(),
            "Search finished"
        );
        Ok(self.matcher(connector.as_ref()).rank_existing(term, hits))
    }

    /// Fuzzy suggestions over the objects of the database whose kind is in
    /// `kinds`; an empty slice means every kind.
    pub async fn suggest(
        &self,
        query: &str,
        kinds: &[ObjectKind],
        database: Option<&str>,
    ) -> ConnectorResult<Vec<MetadataSuggestion>> {
        let query = required("query", query)?;
        let overview = self.get_database_overview(database).await?;
        let connector = self.connector(database).await?;

        let candidates: Vec<ObjectSummary> = overview
            .schemas
            .into_iter()
            .flat_map(|s| {
                s.tables
                    .into_iter()
                    .chain(s.procedures)
                    .chain(s.functions)
            })
            .filter(|o| kinds.is_empty() || kinds.contains(&o.kind))
            .collect();
        Ok(self
            .matcher(connector.as_ref())
            .find_best_matches(query, &candidates))
    }

    /// Procedures whose parsed definitions reference `table`.
    ///
    /// Only the first [`MAX_DEPENDENCY_SCAN`] procedures are inspected.
    /// Procedures whose details cannot be read are skipped.
    pub async fn find_table_dependencies(
        &self,
        table: &str,
        schema: Option<&str>,
        database: Option<&str>,
    ) -> ConnectorResult<TableDependencyReport> {
        let table = required("table_name", table)?;
        let procedures = self.list_procedures(None, database).await?;
        let scanned: Vec<ObjectSummary> =
            procedures.into_iter().take(MAX_DEPENDENCY_SCAN).collect();

        let mut dependencies = Vec::new();
        for procedure in &scanned {
            let details = match self
                .get_stored_procedure_metadata(&procedure.name, Some(&procedure.schema), database)
                .await
            {
                Ok(details) => details,
                Err(e) => {
                    warn!(
                        procedure = %procedure.full_name,
                        error = %e,
                        "Skipping procedure in dependency scan"
                    );
                    continue;
                }
            };
            if details.references_table(table, schema) {
                dependencies.push(TableDependency {
                    procedure_name: details.name,
                    procedure_schema: details.schema_name,
                    related_tables: details.related_tables,
                    parameters: details.parameters,
                });
            }
        }

        Ok(TableDependencyReport {
            table_name: table.to_string(),
            schema: schema.map(str::to_string),
            procedures_scanned: scanned.len(),
            dependencies,
        })
    }

    /// Probe one database. Failures become a report with `status = error`.
    pub async fn health_check(&self, database: Option<&str>) -> HealthReport {
        let config = match self.config_for(database) {
            Ok(config) => config,
            Err(e) => {
                return error_report(database.unwrap_or_default(), "", "", None, &e);
            }
        };
        let connector = match self.handle(config).await {
            Ok(connector) => connector,
            Err(e) => {
                return error_report(
                    &config.name,
                    &config.engine,
                    "",
                    Some(config.masked_connection_string()),
                    &e,
                );
            }
        };
        if !connector.is_connected().await {
            if let Err(e) = connector.connect().await {
                error!(database = %config.name, error = %e, "Health check could not connect");
                return error_report(
                    &config.name,
                    connector.engine(),
                    connector.driver_name(),
                    Some(config.masked_connection_string()),
                    &e,
                );
            }
        }
        connector.health_check().await
    }

    pub fn supported_engines(&self) -> Vec<String> {
        self.registry.list_supported()
    }

    /// Drop cached metadata of one database, or of all of them.
    pub async fn clear_cache(&self, database: Option<&str>) -> ConnectorResult<usize> {
        let database = match database.map(str::trim).filter(|d| !d.is_empty()) {
            Some(name) => Some(self.config_for(Some(name))?.name.as_str()),
            None => None,
        };
        Ok(self.cache.clear(database).await)
    }

    /// Disconnect and forget every connector.
    pub async fn close_all(&self) {
        let mut connectors = self.connectors.write().await;
        for (name, connector) in connectors.drain() {
            info!(database = %name, "Closing connection");
            connector.disconnect().await;
        }
        info!("All connections closed");
    }

    fn matcher(&self, connector: &dyn EngineConnector) -> FuzzyMatcher {
        FuzzyMatcher::from_config(&self.fuzzy).with_preferred_schema(connector.default_schema())
    }
}

fn required<'a>(field: &str, value: &'a str) -> ConnectorResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConnectorError::invalid_input(format!("{field} must not be empty")));
    }
    Ok(value)
}

async fn visible_schemas(connector: &dyn EngineConnector) -> ConnectorResult<Vec<String>> {
    let mut schemas = connector.get_schemas().await?;
    schemas.retain(|s| connector.should_include_schema(s));
    Ok(schemas)
}

fn visible_objects(connector: &dyn EngineConnector, mut objects: Vec<ObjectSummary>) -> Vec<ObjectSummary> {
    objects.retain(|o| {
        connector.should_include_schema(&o.schema) && !connector.should_exclude_object(&o.name)
    });
    objects
}

fn error_report(
    database: &str,
    engine: &str,
    driver: &str,
    connection_string: Option<String>,
    e: &ConnectorError,
) -> HealthReport {
    HealthReport {
        database: database.to_string(),
        engine: engine.to_string(),
        driver: driver.to_string(),
        status: HealthStatus::Error,
        is_connected: false,
        connection_string,
        error: Some(e.to_string()),
        checked_at: Utc::now(),
    }
}

/// The schema a detail lookup will use, so omitted and explicit default
/// schemas share one cache entry.
fn effective_schema(connector: &dyn EngineConnector, schema: Option<&str>) -> String {
    schema
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| connector.default_schema())
}
