//! Configuration handling for the metadata server.
//!
//! Process-level options (transport, logging, config path) come from CLI
//! arguments and environment variables. The database list, cache and fuzzy
//! search settings come from a YAML file.

use crate::error::{ConnectorError, ConnectorResult};
use clap::{Parser, ValueEnum};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";

pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 80.0;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 10;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// One logical database to extract metadata from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Logical name used by callers to pick this database.
    pub name: String,
    /// Engine identifier resolved through the connector registry.
    #[serde(rename = "type")]
    pub engine: String,
    /// Driver connection string (sensitive - never logged unmasked).
    pub connection_string: String,
    /// Schema allow-list; `None` means every non-system schema.
    #[serde(default)]
    pub include_schemas: Option<Vec<String>>,
    /// Object deny-list patterns (`prefix*`, `*suffix`, exact).
    #[serde(default)]
    pub exclude_objects: Option<Vec<String>>,
    /// Seconds allowed for establishing a connection.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_connection_timeout() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

static CREDENTIAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(PWD?|PASSWORD)\s*=\s*[^;]*").unwrap());

impl DatabaseConfig {
    pub fn new(
        name: impl Into<String>,
        engine: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            connection_string: connection_string.into(),
            include_schemas: None,
            exclude_objects: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_include_schemas(mut self, schemas: &[&str]) -> Self {
        self.include_schemas = Some(schemas.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_exclude_objects(mut self, patterns: &[&str]) -> Self {
        self.exclude_objects = Some(patterns.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn connection_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Schema allow-list, treating an empty list like no list.
    pub fn include_schemas(&self) -> Option<&[String]> {
        self.include_schemas
            .as_deref()
            .filter(|schemas| !schemas.is_empty())
    }

    pub fn exclude_patterns(&self) -> &[String] {
        self.exclude_objects.as_deref().unwrap_or(&[])
    }

    /// Connection string with credentials replaced by `***`.
    ///
    /// Handles ODBC style `PWD=...;` / `PASSWORD=...;` pairs and the password
    /// component of URL style strings.
    pub fn masked_connection_string(&self) -> String {
        mask_connection_string(&self.connection_string)
    }

    /// Database named in the path of a URL connection string, if any.
    pub fn url_database_name(&self) -> Option<String> {
        let url = Url::parse(&self.connection_string).ok()?;
        url.path()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("database name must not be empty".to_string());
        }
        if self.engine.trim().is_empty() {
            return Err(format!("database '{}' has no type", self.name));
        }
        if self.connection_string.trim().is_empty() {
            return Err(format!("database '{}' has no connection_string", self.name));
        }
        if self.connection_timeout == 0 {
            return Err(format!(
                "database '{}': connection_timeout must be greater than 0",
                self.name
            ));
        }
        if self.max_connections == 0 {
            return Err(format!(
                "database '{}': max_connections must be greater than 0",
                self.name
            ));
        }
        Ok(())
    }
}

/// Mask credentials in a connection string.
pub fn mask_connection_string(connection_string: &str) -> String {
    let masked = CREDENTIAL_PATTERN
        .replace_all(connection_string, "$1=***")
        .into_owned();

    match Url::parse(&masked) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_ok() {
                url.to_string()
            } else {
                masked
            }
        }
        _ => masked,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Fallback TTL for entries written without an explicit one.
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: default_redis_url(),
            ttl_seconds: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyConfig {
    /// Minimum score on a 0-100 scale.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    /// Manual overrides: alias to canonical object name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FUZZY_THRESHOLD,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            aliases: HashMap::new(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

fn default_max_suggestions() -> usize {
    DEFAULT_MAX_SUGGESTIONS
}

/// Contents of the YAML settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
}

impl Settings {
    /// Parse and validate settings from YAML text.
    pub fn from_yaml(text: &str) -> ConnectorResult<Self> {
        let settings: Settings = serde_yaml::from_str(text)
            .map_err(|e| ConnectorError::config(format!("invalid YAML: {e}")))?;
        settings.validate().map_err(ConnectorError::config)?;
        Ok(settings)
    }

    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// The first configured database is the default one.
    pub fn default_database(&self) -> Option<&DatabaseConfig> {
        self.databases.first()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.databases.is_empty() {
            return Err("at least one database must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for db in &self.databases {
            db.validate()?;
            if !seen.insert(db.name.as_str()) {
                return Err(format!("duplicate database name '{}'", db.name));
            }
        }
        if !(0.0..=100.0).contains(&self.fuzzy.threshold) {
            return Err(format!(
                "fuzzy.threshold must be between 0 and 100 (got {})",
                self.fuzzy.threshold
            ));
        }
        if self.fuzzy.max_suggestions == 0 {
            return Err("fuzzy.max_suggestions must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Command-line configuration for the metadata server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-metadata-server",
    about = "MCP server exposing database metadata (tables, procedures, dependencies) with fuzzy search",
    version,
    author
)]
pub struct Config {
    /// Path to the YAML settings file (databases, cache, fuzzy search)
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        env = "MCP_CONFIG"
    )]
    pub config_path: PathBuf,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Load the settings file this configuration points at.
    pub fn load_settings(&self) -> ConnectorResult<Settings> {
        Settings::load(&self.config_path)
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
databases:
  - name: main
    type: sqlserver
    connection_string: "DRIVER={ODBC Driver 18 for SQL Server};SERVER=db;UID=app;PWD=s3cret;"
    include_schemas: [dbo, sales]
    exclude_objects: ["tmp_*", "*_bak"]
  - name: analytics
    type: postgresql
    connection_string: "postgres://app:hunter2@pg:5432/analytics"
    connection_timeout: 5
cache:
  backend: memory
  ttl_seconds: 120
fuzzy:
  threshold: 70
  aliases:
    cust: Customers
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_settings_from_yaml() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.databases.len(), 2);

        let main = &settings.databases[0];
        assert_eq!(main.engine, "sqlserver");
        assert_eq!(main.connection_timeout, DEFAULT_CONNECTION_TIMEOUT_SECS);
        assert_eq!(main.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(main.include_schemas().unwrap(), ["dbo", "sales"]);
        assert_eq!(main.exclude_patterns(), ["tmp_*", "*_bak"]);

        let analytics = &settings.databases[1];
        assert_eq!(analytics.connection_timeout_duration(), Duration::from_secs(5));
        assert!(analytics.include_schemas().is_none());

        assert_eq!(settings.cache.ttl_seconds, 120);
        assert!(settings.cache.enabled);
        assert_eq!(settings.fuzzy.threshold, 70.0);
        assert_eq!(settings.fuzzy.max_suggestions, DEFAULT_MAX_SUGGESTIONS);
        assert_eq!(settings.fuzzy.aliases["cust"], "Customers");
        assert_eq!(settings.default_database().unwrap().name, "main");
    }

    #[test]
    fn test_settings_requires_a_database() {
        let err = Settings::from_yaml("databases: []").unwrap_err();
        assert!(err.to_string().contains("at least one database"));
    }

    #[test]
    fn test_settings_rejects_duplicate_names() {
        let yaml = r#"
databases:
  - {name: a, type: mysql, connection_string: "mysql://h/a"}
  - {name: a, type: mysql, connection_string: "mysql://h/b"}
"#;
        let err = Settings::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate database name"));
    }

    #[test]
    fn test_settings_rejects_zero_timeout() {
        let yaml = r#"
databases:
  - {name: a, type: mysql, connection_string: "mysql://h/a", connection_timeout: 0}
"#;
        assert!(Settings::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_include_list_means_all_schemas() {
        let mut db = DatabaseConfig::new("a", "mysql", "mysql://h/a");
        db.include_schemas = Some(vec![]);
        assert!(db.include_schemas().is_none());
    }

    #[test]
    fn test_mask_odbc_credentials() {
        let masked = mask_connection_string("SERVER=db;UID=app;PWD=s3cret;DATABASE=x");
        assert_eq!(masked, "SERVER=db;UID=app;PWD=***;DATABASE=x");

        let masked = mask_connection_string("Server=db;password=abc;Encrypt=yes");
        assert_eq!(masked, "Server=db;password=***;Encrypt=yes");
        assert!(!masked.contains("abc"));
    }

    #[test]
    fn test_mask_url_password() {
        let masked = mask_connection_string("postgres://app:hunter2@pg:5432/analytics");
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains("app:***@pg"));
    }

    #[test]
    fn test_mask_leaves_plain_strings_alone() {
        let plain = "DSN=warehouse;UID=reader";
        assert_eq!(mask_connection_string(plain), plain);
    }

    #[test]
    fn test_url_database_name() {
        let db = DatabaseConfig::new("x", "mysql", "mysql://u:p@h:3306/sales");
        assert_eq!(db.url_database_name().as_deref(), Some("sales"));
        let db = DatabaseConfig::new("x", "mysql", "mysql://u:p@h:3306");
        assert_eq!(db.url_database_name(), None);
        let db = DatabaseConfig::new("x", "db2", "DATABASE=sample;PWD=x");
        assert_eq!(db.url_database_name(), None);
    }
}
