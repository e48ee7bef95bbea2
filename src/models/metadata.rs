//! Canonical metadata model.
//!
//! Every connector maps its vendor catalog rows into these types. They carry
//! no behavior beyond small constructors and are created fresh per request.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of catalog object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    StoredProcedure,
    Function,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::StoredProcedure,
        ObjectKind::Function,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::StoredProcedure => "stored_procedure",
            Self::Function => "function",
        }
    }

    /// Relation kinds come from the tables/views catalog, routines from the
    /// procedures/functions catalog.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Table | Self::View)
    }

    /// Multiplier applied to fuzzy scores for this kind.
    pub fn search_weight(&self) -> f64 {
        match self {
            Self::StoredProcedure => 1.2,
            Self::Function => 1.1,
            Self::Table => 1.0,
            Self::View => 0.9,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    /// Accepts the canonical names plus the catalog spellings
    /// (`BASE TABLE`, `PROCEDURE`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "base table" | "base_table" | "t" => Ok(Self::Table),
            "view" | "v" => Ok(Self::View),
            "stored_procedure" | "procedure" | "proc" | "p" => Ok(Self::StoredProcedure),
            "function" | "func" | "f" => Ok(Self::Function),
            other => Err(format!(
                "Invalid object type: {other}. Valid types: table, view, stored_procedure, function"
            )),
        }
    }
}

/// Direction of a routine parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ParameterDirection {
    #[default]
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "INOUT")]
    InOut,
}

impl ParameterDirection {
    /// Map a catalog mode string (`IN`, `OUT`, `INOUT`, `IN/OUT`, `IN OUT`).
    /// Anything unrecognised is treated as input.
    pub fn from_mode(mode: &str) -> Self {
        let normalized: String = mode
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "OUT" => Self::Out,
            "INOUT" => Self::InOut,
            _ => Self::In,
        }
    }
}

impl fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("IN"),
            Self::Out => f.write_str("OUT"),
            Self::InOut => f.write_str("INOUT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-native declared type.
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// Referenced `schema.table.column` when the column is a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i64>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            foreign_key: None,
            default_value: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub direction: ParameterDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub nullable: bool,
}

impl ParameterInfo {
    /// Build a parameter, synthesizing `param_{position}` when the catalog
    /// reports no name. `position` is 1-based.
    pub fn new(
        name: Option<&str>,
        position: usize,
        data_type: impl Into<String>,
        direction: ParameterDirection,
    ) -> Self {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("param_{position}"),
        };
        Self {
            name,
            data_type: data_type.into(),
            direction,
            default_value: None,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    /// Member columns in key order.
    pub columns: Vec<String>,
    pub unique: bool,
    pub clustered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipInfo {
    pub foreign_table: String,
    pub foreign_column: String,
    pub local_column: String,
    #[serde(default = "default_relationship_type")]
    pub relationship_type: String,
}

fn default_relationship_type() -> String {
    "many_to_one".to_string()
}

impl RelationshipInfo {
    pub fn many_to_one(
        local_column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
            local_column: local_column.into(),
            relationship_type: default_relationship_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableMetadata {
    pub name: String,
    pub schema_name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    #[serde(default)]
    pub relationships: Vec<RelationshipInfo>,
}

impl TableMetadata {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoredProcedureMetadata {
    pub name: String,
    pub schema_name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    /// Shape of the first result set, when the engine can describe it.
    #[serde(default)]
    pub returns: Vec<ColumnInfo>,
    /// Referenced tables as `schema.table`, sorted.
    #[serde(default)]
    pub related_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl StoredProcedureMetadata {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }

    /// True if `table` (bare or `schema.table`) is among the related tables.
    pub fn references_table(&self, table: &str, schema: Option<&str>) -> bool {
        let wanted_full = schema.map(|s| format!("{s}.{table}"));
        self.related_tables.iter().any(|related| {
            let bare = related.rsplit('.').next().unwrap_or(related);
            match &wanted_full {
                Some(full) => related.eq_ignore_ascii_case(full),
                None => bare.eq_ignore_ascii_case(table),
            }
        })
    }
}

/// One entry of a catalog listing (tables, views, procedures, functions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectSummary {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub full_name: String,
    /// Engine-specific routine flavour (`SQL_SCALAR_FUNCTION`, `PACKAGE`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
}

impl ObjectSummary {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: ObjectKind) -> Self {
        let schema = schema.into();
        let name = name.into();
        Self {
            full_name: format!("{schema}.{name}"),
            schema,
            name,
            kind,
            routine_type: None,
            created_date: None,
            modified_date: None,
        }
    }

    pub fn with_routine_type(mut self, routine_type: Option<String>) -> Self {
        self.routine_type = routine_type;
        self
    }

    pub fn with_dates(mut self, created: Option<String>, modified: Option<String>) -> Self {
        self.created_date = created;
        self.modified_date = modified;
        self
    }
}

/// A fuzzy-search hit with its normalized score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetadataSuggestion {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub name: String,
    pub schema_name: String,
    /// In `[0, 1]`.
    pub score: f64,
    #[serde(default)]
    pub params: Vec<ParameterInfo>,
    #[serde(default)]
    pub returns: Vec<ColumnInfo>,
    #[serde(default)]
    pub related_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaOverview {
    pub schema_name: String,
    pub table_count: usize,
    pub procedure_count: usize,
    pub function_count: usize,
    pub tables: Vec<ObjectSummary>,
    pub procedures: Vec<ObjectSummary>,
    pub functions: Vec<ObjectSummary>,
}

impl SchemaOverview {
    /// Build an overview whose counts are derived from the lists.
    pub fn new(
        schema_name: impl Into<String>,
        tables: Vec<ObjectSummary>,
        procedures: Vec<ObjectSummary>,
        functions: Vec<ObjectSummary>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_count: tables.len(),
            procedure_count: procedures.len(),
            function_count: functions.len(),
            tables,
            procedures,
            functions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseMetadataResponse {
    pub database_name: String,
    pub database_type: String,
    pub schemas: Vec<SchemaOverview>,
    pub total_schemas: usize,
    pub total_tables: usize,
    pub total_procedures: usize,
    pub total_functions: usize,
    pub total_objects: usize,
}

impl DatabaseMetadataResponse {
    pub fn new(
        database_name: impl Into<String>,
        database_type: impl Into<String>,
        schemas: Vec<SchemaOverview>,
    ) -> Self {
        let total_tables = schemas.iter().map(|s| s.table_count).sum();
        let total_procedures = schemas.iter().map(|s| s.procedure_count).sum();
        let total_functions = schemas.iter().map(|s| s.function_count).sum();
        Self {
            database_name: database_name.into(),
            database_type: database_type.into(),
            total_schemas: schemas.len(),
            total_tables,
            total_procedures,
            total_functions,
            total_objects: total_tables + total_procedures + total_functions,
            schemas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy => f.write_str("unhealthy"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthReport {
    pub database: String,
    #[serde(rename = "type")]
    pub engine: String,
    pub driver: String,
    pub status: HealthStatus,
    pub is_connected: bool,
    /// Connection string with credentials masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A configured database as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub engine: String,
    /// The database used when a request names none.
    pub is_default: bool,
    pub is_connected: bool,
}

/// A procedure that references a given table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableDependency {
    pub procedure_name: String,
    pub procedure_schema: String,
    pub related_tables: Vec<String>,
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableDependencyReport {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub procedures_scanned: usize,
    pub dependencies: Vec<TableDependency>,
}
