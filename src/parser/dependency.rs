//! Table references in routine source text.
//!
//! This is a lexical scan, not a SQL parser. Dynamic SQL, temp tables and CTE
//! names are not resolved; CTE and alias names that look like tables are
//! removed by the catalog verification pass.

use crate::error::ConnectorResult;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Optional `schema.` qualifier followed by an object name, each optionally
/// wrapped in `[..]`, `".."` or backticks.
macro_rules! qualified_name {
    () => {
        r#"(?:[\["`]?([A-Za-z_][A-Za-z0-9_$]*)[\]"`]?\s*\.\s*)?[\["`]?([A-Za-z_][A-Za-z0-9_$]*)[\]"`]?"#
    };
}

static FROM_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\b(?:FROM|JOIN)\s+", qualified_name!())).unwrap()
});

static INSERT_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\b(?:INSERT\s+INTO|UPDATE)\s+", qualified_name!())).unwrap()
});

static DELETE_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(r"(?i)\bDELETE\s+FROM\s+", qualified_name!())).unwrap()
});

/// Names that are keywords or system catalogs rather than user tables.
const IGNORED_NAMES: &[&str] = &[
    "INFORMATION_SCHEMA",
    "SYS",
    "MASTER",
    "MSDB",
    "TEMPDB",
    "PG_CATALOG",
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "VALUES",
    "SET",
    "DECLARE",
    "DUAL",
];

/// Qualifiers that put the object in a system catalog.
const SYSTEM_SCHEMAS: &[&str] = &[
    "INFORMATION_SCHEMA",
    "SYS",
    "PG_CATALOG",
    "SYSCAT",
    "SYSIBM",
    "MYSQL",
    "PERFORMANCE_SCHEMA",
];

/// Checks candidate tables against the live catalog.
#[async_trait]
pub trait TableVerifier: Send + Sync {
    /// `Ok(false)` means the catalog answered and the table does not exist.
    async fn table_exists(&self, schema: &str, table: &str) -> ConnectorResult<bool>;
}

/// A table reference found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub schema: String,
    pub name: String,
}

impl TableReference {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyParser;

impl DependencyParser {
    pub fn new() -> Self {
        Self
    }

    /// Every distinct table reference in `definition`, in order of first
    /// appearance. Unqualified names are placed in `default_schema`.
    ///
    /// Matching is case-insensitive and duplicates are detected
    /// case-insensitively; the first spelling seen is kept.
    pub fn extract_candidates(&self, definition: &str, default_schema: &str) -> Vec<TableReference> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for pattern in [&*FROM_JOIN, &*INSERT_UPDATE, &*DELETE_FROM] {
            for caps in pattern.captures_iter(definition) {
                let Some(name) = caps.get(2).map(|m| m.as_str()) else {
                    continue;
                };
                let schema = caps.get(1).map(|m| m.as_str());

                if is_ignored(name, schema) {
                    continue;
                }

                let reference = TableReference {
                    schema: schema.unwrap_or(default_schema).to_string(),
                    name: name.to_string(),
                };
                if seen.insert(reference.qualified().to_lowercase()) {
                    found.push(reference);
                }
            }
        }
        found
    }

    /// Extract candidates, keep those the catalog confirms and return them as
    /// sorted `schema.table` strings.
    ///
    /// A candidate is dropped only when verification succeeds and reports the
    /// table missing; verification errors keep it.
    pub async fn resolve(
        &self,
        definition: &str,
        default_schema: &str,
        verifier: &dyn TableVerifier,
    ) -> Vec<String> {
        let candidates = self.extract_candidates(definition, default_schema);
        let mut verified = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match verifier.table_exists(&candidate.schema, &candidate.name).await {
                Ok(true) => verified.push(candidate.qualified()),
                Ok(false) => {
                    debug!(table = %candidate.qualified(), "Dropping unverified table reference");
                }
                Err(e) => {
                    warn!(
                        table = %candidate.qualified(),
                        error = %e,
                        "Table verification failed, keeping reference"
                    );
                    verified.push(candidate.qualified());
                }
            }
        }

        verified.sort();
        verified
    }
}

fn is_ignored(name: &str, schema: Option<&str>) -> bool {
    let upper = name.to_ascii_uppercase();
    if IGNORED_NAMES.contains(&upper.as_str()) {
        return true;
    }
    schema.is_some_and(|s| SYSTEM_SCHEMAS.contains(&s.to_ascii_uppercase().as_str()))
}
