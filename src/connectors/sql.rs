//! Small builder for catalog queries with optional filters.

use crate::models::QueryParam;

/// Placeholder syntax of the target driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?` (ODBC, MySQL)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

/// Appends `AND` clauses to a base query that already has a `WHERE`.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<QueryParam>,
    style: ParamStyle,
}

impl SqlBuilder {
    pub fn new(base: &str, style: ParamStyle) -> Self {
        Self {
            sql: base.trim_end().to_string(),
            params: Vec::new(),
            style,
        }
    }

    fn placeholder(&mut self, value: &str) -> String {
        self.params.push(QueryParam::from(value));
        match self.style {
            ParamStyle::Question => "?".to_string(),
            ParamStyle::Dollar => format!("${}", self.params.len()),
        }
    }

    /// `AND column = ?` when `value` is present.
    pub fn and_eq(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            let p = self.placeholder(value);
            self.sql.push_str(&format!(" AND {column} = {p}"));
        }
        self
    }

    /// `AND column IN (?, ...)` when `values` is present and non-empty.
    pub fn and_in(mut self, column: &str, values: Option<&[String]>) -> Self {
        let Some(values) = values.filter(|v| !v.is_empty()) else {
            return self;
        };
        let placeholders: Vec<String> = values.iter().map(|v| self.placeholder(v)).collect();
        self.sql
            .push_str(&format!(" AND {column} IN ({})", placeholders.join(", ")));
        self
    }

    pub fn order_by(mut self, columns: &str) -> Self {
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(columns);
        self
    }

    pub fn build(self) -> (String, Vec<QueryParam>) {
        (self.sql, self.params)
    }
}
