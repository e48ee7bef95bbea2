//! Query parameter and result-row types shared by every engine session.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row: column name to JSON value, in select-list order.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Textual form used by drivers that bind every parameter as text (ODBC).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(if *v { "1".to_string() } else { "0".to_string() }),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Typed accessors over a [`Row`].
///
/// Column lookups are case-insensitive: catalog views disagree on whether
/// aliases come back upper-cased (DB2, Oracle) or as written.
pub trait RowExt {
    fn value(&self, column: &str) -> Option<&JsonValue>;

    /// String value; numbers and booleans are rendered, NULL is `None`.
    fn get_str(&self, column: &str) -> Option<String> {
        match self.value(column)? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Trimmed, non-empty string value.
    fn get_trimmed(&self, column: &str) -> Option<String> {
        self.get_str(column)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Integer value; numeric strings (ODBC text binding, DECIMAL) are parsed.
    fn get_i64(&self, column: &str) -> Option<i64> {
        match self.value(column)? {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
                .or_else(|| n.as_f64().map(|f| f as i64)),
            JsonValue::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            JsonValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Boolean value. Accepts booleans, non-zero numbers and the usual
    /// catalog spellings (`1`, `true`, `YES`, `Y`).
    fn get_bool(&self, column: &str) -> bool {
        match self.value(column) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(JsonValue::String(s)) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "1" | "TRUE" | "YES" | "Y" | "T"
            ),
            _ => false,
        }
    }
}

impl RowExt for Row {
    fn value(&self, column: &str) -> Option<&JsonValue> {
        self.get(column).or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
    }

    #[test]
    fn test_query_param_untagged_json() {
        let params: Vec<QueryParam> = serde_json::from_str(r#"[null, true, 7, 1.5, "dbo"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(7),
                QueryParam::Float(1.5),
                QueryParam::String("dbo".into()),
            ]
        );
    }

    #[test]
    fn test_query_param_as_text() {
        assert_eq!(QueryParam::Null.as_text(), None);
        assert_eq!(QueryParam::Bool(true).as_text().as_deref(), Some("1"));
        assert_eq!(QueryParam::Int(-3).as_text().as_deref(), Some("-3"));
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let r = row(json!({"SCHEMA_NAME": "dbo", "count": 3}));
        assert_eq!(r.get_str("schema_name").as_deref(), Some("dbo"));
        assert_eq!(r.get_i64("COUNT"), Some(3));
        assert_eq!(r.get_str("missing"), None);
    }

    #[test]
    fn test_row_numeric_strings() {
        let r = row(json!({"len": "50", "prec": "10.0", "none": null}));
        assert_eq!(r.get_i64("len"), Some(50));
        assert_eq!(r.get_i64("prec"), Some(10));
        assert_eq!(r.get_i64("none"), None);
        assert_eq!(r.get_str("none"), None);
    }

    #[test]
    fn test_row_bool_spellings() {
        let r = row(json!({
            "a": true, "b": 1, "c": "YES", "d": "Y", "e": "0", "f": "NO", "g": null, "h": 0
        }));
        assert!(r.get_bool("a"));
        assert!(r.get_bool("b"));
        assert!(r.get_bool("c"));
        assert!(r.get_bool("d"));
        assert!(!r.get_bool("e"));
        assert!(!r.get_bool("f"));
        assert!(!r.get_bool("g"));
        assert!(!r.get_bool("h"));
        assert!(!r.get_bool("missing"));
    }

    #[test]
    fn test_get_trimmed_drops_blank() {
        let r = row(json!({"name": "  Orders  ", "blank": "   "}));
        assert_eq!(r.get_trimmed("name").as_deref(), Some("Orders"));
        assert_eq!(r.get_trimmed("blank"), None);
    }
}
