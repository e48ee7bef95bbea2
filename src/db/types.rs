//! Decoding of sqlx catalog rows into JSON rows.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the reported column type into a logical category
//! 2. A decoder extracts the value for that category. Decimals, booleans,
//!    floats, binary and JSON decode the same way on every sqlx engine;
//!    integers, timestamps and text have engine-specific fallbacks.
//!
//! Catalog queries mostly return identifiers, counts, flags and timestamps, so
//! the decoders favour lossless text over precise numeric typing.

use crate::models::Row as JsonRow;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for catalog column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Binary,
    Json,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower.starts_with("timestamp")
        || lower.starts_with("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // varchar, text, name, char, enum and everything else
    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Decode binary data to JSON value.
///
/// If `decode_binary` is true, attempts to decode as UTF-8 text first.
/// Falls back to base64 encoding if not valid UTF-8 or if `decode_binary` is false.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    if decode_binary {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return JsonValue::String(s.to_string());
        }
    }
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of a driver row into a [`JsonRow`].
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow {
        self.to_json_map_with_options(false)
    }

    fn to_json_map_with_options(&self, decode_binary: bool) -> JsonRow;
}

impl RowToJson for MySqlRow {
    fn to_json_map_with_options(&self, decode_binary: bool) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = match categorize_type(type_name) {
                    TypeCategory::Integer => mysql::decode_integer(self, idx),
                    TypeCategory::Temporal => mysql::decode_temporal(self, idx),
                    TypeCategory::Unknown => {
                        mysql::decode_text(self, idx, type_name, decode_binary)
                    }
                    category => decode_common(self, idx, category, decode_binary),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map_with_options(&self, decode_binary: bool) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let value = match categorize_type(col.type_info().name()) {
                    TypeCategory::Integer => postgres::decode_integer(self, idx),
                    TypeCategory::Temporal => postgres::decode_temporal(self, idx),
                    TypeCategory::Unknown => postgres::decode_text(self, idx),
                    category => decode_common(self, idx, category, decode_binary),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Non-null value of column `idx` as `T`, or `None` for NULL and type
/// mismatches.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

/// Categories whose decoding does not depend on the engine.
fn decode_common<'r, R>(
    row: &'r R,
    idx: usize,
    category: TypeCategory,
    decode_binary: bool,
) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    RawDecimal: Decode<'r, R::Database> + Type<R::Database>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    JsonValue: Decode<'r, R::Database> + Type<R::Database>,
{
    let value = match category {
        TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => v.map(|d| JsonValue::String(d.0)),
            Err(e) => {
                tracing::error!(column = idx, error = ?e, "Failed to decode DECIMAL");
                None
            }
        },
        TypeCategory::Boolean => get::<R, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float => get::<R, f64>(row, idx)
            .or_else(|| get::<R, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => {
            get::<R, Vec<u8>>(row, idx).map(|v| decode_binary_value(&v, decode_binary))
        }
        TypeCategory::Json => get::<R, JsonValue>(row, idx),
        TypeCategory::Integer | TypeCategory::Temporal | TypeCategory::Unknown => None,
    };
    value.unwrap_or(JsonValue::Null)
}

mod mysql {
    use super::*;

    pub fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        let signed = get::<_, i64>(row, idx).map(JsonValue::from);
        // information_schema reports lengths and positions as BIGINT UNSIGNED
        signed
            .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i8>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u8>(row, idx).map(JsonValue::from))
            .unwrap_or(JsonValue::Null)
    }

    pub fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
        get::<_, chrono::NaiveDateTime>(row, idx)
            .map(|v| v.to_string())
            .or_else(|| get::<_, chrono::DateTime<chrono::Utc>>(row, idx).map(|v| v.to_rfc3339()))
            .or_else(|| get::<_, chrono::NaiveDate>(row, idx).map(|v| v.to_string()))
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }

    pub fn decode_text(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        decode_binary: bool,
    ) -> JsonValue {
        if let Some(v) = get::<_, String>(row, idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        // Catalog columns with a binary collation come back as VARBINARY-like
        // types even though the content is text.
        get::<_, Vec<u8>>(row, idx)
            .map(|v| decode_binary_value(&v, decode_binary))
            .unwrap_or(JsonValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from))
            .unwrap_or(JsonValue::Null)
    }

    pub fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        get::<_, chrono::DateTime<chrono::Utc>>(row, idx)
            .map(|v| v.to_rfc3339())
            .or_else(|| get::<_, chrono::NaiveDateTime>(row, idx).map(|v| v.to_string()))
            .or_else(|| get::<_, chrono::NaiveDate>(row, idx).map(|v| v.to_string()))
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }

    pub fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<_, String>(row, idx) {
            return JsonValue::String(v);
        }
        // pg_catalog's single-byte "char" (relkind, prokind, contype)
        get::<_, i8>(row, idx)
            .map(|c| JsonValue::String(char::from(c as u8).to_string()))
            .unwrap_or(JsonValue::Null)
    }
}
