//! Schema allow-list and object deny-list evaluation.
//!
//! Patterns are glob-like: a trailing `*` matches by prefix, a leading `*` by
//! suffix, and anything else must match exactly. Matching is case-sensitive,
//! like the catalogs themselves.

/// True if `name` matches a single exclude pattern.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        pattern == name
    }
}

/// True if `name` matches any of `patterns`.
pub fn is_excluded(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, name))
}

/// True if `schema` passes the optional allow-list.
pub fn schema_allowed(include: Option<&[String]>, schema: &str) -> bool {
    include.is_none_or(|schemas| schemas.iter().any(|s| s == schema))
}
