//! Weighted fuzzy matching of catalog objects.
//!
//! Scores are on a 0-100 scale internally and reported as 0-1 in
//! [`MetadataSuggestion`].

use crate::config::FuzzyConfig;
use crate::models::{
    MetadataSuggestion, ObjectKind, ObjectSummary, StoredProcedureMetadata, TableMetadata,
};
use std::collections::HashMap;

const PREFIXES: &[&str] = &["sp_", "fn_", "vw_", "tbl_", "usp_", "ufn_"];
const SUFFIXES: &[&str] = &["_sp", "_fn", "_vw", "_tbl", "_proc", "_func"];

pub const DEFAULT_THRESHOLD: f64 = 60.0;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 10;
pub const DEFAULT_PREFERRED_SCHEMA: &str = "dbo";

const EXACT_SCORE: f64 = 100.0;
const PREFIX_BONUS: f64 = 20.0;
const SUBSTRING_BONUS: f64 = 10.0;
const TOKEN_BONUS: f64 = 15.0;
const SCHEMA_BONUS: f64 = 5.0;

/// Anything the matcher can score.
pub trait Searchable {
    fn search_name(&self) -> &str;
    fn search_schema(&self) -> &str;
    fn search_kind(&self) -> ObjectKind;

    /// Build the suggestion reported for this object. `score` is 0-1.
    fn to_suggestion(&self, score: f64) -> MetadataSuggestion {
        MetadataSuggestion {
            kind: self.search_kind(),
            name: self.search_name().to_string(),
            schema_name: self.search_schema().to_string(),
            score,
            params: Vec::new(),
            returns: Vec::new(),
            related_tables: Vec::new(),
            description: None,
        }
    }
}

impl Searchable for ObjectSummary {
    fn search_name(&self) -> &str {
        &self.name
    }

    fn search_schema(&self) -> &str {
        &self.schema
    }

    fn search_kind(&self) -> ObjectKind {
        self.kind
    }
}

impl Searchable for TableMetadata {
    fn search_name(&self) -> &str {
        &self.name
    }

    fn search_schema(&self) -> &str {
        &self.schema_name
    }

    fn search_kind(&self) -> ObjectKind {
        self.kind
    }

    fn to_suggestion(&self, score: f64) -> MetadataSuggestion {
        MetadataSuggestion {
            kind: self.kind,
            name: self.name.clone(),
            schema_name: self.schema_name.clone(),
            score,
            params: Vec::new(),
            returns: self.columns.clone(),
            related_tables: Vec::new(),
            description: None,
        }
    }
}

impl Searchable for StoredProcedureMetadata {
    fn search_name(&self) -> &str {
        &self.name
    }

    fn search_schema(&self) -> &str {
        &self.schema_name
    }

    fn search_kind(&self) -> ObjectKind {
        self.kind
    }

    fn to_suggestion(&self, score: f64) -> MetadataSuggestion {
        MetadataSuggestion {
            kind: self.kind,
            name: self.name.clone(),
            schema_name: self.schema_name.clone(),
            score,
            params: self.parameters.clone(),
            returns: self.returns.clone(),
            related_tables: self.related_tables.clone(),
            description: None,
        }
    }
}

/// An item paired with its 0-100 score.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    threshold: f64,
    max_suggestions: usize,
    aliases: HashMap<String, String>,
    preferred_schema: String,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            aliases: HashMap::new(),
            preferred_schema: DEFAULT_PREFERRED_SCHEMA.to_string(),
        }
    }

    pub fn from_config(config: &FuzzyConfig) -> Self {
        let mut matcher = Self::new()
            .with_threshold(config.threshold)
            .with_max_suggestions(config.max_suggestions);
        for (alias, name) in &config.aliases {
            matcher.add_alias(alias, name);
        }
        matcher
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 100.0);
        self
    }

    pub fn with_max_suggestions(mut self, max_suggestions: usize) -> Self {
        self.max_suggestions = max_suggestions;
        self
    }

    /// Schema whose objects get the small preference bonus.
    pub fn with_preferred_schema(mut self, schema: impl Into<String>) -> Self {
        self.preferred_schema = schema.into();
        self
    }

    pub fn add_alias(&mut self, alias: &str, name: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), name.to_string());
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_suggestions(&self) -> usize {
        self.max_suggestions
    }

    /// Lowercase and trim; resolve an alias, or else strip one known prefix
    /// and one known suffix.
    pub fn normalize(&self, query: &str) -> String {
        let query = query.trim().to_lowercase();
        if let Some(name) = self.aliases.get(&query) {
            return name.clone();
        }

        let mut normalized = query.as_str();
        if let Some(rest) = PREFIXES.iter().find_map(|p| normalized.strip_prefix(p)) {
            normalized = rest;
        }
        if let Some(rest) = SUFFIXES.iter().find_map(|s| normalized.strip_suffix(s)) {
            normalized = rest;
        }
        normalized.to_string()
    }

    /// Weighted score of `candidate` against an already normalized query.
    pub fn score<T: Searchable + ?Sized>(&self, query: &str, candidate: &T) -> f64 {
        let query = query.to_lowercase();
        let name = candidate.search_name().to_lowercase();

        let mut base = ratio(&query, &name);
        if name == query {
            base = EXACT_SCORE;
        } else if name.starts_with(&query) {
            base += PREFIX_BONUS;
        } else if name.contains(&query) {
            base += SUBSTRING_BONUS;
        }

        base += token_overlap(&query, &name) * TOKEN_BONUS;

        let mut weighted = base * candidate.search_kind().search_weight();
        if candidate
            .search_schema()
            .eq_ignore_ascii_case(&self.preferred_schema)
        {
            weighted += SCHEMA_BONUS;
        }
        weighted.clamp(0.0, 100.0)
    }

    /// Score every candidate, drop those under the threshold and return the
    /// best `max_suggestions`, highest first. Equal scores keep input order.
    pub fn find_best_matches<T: Searchable>(
        &self,
        query: &str,
        candidates: &[T],
    ) -> Vec<MetadataSuggestion> {
        if query.trim().is_empty() || candidates.is_empty() {
            return Vec::new();
        }
        let normalized = self.normalize(query);

        let mut scored: Vec<(f64, &T)> = candidates
            .iter()
            .map(|c| (self.score(&normalized, c), c))
            .filter(|(score, _)| *score >= self.threshold)
            .collect();
        sort_descending(&mut scored, |(score, _)| *score);
        scored.truncate(self.max_suggestions);

        scored
            .into_iter()
            .map(|(score, c)| c.to_suggestion(score / 100.0))
            .collect()
    }

    /// Re-rank already fetched results without filtering. The query is used as
    /// given, not normalized.
    pub fn rank_existing<T: Searchable>(&self, query: &str, results: Vec<T>) -> Vec<Ranked<T>> {
        let mut ranked: Vec<Ranked<T>> = results
            .into_iter()
            .map(|item| Ranked {
                score: self.score(query, &item),
                item,
            })
            .collect();
        if !query.trim().is_empty() {
            sort_descending(&mut ranked, |r| r.score);
        }
        ranked
    }

    /// Plain similarity search over names, returning `(name, score 0-1)`.
    pub fn simple_search<S: AsRef<str>>(&self, query: &str, names: &[S]) -> Vec<(String, f64)> {
        if query.trim().is_empty() || names.is_empty() {
            return Vec::new();
        }
        let normalized = self.normalize(query);

        let mut scored: Vec<(f64, &str)> = names
            .iter()
            .map(|n| (ratio(&normalized, &n.as_ref().to_lowercase()), n.as_ref()))
            .filter(|(score, _)| *score >= self.threshold)
            .collect();
        sort_descending(&mut scored, |(score, _)| *score);
        scored.truncate(self.max_suggestions);

        scored
            .into_iter()
            .map(|(score, name)| (name.to_string(), score / 100.0))
            .collect()
    }
}

/// Stable descending sort on an f64 key.
fn sort_descending<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

/// Character similarity in 0-100: `200 * lcs / (len_a + len_b)`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * longest_common_subsequence(&a, &b) as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Fraction (0-1) of `_`-separated query tokens found inside some name token.
fn token_overlap(query: &str, name: &str) -> f64 {
    let query_tokens: Vec<&str> = query.split('_').filter(|t| !t.is_empty()).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let name_tokens: Vec<&str> = name.split('_').collect();
    let matched = query_tokens
        .iter()
        .filter(|qt| name_tokens.iter().any(|nt| nt.contains(*qt)))
        .count();
    matched as f64 / query_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(schema: &str, name: &str, kind: ObjectKind) -> ObjectSummary {
        ObjectSummary::new(schema, name, kind)
    }

    #[test]
    fn test_normalize_strips_one_prefix_and_suffix() {
        let m = FuzzyMatcher::new();
        assert_eq!(m.normalize("  SP_GetUser "), "getuser");
        assert_eq!(m.normalize("usp_orders_proc"), "orders");
        assert_eq!(m.normalize("sp_fn_x"), "fn_x");
        assert_eq!(m.normalize("customers"), "customers");
    }

    #[test]
    fn test_normalize_alias_wins() {
        let mut m = FuzzyMatcher::new();
        m.add_alias("Cust", "Customers");
        assert_eq!(m.normalize("cust"), "Customers");
        assert_eq!(m.normalize("CUST "), "Customers");
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", "abc"), 100.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
        assert!((ratio("orders", "order") - 200.0 * 5.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_caps_at_100() {
        let m = FuzzyMatcher::new();
        let proc_ = obj("sales", "GetUser", ObjectKind::StoredProcedure);
        // 100 + 15 token bonus, times 1.2
        assert_eq!(m.score("getuser", &proc_), 100.0);
    }

    #[test]
    fn test_sp_prefix_query_finds_procedure() {
        let m = FuzzyMatcher::new().with_threshold(80.0);
        let candidates = vec![obj("", "GetUser", ObjectKind::StoredProcedure)];
        let hits = m.find_best_matches("sp_getuser", &candidates);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.8);
        assert_eq!(hits[0].kind, ObjectKind::StoredProcedure);
    }

    #[test]
    fn test_kind_weight_and_schema_bonus() {
        let m = FuzzyMatcher::new().with_threshold(0.0);
        let view = obj("other", "order_summary", ObjectKind::View);
        let table = obj("other", "order_summary", ObjectKind::Table);
        let dbo_table = obj("dbo", "order_summary", ObjectKind::Table);
        let v = m.score("order", &view);
        let t = m.score("order", &table);
        let d = m.score("order", &dbo_table);
        assert!(t > v);
        assert!((d - t - 5.0).abs() < 1e-9 || d == 100.0);
    }

    #[test]
    fn test_preferred_schema_is_configurable() {
        let m = FuzzyMatcher::new().with_preferred_schema("public");
        let public = obj("public", "invoices", ObjectKind::Table);
        let dbo = obj("dbo", "invoices", ObjectKind::Table);
        assert!(m.score("inv", &public) > m.score("inv", &dbo));
    }

    #[test]
    fn test_results_sorted_and_truncated() {
        let m = FuzzyMatcher::new().with_threshold(10.0).with_max_suggestions(2);
        let candidates = vec![
            obj("x", "customer_notes", ObjectKind::Table),
            obj("x", "customers", ObjectKind::Table),
            obj("x", "cust", ObjectKind::Table),
        ];
        let hits = m.find_best_matches("cust", &candidates);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "cust");
        assert_eq!(hits[1].name, "customers");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let m = FuzzyMatcher::new().with_threshold(0.0);
        let candidates = vec![
            obj("a", "alpha", ObjectKind::Table),
            obj("b", "alpha", ObjectKind::Table),
        ];
        let hits = m.find_best_matches("alpha", &candidates);
        assert_eq!(hits[0].schema_name, "a");
        assert_eq!(hits[1].schema_name, "b");
    }

    #[test]
    fn test_empty_query_or_candidates() {
        let m = FuzzyMatcher::new();
        let none: Vec<ObjectSummary> = Vec::new();
        assert!(m.find_best_matches("x", &none).is_empty());
        assert!(m
            .find_best_matches("  ", &[obj("a", "b", ObjectKind::Table)])
            .is_empty());
    }

    #[test]
    fn test_rank_existing_keeps_everything() {
        let m = FuzzyMatcher::new();
        let ranked = m.rank_existing(
            "orders",
            vec![
                obj("s", "zzz", ObjectKind::Table),
                obj("s", "orders", ObjectKind::Table),
            ],
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item.name, "orders");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_simple_search() {
        let m = FuzzyMatcher::new();
        let hits = m.simple_search("tbl_Orders", &["orders", "order_items", "users"]);
        assert_eq!(hits.first().map(|h| h.0.as_str()), Some("orders"));
        assert!(hits.iter().all(|(_, s)| *s >= 0.6));
    }

    #[test]
    fn test_procedure_suggestion_carries_details() {
        let m = FuzzyMatcher::new();
        let proc_ = StoredProcedureMetadata {
            name: "usp_GetOrders".into(),
            schema_name: "dbo".into(),
            kind: ObjectKind::StoredProcedure,
            parameters: vec![crate::models::ParameterInfo::new(
                Some("@id"),
                1,
                "int",
                crate::models::ParameterDirection::In,
            )],
            returns: Vec::new(),
            related_tables: vec!["dbo.Orders".into()],
            definition: None,
        };
        let hits = m.find_best_matches("getorders", std::slice::from_ref(&proc_));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].params.len(), 1);
        assert_eq!(hits[0].related_tables, vec!["dbo.Orders".to_string()]);
    }
}
