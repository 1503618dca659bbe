//! Inference settings: the `[profile]` and `[roles]` config sections.
//!
//! Column-scoped settings are keyed either by `table.column` or by a bare
//! `column` that applies to every table; the qualified key wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use insight_core::value::DEFAULT_DATETIME_FORMATS;
use insight_core::{ColumnRole, ColumnType};

/// Column profiler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    /// Distinct ratio below which a column is categorical.
    pub categorical_threshold: f64,
    /// Number of distinct sample values kept per column.
    pub sample_size: usize,
    /// `chrono` formats accepted for datetime detection. RFC 3339 is always
    /// accepted.
    pub datetime_formats: Vec<String>,
    /// Types that override inference.
    pub declared_types: BTreeMap<String, ColumnType>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            categorical_threshold: 0.05,
            sample_size: 5,
            datetime_formats: DEFAULT_DATETIME_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            declared_types: BTreeMap::new(),
        }
    }
}

impl ProfileConfig {
    pub fn declared_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        scoped(&self.declared_types, table, column).copied()
    }
}

/// Role classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoleConfig {
    /// Minimum distinct ratio for an identifier candidate.
    pub identifier_tolerance: f64,
    /// Columns that are always `ignored`.
    pub ignored_columns: Vec<String>,
    /// Roles that override classification.
    pub declared_roles: BTreeMap<String, ColumnRole>,
    /// Also match identifier-named columns to other tables by shared values.
    pub value_overlap: bool,
    /// Share of a column's distinct values that must appear among another
    /// table's identifier values for a value-overlap reference.
    pub min_value_overlap: f64,
    pub naming: NamingPolicy,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            identifier_tolerance: 0.98,
            ignored_columns: Vec::new(),
            declared_roles: BTreeMap::new(),
            value_overlap: false,
            min_value_overlap: 0.5,
            naming: NamingPolicy::default(),
        }
    }
}

impl RoleConfig {
    pub fn is_ignored(&self, table: &str, column: &str) -> bool {
        let qualified = format!("{table}.{column}");
        self.ignored_columns
            .iter()
            .any(|c| *c == qualified || c == column)
    }

    pub fn declared_role(&self, table: &str, column: &str) -> Option<ColumnRole> {
        scoped(&self.declared_roles, table, column).copied()
    }
}

/// How column and table names are matched against each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NamingPolicy {
    pub case_sensitive: bool,
    /// Characters that split a name into tokens.
    pub separators: String,
    /// Tokens marking an identifier when they start or end a column name.
    pub identifier_tokens: Vec<String>,
    /// Treat `customers` and `customer` as the same name.
    pub singularize: bool,
    /// Accept qualified references such as `billing_customer_id`.
    pub qualified_prefixes: bool,
    /// Name relationships after keywords in the key column, using
    /// `relationship_verbs`, instead of always `<Source>_TO_<Target>`.
    pub semantic_relationships: bool,
    /// Column name token to relationship verb.
    pub relationship_verbs: BTreeMap<String, String>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            separators: "_- .".to_string(),
            identifier_tokens: vec!["id".to_string(), "key".to_string(), "code".to_string()],
            singularize: true,
            qualified_prefixes: true,
            semantic_relationships: false,
            relationship_verbs: [
                ("creator", "CREATED"),
                ("employee", "WORKS_FOR"),
                ("location", "LOCATED_IN"),
                ("owner", "BELONGS_TO"),
                ("part", "PART_OF"),
            ]
            .into_iter()
            .map(|(token, verb)| (token.to_string(), verb.to_string()))
            .collect(),
        }
    }
}

fn scoped<'a, T>(map: &'a BTreeMap<String, T>, table: &str, column: &str) -> Option<&'a T> {
    map.get(&format!("{table}.{column}"))
        .or_else(|| map.get(column))
}
