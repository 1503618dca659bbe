//! Core domain types shared by the profiler, classifier, inference engine and
//! graph construction executor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Value, DEFAULT_DATETIME_FORMATS};

// ── Column Profiling ──────────────────────────────────────────────

/// Inferred data type of a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Categorical,
    Numeric,
    Datetime,
    Text,
    Boolean,
    IdentifierLike,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Categorical => "categorical",
            Self::Numeric => "numeric",
            Self::Datetime => "datetime",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::IdentifierLike => "identifier_like",
        };
        f.write_str(s)
    }
}

/// Why a column's profile is less trustworthy than its type suggests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Every value is null; the column was classified as text.
    EmptyColumn,
    /// Values parse as several incompatible types; degraded to text.
    MixedTypes,
    /// A declared type does not fit the observed values.
    DeclaredTypeMismatch,
}

/// A non-fatal profiling finding, kept on the profile for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfilingAnomaly {
    pub kind: AnomalyKind,
    pub detail: String,
}

/// Statistical shape of one column of one table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: ColumnType,
    /// Nulls over all rows.
    pub null_fraction: f64,
    /// Distinct non-null values over non-null values.
    pub distinct_ratio: f64,
    pub sample_values: Vec<Value>,
    pub row_count: usize,
    pub non_null_count: usize,
    pub distinct_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<ProfilingAnomaly>,
}

impl ColumnProfile {
    /// True when every row has a value and every value is distinct.
    pub fn is_unique_and_complete(&self, tolerance: f64) -> bool {
        self.non_null_count > 0 && self.null_fraction == 0.0 && self.distinct_ratio >= tolerance
    }

    pub fn is_empty(&self) -> bool {
        self.non_null_count == 0
    }
}

// ── Column Roles ──────────────────────────────────────────────────

/// Semantic function of a column in the graph mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    EntityIdentifier,
    EntityAttribute,
    RelationshipKey,
    Ignored,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EntityIdentifier => "entity_identifier",
            Self::EntityAttribute => "entity_attribute",
            Self::RelationshipKey => "relationship_key",
            Self::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

// ── Mapping Types ─────────────────────────────────────────────────

/// A class of entity, materialized as one node label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityType {
    /// Node label.
    pub name: String,
    pub identifier_column: String,
    /// Ordered, duplicate-free.
    pub attribute_columns: Vec<String>,
    pub source_table: String,
    /// Profiled type of the identifier and attribute columns. Columns absent
    /// here are written as they appear in the source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_types: BTreeMap<String, ColumnType>,
    /// Formats for parsing `datetime` columns. Empty means
    /// [`DEFAULT_DATETIME_FORMATS`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datetime_formats: Vec<String>,
}

impl EntityType {
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        identifier_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier_column: identifier_column.into(),
            attribute_columns: Vec::new(),
            source_table: source_table.into(),
            column_types: BTreeMap::new(),
            datetime_formats: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.attribute_columns.contains(&column) {
                self.attribute_columns.push(column);
            }
        }
        self
    }

    pub fn with_column_type(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        self.column_types.insert(column.into(), ty);
        self
    }

    pub fn with_datetime_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datetime_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Type used to coerce values of `column`, if known.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types.get(column).copied()
    }

    /// Convert a cell of `column` to its profiled type. Untyped columns are
    /// written as they appear in the source.
    pub fn coerce(&self, column: &str, value: &Value) -> Value {
        match self.column_type(column) {
            Some(ty) if self.datetime_formats.is_empty() => {
                value.coerce_with(ty, DEFAULT_DATETIME_FORMATS)
            }
            Some(ty) => value.coerce_with(ty, self.datetime_formats.as_slice()),
            None => value.clone(),
        }
    }
}

/// A directed connection between two entity types, derived from a
/// foreign-key-like column of the source entity's table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipType {
    /// Relationship type name in the graph.
    pub name: String,
    pub source_entity: String,
    pub target_entity: String,
    /// Referencing column in the source entity's table.
    pub source_key_column: String,
    /// Identifier column of the target entity.
    pub target_key_column: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_columns: Vec<String>,
}

impl RelationshipType {
    pub fn new(
        name: impl Into<String>,
        source_entity: impl Into<String>,
        target_entity: impl Into<String>,
        source_key_column: impl Into<String>,
        target_key_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_entity: source_entity.into(),
            target_entity: target_entity.into(),
            source_key_column: source_key_column.into(),
            target_key_column: target_key_column.into(),
            attribute_columns: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_self_relationship(&self) -> bool {
        self.source_entity == self.target_entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_serializes_snake_case() {
        let json = serde_json::to_string(&ColumnType::IdentifierLike).unwrap();
        assert_eq!(json, "\"identifier_like\"");
        assert_eq!(ColumnType::IdentifierLike.to_string(), "identifier_like");
    }

    #[test]
    fn entity_attributes_stay_duplicate_free() {
        let entity = EntityType::new("Customer", "customer", "id")
            .with_attributes(["name", "city", "name"]);
        assert_eq!(entity.attribute_columns, vec!["name", "city"]);
    }

    #[test]
    fn entity_without_column_types_omits_field() {
        let entity = EntityType::new("Customer", "customer", "id");
        let json = serde_json::to_string(&entity).unwrap();
        assert!(!json.contains("column_types"));

        let back: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn datetime_columns_coerce_with_entity_formats() {
        let entity = EntityType::new("Visit", "visits", "id")
            .with_attributes(["day"])
            .with_column_type("day", ColumnType::Datetime);
        let raw = Value::from("03.02.2024");
        assert_eq!(entity.coerce("day", &raw), raw);

        let entity = entity.with_datetime_formats(["%d.%m.%Y"]);
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 2, 3)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(entity.coerce("day", &raw), Value::DateTime(expected));
        assert_eq!(entity.coerce("note", &raw), raw);
    }

    #[test]
    fn unique_and_complete_requires_values() {
        let profile = ColumnProfile {
            name: "id".to_string(),
            inferred_type: ColumnType::Text,
            null_fraction: 0.0,
            distinct_ratio: 0.0,
            sample_values: vec![],
            row_count: 0,
            non_null_count: 0,
            distinct_count: 0,
            anomalies: vec![],
        };
        assert!(!profile.is_unique_and_complete(0.98));
        assert!(profile.is_empty());
    }
}
