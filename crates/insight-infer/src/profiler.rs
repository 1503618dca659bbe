//! Column profiler.
//!
//! One linear pass per column collects null counts, exact distinct counts,
//! deterministic samples and type evidence. Type priority: declared type,
//! then boolean, datetime, numeric, categorical and finally text. Columns
//! that would be integer or text but look like keys (complete, unique,
//! whitespace-free) are reported as `identifier_like`.
//!
//! Profiling never fails: odd columns get an anomaly, not an error.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use insight_core::value::{parse_bool, parse_datetime, parse_number};
use insight_core::{AnomalyKind, ColumnProfile, ColumnType, ProfilingAnomaly, Table, Value};

use crate::config::ProfileConfig;

/// Profiles of every column of one table, in column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableProfile {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Running type evidence for one column.
struct TypeEvidence {
    all_bool: bool,
    all_datetime: bool,
    all_numeric: bool,
    all_integer: bool,
    whitespace_free: bool,
    /// Values that parse as a number or a datetime.
    typed_hits: usize,
    /// Values that parse as nothing but text.
    text_only: usize,
    /// Boolean tokens such as `yes` that are neither numbers nor datetimes.
    bool_only: usize,
}

impl TypeEvidence {
    fn new() -> Self {
        Self {
            all_bool: true,
            all_datetime: true,
            all_numeric: true,
            all_integer: true,
            whitespace_free: true,
            typed_hits: 0,
            text_only: 0,
            bool_only: 0,
        }
    }

    fn observe(&mut self, value: &Value, formats: &[String]) {
        let (is_bool, is_datetime, number) = match value {
            Value::Null => return,
            Value::Bool(_) => (true, false, None),
            Value::Int(i) => (*i == 0 || *i == 1, false, Some(value.clone())),
            Value::Float(_) => (false, false, Some(value.clone())),
            Value::DateTime(_) => (false, true, None),
            Value::Text(s) => {
                if s.chars().any(char::is_whitespace) {
                    self.whitespace_free = false;
                }
                (
                    parse_bool(s).is_some(),
                    parse_datetime(s, formats).is_some(),
                    parse_number(s),
                )
            }
        };

        self.all_bool &= is_bool;
        self.all_datetime &= is_datetime;
        self.all_numeric &= number.is_some();
        self.all_integer &= matches!(number, Some(Value::Int(_)));

        if number.is_some() || is_datetime {
            self.typed_hits += 1;
        } else if is_bool {
            self.bool_only += 1;
        } else {
            self.text_only += 1;
        }
    }

    /// Values that only read as text once the column is known not to be
    /// boolean.
    fn text_values(&self) -> usize {
        if self.all_bool {
            self.text_only
        } else {
            self.text_only + self.bool_only
        }
    }

    fn is_mixed(&self) -> bool {
        self.typed_hits > 0 && self.text_values() > 0
    }

    fn fits(&self, ty: ColumnType) -> bool {
        match ty {
            ColumnType::Boolean => self.all_bool,
            ColumnType::Datetime => self.all_datetime,
            ColumnType::Numeric => self.all_numeric,
            ColumnType::IdentifierLike => self.whitespace_free,
            ColumnType::Categorical | ColumnType::Text => true,
        }
    }
}

/// Computes [`ColumnProfile`]s from tabular rows.
#[derive(Debug, Clone, Default)]
pub struct ColumnProfiler {
    config: ProfileConfig,
}

impl ColumnProfiler {
    pub fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Profile every column of a table.
    pub fn profile_table(&self, table: &Table) -> TableProfile {
        let columns = table
            .columns
            .iter()
            .map(|column| self.profile_column(&table.name, column, table.column_values(column)))
            .collect();

        tracing::debug!(table = %table.name, rows = table.len(), "Profiled table");
        TableProfile {
            table: table.name.clone(),
            row_count: table.len(),
            columns,
        }
    }

    /// Profile one column given its values in row order.
    pub fn profile_column<'a, I>(&self, table: &str, column: &str, values: I) -> ColumnProfile
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut row_count = 0usize;
        let mut null_count = 0usize;
        let mut distinct = HashSet::new();
        let mut samples = Vec::new();
        let mut evidence = TypeEvidence::new();

        for value in values {
            row_count += 1;
            let Some(key) = value.key() else {
                null_count += 1;
                continue;
            };
            evidence.observe(value, &self.config.datetime_formats);
            if distinct.insert(key) && samples.len() < self.config.sample_size {
                samples.push(value.clone());
            }
        }

        let non_null_count = row_count - null_count;
        let distinct_count = distinct.len();
        let null_fraction = ratio(null_count, row_count);
        let distinct_ratio = ratio(distinct_count, non_null_count);

        let mut anomalies = Vec::new();
        let inferred_type = if non_null_count == 0 {
            anomalies.push(ProfilingAnomaly {
                kind: AnomalyKind::EmptyColumn,
                detail: "column has no non-null values".to_string(),
            });
            self.config
                .declared_type(table, column)
                .unwrap_or(ColumnType::Text)
        } else if let Some(declared) = self.config.declared_type(table, column) {
            if !evidence.fits(declared) {
                anomalies.push(ProfilingAnomaly {
                    kind: AnomalyKind::DeclaredTypeMismatch,
                    detail: format!("declared {declared} but values do not all fit"),
                });
            }
            declared
        } else if evidence.all_bool {
            ColumnType::Boolean
        } else if evidence.all_datetime {
            ColumnType::Datetime
        } else if evidence.is_mixed() {
            anomalies.push(ProfilingAnomaly {
                kind: AnomalyKind::MixedTypes,
                detail: format!(
                    "{} typed and {} text values",
                    evidence.typed_hits,
                    evidence.text_values()
                ),
            });
            ColumnType::Text
        } else {
            let key_like = null_count == 0
                && non_null_count >= 2
                && distinct_count == non_null_count
                && evidence.whitespace_free;
            if evidence.all_numeric {
                if key_like && evidence.all_integer {
                    ColumnType::IdentifierLike
                } else {
                    ColumnType::Numeric
                }
            } else if key_like {
                ColumnType::IdentifierLike
            } else if distinct_ratio < self.config.categorical_threshold {
                ColumnType::Categorical
            } else {
                ColumnType::Text
            }
        };

        for anomaly in &anomalies {
            tracing::warn!(
                table,
                column,
                kind = ?anomaly.kind,
                detail = %anomaly.detail,
                "Profiling anomaly"
            );
        }

        ColumnProfile {
            name: column.to_string(),
            inferred_type,
            null_fraction,
            distinct_ratio,
            sample_values: samples,
            row_count,
            non_null_count,
            distinct_count,
            anomalies,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(values: &[Value]) -> ColumnProfile {
        ColumnProfiler::default().profile_column("t", "c", values)
    }

    fn texts(raw: &[&str]) -> Vec<Value> {
        raw.iter().map(|s| Value::from_raw(s)).collect()
    }

    #[test]
    fn test_boolean_beats_numeric() {
        let p = profile(&texts(&["1", "0", "1", "0"]));
        assert_eq!(p.inferred_type, ColumnType::Boolean);

        let p = profile(&texts(&["Yes", "no", "YES"]));
        assert_eq!(p.inferred_type, ColumnType::Boolean);
    }

    #[test]
    fn test_datetime_column() {
        let p = profile(&texts(&["2024-01-01", "2024-01-01", "2024-02-03T10:00:00Z"]));
        assert_eq!(p.inferred_type, ColumnType::Datetime);
    }

    #[test]
    fn test_numeric_with_repeats_is_numeric() {
        let p = profile(&texts(&["10", "2.5", "10", "7"]));
        assert_eq!(p.inferred_type, ColumnType::Numeric);
        assert_eq!(p.distinct_count, 3);
        assert_eq!(p.distinct_ratio, 0.75);
    }

    #[test]
    fn test_unique_integers_are_identifier_like() {
        let p = profile(&texts(&["101", "102", "103"]));
        assert_eq!(p.inferred_type, ColumnType::IdentifierLike);
    }

    #[test]
    fn test_unique_codes_are_identifier_like_but_sentences_are_not() {
        let p = profile(&texts(&["C-001", "C-002", "C-003"]));
        assert_eq!(p.inferred_type, ColumnType::IdentifierLike);

        let p = profile(&texts(&["Ada Lovelace", "Grace Hopper", "Alan Turing"]));
        assert_eq!(p.inferred_type, ColumnType::Text);
    }

    #[test]
    fn test_identifier_like_requires_no_nulls() {
        let p = profile(&texts(&["a1", "", "a3"]));
        assert_eq!(p.inferred_type, ColumnType::Text);
        assert!((p.null_fraction - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(p.distinct_ratio, 1.0);
    }

    #[test]
    fn test_categorical_below_threshold() {
        let mut raw = vec!["north"; 50];
        raw.extend(vec!["south"; 50]);
        let p = profile(&texts(&raw));
        assert_eq!(p.inferred_type, ColumnType::Categorical);
        assert_eq!(p.distinct_ratio, 0.02);
    }

    #[test]
    fn test_all_null_column() {
        let p = profile(&texts(&["", " ", ""]));
        assert_eq!(p.inferred_type, ColumnType::Text);
        assert_eq!(p.distinct_ratio, 0.0);
        assert_eq!(p.null_fraction, 1.0);
        assert_eq!(p.anomalies[0].kind, AnomalyKind::EmptyColumn);
    }

    #[test]
    fn test_mixed_types_degrade_to_text() {
        let p = profile(&texts(&["12", "2024-01-01", "n/a", "15"]));
        assert_eq!(p.inferred_type, ColumnType::Text);
        assert_eq!(p.anomalies[0].kind, AnomalyKind::MixedTypes);
    }

    #[test]
    fn test_boolean_token_among_numbers_is_mixed() {
        let p = profile(&texts(&["1", "2", "yes"]));
        assert_eq!(p.inferred_type, ColumnType::Text);
        assert_eq!(p.anomalies.len(), 1);
        assert_eq!(p.anomalies[0].kind, AnomalyKind::MixedTypes);
        assert_eq!(p.anomalies[0].detail, "2 typed and 1 text values");
    }

    #[test]
    fn test_declared_type_wins_and_flags_mismatch() {
        let mut config = ProfileConfig::default();
        config
            .declared_types
            .insert("t.c".to_string(), ColumnType::Numeric);
        let profiler = ColumnProfiler::new(config);

        let p = profiler.profile_column("t", "c", &texts(&["1", "two"]));
        assert_eq!(p.inferred_type, ColumnType::Numeric);
        assert_eq!(p.anomalies[0].kind, AnomalyKind::DeclaredTypeMismatch);

        let p = profiler.profile_column("t", "c", &texts(&["1", "2"]));
        assert!(p.anomalies.is_empty());
    }

    #[test]
    fn test_samples_are_first_distinct_values() {
        let p = profile(&texts(&["b", "a", "b", "c", "d", "e", "f", "g"]));
        assert_eq!(p.sample_values, texts(&["b", "a", "c", "d", "e"]));
    }

    #[test]
    fn test_profile_table_keeps_column_order() {
        let table = Table::with_columns("customer", &["id", "name"])
            .row(vec![Value::from("1"), Value::from("Ada")])
            .row(vec![Value::from("2"), Value::from("Grace")]);
        let profile = ColumnProfiler::default().profile_table(&table);

        assert_eq!(profile.row_count, 2);
        let names: Vec<_> = profile.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(
            profile.column("id").unwrap().inferred_type,
            ColumnType::IdentifierLike
        );
    }
}
