//! Tagged scalar values and the tabular row source.
//!
//! Every input format (CSV file, in-memory table, query result) is reduced to
//! rows of [`Value`]s so the profiler never depends on where data came from.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::ColumnType;

/// Datetime formats tried when no explicit list is configured.
pub const DEFAULT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
];

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

/// Hashable identity of a non-null value, used for distinct counting and
/// merge-key deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    DateTime(NaiveDateTime),
    Text(String),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    /// Wrap a raw text cell. Blank cells become `Null`.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Null
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// Turn raw text into the most specific scalar it represents.
    ///
    /// Only literal `true`/`false` become booleans here; `0`/`1` stay numbers
    /// until a profile says the column is boolean.
    pub fn parse_loose(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        if let Some(number) = parse_number(trimmed) {
            return number;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        match parse_datetime(trimmed, DEFAULT_DATETIME_FORMATS) {
            Some(dt) => Self::DateTime(dt),
            None => Self::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form of the value; `None` for null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Identity key for distinct counting; `None` for null.
    pub fn key(&self) -> Option<ValueKey> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(ValueKey::Bool(*b)),
            Self::Int(i) => Some(ValueKey::Int(*i)),
            Self::Float(f) => Some(ValueKey::Float(f.to_bits())),
            Self::DateTime(dt) => Some(ValueKey::DateTime(*dt)),
            Self::Text(s) => Some(ValueKey::Text(s.clone())),
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::DateTime(_) => "datetime",
            Self::Text(_) => "text",
        }
    }

    /// Convert the value to the representation implied by a profiled type.
    ///
    /// Conversion is lossless or not attempted: a value that does not fit the
    /// target type is returned unchanged.
    pub fn coerce(&self, ty: ColumnType) -> Value {
        self.coerce_with(ty, DEFAULT_DATETIME_FORMATS)
    }

    /// [`Value::coerce`] with an explicit datetime format list.
    pub fn coerce_with<S: AsRef<str>>(&self, ty: ColumnType, datetime_formats: &[S]) -> Value {
        let Some(text) = self.as_text() else {
            return Self::Null;
        };
        let trimmed = text.trim();

        match ty {
            ColumnType::Boolean => match self {
                Self::Bool(_) => self.clone(),
                _ => parse_bool(trimmed).map(Self::Bool).unwrap_or_else(|| self.clone()),
            },
            ColumnType::Numeric => match self {
                Self::Int(_) | Self::Float(_) => self.clone(),
                _ => parse_number(trimmed).unwrap_or_else(|| self.clone()),
            },
            ColumnType::Datetime => match self {
                Self::DateTime(_) => self.clone(),
                _ => parse_datetime(trimmed, datetime_formats)
                    .map(Self::DateTime)
                    .unwrap_or_else(|| self.clone()),
            },
            ColumnType::IdentifierLike => match self {
                Self::Text(_) => match trimmed.parse::<i64>() {
                    // Only canonical integers: "007" keeps its leading zeros.
                    Ok(i) if i.to_string() == trimmed => Self::Int(i),
                    _ => self.clone(),
                },
                _ => self.clone(),
            },
            ColumnType::Categorical | ColumnType::Text => self.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Self::Null)
    }
}

// ── Scalar parsing ───────────────────────────────────────────────

/// Parse a boolean token: true/false, yes/no, 1/0 (case-insensitive).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a real number, preferring an integer representation.
pub fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Int(i));
    }
    match raw.parse::<f64>() {
        Ok(x) if x.is_finite() => Some(Value::Float(x)),
        _ => None,
    }
}

/// Parse a datetime under RFC 3339 or any of the given `chrono` formats.
///
/// Date-only formats resolve to midnight.
pub fn parse_datetime<S: AsRef<str>>(raw: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in formats {
        let fmt = fmt.as_ref();
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

// ── Tabular source ───────────────────────────────────────────────

/// One row: column name to value. Absent columns read as null.
pub type Row = HashMap<String, Value>;

/// A named table with an ordered column list.
///
/// This is the single row-source abstraction the engine consumes; CSV files,
/// query results and test fixtures are all loaded into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names given as string slices.
    pub fn with_columns(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::new(name, columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Append a row given positionally in column order.
    pub fn push_values<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let row = self
            .columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(Into::into))
            .collect();
        self.rows.push(row);
    }

    /// Builder form of [`Table::push_values`].
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_values(values);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Value of `column` in `row`, null when absent.
    pub fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
        row.get(column).unwrap_or(&NULL_VALUE)
    }

    /// All values of one column, in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().map(move |row| Self::cell(row, column))
    }
}
