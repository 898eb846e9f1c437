//! Query-related data models.
//!
//! `QuerySpec` is produced only by the query validator and is the only input
//! the executor accepts. `RowSet` is the agent-facing result shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Statement classes admitted by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
}

/// A validated, bounded query ready for execution.
///
/// Only the query validator can build one; outside the crate it is read-only.
///
/// ```compile_fail
/// use sql_check_mcp::models::QuerySpec;
///
/// let spec = QuerySpec::new("DELETE FROM EMP", "DELETE FROM EMP", 10, false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    original: String,
    text: String,
    kind: StatementKind,
    limit: u32,
    limit_imposed: bool,
}

impl QuerySpec {
    pub(crate) fn new(
        original: impl Into<String>,
        text: impl Into<String>,
        limit: u32,
        limit_imposed: bool,
    ) -> Self {
        Self {
            original: original.into(),
            text: text.into(),
            kind: StatementKind::Select,
            limit,
            limit_imposed,
        }
    }

    /// Unvalidated spec for executor tests.
    #[cfg(test)]
    pub(crate) fn unchecked(text: &str, limit: u32) -> Self {
        Self::new(text, text, limit, false)
    }

    /// Text as submitted by the agent.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Text sent to the database (limit clause possibly rewritten).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Maximum rows returned to the caller.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// True when the limit came from policy rather than the query itself.
    pub fn limit_imposed(&self) -> bool {
        self.limit_imposed
    }

    /// Rows fetched from the database: the limit plus one truncation probe.
    pub fn fetch_limit(&self) -> usize {
        self.limit as usize + 1
    }
}

/// A single result cell.
///
/// Dates and times arrive as ISO-8601 `Text`; decimals, UUIDs, JSON documents
/// and unsigned integers beyond `i64` also render as `Text`, binary as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Float that degrades to text when not representable in JSON.
    pub fn float(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Text(value.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Bounded result of `execute_select_query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RowSet {
    /// Column names in select-list order.
    pub columns: Vec<String>,
    /// Row values, positionally aligned with `columns`.
    pub rows: Vec<Vec<ScalarValue>>,
    /// True when more rows existed than were returned.
    pub truncated: bool,
}

impl RowSet {
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            truncated: false,
        }
    }

    /// Trim `rows` to `limit`, flagging truncation when the probe row was present.
    pub fn bounded(columns: Vec<String>, mut rows: Vec<Vec<ScalarValue>>, limit: u32) -> Self {
        let truncated = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Self {
            columns,
            rows,
            truncated,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_serialization() {
        let row = vec![
            ScalarValue::Null,
            ScalarValue::Bool(true),
            ScalarValue::Integer(7),
            ScalarValue::Float(1.5),
            ScalarValue::Text("2024-01-31T10:00:00".into()),
        ];
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!([null, true, 7, 1.5, "2024-01-31T10:00:00"])
        );
    }

    #[test]
    fn test_non_finite_float_becomes_text() {
        assert_eq!(ScalarValue::float(f64::NAN).as_str(), Some("NaN"));
        assert_eq!(ScalarValue::float(2.0), ScalarValue::Float(2.0));
    }

    #[test]
    fn test_bounded_sets_truncated_from_probe_row() {
        let rows: Vec<Vec<ScalarValue>> =
            (0..6).map(|i| vec![ScalarValue::Integer(i)]).collect();
        let set = RowSet::bounded(vec!["ID".into()], rows, 5);
        assert_eq!(set.row_count(), 5);
        assert!(set.truncated);
    }

    #[test]
    fn test_bounded_exact_fit_is_not_truncated() {
        let rows: Vec<Vec<ScalarValue>> =
            (0..5).map(|i| vec![ScalarValue::Integer(i)]).collect();
        let set = RowSet::bounded(vec!["ID".into()], rows, 5);
        assert_eq!(set.row_count(), 5);
        assert!(!set.truncated);
    }

    #[test]
    fn test_fetch_limit_includes_probe() {
        let spec = QuerySpec::new("SELECT 1", "SELECT 1 LIMIT 11", 10, true);
        assert_eq!(spec.fetch_limit(), 11);
        assert_eq!(spec.kind(), StatementKind::Select);
        assert_eq!(spec.original(), "SELECT 1");
    }
}
