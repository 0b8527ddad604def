//! Row filters and select queries.

use crate::error::StorageResult;
use crate::schema::TableSchema;
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    /// Equal. Comparing with `NULL` tests for `NULL`.
    #[default]
    #[serde(rename = "=")]
    Eq,
    /// Not equal. Comparing with `NULL` tests for non-`NULL`.
    #[serde(rename = "!=")]
    Ne,
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// SQL `LIKE` pattern match (`%` and `_`, ASCII case-insensitive).
    #[serde(rename = "LIKE", alias = "like")]
    Like,
}

/// One `column op value` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column to test.
    pub column: String,
    /// Operator, `=` when omitted.
    #[serde(default)]
    pub op: Operator,
    /// Operand.
    pub value: Value,
}

impl Condition {
    /// Creates a condition.
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Creates an equality condition.
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    /// Evaluates the condition against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get_or_null(&self.column);

        match (self.op, &self.value) {
            (Operator::Eq, Value::Null) => return actual.is_null(),
            (Operator::Ne, Value::Null) => return !actual.is_null(),
            _ => {}
        }
        if actual.is_null() || self.value.is_null() {
            return false;
        }

        if self.op == Operator::Like {
            return match (actual, &self.value) {
                (Value::Text(text), Value::Text(pattern)) => like(text, pattern),
                _ => false,
            };
        }

        let Some(ordering) = compare(actual, &self.value) else {
            return false;
        };
        match self.op {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Like => false,
        }
    }
}

/// Numeric values compare across integer and real; otherwise types must match.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        _ => match (a.as_real(), b.as_real()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    // Iterative wildcard match with single-point backtracking on `%`.
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

/// A conjunction of conditions. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub Vec<Condition>);

impl Filter {
    /// The filter matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder-style conjunction.
    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.0.push(condition);
        self
    }

    /// Returns true if every condition matches.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|c| c.matches(row))
    }

    /// Fails if a condition names a column the table does not have.
    pub fn check(&self, schema: &TableSchema) -> StorageResult<()> {
        for condition in &self.0 {
            if schema.column(&condition.column).is_none() {
                return Err(crate::StorageError::unknown_column(
                    &schema.name,
                    &condition.column,
                ));
            }
        }
        Ok(())
    }
}

/// A select query over one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Columns to return; empty means all.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Row filter.
    #[serde(default, rename = "where")]
    pub filter: Filter,
    /// Sort columns; rows come back in primary-key order when empty.
    #[serde(default)]
    pub order_by: Vec<String>,
    /// Reverse the sort.
    #[serde(default)]
    pub descending: bool,
    /// Drop duplicate result rows (after projection).
    #[serde(default)]
    pub distinct: bool,
    /// Maximum number of rows returned.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    /// A query returning every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the projected columns.
    #[must_use]
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the sort columns.
    #[must_use]
    pub fn order_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fails if the query names a column the table does not have.
    pub fn check(&self, schema: &TableSchema) -> StorageResult<()> {
        self.filter.check(schema)?;
        for column in self.columns.iter().chain(&self.order_by) {
            if schema.column(column).is_none() {
                return Err(crate::StorageError::unknown_column(&schema.name, column));
            }
        }
        Ok(())
    }

    /// Orders, projects, de-duplicates and limits rows that already passed
    /// the filter.
    #[must_use]
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| {
                self.order_by
                    .iter()
                    .map(|c| a.get_or_null(c).cmp(b.get_or_null(c)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        if self.descending {
            rows.reverse();
        }
        if !self.columns.is_empty() {
            rows = rows.iter().map(|r| r.project(&self.columns)).collect();
        }
        if self.distinct {
            let mut seen = HashSet::new();
            rows.retain(|r| seen.insert(r.clone()));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}
