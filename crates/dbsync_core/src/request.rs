//! Typed request payloads.
//!
//! Every operation takes one of these structs. They deserialize from the JSON
//! shapes agents exchange, and [`Request::from_json`] checks their shape once
//! so the engine can rely on it afterwards.

use crate::error::{SyncError, SyncResult};
use dbsync_storage::{Filter, Query, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Common behaviour of request payloads.
pub trait Request: DeserializeOwned {
    /// Checks the parts of the payload serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedPayload`] describing the first problem.
    fn validate(&self) -> SyncResult<()>;

    /// Parses and validates a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedPayload`] if the JSON does not have the
    /// expected shape.
    fn from_json(json: &str) -> SyncResult<Self> {
        let request: Self = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }
}

fn require_table(table: &str) -> SyncResult<()> {
    if table.is_empty() {
        return Err(SyncError::malformed("missing table name"));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Row),
    Many(Vec<Row>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Row>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(row) => vec![row],
        OneOrMany::Many(rows) => rows,
    })
}

/// Unconditional insert of a row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkInsertRequest {
    /// Target table.
    pub table: String,
    /// Rows to insert.
    pub data: Vec<Row>,
}

impl Request for BulkInsertRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

/// Row-level sync of one row or a list of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Target table.
    pub table: String,
    /// Rows to apply; a single JSON object is accepted too.
    #[serde(deserialize_with = "one_or_many")]
    pub data: Vec<Row>,
}

impl SyncRequest {
    /// Creates a request for a single row.
    pub fn single(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            data: vec![row],
        }
    }
}

impl Request for SyncRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

/// Which rows a delete removes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeleteQuery {
    /// Rows matched by primary key; non-key columns are ignored.
    Rows {
        /// Rows naming the keys to delete.
        data: Vec<Row>,
    },
    /// Rows matching every condition.
    Filter {
        /// The conditions.
        #[serde(rename = "where")]
        filter: Filter,
    },
}

/// Deletion by key or by filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Target table.
    pub table: String,
    /// Rows to remove.
    pub query: DeleteQuery,
}

impl Request for DeleteRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

/// A full snapshot of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// Target table.
    pub table: String,
    /// Every row the table should hold afterwards.
    pub data: Vec<Row>,
}

impl Request for SnapshotRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

/// A child table of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedTable {
    /// Child table.
    pub table: String,
    /// Parent column to child column.
    pub field_match: BTreeMap<String, String>,
}

/// Declares child tables whose rows follow their parent rows on deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRequest {
    /// Parent table.
    pub base_table: String,
    /// Child tables.
    pub relationed_tables: Vec<RelatedTable>,
}

impl Request for RelationshipRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.base_table)?;
        if self.relationed_tables.is_empty() {
            return Err(SyncError::malformed("relationship without related tables"));
        }
        for related in &self.relationed_tables {
            require_table(&related.table)?;
            if related.field_match.is_empty() {
                return Err(SyncError::malformed(format!(
                    "relationship {} -> {} has no field_match",
                    self.base_table, related.table
                )));
            }
        }
        Ok(())
    }
}

/// Tables covered by a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Table names.
    pub tables: Vec<String>,
}

impl TransactionRequest {
    /// Creates a request for the given tables.
    pub fn new<S: Into<String>>(tables: impl IntoIterator<Item = S>) -> Self {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }
}

impl Request for TransactionRequest {
    fn validate(&self) -> SyncResult<()> {
        if self.tables.is_empty() {
            return Err(SyncError::malformed("transaction without tables"));
        }
        self.tables.iter().try_for_each(|t| require_table(t))
    }
}

/// A select over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectRequest {
    /// Target table.
    pub table: String,
    /// The query; selects every row when omitted.
    #[serde(default)]
    pub query: Query,
}

impl Request for SelectRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

/// Row cap for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxRowsRequest {
    /// Target table.
    pub table: String,
    /// Cap; `0` removes it.
    pub max_rows: usize,
}

impl Request for MaxRowsRequest {
    fn validate(&self) -> SyncResult<()> {
        require_table(&self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbsync_storage::{Operator, Value};

    #[test]
    fn sync_request_accepts_single_row() {
        let request =
            SyncRequest::from_json(r#"{"table": "os", "data": {"name": "linux"}}"#).unwrap();
        assert_eq!(request.data.len(), 1);

        let request = SyncRequest::from_json(
            r#"{"table": "os", "data": [{"name": "linux"}, {"name": "bsd"}]}"#,
        )
        .unwrap();
        assert_eq!(request.data.len(), 2);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = SyncRequest::from_json(r#"{"table": "os"}"#).unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { .. }));

        let err = BulkInsertRequest::from_json(r#"{"table": "", "data": []}"#).unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { .. }));
    }

    #[test]
    fn delete_query_variants() {
        let request = DeleteRequest::from_json(
            r#"{"table": "ports", "query": {"data": [{"port": 22}]}}"#,
        )
        .unwrap();
        assert!(matches!(request.query, DeleteQuery::Rows { ref data } if data.len() == 1));

        let request = DeleteRequest::from_json(
            r#"{"table": "ports", "query": {"where": [{"column": "port", "op": ">", "value": 1024}]}}"#,
        )
        .unwrap();
        match request.query {
            DeleteQuery::Filter { filter } => {
                assert_eq!(filter.0[0].op, Operator::Gt);
                assert_eq!(filter.0[0].value, Value::Integer(1024));
            }
            DeleteQuery::Rows { .. } => panic!("expected filter"),
        }
    }

    #[test]
    fn relationship_requires_field_match() {
        let json = r#"{"base_table": "processes",
                       "relationed_tables": [{"table": "ports", "field_match": {}}]}"#;
        assert!(RelationshipRequest::from_json(json).is_err());

        let json = r#"{"base_table": "processes",
                       "relationed_tables": [{"table": "ports", "field_match": {"pid": "pid"}}]}"#;
        let request = RelationshipRequest::from_json(json).unwrap();
        assert_eq!(request.relationed_tables[0].field_match["pid"], "pid");
    }

    #[test]
    fn select_query_defaults_to_all_rows() {
        let request = SelectRequest::from_json(r#"{"table": "os"}"#).unwrap();
        assert_eq!(request.query, Query::all());
    }

    #[test]
    fn transaction_requires_tables() {
        assert!(TransactionRequest::from_json(r#"{"tables": []}"#).is_err());
        let request = TransactionRequest::from_json(r#"{"tables": ["a", "b"]}"#).unwrap();
        assert_eq!(request, TransactionRequest::new(["a", "b"]));
    }
}
