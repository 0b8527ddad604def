//! End-to-end behaviour of the synchronization engine.

use dbsync_core::{
    BulkInsertRequest, DbManagement, DbSync, DeleteRequest, EngineConfig, EngineType, Handle,
    MaxRowsPolicy, Operation, Query, RelatedTable, RelationshipRequest, Request, Row, RowKey,
    RowStatus, SelectRequest, SnapshotRequest, SyncError, SyncEvent, SyncRequest,
    TransactionRequest, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const SCHEMA: &str = "
    CREATE TABLE processes (
        pid INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        cpu REAL DEFAULT 0
    );
    CREATE TABLE ports (
        port INTEGER,
        protocol TEXT,
        pid INTEGER,
        state TEXT,
        PRIMARY KEY (port, protocol)
    ) WITHOUT ROWID;
";

fn open(dbsync: &DbSync) -> Handle {
    dbsync
        .open(&EngineConfig::new().creation_statement(SCHEMA))
        .unwrap()
}

fn process(pid: i64, name: &str) -> Row {
    Row::new().with("pid", pid).with("name", name).with("cpu", 0.0)
}

fn port(port: i64, pid: i64) -> Row {
    Row::new()
        .with("port", port)
        .with("protocol", "tcp")
        .with("pid", pid)
        .with("state", "listen")
}

fn snapshot(table: &str, data: Vec<Row>) -> SnapshotRequest {
    SnapshotRequest {
        table: table.to_string(),
        data,
    }
}

fn rows(table: &str, data: Vec<Row>) -> SyncRequest {
    SyncRequest {
        table: table.to_string(),
        data,
    }
}

fn refresh(dbsync: &DbSync, handle: Handle, request: &SnapshotRequest) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    dbsync
        .refresh_snapshot(handle, request, |e| events.push(e))
        .unwrap();
    events
}

fn select_all(dbsync: &DbSync, handle: Handle, table: &str) -> Vec<Row> {
    let mut out = Vec::new();
    let request = SelectRequest {
        table: table.to_string(),
        query: Query::all(),
    };
    dbsync
        .select_rows(handle, &request, |e| out.push(e.data))
        .unwrap();
    out
}

fn pid_key(pid: i64) -> RowKey {
    RowKey(vec![Value::Integer(pid)])
}

#[test]
fn refresh_is_idempotent() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let request = snapshot("processes", vec![process(1, "init"), process(2, "sshd")]);

    assert_eq!(refresh(&dbsync, handle, &request).len(), 2);
    assert!(refresh(&dbsync, handle, &request).is_empty());
}

#[test]
fn refresh_reports_changes_in_order() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    refresh(
        &dbsync,
        handle,
        &snapshot(
            "processes",
            vec![process(1, "init"), process(2, "sshd"), process(3, "cron")],
        ),
    );

    let events = refresh(
        &dbsync,
        handle,
        &snapshot("processes", vec![process(9, "bash"), process(2, "sshd-2")]),
    );
    let summary: Vec<(Operation, Option<&Value>)> = events
        .iter()
        .map(|e| (e.operation, e.data.get("pid")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Operation::Inserted, Some(&Value::Integer(9))),
            (Operation::Modified, Some(&Value::Integer(2))),
            (Operation::Deleted, Some(&Value::Integer(1))),
            (Operation::Deleted, Some(&Value::Integer(3))),
        ]
    );
    assert_eq!(events[1].old.as_ref().unwrap().get("name"), Some(&Value::from("sshd")));
}

#[test]
fn diff_classification() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let base = Row::new().with("pid", 7).with("name", "a").with("cpu", 1.0);
    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", base.clone()), |_| {})
        .unwrap();

    let mut events = Vec::new();
    let changed = Row::new().with("pid", 7).with("name", "a").with("cpu", 3.0);
    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", changed.clone()), |e| {
            events.push(e)
        })
        .unwrap();
    assert_eq!(events, vec![SyncEvent::modified("processes", changed.clone(), base)]);

    events.clear();
    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", changed), |e| events.push(e))
        .unwrap();
    assert!(events.is_empty());

    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", process(8, "b")), |e| {
            events.push(e)
        })
        .unwrap();
    assert_eq!(events, vec![SyncEvent::inserted("processes", process(8, "b"))]);
}

#[test]
fn partial_row_replaces_whole_row() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let full = Row::new().with("pid", 1).with("name", "init").with("cpu", 5.0);
    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", full), |_| {})
        .unwrap();

    let partial = Row::new().with("pid", 1).with("name", "init");
    dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", partial), |_| {})
        .unwrap();

    let stored = select_all(&dbsync, handle, "processes");
    assert_eq!(stored[0].get("cpu"), Some(&Value::Real(0.0)));
}

#[test]
fn deletion_detection() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync
        .insert_bulk_data(
            handle,
            &BulkInsertRequest {
                table: "processes".into(),
                data: vec![process(1, "k1"), process(2, "k2"), process(3, "k3")],
            },
        )
        .unwrap();

    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["processes"]))
        .unwrap();
    dbsync
        .sync_txn_row_data(
            handle,
            txn,
            &rows("processes", vec![process(1, "k1"), process(3, "k3")]),
            |_| {},
        )
        .unwrap();

    let mut deleted = Vec::new();
    dbsync
        .get_deleted(handle, txn, |e| deleted.push(e))
        .unwrap();
    assert_eq!(deleted, vec![SyncEvent::deleted("processes", process(2, "k2"))]);
    assert_eq!(select_all(&dbsync, handle, "processes").len(), 3);
    assert_eq!(
        dbsync.row_status(handle, "processes", &pid_key(2)).unwrap(),
        RowStatus::Stale
    );

    dbsync.close_transaction(handle, txn).unwrap();
    let remaining: Vec<_> = select_all(&dbsync, handle, "processes")
        .into_iter()
        .map(|r| r.get("pid").cloned())
        .collect();
    assert_eq!(remaining, vec![Some(Value::Integer(1)), Some(Value::Integer(3))]);
    assert_eq!(
        dbsync.row_status(handle, "processes", &pid_key(1)).unwrap(),
        RowStatus::Untouched
    );
}

#[test]
fn transaction_table_mismatch() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["ports"]))
        .unwrap();

    let err = dbsync
        .sync_txn_row_data(
            handle,
            txn,
            &SyncRequest::single("processes", process(1, "init")),
            |_| {},
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidTable { .. }));
    assert!(select_all(&dbsync, handle, "processes").is_empty());
}

#[test]
fn closed_transaction_is_invalid() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["ports"]))
        .unwrap();
    dbsync.close_transaction(handle, txn).unwrap();

    let err = dbsync.get_deleted(handle, txn, |_| {}).unwrap_err();
    assert!(matches!(err, SyncError::InvalidTransaction));
    let err = dbsync
        .sync_txn_row_data(handle, txn, &SyncRequest::single("ports", port(22, 1)), |_| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidTransaction));
}

#[test]
fn invalid_handle_rejected_everywhere() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["ports"]))
        .unwrap();
    dbsync.release_context(handle);

    let invalid = |r: Result<(), SyncError>| matches!(r, Err(SyncError::InvalidHandle));
    assert!(invalid(
        dbsync
            .sync_row_data(handle, &SyncRequest::single("ports", port(22, 1)), |_| {})
    ));
    assert!(invalid(
        dbsync.refresh_snapshot(handle, &snapshot("ports", vec![]), |_| {})
    ));
    assert!(invalid(dbsync.insert_bulk_data(handle, &BulkInsertRequest {
        table: "ports".into(),
        data: vec![],
    })
    .map(|_| ())));
    assert!(invalid(dbsync.set_max_rows(handle, "ports", 5)));
    assert!(invalid(dbsync.close_transaction(handle, txn).map(|_| ())));
    assert!(invalid(dbsync.get_deleted(handle, txn, |_| {}).map(|_| ())));
    assert!(invalid(
        dbsync
            .create_transaction(handle, &TransactionRequest::new(["ports"]))
            .map(|_| ())
    ));

    // A new session reusing the slot is not reachable through the old handle.
    let fresh = open(&dbsync);
    assert_ne!(fresh, handle);
    assert!(invalid(dbsync.session_info(handle).map(|_| ())));
}

#[test]
fn handles_are_isolated() {
    let dbsync = Arc::new(DbSync::new());
    let a = open(&dbsync);
    let b = open(&dbsync);

    refresh(&dbsync, a, &snapshot("processes", vec![process(1, "a")]));

    // While A holds its shared lock inside the callback, exclusive work on B
    // completes and B's data stays separate.
    let mut inner_done = false;
    dbsync
        .refresh_snapshot(a, &snapshot("processes", vec![process(2, "a2")]), |_| {
            if !inner_done {
                dbsync
                    .insert_bulk_data(
                        b,
                        &BulkInsertRequest {
                            table: "processes".into(),
                            data: vec![process(100, "b")],
                        },
                    )
                    .unwrap();
                inner_done = true;
            }
        })
        .unwrap();
    assert!(inner_done);

    let a_rows = select_all(&dbsync, a, "processes");
    let b_rows = select_all(&dbsync, b, "processes");
    assert_eq!(a_rows, vec![process(2, "a2")]);
    assert_eq!(b_rows, vec![process(100, "b")]);
}

#[test]
fn concurrent_syncs_on_one_handle() {
    let dbsync = Arc::new(DbSync::new());
    let handle = open(&dbsync);

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let dbsync = Arc::clone(&dbsync);
            thread::spawn(move || {
                for i in 0..50 {
                    let pid = w * 1000 + i;
                    dbsync
                        .sync_row_data(
                            handle,
                            &SyncRequest::single("processes", process(pid, "worker")),
                            |_| {},
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(select_all(&dbsync, handle, "processes").len(), 200);
}

#[test]
fn relationships_cascade_on_sweep() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let relationship = RelationshipRequest::from_json(
        r#"{"base_table": "processes",
            "relationed_tables": [{"table": "ports", "field_match": {"pid": "pid"}}]}"#,
    )
    .unwrap();
    dbsync.add_table_relationship(handle, &relationship).unwrap();

    refresh(
        &dbsync,
        handle,
        &snapshot("processes", vec![process(1, "sshd"), process(2, "nginx")]),
    );
    refresh(
        &dbsync,
        handle,
        &snapshot("ports", vec![port(22, 1), port(80, 2), port(443, 2)]),
    );

    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["processes"]))
        .unwrap();
    dbsync
        .sync_txn_row_data(handle, txn, &SyncRequest::single("processes", process(1, "sshd")), |_| {})
        .unwrap();

    let mut reported = Vec::new();
    let count = dbsync
        .get_deleted(handle, txn, |e| reported.push((e.table, e.operation)))
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        reported,
        vec![
            ("processes".to_string(), Operation::Deleted),
            ("ports".to_string(), Operation::Deleted),
            ("ports".to_string(), Operation::Deleted),
        ]
    );

    assert_eq!(dbsync.close_transaction(handle, txn).unwrap(), 3);
    assert_eq!(select_all(&dbsync, handle, "ports"), vec![port(22, 1)]);
}

#[test]
fn cascade_into_covered_child_reports_each_row_once() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync
        .add_table_relationship(
            handle,
            &RelationshipRequest::from_json(
                r#"{"base_table": "processes",
                    "relationed_tables": [{"table": "ports", "field_match": {"pid": "pid"}}]}"#,
            )
            .unwrap(),
        )
        .unwrap();
    refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "sshd")]));
    refresh(&dbsync, handle, &snapshot("ports", vec![port(22, 1)]));

    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["processes", "ports"]))
        .unwrap();

    let mut reported = Vec::new();
    let count = dbsync
        .get_deleted(handle, txn, |e| reported.push(e))
        .unwrap();
    assert_eq!(
        reported,
        vec![
            SyncEvent::deleted("processes", process(1, "sshd")),
            SyncEvent::deleted("ports", port(22, 1)),
        ]
    );
    assert_eq!(count, 2);
    assert_eq!(dbsync.close_transaction(handle, txn).unwrap(), count);
    assert!(select_all(&dbsync, handle, "ports").is_empty());
}

#[test]
fn covered_child_listed_first_reports_each_row_once() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync
        .add_table_relationship(
            handle,
            &RelationshipRequest::from_json(
                r#"{"base_table": "processes",
                    "relationed_tables": [{"table": "ports", "field_match": {"pid": "pid"}}]}"#,
            )
            .unwrap(),
        )
        .unwrap();
    refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "sshd")]));
    refresh(&dbsync, handle, &snapshot("ports", vec![port(22, 1), port(23, 1)]));

    let txn = dbsync
        .create_transaction(handle, &TransactionRequest::new(["ports", "processes"]))
        .unwrap();
    dbsync
        .sync_txn_row_data(handle, txn, &SyncRequest::single("ports", port(23, 1)), |_| {})
        .unwrap();

    // Port 22 is stale; port 23 was seen but still goes with its process.
    let count = dbsync.get_deleted(handle, txn, |_| {}).unwrap();
    assert_eq!(count, 3);
    assert_eq!(dbsync.close_transaction(handle, txn).unwrap(), count);
}

#[test]
fn relationship_without_field_match_is_rejected() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    let request = RelationshipRequest {
        base_table: "processes".into(),
        relationed_tables: vec![RelatedTable {
            table: "ports".into(),
            field_match: BTreeMap::new(),
        }],
    };
    let err = dbsync.add_table_relationship(handle, &request).unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));

    refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "a"), process(2, "b")]));
    refresh(&dbsync, handle, &snapshot("ports", vec![port(22, 1), port(80, 7)]));
    let removed = dbsync
        .delete_rows_data(
            handle,
            &DeleteRequest::from_json(r#"{"table": "processes", "query": {"data": [{"pid": 2}]}}"#)
                .unwrap(),
        )
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(select_all(&dbsync, handle, "ports").len(), 2);
}

#[test]
fn typed_requests_are_validated() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);

    let err = dbsync
        .create_transaction(handle, &TransactionRequest { tables: Vec::new() })
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));
    assert_eq!(dbsync.session_info(handle).unwrap().open_transactions, 0);

    let err = dbsync
        .sync_row_data(handle, &SyncRequest::single("", process(1, "a")), |_| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));
}

#[test]
fn delete_by_filter_cascades() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync
        .add_table_relationship(
            handle,
            &RelationshipRequest::from_json(
                r#"{"base_table": "processes",
                    "relationed_tables": [{"table": "ports", "field_match": {"pid": "pid"}}]}"#,
            )
            .unwrap(),
        )
        .unwrap();
    refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "a"), process(2, "b")]));
    refresh(&dbsync, handle, &snapshot("ports", vec![port(22, 1), port(80, 2)]));

    let request = DeleteRequest::from_json(
        r#"{"table": "processes", "query": {"where": [{"column": "name", "value": "b"}]}}"#,
    )
    .unwrap();
    assert_eq!(dbsync.delete_rows_data(handle, &request).unwrap(), 2);
    assert_eq!(select_all(&dbsync, handle, "ports"), vec![port(22, 1)]);
}

#[test]
fn max_rows_reported_and_lifted() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync.set_max_rows(handle, "ports", 2).unwrap();

    let mut ops = Vec::new();
    dbsync
        .sync_row_data(
            handle,
            &rows("ports", vec![port(1, 1), port(2, 1), port(3, 1)]),
            |e| ops.push(e.operation),
        )
        .unwrap();
    assert_eq!(
        ops,
        vec![Operation::Inserted, Operation::Inserted, Operation::MaxRows]
    );

    dbsync.set_max_rows(handle, "ports", 0).unwrap();
    dbsync
        .sync_row_data(handle, &SyncRequest::single("ports", port(3, 1)), |_| {})
        .unwrap();
    assert_eq!(select_all(&dbsync, handle, "ports").len(), 3);
}

#[test]
fn capped_refresh_applies_before_sweeping() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    dbsync.set_max_rows(handle, "ports", 2).unwrap();
    refresh(&dbsync, handle, &snapshot("ports", vec![port(1, 1), port(2, 1)]));

    let events = refresh(&dbsync, handle, &snapshot("ports", vec![port(3, 1), port(4, 1)]));
    let ops: Vec<_> = events.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            Operation::MaxRows,
            Operation::MaxRows,
            Operation::Deleted,
            Operation::Deleted
        ]
    );
    assert!(select_all(&dbsync, handle, "ports").is_empty());
}

#[test]
fn evict_policy_reports_deletions() {
    let dbsync = DbSync::new();
    let handle = dbsync
        .open(
            &EngineConfig::new()
                .creation_statement(SCHEMA)
                .max_rows_policy(MaxRowsPolicy::EvictOldest),
        )
        .unwrap();
    dbsync.set_max_rows(handle, "ports", 1).unwrap();

    let mut events = Vec::new();
    dbsync
        .sync_row_data(handle, &rows("ports", vec![port(1, 1), port(2, 1)]), |e| {
            events.push(e)
        })
        .unwrap();
    let ops: Vec<_> = events.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![Operation::Inserted, Operation::Deleted, Operation::Inserted]
    );
    assert_eq!(select_all(&dbsync, handle, "ports"), vec![port(2, 1)]);
}

#[test]
fn malformed_payloads() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);

    let unknown_column = Row::new().with("pid", 1).with("name", "x").with("uid", 0);
    let err = dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", unknown_column), |_| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));

    let missing_not_null = Row::new().with("pid", 1);
    let err = dbsync
        .sync_row_data(handle, &SyncRequest::single("processes", missing_not_null), |_| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));

    let err = SnapshotRequest::from_json(r#"{"data": []}"#).unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));

    let err = dbsync
        .refresh_snapshot(handle, &snapshot("users", vec![]), |_| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidTable { .. }));
}

#[test]
fn select_with_query() {
    let dbsync = DbSync::new();
    let handle = open(&dbsync);
    refresh(
        &dbsync,
        handle,
        &snapshot(
            "processes",
            vec![process(1, "init"), process(2, "sshd"), process(3, "sshd")],
        ),
    );

    let request = SelectRequest::from_json(
        r#"{"table": "processes",
            "query": {"columns": ["name"], "where": [{"column": "pid", "op": ">", "value": 1}],
                      "distinct": true}}"#,
    )
    .unwrap();
    let mut events = Vec::new();
    let count = dbsync
        .select_rows(handle, &request, |e| events.push(e))
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(events[0].operation, Operation::Selected);
    assert_eq!(events[0].data, Row::new().with("name", "sshd"));
}

#[test]
fn persistent_file_session_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::new()
        .engine_type(EngineType::File)
        .path(dir.path().join("agent.db"))
        .management(DbManagement::Persistent)
        .creation_statement(SCHEMA);

    let dbsync = DbSync::new();
    let handle = dbsync.open(&config).unwrap();
    refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "init")]));
    dbsync.release_context(handle);

    let handle = dbsync.open(&config).unwrap();
    let events = refresh(&dbsync, handle, &snapshot("processes", vec![process(1, "init")]));
    assert!(events.is_empty());
    dbsync.release_all();
}

#[test]
fn second_open_of_locked_file_fails() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::new()
        .engine_type(EngineType::File)
        .path(dir.path().join("agent.db"))
        .creation_statement(SCHEMA);

    let dbsync = DbSync::new();
    let _handle = dbsync.open(&config).unwrap();
    let err = dbsync.open(&config).unwrap_err();
    assert!(matches!(err, SyncError::EngineCreation { .. }));
}
