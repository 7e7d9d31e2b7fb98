// crates/sqlite-worker/tests/worker_lifecycle.rs
// ============================================================================
// Module: Worker Lifecycle Tests
// Description: Open, execute, share, close, and drain behavior of handles.
// Purpose: Validate error isolation, owner sharing, and shutdown draining.
// ============================================================================

//! ## Overview
//! Handle-level tests against real `SQLite` files:
//! - Engine errors reach the submitter and leave the owner running
//! - Closed handles fail fast; double close is rejected
//! - Differently spelled paths share one owner; `:memory:` never does
//! - Queue bounds surface as queue-full errors
//! - Closing the last handle drains requests that were already queued
//! - Implicit transactions, scripts, factories, and configuration

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use rusqlite::Connection;
use sqlite_worker::ConfigError;
use sqlite_worker::PathCase;
use sqlite_worker::Registry;
use sqlite_worker::RowFactory;
use sqlite_worker::TextFactory;
use sqlite_worker::Value;
use sqlite_worker::WorkerConfig;
use sqlite_worker::WorkerError;
use sqlite_worker::WorkerHandle;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn count_rows(path: &Path, table: &str) -> i64 {
    let connection = Connection::open(path).unwrap();
    connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)).unwrap()
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn stalled_config() -> WorkerConfig {
    WorkerConfig {
        busy_timeout_ms: 30_000,
        ..WorkerConfig::default()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// SECTION: Error Isolation
// ============================================================================

#[test]
fn bad_sql_returns_engine_error_and_owner_keeps_serving() {
    let temp = TempDir::new().unwrap();
    let worker = WorkerHandle::open(temp.path().join("bad.db")).unwrap();

    let err = worker.execute("SELEC 1", Vec::new()).unwrap_err();
    assert!(matches!(err, WorkerError::Engine(_)));

    let rows = worker.execute("SELECT 1", Vec::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::Integer(1)));
    worker.close().unwrap();
}

#[test]
fn failed_insert_does_not_disturb_later_reads() {
    let temp = TempDir::new().unwrap();
    let worker = WorkerHandle::open(temp.path().join("constraint.db")).unwrap();
    worker.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES (?, ?)", vec![Value::Integer(1), text("a")]).unwrap();

    let err = worker
        .execute("INSERT INTO t VALUES (?, ?)", vec![Value::Integer(1), text("b")])
        .unwrap_err();
    assert!(matches!(err, WorkerError::Engine(_)));
    let err = worker.execute("INSERT INTO t VALUES (?)", vec![Value::Integer(2)]).unwrap_err();
    assert!(matches!(err, WorkerError::Engine(_)));

    let rows = worker.execute("SELECT name FROM t", Vec::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&text("a")));
    worker.close().unwrap();
}

#[test]
fn comment_only_query_returns_no_rows() {
    let temp = TempDir::new().unwrap();
    let worker = WorkerHandle::open(temp.path().join("blank.db")).unwrap();
    assert!(worker.execute("", Vec::new()).unwrap().is_empty());
    let output = worker.execute_full("-- c", Vec::new()).unwrap();
    assert!(output.rows.is_empty());
    assert!(output.columns.is_empty());

    let rows = worker.execute("SELECT 1", Vec::new()).unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Integer(1)));
    worker.close().unwrap();
}

// ============================================================================
// SECTION: Close Semantics
// ============================================================================

#[test]
fn closed_handle_rejects_every_operation() {
    let temp = TempDir::new().unwrap();
    let worker = WorkerHandle::open(temp.path().join("closed.db")).unwrap();
    worker.close().unwrap();
    assert!(worker.is_closed());

    assert_eq!(worker.close().unwrap_err(), WorkerError::AlreadyClosed);
    assert_eq!(worker.execute("SELECT 1", Vec::new()).unwrap_err(), WorkerError::AlreadyClosed);
    assert_eq!(worker.execute_script("SELECT 1;").unwrap_err(), WorkerError::AlreadyClosed);
    assert_eq!(worker.total_changes().unwrap_err(), WorkerError::AlreadyClosed);
    assert_eq!(worker.commit().unwrap_err(), WorkerError::AlreadyClosed);
    assert_eq!(
        worker.set_row_factory(RowFactory::Named).unwrap_err(),
        WorkerError::AlreadyClosed
    );
}

#[test]
fn close_drains_requests_queued_before_it() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("drain.db");
    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

    let worker = Arc::new(WorkerHandle::open_with_config(&path, &stalled_config()).unwrap());
    blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let submitters = 5;
    let spawn_insert = |i: i64| {
        let worker = Arc::clone(&worker);
        thread::spawn(move || {
            worker.execute("INSERT INTO t VALUES (?)", vec![Value::Integer(i)]).unwrap();
        })
    };
    // The first insert stalls inside the owner; the rest wait in the queue.
    let mut handles = vec![spawn_insert(0)];
    thread::sleep(Duration::from_millis(100));
    for i in 1 .. submitters {
        handles.push(spawn_insert(i));
    }
    wait_until(|| worker.queue_depth() == 4);

    let closer = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.close())
    };
    thread::sleep(Duration::from_millis(50));
    blocker.execute_batch("COMMIT").unwrap();

    closer.join().unwrap().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(count_rows(&path, "t"), submitters);
}

// ============================================================================
// SECTION: Owner Sharing
// ============================================================================

#[test]
fn key_value_round_trip_shares_owner_across_handles() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kv.db");
    let first = WorkerHandle::open(&path).unwrap();
    first.execute("CREATE TABLE kv (k TEXT, v INTEGER)", Vec::new()).unwrap();
    for i in 0 .. 10 {
        let values = vec![text(&format!("key-{i}")), Value::Integer(i)];
        first.execute("INSERT INTO kv VALUES (?, ?)", values).unwrap();
    }

    let second = WorkerHandle::open(&path).unwrap();
    assert_eq!(first.owner_id(), second.owner_id());
    first.close().unwrap();

    let rows = second.execute("SELECT k, v FROM kv ORDER BY rowid", Vec::new()).unwrap();
    assert_eq!(rows.len(), 10);
    for (i, row) in (0_i64 ..).zip(&rows) {
        assert_eq!(row.values(), &[text(&format!("key-{i}")), Value::Integer(i)]);
    }
    second.close().unwrap();
    assert_eq!(count_rows(&path, "kv"), 10);
}

#[test]
fn memory_databases_never_share_an_owner() {
    let first = WorkerHandle::open(":memory:").unwrap();
    let second = WorkerHandle::open(":MEMORY:").unwrap();
    assert_ne!(first.owner_id(), second.owner_id());
    assert!(first.path().is_memory());

    first.execute("CREATE TABLE only_here (x)", Vec::new()).unwrap();
    let err = second.execute("SELECT * FROM only_here", Vec::new()).unwrap_err();
    assert!(matches!(err, WorkerError::Engine(_)));
    first.close().unwrap();
    second.close().unwrap();
}

#[test]
fn differently_spelled_paths_share_an_owner() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("sub")).unwrap();
    let plain = WorkerHandle::open(temp.path().join("same.db")).unwrap();
    let dotted_path = temp.path().join("sub").join("..").join(".").join("same.db");
    let dotted = WorkerHandle::open(dotted_path).unwrap();
    assert_eq!(plain.owner_id(), dotted.owner_id());
    assert_eq!(plain.path(), dotted.path());
    plain.close().unwrap();
    dotted.close().unwrap();
}

#[test]
fn insensitive_paths_share_an_owner() {
    let temp = TempDir::new().unwrap();
    let config = WorkerConfig {
        path_case: PathCase::Insensitive,
        ..WorkerConfig::default()
    };
    let upper = WorkerHandle::open_with_config(temp.path().join("Case.DB"), &config).unwrap();
    let lower = WorkerHandle::open_with_config(temp.path().join("case.db"), &config).unwrap();
    assert_eq!(upper.owner_id(), lower.owner_id());
    upper.close().unwrap();
    lower.close().unwrap();
}

#[test]
fn injected_registry_is_isolated_from_global() {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());
    let path = temp.path().join("injected.db");
    let injected =
        WorkerHandle::open_in(Arc::clone(&registry), &path, &WorkerConfig::default()).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(injected.path()));
    assert!(!Registry::global().contains(injected.path()));

    let global = WorkerHandle::open(&path).unwrap();
    assert_ne!(injected.owner_id(), global.owner_id());
    global.close().unwrap();

    injected.close().unwrap();
    assert!(registry.is_empty());
}

#[test]
fn dropping_last_handle_stops_owner() {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());
    let path = temp.path().join("dropped.db");
    {
        let worker =
            WorkerHandle::open_in(Arc::clone(&registry), &path, &WorkerConfig::default()).unwrap();
        worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
        worker.execute("INSERT INTO t VALUES (1)", Vec::new()).unwrap();
    }
    assert!(registry.is_empty());
    assert_eq!(count_rows(&path, "t"), 1);
}

// ============================================================================
// SECTION: Queue Bounds
// ============================================================================

#[test]
fn full_queue_reports_queue_full() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("full.db");
    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

    let config = WorkerConfig {
        max_queue_size: 1,
        ..stalled_config()
    };
    let stalled = Arc::new(WorkerHandle::open_with_config(&path, &config).unwrap());
    let impatient = WorkerHandle::open_with_config(
        &path,
        &WorkerConfig {
            enqueue_timeout_ms: 50,
            ..WorkerConfig::default()
        },
    )
    .unwrap();
    assert_eq!(stalled.owner_id(), impatient.owner_id());

    blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();
    let inserter = {
        let stalled = Arc::clone(&stalled);
        thread::spawn(move || stalled.execute("INSERT INTO t VALUES (1)", Vec::new()))
    };

    let mut saw_full = false;
    for _ in 0 .. 200 {
        match impatient.commit() {
            Ok(()) => thread::sleep(Duration::from_millis(5)),
            Err(WorkerError::QueueFull {
                timeout_ms,
            }) => {
                assert_eq!(timeout_ms, 50);
                saw_full = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(saw_full, "queue never filled");

    blocker.execute_batch("COMMIT").unwrap();
    inserter.join().unwrap().unwrap();
    impatient.close().unwrap();
    stalled.close().unwrap();
    assert_eq!(count_rows(&path, "t"), 1);
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn implicit_transaction_is_visible_only_after_commit() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("implicit.db");
    let worker = WorkerHandle::open(&path).unwrap();
    worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES (1)", Vec::new()).unwrap();
    assert_eq!(count_rows(&path, "t"), 0);

    worker.commit().unwrap();
    worker.execute("SELECT 1", Vec::new()).unwrap();
    assert_eq!(count_rows(&path, "t"), 1);
    worker.close().unwrap();
}

#[test]
fn autocommit_mode_writes_through_immediately() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("autocommit.db");
    let config = WorkerConfig {
        implicit_transactions: false,
        ..WorkerConfig::default()
    };
    let worker = WorkerHandle::open_with_config(&path, &config).unwrap();
    worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES (1)", Vec::new()).unwrap();
    assert_eq!(count_rows(&path, "t"), 1);
    worker.close().unwrap();
}

#[test]
fn script_commits_pending_work_first() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("script.db");
    let worker = WorkerHandle::open(&path).unwrap();
    worker.execute("CREATE TABLE a (x)", Vec::new()).unwrap();
    worker.execute("INSERT INTO a VALUES (1)", Vec::new()).unwrap();

    let output = worker
        .execute_script_full(
            "CREATE TABLE b (y); INSERT INTO b VALUES (1); INSERT INTO b VALUES (2);",
        )
        .unwrap();
    assert!(output.rows.is_empty());
    assert!(output.columns.is_empty());
    assert_eq!(count_rows(&path, "a"), 1);
    assert_eq!(count_rows(&path, "b"), 2);
    worker.close().unwrap();
}

#[test]
fn total_changes_counts_modified_rows() {
    let worker = WorkerHandle::open(":memory:").unwrap();
    worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
    for i in 0 .. 3 {
        worker.execute("INSERT INTO t VALUES (?)", vec![Value::Integer(i)]).unwrap();
    }
    worker.execute("UPDATE t SET x = x + 1", Vec::new()).unwrap();
    assert_eq!(worker.total_changes().unwrap(), 6);
    worker.close().unwrap();
    assert_eq!(worker.total_changes().unwrap_err(), WorkerError::AlreadyClosed);
}

#[test]
fn execute_full_reports_columns_and_last_insert_id() {
    let worker = WorkerHandle::open(":memory:").unwrap();
    worker.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", Vec::new()).unwrap();
    let inserted = worker.execute_full("INSERT INTO t (name) VALUES (?)", vec![text("x")]).unwrap();
    assert_eq!(inserted.last_insert_id, 1);
    assert!(inserted.rows.is_empty());

    let selected = worker.execute_full("SELECT id, name FROM t", Vec::new()).unwrap();
    let names: Vec<&str> = selected.columns.iter().map(|column| column.name()).collect();
    assert_eq!(names, vec!["id", "name"]);
    worker.close().unwrap();
}

// ============================================================================
// SECTION: Factories
// ============================================================================

#[test]
fn factories_apply_to_later_results() {
    let worker = WorkerHandle::open(":memory:").unwrap();
    worker.execute("CREATE TABLE t (Name TEXT)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES ('ada')", Vec::new()).unwrap();

    let tuple = worker.execute("SELECT Name FROM t", Vec::new()).unwrap();
    assert_eq!(tuple[0].get_named("name"), None);

    worker.set_row_factory(RowFactory::Named).unwrap();
    let named = worker.execute("SELECT Name FROM t", Vec::new()).unwrap();
    assert_eq!(named[0].get_named("name"), Some(&text("ada")));

    worker.set_text_factory(TextFactory::Bytes).unwrap();
    let bytes = worker.execute("SELECT Name FROM t", Vec::new()).unwrap();
    assert_eq!(bytes[0].get(0), Some(&Value::Blob(b"ada".to_vec())));
    worker.close().unwrap();
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn invalid_config_is_rejected_at_open() {
    let config = WorkerConfig {
        max_queue_size: 0,
        ..WorkerConfig::default()
    };
    let err = WorkerHandle::open_with_config(":memory:", &config).unwrap_err();
    assert!(matches!(err, WorkerError::Config(ConfigError::Invalid(_))));
}

#[test]
fn config_file_drives_owner_settings() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("worker.toml");
    std::fs::write(&config_path, "max_queue_size = 4\nimplicit_transactions = false\n").unwrap();
    let config = WorkerConfig::load(&config_path).unwrap();
    assert_eq!(config.max_queue_size, 4);

    let path = temp.path().join("configured.db");
    let worker = WorkerHandle::open_with_config(&path, &config).unwrap();
    worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES (1)", Vec::new()).unwrap();
    assert_eq!(count_rows(&path, "t"), 1);
    worker.close().unwrap();
}

#[test]
fn uri_like_names_open_as_plain_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("file:plain.db");
    let worker = WorkerHandle::open(&path).unwrap();
    worker.execute("CREATE TABLE t (x)", Vec::new()).unwrap();
    worker.execute("INSERT INTO t VALUES (1)", Vec::new()).unwrap();
    worker.close().unwrap();
    assert!(path.is_file());
    assert_eq!(count_rows(&path, "t"), 1);
}

#[test]
fn directory_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let err = WorkerHandle::open(temp.path()).unwrap_err();
    assert!(matches!(err, WorkerError::InvalidPath(_)));
}
