//! Integration tests for connection readiness, reset-on-connect and
//! disconnect semantics.

mod common;

use std::sync::Arc;

use nestdb::{Db, DbOptions, Engine, NamespaceOptions, Status, Value};

#[tokio::test]
async fn test_status_transitions_on_first_operation() {
    let (_dir, db) = common::temp_db();
    assert_eq!(db.status(), Status::Opening);

    db.put("k", Value::Int(1)).await.unwrap();
    assert_eq!(db.status(), Status::Open);

    db.disconnect().await.unwrap();
    assert_eq!(db.status(), Status::Closed);
}

#[tokio::test]
async fn test_concurrent_readiness_resolves_once_for_all_clones() {
    let (_dir, db) = common::temp_db();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let clone = db.clone();
        handles.push(tokio::spawn(async move { clone.is_ready().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(db.status(), Status::Open);
}

#[tokio::test]
async fn test_reset_clears_once_then_later_opens_preserve_data() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("db");

    let db = Db::open(DbOptions::new(&path));
    db.put("k1", Value::Int(1)).await.unwrap();
    db.disconnect().await.unwrap();

    // Reset wipes pre-existing data before readiness resolves.
    let db = Db::open(DbOptions::new(&path).with_reset(true));
    assert_eq!(db.get("k1").await.unwrap(), None);
    db.put("k2", Value::Int(2)).await.unwrap();
    db.disconnect().await.unwrap();

    // A plain reopen sees everything written after the reset.
    let db = Db::open(DbOptions::new(&path));
    assert_eq!(db.get("k2").await.unwrap(), Some(Value::Int(2)));
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_operations_after_disconnect_fail_not_connected() {
    let (_dir, db) = common::temp_db();
    let sub = db.sub("s").unwrap();
    db.put("k", Value::Int(1)).await.unwrap();
    db.disconnect().await.unwrap();

    let err = db.get("k").await.unwrap_err();
    assert!(err.to_string().contains("not connected"), "got: {err}");
    // Derived handles share the root's lifecycle.
    let err = sub.put("k", Value::Int(2)).await.unwrap_err();
    assert!(err.to_string().contains("not connected"), "got: {err}");
}

#[tokio::test]
async fn test_with_external_engine() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(&dir.path().join("db"), true).unwrap());

    let db = Db::with_engine(engine, NamespaceOptions::default());
    // The engine is already live, so the handle is Open before any
    // operation has resolved readiness.
    assert_eq!(db.status(), Status::Open);
    db.put("k", Value::Text("v".into())).await.unwrap();
    assert_eq!(db.get("k").await.unwrap(), Some(Value::Text("v".into())));
}

#[tokio::test]
async fn test_default_instance_is_process_wide() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();

    let first = Db::default_instance(DbOptions::new(dir.path().join("db")));
    // Later options are ignored; the same instance comes back.
    let second = Db::default_instance(DbOptions::new(dir.path().join("other")));
    assert!(Arc::ptr_eq(&first, &second));
}
