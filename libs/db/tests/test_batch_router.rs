//! Integration tests for the multi-namespace batch router and the raw
//! deferred batch builder.

mod common;

use nestdb::{BatchOp, Db, DbOptions, IterOptions, Key, KeyEncoding, NamespaceOptions, Value};

#[tokio::test]
async fn test_batch_routes_across_namespaces() {
    let (_dir, db) = common::temp_db();

    db.batch(vec![
        BatchOp::put("root-key", Value::Int(1)),
        BatchOp::put("user-key", Value::Int(2)).at(["users"]),
        BatchOp::put("deep-key", Value::Int(3)).at(["users", "settings"]),
    ])
    .await
    .unwrap();

    assert_eq!(db.get("root-key").await.unwrap(), Some(Value::Int(1)));
    let users = db.sub("users").unwrap();
    assert_eq!(users.get("user-key").await.unwrap(), Some(Value::Int(2)));
    let settings = users.sub("settings").unwrap();
    assert_eq!(settings.get("deep-key").await.unwrap(), Some(Value::Int(3)));
}

#[tokio::test]
async fn test_pathless_ops_target_root_even_from_a_sub_handle() {
    let (_dir, db) = common::temp_db();
    let sub = db.sub("s").unwrap();

    sub.batch(vec![BatchOp::put("k", Value::Int(1))])
        .await
        .unwrap();

    // The write landed at the root, not in the handle's own partition.
    assert_eq!(db.get("k").await.unwrap(), Some(Value::Int(1)));
    assert_eq!(sub.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_per_group_operation_order_is_preserved() {
    let (_dir, db) = common::temp_db();

    db.batch(vec![
        BatchOp::put("k", Value::Int(1)),
        BatchOp::del("k"),
    ])
    .await
    .unwrap();

    assert_eq!(db.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_group_does_not_roll_back_siblings() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    // Root defaults to lexint keys; derived namespaces inherit that, so a
    // text key routed at ["x"] fails to encode while the root group is fine.
    let db = Db::open(
        DbOptions::new(dir.path().join("db"))
            .with_namespace(NamespaceOptions::default().with_key_encoding(KeyEncoding::LexInt)),
    );

    let err = db
        .batch(vec![
            BatchOp::put(Key::Int(1), Value::Text("ok".into())),
            BatchOp::put("not-an-int", Value::Text("bad".into())).at(["x"]),
        ])
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("batch failed for 1 group(s)"), "got: {msg}");
    assert!(msg.contains("x:"), "got: {msg}");

    // The sibling group committed and stays committed.
    assert_eq!(
        db.get(Key::Int(1)).await.unwrap(),
        Some(Value::Text("ok".into()))
    );
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let (_dir, db) = common::temp_db();
    db.batch(Vec::new()).await.unwrap();
}

#[tokio::test]
async fn test_raw_batch_writes_prefixed_bytes() {
    let (_dir, db) = common::temp_db();
    let sub = db.sub("raw").unwrap();

    let batch = sub.raw_batch().put(b"a", b"1").put(b"b", b"2").del(b"a");
    assert_eq!(batch.len(), 3);
    batch.write().await.unwrap();

    // Keys landed inside the sub's partition, already encoded as given.
    let keys = sub.keys(IterOptions::default()).await.unwrap();
    assert_eq!(keys, [b"b".to_vec()]);
    assert_eq!(db.keys(IterOptions::default()).await.unwrap().len(), 0);
}
