//! Integration tests for iteration, child-key filtering and the
//! iterator/stream decode asymmetry.

mod common;

use nestdb::{DbOptions, IterOptions, Key, KeyEncoding, NamespaceOptions, SubOptions, Value};

#[tokio::test]
async fn test_default_iteration_hides_child_boundary_keys() {
    let (_dir, db) = common::temp_db();
    db.put("a", Value::Int(1)).await.unwrap();
    db.put("b", Value::Int(2)).await.unwrap();
    let child = db.sub("nested").unwrap();
    child.put("hidden", Value::Int(3)).await.unwrap();

    let mut iter = db.iterator(IterOptions::default()).await.unwrap();
    let mut keys = Vec::new();
    while let Some(item) = iter.next().await {
        let (key, _) = item.unwrap();
        keys.push(key);
    }
    assert_eq!(keys, [Key::Text("a".into()), Key::Text("b".into())]);
}

#[tokio::test]
async fn test_all_option_surfaces_child_boundary_keys() {
    let (_dir, db) = common::temp_db();
    db.put("a", Value::Int(1)).await.unwrap();
    let child = db.sub("nested").unwrap();
    child.put("hidden", Value::Int(3)).await.unwrap();

    let keys = db.keys(IterOptions::default().all()).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&b"a".to_vec()));
    assert!(keys.contains(&b"!nested!hidden".to_vec()));
}

#[tokio::test]
async fn test_range_bounds_apply() {
    let (_dir, db) = common::temp_db();
    for key in ["a", "b", "c", "d"] {
        db.put(key, Value::Int(0)).await.unwrap();
    }

    let keys = db
        .keys(IterOptions::default().gte("b").lte("c"))
        .await
        .unwrap();
    assert_eq!(keys, [b"b".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn test_iterator_decodes_keys_streams_do_not() {
    let (_dir, db) = common::temp_db();
    let nums = db
        .sub_with("n", SubOptions::default().key_encoding(KeyEncoding::LexInt))
        .unwrap();
    for n in [3u64, 300, 70_000] {
        nums.put(n, Value::Int(n as i64)).await.unwrap();
    }

    // Pull iterator: decoded integer keys, in numeric order.
    let mut iter = nums.iterator(IterOptions::default()).await.unwrap();
    let mut decoded = Vec::new();
    while let Some(item) = iter.next().await {
        decoded.push(item.unwrap().0);
    }
    assert_eq!(decoded, [Key::Int(3), Key::Int(300), Key::Int(70_000)]);

    // Push stream: raw engine bytes, untouched.
    let mut stream = nums.key_stream(IterOptions::default()).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, vec![0x83u8]);
}

#[tokio::test]
async fn test_lexint_keys_never_filtered_as_child_boundaries() {
    let (_dir, db) = common::temp_db();
    let nums = db
        .sub_with("n", SubOptions::default().key_encoding(KeyEncoding::LexInt))
        .unwrap();

    // 33 is the separator byte `'!'`; its encoding must not start with it
    // or default iteration would hide the entry while exists() still sees it.
    nums.put(33u64, Value::Int(33)).await.unwrap();
    assert!(nums.exists(33u64).await.unwrap());

    let mut iter = nums.iterator(IterOptions::default()).await.unwrap();
    let mut decoded = Vec::new();
    while let Some(item) = iter.next().await {
        decoded.push(item.unwrap().0);
    }
    assert_eq!(decoded, [Key::Int(33)]);
    assert_eq!(nums.keys(IterOptions::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_iterator_key_decode_falls_back_to_raw_bytes() {
    common::init_tracing();
    // Root uses lexint, but a raw batch plants a key lexint cannot parse.
    let dir = tempfile::TempDir::new().unwrap();
    let db = nestdb::Db::open(
        DbOptions::new(dir.path().join("db"))
            .with_namespace(NamespaceOptions::default().with_key_encoding(KeyEncoding::LexInt)),
    );
    db.raw_batch().put(b"zzz-not-lexint", b"v").write().await.unwrap();

    let mut iter = db.iterator(IterOptions::default()).await.unwrap();
    let (key, _) = iter.next().await.unwrap().unwrap();
    assert_eq!(key, Key::Bytes(b"zzz-not-lexint".to_vec()));
}

#[tokio::test]
async fn test_abandoning_iterator_mid_stream_is_safe() {
    let (_dir, db) = common::temp_db();
    for i in 0..500u32 {
        db.put(format!("key-{i:04}"), Value::Int(i as i64))
            .await
            .unwrap();
    }

    let mut iter = db.iterator(IterOptions::default()).await.unwrap();
    let first = iter.next().await.unwrap().unwrap();
    assert_eq!(first.0, Key::Text("key-0000".into()));
    drop(iter);

    // The store stays fully usable after the cursor is abandoned.
    db.put("after", Value::Int(1)).await.unwrap();
    assert_eq!(db.get("after").await.unwrap(), Some(Value::Int(1)));
}

#[tokio::test]
async fn test_entries_values_and_buffer() {
    let (_dir, db) = common::temp_db();
    let raw = db
        .sub_with(
            "r",
            SubOptions::default().value_encoding(nestdb::ValueEncoding::Raw),
        )
        .unwrap();
    raw.put("a", Value::Bytes(b"he".to_vec())).await.unwrap();
    raw.put("b", Value::Bytes(b"llo".to_vec())).await.unwrap();

    let entries = raw.entries(IterOptions::default()).await.unwrap();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), b"he".to_vec()),
            (b"b".to_vec(), b"llo".to_vec()),
        ]
    );

    let values = raw.values(IterOptions::default()).await.unwrap();
    assert_eq!(values, vec![b"he".to_vec(), b"llo".to_vec()]);

    let buffer = raw.values_buffer(IterOptions::default()).await.unwrap();
    assert_eq!(buffer, b"hello".to_vec());
}

#[tokio::test]
async fn test_list_all_counts_entries() {
    let (_dir, db) = common::temp_db();
    db.put("a", Value::Int(1)).await.unwrap();
    db.put("b", Value::Int(2)).await.unwrap();
    db.sub("c").unwrap().put("k", Value::Int(3)).await.unwrap();

    assert_eq!(db.list_all(false).await.unwrap(), 2);
    assert_eq!(db.list_all(true).await.unwrap(), 3);
}
