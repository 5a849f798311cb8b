//! Shared helpers for integration tests.

use std::sync::Once;

use nestdb::{Db, DbOptions};
use tempfile::TempDir;

/// Install the dev tracing subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        nestdb_core::telemetry::try_init_dev_subscriber();
    });
}

/// A fresh database in its own scratch directory. Keep the `TempDir`
/// alive for the duration of the test.
pub fn temp_db() -> (TempDir, Db) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let db = Db::open(DbOptions::new(dir.path().join("db")));
    (dir, db)
}
