//! # nestdb - hierarchical key-value storage over RocksDB
//!
//! nestdb layers independently-addressable, nested namespaces
//! ("sub-databases") over a single RocksDB connection. Namespaces share
//! one flat key space through a prefixing convention, encode keys and
//! values through a per-namespace policy, hide nested-namespace
//! bookkeeping keys from normal iteration, and route mixed multi-namespace
//! batches to their correct partitions.
//!
//! ```ignore
//! use nestdb::{Db, DbOptions, IterOptions, Value};
//!
//! let db = Db::open(DbOptions::new("/var/lib/myapp/db"));
//! db.put("greeting", "hello").await?;
//!
//! let users = db.sub("users")?;
//! users.put("alice", Value::Map(vec![("age".into(), Value::Int(30))])).await?;
//!
//! // Parent iteration never surfaces the `users` bookkeeping keys.
//! let mut iter = db.iterator(IterOptions::default()).await?;
//! while let Some(entry) = iter.next().await {
//!     let (key, raw_value) = entry?;
//!     // ...
//! }
//!
//! db.disconnect().await?;
//! ```
//!
//! # Module organization
//!
//! - [`value`]: the dynamic [`Value`] type behind the binary encoding
//! - [`encoding`]: key/value encoding policy ([`KeyEncoding`],
//!   [`ValueEncoding`], lexicographic integers)
//! - [`rocks`]: the RocksDB engine boundary ([`Engine`])
//! - [`db`]: namespace tree, connection lifecycle, core operations
//! - [`stream`]: pull iterator, push streams, collectors
//! - [`batch`]: the multi-namespace batch router
//!
//! # Guarantees in brief
//!
//! - A read of an absent key is `Ok(None)`, never an error.
//! - Every operation awaits a single memoized readiness signal per root;
//!   a requested reset completes before readiness resolves, exactly once.
//! - Batch groups are atomic per namespace, concurrent and independent
//!   across namespaces: committed groups survive a sibling failure.

pub mod batch;
pub mod db;
pub mod encoding;
pub mod rocks;
pub mod stream;
pub mod value;

pub use batch::{BatchKind, BatchOp, RawBatch};
pub use db::{Db, DbOptions, NamespaceHook, NamespaceOptions, SubOptions};
pub use encoding::{Key, KeyCodec, KeyEncoding, ValueCodec, ValueEncoding};
pub use rocks::{Engine, RawOp, Status};
pub use stream::{EntryStream, Iter, IterOptions, KeyStream, ValueStream};
pub use value::Value;
