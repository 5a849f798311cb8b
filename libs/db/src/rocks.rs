//! RocksDB engine boundary.
//!
//! [`Engine`] owns the single native handle shared by a whole namespace
//! tree. It exposes the ordered byte-store primitives the namespace layer
//! is built on: point get/put/del, an atomic write batch, a prefix-bounded
//! forward scan with early stop, and a destructive prefix clear. The
//! handle sits behind `RwLock<Option<DB>>` so `close()` can drop it while
//! later calls fail with a `not connected` error instead of touching a
//! dead database.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

/// Connection status as observed through a namespace handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Closed,
    Opening,
    Open,
}

/// A single already-encoded engine operation, as submitted in a batch.
#[derive(Debug, Clone)]
pub enum RawOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

/// Deletions per write batch while clearing a prefix.
const CLEAR_CHUNK: usize = 1_024;

pub struct Engine {
    path: PathBuf,
    db: RwLock<Option<DB>>,
}

impl Engine {
    /// Open (or create) the database at `path`.
    #[tracing::instrument(skip_all, fields(path = ?path))]
    pub fn open(path: &Path, create_if_missing: bool) -> Result<Engine> {
        match path.try_exists() {
            Err(e) => return Err(e.into()),
            Ok(true) => {
                if path.is_file() {
                    bail!("Path is a file: {}", path.display());
                }
                if path.is_symlink() {
                    bail!("Path is a symlink: {}", path.display());
                }
            }
            Ok(false) => {}
        }

        let mut opts = Options::default();
        opts.create_if_missing(create_if_missing);
        let db = DB::open(&opts, path)?;
        tracing::info!("engine opened");

        Ok(Engine {
            path: path.to_path_buf(),
            db: RwLock::new(Some(db)),
        })
    }

    /// The filesystem path this engine was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Open` while the native handle is live, `Closed` after `close()`.
    pub fn status(&self) -> Status {
        match self.db.read() {
            Ok(guard) if guard.is_some() => Status::Open,
            _ => Status::Closed,
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> Result<T>) -> Result<T> {
        let guard = self.db.read().map_err(|_| anyhow!("engine lock poisoned"))?;
        match guard.as_ref() {
            Some(db) => f(db),
            None => bail!("not connected: engine is closed"),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| Ok(db.get(key)?))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_db(|db| Ok(db.put(key, value)?))
    }

    /// Idempotent: deleting an absent key succeeds.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        self.with_db(|db| Ok(db.delete(key)?))
    }

    /// Apply a group of operations as one atomic write batch.
    pub fn write_batch(&self, ops: Vec<RawOp>) -> Result<()> {
        self.with_db(|db| {
            let mut batch = WriteBatch::default();
            for op in ops {
                match op {
                    RawOp::Put { key, value } => batch.put(key, value),
                    RawOp::Del { key } => batch.delete(key),
                }
            }
            Ok(db.write(batch)?)
        })
    }

    /// Forward scan over keys starting with `prefix`, bounded by optional
    /// `gte`/`lte` applied to the prefix-stripped remainder.
    ///
    /// The visitor receives `(stripped_key, value)` and returns `true` to
    /// continue, `false` to stop early.
    pub fn scan<F>(
        &self,
        prefix: &[u8],
        gte: Option<&[u8]>,
        lte: Option<&[u8]>,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(Vec<u8>, Vec<u8>) -> bool,
    {
        self.with_db(|db| {
            let mut start = prefix.to_vec();
            if let Some(gte) = gte {
                start.extend_from_slice(gte);
            }
            let iter = db.iterator(IteratorMode::From(&start, Direction::Forward));
            for item in iter {
                let (key, value) = item?;
                if !key.starts_with(prefix) {
                    break;
                }
                let stripped = &key[prefix.len()..];
                if let Some(lte) = lte {
                    if stripped > lte {
                        break;
                    }
                }
                if !visit(stripped.to_vec(), value.into_vec()) {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Delete every key starting with `prefix` (the whole store when the
    /// prefix is empty). Returns the number of keys deleted.
    pub fn clear_prefix(&self, prefix: &[u8]) -> Result<usize> {
        self.with_db(|db| {
            let mut deleted = 0;
            loop {
                let mut batch = WriteBatch::default();
                let mut in_batch = 0;
                let iter = db.iterator(IteratorMode::From(prefix, Direction::Forward));
                for item in iter {
                    let (key, _) = item?;
                    if !key.starts_with(prefix) {
                        break;
                    }
                    batch.delete(key);
                    in_batch += 1;
                    if in_batch >= CLEAR_CHUNK {
                        break;
                    }
                }
                if in_batch == 0 {
                    break;
                }
                db.write(batch)?;
                deleted += in_batch;
            }
            Ok(deleted)
        })
    }

    /// Drop the native handle. Every later operation fails with a
    /// `not connected` error.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| anyhow!("engine lock poisoned"))?;
        match guard.take() {
            Some(db) => {
                drop(db);
                tracing::info!(path = ?self.path, "engine closed");
                Ok(())
            }
            None => bail!("engine is already closed"),
        }
    }
}
