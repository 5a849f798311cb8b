//! Batch routing across namespaces.
//!
//! [`Db::batch`] takes a heterogeneous list of operations, each optionally
//! tagged with a target namespace path, partitions them by resolved path
//! and submits every group as one atomic engine write batch. Groups are
//! dispatched concurrently and commit independently: a failing group
//! never rolls back a sibling that already committed. The aggregate error
//! names every failed group so callers can reconcile.
//!
//! [`Db::raw_batch`] is the low-level deferred builder: already-encoded
//! keys and values, prefixed by the handle's namespace, committed as one
//! atomic batch with no routing involved.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::db::Db;
use crate::encoding::Key;
use crate::rocks::RawOp;
use crate::value::Value;

/// The engine-defined operation set.
#[derive(Debug, Clone)]
pub enum BatchKind {
    Put { key: Key, value: Value },
    Del { key: Key },
}

/// One routed batch operation. A missing (or empty) `path` targets the
/// root namespace.
#[derive(Debug, Clone)]
pub struct BatchOp {
    pub kind: BatchKind,
    pub path: Option<Vec<String>>,
}

impl BatchOp {
    pub fn put(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            kind: BatchKind::Put {
                key: key.into(),
                value: value.into(),
            },
            path: None,
        }
    }

    pub fn del(key: impl Into<Key>) -> Self {
        Self {
            kind: BatchKind::Del { key: key.into() },
            path: None,
        }
    }

    /// Route this operation to the namespace at `path` (absolute, from
    /// the root).
    pub fn at<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }
}

impl Db {
    /// Encode a group of operations with this namespace's encodings.
    ///
    /// Value hooks are a `put`/`get` concern and do not apply to batched
    /// writes.
    fn encode_group(&self, kinds: Vec<BatchKind>) -> Result<Vec<RawOp>> {
        let mut out = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind {
                BatchKind::Put { key, value } => out.push(RawOp::Put {
                    key: self.full_key(&key)?,
                    value: self.opts.value_encoding.encode(&value)?,
                }),
                BatchKind::Del { key } => out.push(RawOp::Del {
                    key: self.full_key(&key)?,
                }),
            }
        }
        Ok(out)
    }

    /// Route `ops` to their target namespaces and submit one atomic
    /// engine batch per distinct path, all groups concurrently.
    ///
    /// Operations without a path go to the root, regardless of which
    /// handle this is called on. Per-group operation order is preserved.
    /// Atomicity holds within a group only: if any group fails the call
    /// returns an aggregate error, but committed sibling groups stay
    /// committed.
    pub async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let engine = self.ensure_ready().await?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut groups: BTreeMap<Vec<String>, Vec<BatchKind>> = BTreeMap::new();
        for op in ops {
            groups
                .entry(op.path.unwrap_or_default())
                .or_default()
                .push(op.kind);
        }

        let mut failures: Vec<(String, String)> = Vec::new();
        let mut tasks = Vec::with_capacity(groups.len());
        for (path, kinds) in groups {
            let label = if path.is_empty() {
                "<root>".to_string()
            } else {
                path.join("/")
            };
            let raw = match self.at_path(&path).and_then(|ns| ns.encode_group(kinds)) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(group = %label, error = %err, "batch group rejected");
                    failures.push((label, err.to_string()));
                    continue;
                }
            };
            let engine = engine.clone();
            tasks.push((
                label,
                tokio::task::spawn_blocking(move || engine.write_batch(raw)),
            ));
        }

        for (label, task) in tasks {
            let outcome = match task.await {
                Ok(result) => result,
                Err(err) => Err(anyhow::anyhow!("batch task panicked: {err}")),
            };
            match outcome {
                Ok(()) => tracing::debug!(group = %label, "batch group committed"),
                Err(err) => {
                    tracing::warn!(group = %label, error = %err, "batch group failed");
                    failures.push((label, err.to_string()));
                }
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        let detail: Vec<String> = failures
            .iter()
            .map(|(label, err)| format!("{label}: {err}"))
            .collect();
        bail!(
            "batch failed for {} group(s) [{}]; committed groups are not rolled back",
            failures.len(),
            detail.join("; ")
        );
    }

    /// Start a deferred raw batch against this namespace's partition.
    pub fn raw_batch(&self) -> RawBatch {
        RawBatch {
            db: self.clone(),
            ops: Vec::new(),
        }
    }
}

/// Deferred builder of raw, already-encoded operations, committed as one
/// atomic engine batch. No key/value encoding and no routing apply; keys
/// are prefixed by the originating namespace.
pub struct RawBatch {
    db: Db,
    ops: Vec<RawOp>,
}

impl RawBatch {
    pub fn put(mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        let mut k = self.db.prefix.clone();
        k.extend_from_slice(key.as_ref());
        self.ops.push(RawOp::Put {
            key: k,
            value: value.as_ref().to_vec(),
        });
        self
    }

    pub fn del(mut self, key: impl AsRef<[u8]>) -> Self {
        let mut k = self.db.prefix.clone();
        k.extend_from_slice(key.as_ref());
        self.ops.push(RawOp::Del { key: k });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commit all queued operations atomically.
    pub async fn write(self) -> Result<()> {
        let engine = self.db.ensure_ready().await?;
        let ops = self.ops;
        tokio::task::spawn_blocking(move || engine.write_batch(ops))
            .await
            .map_err(|err| anyhow::anyhow!("raw batch task panicked: {err}"))?
    }
}
