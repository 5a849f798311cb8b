//! Stream and iterator views over a namespace.
//!
//! Three shapes over the same scan machinery:
//!
//! - [`Db::iterator`] - pull-based cursor yielding `(Key, raw value)`
//!   pairs. Keys are decoded through the namespace key encoding (falling
//!   back to raw bytes when decoding fails); values stay raw.
//! - [`Db::entry_stream`] / [`Db::key_stream`] / [`Db::value_stream`] -
//!   push-style streams of raw engine keys and values. Streams never
//!   decode keys; the decode asymmetry with [`Db::iterator`] is part of
//!   the contract.
//! - [`Db::entries`] / [`Db::keys`] / [`Db::values`] /
//!   [`Db::values_buffer`] - materialized collections.
//!
//! All views exclude child-boundary keys (raw keys starting with the
//! namespace separator) unless [`IterOptions::all`] is set. Scans run on
//! the blocking pool and feed a bounded channel, so abandoning a cursor
//! mid-iteration drops the receiver and tears the scan down promptly.

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::db::Db;
use crate::encoding::{Key, KeyEncoding};

/// Bound applied to the scan feed channel; keeps abandoned cursors from
/// buffering an unbounded snapshot.
const STREAM_BUFFER: usize = 64;

/// Range and filtering options for iteration.
///
/// `gte`/`lte` bounds are encoded with the namespace key encoding and
/// apply within the partition. `all` disables child-boundary filtering.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    pub gte: Option<Key>,
    pub lte: Option<Key>,
    pub all: bool,
}

impl IterOptions {
    pub fn gte(mut self, key: impl Into<Key>) -> Self {
        self.gte = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<Key>) -> Self {
        self.lte = Some(key.into());
        self
    }

    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }
}

type RawEntry = (Vec<u8>, Vec<u8>);

/// Pull-based cursor over a namespace.
///
/// Lazy, forward-only and non-restartable. Dropping it mid-iteration is
/// safe; the underlying scan stops on the next send.
pub struct Iter {
    rx: mpsc::Receiver<Result<RawEntry>>,
    key_encoding: KeyEncoding,
}

impl Iter {
    /// Next `(key, raw value)` pair, or `None` at the end.
    ///
    /// Keys that fail to decode are surfaced as `Key::Bytes` rather than
    /// erroring, since a partition may hold keys written under other
    /// encodings.
    pub async fn next(&mut self) -> Option<Result<(Key, Vec<u8>)>> {
        let item = self.rx.recv().await?;
        Some(item.map(|(key, value)| {
            let key = self
                .key_encoding
                .decode(&key)
                .unwrap_or_else(|_| Key::Bytes(key));
            (key, value)
        }))
    }
}

/// Push-style stream of raw `(key, value)` entries.
pub struct EntryStream {
    rx: mpsc::Receiver<Result<RawEntry>>,
}

impl EntryStream {
    pub async fn next(&mut self) -> Option<Result<RawEntry>> {
        self.rx.recv().await
    }
}

/// Push-style stream of raw keys.
pub struct KeyStream {
    rx: mpsc::Receiver<Result<RawEntry>>,
}

impl KeyStream {
    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        self.rx.recv().await.map(|item| item.map(|(key, _)| key))
    }
}

/// Push-style stream of raw values.
pub struct ValueStream {
    rx: mpsc::Receiver<Result<RawEntry>>,
}

impl ValueStream {
    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        self.rx
            .recv()
            .await
            .map(|item| item.map(|(_, value)| value))
    }
}

impl Db {
    /// Spawn a filtered scan of this partition feeding a bounded channel.
    async fn raw_stream(&self, opts: &IterOptions) -> Result<mpsc::Receiver<Result<RawEntry>>> {
        let engine = self.ensure_ready().await?;
        let gte = opts
            .gte
            .as_ref()
            .map(|k| self.opts.key_encoding.encode(k))
            .transpose()?;
        let lte = opts
            .lte
            .as_ref()
            .map(|k| self.opts.key_encoding.encode(k))
            .transpose()?;
        let sep = self.sep_byte()?;
        let all = opts.all;
        let prefix = self.prefix.clone();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || {
            let result = engine.scan(&prefix, gte.as_deref(), lte.as_deref(), |key, value| {
                if !all && key.first() == Some(&sep) {
                    return true;
                }
                // A failed send means the consumer went away; stop the scan.
                tx.blocking_send(Ok((key, value))).is_ok()
            });
            if let Err(err) = result {
                let _ = tx.blocking_send(Err(err));
            }
        });
        Ok(rx)
    }

    /// Pull-based cursor with decoded keys (see module docs).
    pub async fn iterator(&self, opts: IterOptions) -> Result<Iter> {
        Ok(Iter {
            rx: self.raw_stream(&opts).await?,
            key_encoding: self.opts.key_encoding.clone(),
        })
    }

    /// Stream of raw `(key, value)` entries.
    pub async fn entry_stream(&self, opts: IterOptions) -> Result<EntryStream> {
        Ok(EntryStream {
            rx: self.raw_stream(&opts).await?,
        })
    }

    /// Stream of raw keys.
    pub async fn key_stream(&self, opts: IterOptions) -> Result<KeyStream> {
        Ok(KeyStream {
            rx: self.raw_stream(&opts).await?,
        })
    }

    /// Stream of raw values.
    pub async fn value_stream(&self, opts: IterOptions) -> Result<ValueStream> {
        Ok(ValueStream {
            rx: self.raw_stream(&opts).await?,
        })
    }

    /// Materialize all raw entries matching `opts`.
    pub async fn entries(&self, opts: IterOptions) -> Result<Vec<RawEntry>> {
        let mut stream = self.entry_stream(opts).await?;
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Materialize all raw keys matching `opts`.
    pub async fn keys(&self, opts: IterOptions) -> Result<Vec<Vec<u8>>> {
        let mut stream = self.key_stream(opts).await?;
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Materialize all raw values matching `opts`.
    pub async fn values(&self, opts: IterOptions) -> Result<Vec<Vec<u8>>> {
        let mut stream = self.value_stream(opts).await?;
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Concatenate all raw values matching `opts` into one buffer.
    pub async fn values_buffer(&self, opts: IterOptions) -> Result<Vec<u8>> {
        let mut stream = self.value_stream(opts).await?;
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.extend_from_slice(&item?);
        }
        Ok(out)
    }

    /// Log every entry of this partition at INFO level. Debug aid.
    pub async fn list_all(&self, all: bool) -> Result<usize> {
        let mut iter = self
            .iterator(IterOptions {
                all,
                ..Default::default()
            })
            .await?;
        let mut count = 0;
        while let Some(item) = iter.next().await {
            let (key, value) = item.context("list_all iteration failed")?;
            tracing::info!(?key, value_len = value.len(), "entry");
            count += 1;
        }
        Ok(count)
    }
}
