//! Namespace tree, connection lifecycle and the core operations.
//!
//! A [`Db`] is one addressable namespace: a cheap, clonable handle made of
//! a shared root connection, a path of segments and the encoding options
//! resolved for that node. The root owns the engine; derived namespaces
//! ([`Db::sub`]) are disposable views over a prefixed region of the same
//! store, and all lifecycle operations (readiness, reset, disconnect) are
//! delegated to the shared root state.
//!
//! # Key layout
//!
//! Each path segment `s` contributes `{sep}{s}{sep}` to the node's byte
//! prefix, so a key `k` under path `["x", "y"]` lands at `!x!!y!` +
//! `encode(k)`. Within a parent's partition, every descendant key starts
//! with the separator - that is the child-boundary marker the stream
//! layer filters out of default iteration.
//!
//! # Readiness
//!
//! Every operation first awaits a single memoized readiness cell shared
//! by the whole tree. The first awaiter opens the engine (and performs
//! the one-shot destructive reset when requested); concurrent awaiters
//! observe the same resolution. After [`Db::disconnect`] the root is
//! `Closed` and every operation fails with a `not connected` error.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use tokio::sync::OnceCell;

use crate::encoding::{Key, KeyEncoding, ValueEncoding};
use crate::rocks::{Engine, Status};
use crate::value::Value;

// ============================================================================
// Options
// ============================================================================

/// Hook applied to keys and values on their way through a namespace.
///
/// Every method defaults to identity. Specialized namespace kinds (e.g.
/// an index layer) install a hook instead of subclassing.
pub trait NamespaceHook: Send + Sync {
    /// Rewrite a key before it is encoded. Applies to `put`, `get` and
    /// `exists`; the value hooks observe the transformed key.
    fn transform_key(&self, key: Key) -> Result<Key> {
        Ok(key)
    }

    /// Rewrite a key before a delete. Defaults to
    /// [`NamespaceHook::transform_key`].
    fn del_key(&self, key: Key) -> Result<Key> {
        self.transform_key(key)
    }

    fn on_put(&self, value: Value, _key: &Key) -> Result<Value> {
        Ok(value)
    }

    fn on_get(&self, value: Value, _key: &Key) -> Result<Value> {
        Ok(value)
    }
}

/// Per-namespace configuration, resolved at construction and inherited by
/// derived namespaces unless overridden.
#[derive(Clone)]
pub struct NamespaceOptions {
    /// Single ASCII character delimiting path segments in key prefixes
    /// and marking child-boundary keys. Default `'!'`.
    pub separator: char,
    pub key_encoding: KeyEncoding,
    pub value_encoding: ValueEncoding,
    pub hook: Option<Arc<dyn NamespaceHook>>,
}

impl Default for NamespaceOptions {
    fn default() -> Self {
        Self {
            separator: '!',
            key_encoding: KeyEncoding::default(),
            value_encoding: ValueEncoding::default(),
            hook: None,
        }
    }
}

impl fmt::Debug for NamespaceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceOptions")
            .field("separator", &self.separator)
            .field("key_encoding", &self.key_encoding)
            .field("value_encoding", &self.value_encoding)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl NamespaceOptions {
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    pub fn with_value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = encoding;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn NamespaceHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn sep_byte(&self) -> Result<u8> {
        if !self.separator.is_ascii() {
            bail!("namespace separator must be ASCII, got {:?}", self.separator);
        }
        Ok(self.separator as u8)
    }
}

/// Overrides applied when deriving a namespace with [`Db::sub_with`].
/// `None` fields inherit from the parent.
#[derive(Clone, Default)]
pub struct SubOptions {
    pub separator: Option<char>,
    pub key_encoding: Option<KeyEncoding>,
    pub value_encoding: Option<ValueEncoding>,
    pub hook: Option<Arc<dyn NamespaceHook>>,
}

impl SubOptions {
    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = Some(encoding);
        self
    }

    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = Some(encoding);
        self
    }

    pub fn separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn NamespaceHook>) -> Self {
        self.hook = Some(hook);
        self
    }
}

/// Root construction options.
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Directory of the underlying store.
    pub path: PathBuf,
    /// Destructively clear the whole store before the first readiness
    /// resolution. Single-shot; ignored when an external engine is used.
    pub reset: bool,
    pub create_if_missing: bool,
    /// Defaults inherited by the root namespace and its descendants.
    pub namespace: NamespaceOptions,
}

impl DbOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reset: false,
            create_if_missing: true,
            namespace: NamespaceOptions::default(),
        }
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_namespace(mut self, namespace: NamespaceOptions) -> Self {
        self.namespace = namespace;
        self
    }
}

// ============================================================================
// Shared root state
// ============================================================================

enum Backend {
    Owned {
        path: PathBuf,
        create_if_missing: bool,
    },
    External(Arc<Engine>),
}

pub(crate) struct Shared {
    backend: Backend,
    reset: AtomicBool,
    engine: OnceCell<Arc<Engine>>,
    closed: AtomicBool,
    root_ns: NamespaceOptions,
}

// ============================================================================
// Db
// ============================================================================

/// A namespace handle over a shared store connection.
///
/// The root (`path() == []`) owns the connection lifecycle; handles
/// returned by [`Db::sub`] address prefixed partitions of the same store.
/// Cloning is cheap and clones observe the same readiness and data.
#[derive(Clone)]
pub struct Db {
    pub(crate) shared: Arc<Shared>,
    pub(crate) path: Vec<String>,
    pub(crate) prefix: Vec<u8>,
    pub(crate) opts: NamespaceOptions,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("status", &self.status())
            .field("opts", &self.opts)
            .finish()
    }
}

static DEFAULT_INSTANCE: OnceLock<Arc<Db>> = OnceLock::new();

impl Db {
    /// Create a root handle over the store at `opts.path`.
    ///
    /// The engine is opened lazily by the first operation (or an explicit
    /// [`Db::is_ready`] await); construction itself cannot fail.
    pub fn open(opts: DbOptions) -> Db {
        tracing::debug!(path = ?opts.path, reset = opts.reset, "opening database");
        Db {
            shared: Arc::new(Shared {
                backend: Backend::Owned {
                    path: opts.path,
                    create_if_missing: opts.create_if_missing,
                },
                reset: AtomicBool::new(opts.reset),
                engine: OnceCell::new(),
                closed: AtomicBool::new(false),
                root_ns: opts.namespace.clone(),
            }),
            path: Vec::new(),
            prefix: Vec::new(),
            opts: opts.namespace,
        }
    }

    /// Create a root handle over an externally supplied engine.
    ///
    /// The instance is fresh and never shared through
    /// [`Db::default_instance`]; a reset is never performed on an
    /// external engine.
    pub fn with_engine(engine: Arc<Engine>, namespace: NamespaceOptions) -> Db {
        Db {
            shared: Arc::new(Shared {
                backend: Backend::External(engine),
                reset: AtomicBool::new(false),
                engine: OnceCell::new(),
                closed: AtomicBool::new(false),
                root_ns: namespace.clone(),
            }),
            path: Vec::new(),
            prefix: Vec::new(),
            opts: namespace,
        }
    }

    /// Process-wide default instance, created on first call and reused
    /// for the process lifetime. Later calls ignore `opts`.
    ///
    /// This is an opt-in convenience; [`Db::open`] never touches global
    /// state.
    pub fn default_instance(opts: DbOptions) -> Arc<Db> {
        DEFAULT_INSTANCE
            .get_or_init(|| Arc::new(Db::open(opts)))
            .clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Current connection status. Only the root ever transitions it;
    /// derived namespaces observe the root's state.
    pub fn status(&self) -> Status {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Status::Closed;
        }
        match self.shared.engine.get() {
            Some(engine) => engine.status(),
            // An external engine has a status of its own before the first
            // operation resolves the readiness cell.
            None => match &self.shared.backend {
                Backend::External(engine) => engine.status(),
                Backend::Owned { .. } => Status::Opening,
            },
        }
    }

    /// Await the shared readiness of the root connection.
    ///
    /// Safe to call concurrently from any handle in the tree; every
    /// caller observes the same single resolution.
    pub async fn is_ready(&self) -> Result<()> {
        self.ensure_ready().await.map(|_| ())
    }

    pub(crate) async fn ensure_ready(&self) -> Result<Arc<Engine>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            bail!("not connected: database has been closed");
        }
        let shared = &self.shared;
        let engine = shared
            .engine
            .get_or_try_init(|| async {
                let engine = match &shared.backend {
                    Backend::External(engine) => engine.clone(),
                    Backend::Owned {
                        path,
                        create_if_missing,
                    } => {
                        let (path, create) = (path.clone(), *create_if_missing);
                        let engine =
                            tokio::task::spawn_blocking(move || Engine::open(&path, create))
                                .await
                                .context("engine open task failed")??;
                        Arc::new(engine)
                    }
                };
                // Single-shot: a later reconnect must not clear again.
                if shared.reset.swap(false, Ordering::SeqCst) {
                    let engine = engine.clone();
                    let deleted = tokio::task::spawn_blocking(move || engine.clear_prefix(&[]))
                        .await
                        .context("reset task failed")??;
                    tracing::info!(deleted, "reset cleared store before readiness");
                }
                Ok::<_, anyhow::Error>(engine)
            })
            .await?;
        Ok(engine.clone())
    }

    /// Close the engine. Every subsequent operation on any handle of the
    /// tree fails with a `not connected` error.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let engine = self.ensure_ready().await?;
        self.shared.closed.store(true, Ordering::SeqCst);
        tokio::task::spawn_blocking(move || engine.close())
            .await
            .context("engine close task failed")??;
        tracing::info!("database disconnected");
        Ok(())
    }

    // =========================================================================
    // Addressing
    // =========================================================================

    /// Path segments from the root; empty for the root itself.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The options resolved for this namespace.
    pub fn options(&self) -> &NamespaceOptions {
        &self.opts
    }

    /// Derive a child namespace, inheriting this node's options.
    pub fn sub(&self, segment: impl AsRef<str>) -> Result<Db> {
        self.sub_with(segment, SubOptions::default())
    }

    /// Derive a child namespace with explicit option overrides.
    ///
    /// Deriving the same path twice yields logically equivalent handles
    /// over the same partition.
    pub fn sub_with(&self, segment: impl AsRef<str>, overrides: SubOptions) -> Result<Db> {
        let segment = segment.as_ref();
        let opts = NamespaceOptions {
            separator: overrides.separator.unwrap_or(self.opts.separator),
            key_encoding: overrides
                .key_encoding
                .unwrap_or_else(|| self.opts.key_encoding.clone()),
            value_encoding: overrides
                .value_encoding
                .unwrap_or_else(|| self.opts.value_encoding.clone()),
            hook: overrides.hook.or_else(|| self.opts.hook.clone()),
        };
        let sep = opts.sep_byte()?;
        if segment.is_empty() {
            bail!("namespace segment must not be empty");
        }
        if segment.contains(opts.separator) {
            bail!(
                "namespace segment {:?} must not contain the separator {:?}",
                segment,
                opts.separator
            );
        }

        let mut prefix = self.prefix.clone();
        prefix.push(sep);
        prefix.extend_from_slice(segment.as_bytes());
        prefix.push(sep);

        let mut path = self.path.clone();
        path.push(segment.to_string());

        Ok(Db {
            shared: self.shared.clone(),
            path,
            prefix,
            opts,
        })
    }

    /// The root handle of this tree, with the root's default options.
    pub fn root(&self) -> Db {
        Db {
            shared: self.shared.clone(),
            path: Vec::new(),
            prefix: Vec::new(),
            opts: self.shared.root_ns.clone(),
        }
    }

    /// Resolve a namespace by absolute path from the root, deriving with
    /// inherited defaults segment by segment.
    pub fn at_path(&self, path: &[String]) -> Result<Db> {
        let mut db = self.root();
        for segment in path {
            db = db.sub(segment)?;
        }
        Ok(db)
    }

    pub(crate) fn full_key(&self, key: &Key) -> Result<Vec<u8>> {
        let mut out = self.prefix.clone();
        out.extend(self.opts.key_encoding.encode(key)?);
        Ok(out)
    }

    pub(crate) fn sep_byte(&self) -> Result<u8> {
        self.opts.sep_byte()
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Write a value under the (optionally hook-transformed) `key`.
    /// Engine failures propagate unchanged.
    pub async fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let engine = self.ensure_ready().await?;
        let mut key = key.into();
        let mut value = value.into();
        if let Some(hook) = &self.opts.hook {
            key = hook.transform_key(key)?;
            value = hook.on_put(value, &key)?;
        }
        let k = self.full_key(&key)?;
        let v = self.opts.value_encoding.encode(&value)?;
        engine.put(&k, &v)
    }

    /// Read the value under `key`; an absent key is `Ok(None)`, never an
    /// error.
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let engine = self.ensure_ready().await?;
        let mut key = key.into();
        if let Some(hook) = &self.opts.hook {
            key = hook.transform_key(key)?;
        }
        let k = self.full_key(&key)?;
        match engine.get(&k)? {
            None => Ok(None),
            Some(bytes) => {
                let mut value = self.opts.value_encoding.decode(&bytes)?;
                if let Some(hook) = &self.opts.hook {
                    value = hook.on_get(value, &key)?;
                }
                Ok(Some(value))
            }
        }
    }

    /// Delete `key`. Idempotent: deleting an absent key succeeds.
    pub async fn del(&self, key: impl Into<Key>) -> Result<()> {
        let engine = self.ensure_ready().await?;
        let mut key = key.into();
        if let Some(hook) = &self.opts.hook {
            key = hook.del_key(key)?;
        }
        let k = self.full_key(&key)?;
        engine.del(&k)
    }

    /// True iff a bounded range scan `[key, key]` yields an entry.
    pub async fn exists(&self, key: impl Into<Key>) -> Result<bool> {
        let engine = self.ensure_ready().await?;
        let mut key = key.into();
        if let Some(hook) = &self.opts.hook {
            key = hook.transform_key(key)?;
        }
        let encoded = self.opts.key_encoding.encode(&key)?;
        let prefix = self.prefix.clone();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut found = false;
            engine.scan(&prefix, Some(&encoded[..]), Some(&encoded[..]), |_, _| {
                found = true;
                false
            })?;
            Ok(found)
        })
        .await
        .context("exists scan task failed")?
    }

    /// Delete every key in this partition, child-boundary keys (and thus
    /// all descendant namespaces) included. Resolves once the engine has
    /// finished.
    #[tracing::instrument(skip(self), fields(path = ?self.path))]
    pub async fn clear(&self) -> Result<()> {
        let engine = self.ensure_ready().await?;
        let prefix = self.prefix.clone();
        let deleted = tokio::task::spawn_blocking(move || engine.clear_prefix(&prefix))
            .await
            .context("clear task failed")??;
        tracing::debug!(deleted, "cleared partition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sub_builds_nested_prefixes() {
        let dir = TempDir::new().unwrap();
        let root = Db::open(DbOptions::new(dir.path().join("db")));
        assert!(root.path().is_empty());
        assert!(root.prefix.is_empty());

        let x = root.sub("x").unwrap();
        assert_eq!(x.path(), ["x"]);
        assert_eq!(x.prefix, b"!x!");

        let xy = x.sub("y").unwrap();
        assert_eq!(xy.path(), ["x", "y"]);
        assert_eq!(xy.prefix, b"!x!!y!");
    }

    #[test]
    fn test_sub_rejects_bad_segments() {
        let dir = TempDir::new().unwrap();
        let root = Db::open(DbOptions::new(dir.path().join("db")));
        assert!(root.sub("").is_err());
        assert!(root.sub("a!b").is_err());
    }

    #[test]
    fn test_sub_with_overrides_merge() {
        let dir = TempDir::new().unwrap();
        let root = Db::open(DbOptions::new(dir.path().join("db")));

        let child = root
            .sub_with("n", SubOptions::default().key_encoding(KeyEncoding::LexInt))
            .unwrap();
        assert!(matches!(child.options().key_encoding, KeyEncoding::LexInt));
        // Value encoding inherited.
        assert!(matches!(
            child.options().value_encoding,
            ValueEncoding::Binary
        ));

        // Grandchild inherits the override.
        let grandchild = child.sub("m").unwrap();
        assert!(matches!(
            grandchild.options().key_encoding,
            KeyEncoding::LexInt
        ));
    }

    #[test]
    fn test_at_path_resolves_from_root_with_defaults() {
        let dir = TempDir::new().unwrap();
        let root = Db::open(DbOptions::new(dir.path().join("db")));
        let child = root
            .sub_with("x", SubOptions::default().key_encoding(KeyEncoding::LexInt))
            .unwrap();

        // at_path derives from the root with root defaults, regardless of
        // which handle it is called on.
        let resolved = child.at_path(&["x".to_string()]).unwrap();
        assert_eq!(resolved.prefix, child.prefix);
        assert!(matches!(resolved.options().key_encoding, KeyEncoding::Utf8));
    }

    #[test]
    fn test_status_starts_opening() {
        let dir = TempDir::new().unwrap();
        let root = Db::open(DbOptions::new(dir.path().join("db")));
        assert_eq!(root.status(), Status::Opening);
    }
}
