//! Key and value encoding policy.
//!
//! Encodings are a closed set of variants resolved once when a namespace
//! is constructed, so every operation on that namespace runs a fixed
//! encode/decode pair:
//!
//! - [`KeyEncoding`]: `Utf8` (default), `LexInt` (order-preserving
//!   integers), `Raw` (engine-native bytes), or `Custom`.
//! - [`ValueEncoding`]: `Binary` (self-describing MessagePack, default),
//!   `Raw`, or `Custom`.
//!
//! Keys use direct byte layouts (never MessagePack) so that byte-wise
//! comparison in the engine matches the intended key order.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::value::Value;

// ============================================================================
// Key
// ============================================================================

/// A dynamically typed key addressed within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bytes(Vec<u8>),
    Text(String),
    Int(u64),
}

impl Key {
    /// Borrow the text content, if this is a `Text` key.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer content, if this is an `Int` key.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Key::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(v)
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Key::Int(v)
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Key::Int(v as u64)
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key::Bytes(v)
    }
}

impl From<&[u8]> for Key {
    fn from(v: &[u8]) -> Self {
        Key::Bytes(v.to_vec())
    }
}

// ============================================================================
// Custom codec traits
// ============================================================================

/// Caller-supplied key codec for [`KeyEncoding::Custom`].
pub trait KeyCodec: Send + Sync {
    fn encode(&self, key: &Key) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Key>;
}

/// Caller-supplied value codec for [`ValueEncoding::Custom`].
pub trait ValueCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

// ============================================================================
// KeyEncoding
// ============================================================================

/// How application keys map to engine bytes.
#[derive(Clone)]
pub enum KeyEncoding {
    /// Text keys as UTF-8 bytes; integers stringified; bytes pass through.
    Utf8,
    /// Order-preserving integer encoding (see [`lexint`]).
    LexInt,
    /// Engine-native bytes: text as UTF-8, integers as 8-byte big-endian.
    Raw,
    /// Caller-supplied codec.
    Custom(Arc<dyn KeyCodec>),
}

impl Default for KeyEncoding {
    fn default() -> Self {
        KeyEncoding::Utf8
    }
}

impl fmt::Debug for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Utf8 => f.write_str("Utf8"),
            KeyEncoding::LexInt => f.write_str("LexInt"),
            KeyEncoding::Raw => f.write_str("Raw"),
            KeyEncoding::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl KeyEncoding {
    /// Encode a key to its engine byte representation.
    pub fn encode(&self, key: &Key) -> Result<Vec<u8>> {
        match self {
            KeyEncoding::Utf8 => Ok(match key {
                Key::Text(s) => s.as_bytes().to_vec(),
                Key::Int(n) => n.to_string().into_bytes(),
                Key::Bytes(b) => b.clone(),
            }),
            KeyEncoding::LexInt => match key {
                Key::Int(n) => Ok(lexint::pack(*n)),
                other => bail!("lexint key encoding requires integer keys, got {other:?}"),
            },
            KeyEncoding::Raw => Ok(match key {
                Key::Bytes(b) => b.clone(),
                Key::Text(s) => s.as_bytes().to_vec(),
                Key::Int(n) => n.to_be_bytes().to_vec(),
            }),
            KeyEncoding::Custom(codec) => codec.encode(key),
        }
    }

    /// Decode engine bytes back into a key.
    ///
    /// `Utf8` falls back to `Key::Bytes` for non-UTF-8 input rather than
    /// erroring, since iteration may surface keys written by other
    /// encodings.
    pub fn decode(&self, bytes: &[u8]) -> Result<Key> {
        match self {
            KeyEncoding::Utf8 => Ok(match std::str::from_utf8(bytes) {
                Ok(s) => Key::Text(s.to_string()),
                Err(_) => Key::Bytes(bytes.to_vec()),
            }),
            KeyEncoding::LexInt => lexint::unpack(bytes).map(Key::Int),
            KeyEncoding::Raw => Ok(Key::Bytes(bytes.to_vec())),
            KeyEncoding::Custom(codec) => codec.decode(bytes),
        }
    }
}

// ============================================================================
// ValueEncoding
// ============================================================================

/// How application values map to engine bytes.
#[derive(Clone)]
pub enum ValueEncoding {
    /// Self-describing MessagePack over [`Value`] (the default).
    Binary,
    /// Byte values pass through untouched; anything else is an error.
    Raw,
    /// Caller-supplied codec.
    Custom(Arc<dyn ValueCodec>),
}

impl Default for ValueEncoding {
    fn default() -> Self {
        ValueEncoding::Binary
    }
}

impl fmt::Debug for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueEncoding::Binary => f.write_str("Binary"),
            ValueEncoding::Raw => f.write_str("Raw"),
            ValueEncoding::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl ValueEncoding {
    /// Encode a value to its engine byte representation.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            ValueEncoding::Binary => {
                rmp_serde::to_vec(value).map_err(|e| anyhow::anyhow!("msgpack encode failed: {e}"))
            }
            ValueEncoding::Raw => match value {
                Value::Bytes(b) => Ok(b.clone()),
                Value::Text(s) => Ok(s.as_bytes().to_vec()),
                other => bail!("raw value encoding requires byte or text values, got {other:?}"),
            },
            ValueEncoding::Custom(codec) => codec.encode(value),
        }
    }

    /// Decode engine bytes back into a value.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            ValueEncoding::Binary => rmp_serde::from_slice(bytes)
                .map_err(|e| anyhow::anyhow!("msgpack decode failed: {e}")),
            ValueEncoding::Raw => Ok(Value::Bytes(bytes.to_vec())),
            ValueEncoding::Custom(codec) => codec.decode(bytes),
        }
    }
}

// ============================================================================
// Lexicographic integers
// ============================================================================

/// Order-preserving integer encoding.
///
/// Values up to 119 are a single byte `0x80 + n`. Larger values are a
/// length-prefix byte (`0xF8 + len - 1`, len 1..=8) followed by the
/// minimal big-endian bytes. Byte-wise comparison of two encodings
/// matches numeric comparison for the whole `u64` range: immediates sort
/// below every prefixed form, longer forms carry larger prefixes, and
/// equal lengths compare big-endian.
///
/// The leading byte is always `>= 0x80`, above the ASCII range, so an
/// encoded key can never collide with a namespace separator and get
/// filtered as a child-boundary key.
pub mod lexint {
    use anyhow::{bail, Result};

    /// Largest value encoded as a single immediate byte.
    pub const IMMEDIATE_MAX: u64 = 119;
    /// Leading byte of the smallest immediate; keeps every encoding out
    /// of the ASCII range.
    pub const IMMEDIATE_BASE: u8 = 0x80;
    /// Leading byte of the one-payload-byte prefixed form.
    pub const PREFIX_BASE: u8 = 0xF8;

    /// Encode an integer into its order-preserving byte form.
    pub fn pack(n: u64) -> Vec<u8> {
        if n <= IMMEDIATE_MAX {
            return vec![IMMEDIATE_BASE + n as u8];
        }
        let be = n.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let mut out = Vec::with_capacity(1 + 8 - skip);
        out.push(PREFIX_BASE + (8 - skip - 1) as u8);
        out.extend_from_slice(&be[skip..]);
        out
    }

    /// Decode an order-preserving byte form back into an integer.
    pub fn unpack(bytes: &[u8]) -> Result<u64> {
        let Some((&first, rest)) = bytes.split_first() else {
            bail!("lexint: empty input");
        };
        if first < IMMEDIATE_BASE {
            bail!("lexint: invalid leading byte {first}");
        }
        if first < PREFIX_BASE {
            if !rest.is_empty() {
                bail!("lexint: trailing bytes after immediate");
            }
            return Ok(u64::from(first - IMMEDIATE_BASE));
        }
        let len = (first - PREFIX_BASE) as usize + 1;
        if rest.len() != len {
            bail!("lexint: expected {len} payload bytes, got {}", rest.len());
        }
        let mut be = [0u8; 8];
        be[8 - len..].copy_from_slice(rest);
        Ok(u64::from_be_bytes(be))
    }
}
