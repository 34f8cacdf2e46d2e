use serde::{Deserialize, Serialize};
use shared::{Error, Result};

/// One versioned record in a collection, exactly as the backend holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredItem {
    /// Unique within the item's collection.
    pub key: String,
    /// Caller-assigned, monotonically increasing. The store never generates
    /// versions, it only compares them.
    pub version: u64,
    /// Tombstone marker. Deleted records stay in the backend so their
    /// version can block older writes.
    pub deleted: bool,
    /// Encoded record bytes. Conditional writes compare these byte-for-byte.
    pub raw: Vec<u8>,
}

impl StoredItem {
    pub fn new(key: impl Into<String>, version: u64, deleted: bool, raw: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            version,
            deleted,
            raw,
        }
    }
}

/// An externally-defined collection ("kind") of versioned items.
///
/// The core only needs the collection's stable name, a decoder for raw
/// record bytes, and the deleted placeholder written in place of removed
/// items.
pub trait DataKind: Send + Sync {
    /// Stable collection name, used to derive backend table keys.
    fn name(&self) -> &str;

    /// Decode a raw backend record for `key` into its item.
    fn decode(&self, key: &str, raw: &[u8]) -> Result<StoredItem>;

    /// Build the tombstone stored in place of a removed item.
    fn tombstone(&self, key: &str, version: u64) -> StoredItem;
}

/// Record envelope used by [`JsonKind`].
#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    payload: serde_json::Value,
}

/// [`DataKind`] over a JSON envelope: `{"version", "deleted", "payload"}`.
///
/// The payload stays opaque to the store; only `version` and `deleted` are
/// interpreted.
pub struct JsonKind {
    name: &'static str,
}

impl JsonKind {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Encode a live item carrying `payload`.
    pub fn item(&self, key: &str, version: u64, payload: serde_json::Value) -> Result<StoredItem> {
        let raw = serde_json::to_vec(&Envelope {
            version,
            deleted: false,
            payload,
        })
        .map_err(|e| Error::Internal(format!("Failed to encode record: {}", e)))?;
        Ok(StoredItem::new(key, version, false, raw))
    }
}

impl DataKind for JsonKind {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, key: &str, raw: &[u8]) -> Result<StoredItem> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| Error::Malformed(key.to_string(), e.to_string()))?;
        Ok(StoredItem::new(
            key,
            envelope.version,
            envelope.deleted,
            raw.to_vec(),
        ))
    }

    fn tombstone(&self, key: &str, version: u64) -> StoredItem {
        let raw = format!(r#"{{"version":{},"deleted":true}}"#, version).into_bytes();
        StoredItem::new(key, version, true, raw)
    }
}
