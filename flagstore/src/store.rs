use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use shared::{Error, Result, StoreConfig};
use tracing::debug;

use crate::cache::{CachePolicy, StoreCache};
use crate::domain::{DataKind, StoredItem};
use crate::ports::{CommitOutcome, Precondition, StoreBackend, Transaction, WriteOp};

/// Interception point awaited immediately before each conditional-write
/// attempt. Test harnesses use it to force deterministic write races;
/// production paths are identical with or without one attached.
pub type PreWriteHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Full replacement data for [`PersistentStore::init`]: each collection with
/// its complete desired set of items.
pub type FullDataSet<'a> = Vec<(&'a dyn DataKind, Vec<StoredItem>)>;

const INITED_FLAG_KEY: &str = "$inited";

/// Persistent, versioned store client: optimistic concurrency on writes and
/// an optional read-through cache on reads.
///
/// Correctness against concurrent writers (in this process or others) comes
/// entirely from the backend's conditional commit; the client holds no locks
/// across operations and is safe to share behind an `Arc`.
pub struct PersistentStore {
    backend: Arc<dyn StoreBackend>,
    prefix: String,
    items: StoreCache<Option<StoredItem>>,
    inited: StoreCache<bool>,
    pre_write: Option<PreWriteHook>,
}

impl PersistentStore {
    /// Create a client over `backend`, namespaced by `prefix`. A `cache_ttl`
    /// of `None` disables the per-item cache; answers are identical either
    /// way, only latency differs.
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        prefix: impl Into<String>,
        cache_ttl: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            items: StoreCache::new(cache_ttl.map_or(CachePolicy::Disabled, CachePolicy::Ttl)),
            // Once observed true, the initialization flag holds for the
            // client's lifetime
            inited: StoreCache::new(CachePolicy::Infinite),
            pre_write: None,
        }
    }

    pub fn with_config(backend: Arc<dyn StoreBackend>, config: &StoreConfig) -> Self {
        Self::new(backend, config.prefix.clone(), config.cache_ttl)
    }

    /// Attach a pre-write interception hook.
    pub fn with_pre_write_hook(mut self, hook: PreWriteHook) -> Self {
        self.pre_write = Some(hook);
        self
    }

    fn table_key(&self, kind: &dyn DataKind) -> String {
        format!("{}:{}", self.prefix, kind.name())
    }

    fn inited_key(&self) -> String {
        format!("{}:{}", self.prefix, INITED_FLAG_KEY)
    }

    fn item_cache_key(kind: &dyn DataKind, key: &str) -> String {
        format!("{}:{}", kind.name(), key)
    }

    /// True once a full data load has completed against this backend
    /// keyspace. A true answer is memoized forever; a false answer sends the
    /// next call back to the backend.
    pub async fn initialized(&self) -> Result<bool> {
        if let Some(flag) = self.inited.get(INITED_FLAG_KEY).await {
            return Ok(flag);
        }
        let present = self.backend.marker_exists(&self.inited_key()).await?;
        if present {
            self.inited.set(INITED_FLAG_KEY, true).await;
        }
        Ok(present)
    }

    /// Atomically replace every supplied collection and mark the store
    /// initialized. Observers see the prior state or the fully replaced
    /// state, never a partial mix across collections.
    pub async fn init(&self, data: FullDataSet<'_>) -> Result<()> {
        let mut ops = Vec::new();
        for (kind, items) in &data {
            let table = self.table_key(*kind);
            ops.push(WriteOp::ClearTable {
                table: table.clone(),
            });
            for item in items {
                ops.push(WriteOp::SetField {
                    table: table.clone(),
                    field: item.key.clone(),
                    value: item.raw.clone(),
                });
            }
        }
        ops.push(WriteOp::SetMarker {
            key: self.inited_key(),
        });

        let outcome = self
            .backend
            .commit(Transaction {
                ops,
                precondition: None,
            })
            .await?;
        if outcome == CommitOutcome::PreconditionFailed {
            return Err(Error::Internal(
                "unconditional commit reported a failed precondition".to_string(),
            ));
        }

        self.inited.set(INITED_FLAG_KEY, true).await;

        // Entries cached before the replacement may describe keys the new
        // data set no longer contains; drop everything before priming
        self.items.flush();
        for (kind, items) in &data {
            for item in items {
                self.items
                    .set(&Self::item_cache_key(*kind, &item.key), Some(item.clone()))
                    .await;
            }
        }
        Ok(())
    }

    /// Fetch one item. Deleted and missing records both read as absent.
    pub async fn get(&self, kind: &dyn DataKind, key: &str) -> Result<Option<StoredItem>> {
        let cache_key = Self::item_cache_key(kind, key);
        let record = self
            .items
            .get_or_compute(&cache_key, || self.read_item(kind, key))
            .await?;
        // The cache keeps tombstones so their version can block older
        // writes; callers never see them
        Ok(record.filter(|item| !item.deleted))
    }

    async fn read_item(&self, kind: &dyn DataKind, key: &str) -> Result<Option<StoredItem>> {
        let table = self.table_key(kind);
        match self.backend.read_field(&table, key).await? {
            Some(raw) => Ok(Some(kind.decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Fetch a whole collection, tombstones excluded. Always reads the
    /// backend in one request; the per-item cache is not consulted.
    pub async fn all(&self, kind: &dyn DataKind) -> Result<HashMap<String, StoredItem>> {
        let table = self.table_key(kind);
        let fields = self.backend.read_table(&table).await?;
        let mut items = HashMap::with_capacity(fields.len());
        for (field, raw) in fields {
            let item = kind.decode(&field, &raw)?;
            if !item.deleted {
                items.insert(field, item);
            }
        }
        Ok(items)
    }

    /// Write `item` unless the backend already holds that key at the same or
    /// a newer version. Returns whether the write was applied; a stale write
    /// is a normal outcome, not an error.
    ///
    /// A lost race against a concurrent writer restarts the attempt
    /// immediately; transport failures are never retried here.
    pub async fn upsert(&self, kind: &dyn DataKind, item: StoredItem) -> Result<bool> {
        let table = self.table_key(kind);
        let cache_key = Self::item_cache_key(kind, &item.key);
        loop {
            // The version comparison must run against live backend state,
            // not the cache, or a lost update could slip through
            let prior = self.backend.read_field(&table, &item.key).await?;
            if let Some(raw) = &prior {
                let current = kind.decode(&item.key, raw)?;
                if current.version >= item.version {
                    debug!(
                        "Not applying stale write for key '{}' in '{}' (stored v{}, submitted v{})",
                        item.key,
                        kind.name(),
                        current.version,
                        item.version
                    );
                    // Readers should see the winning record, not the
                    // rejected one
                    self.items.set(&cache_key, Some(current)).await;
                    return Ok(false);
                }
            }

            if let Some(hook) = &self.pre_write {
                hook().await;
            }

            let precondition = match prior {
                Some(expected) => Precondition::FieldEquals {
                    table: table.clone(),
                    field: item.key.clone(),
                    expected,
                },
                None => Precondition::FieldAbsent {
                    table: table.clone(),
                    field: item.key.clone(),
                },
            };
            let txn = Transaction {
                ops: vec![WriteOp::SetField {
                    table: table.clone(),
                    field: item.key.clone(),
                    value: item.raw.clone(),
                }],
                precondition: Some(precondition),
            };

            match self.backend.commit(txn).await? {
                CommitOutcome::Committed => {
                    self.items.set(&cache_key, Some(item)).await;
                    return Ok(true);
                }
                CommitOutcome::PreconditionFailed => {
                    debug!(
                        "Lost write race for key '{}' in '{}', retrying",
                        item.key,
                        kind.name()
                    );
                }
            }
        }
    }

    /// Remove an item by writing its tombstone. Versioning rules are the
    /// same as for [`PersistentStore::upsert`].
    pub async fn delete(&self, kind: &dyn DataKind, key: &str, version: u64) -> Result<bool> {
        self.upsert(kind, kind.tombstone(key, version)).await
    }

    /// Advisory liveness probe: one harmless backend read with every error
    /// collapsed to `false`. Bypasses the memoized initialization flag so
    /// the answer reflects live connectivity.
    pub async fn is_available(&self) -> bool {
        self.backend.marker_exists(&self.inited_key()).await.is_ok()
    }

    /// Release the backend connection. Operations after this fail as
    /// unavailable.
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}
