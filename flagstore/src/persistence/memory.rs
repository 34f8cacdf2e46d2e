use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shared::{Error, Result};
use tokio::sync::Mutex;

use crate::ports::{CommitOutcome, Precondition, StoreBackend, Transaction, WriteOp};

/// In-process reference backend: hash tables and markers behind one lock,
/// providing the same transactional contract a remote backend would.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    offline: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, HashMap<String, Vec<u8>>>,
    markers: HashSet<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a connectivity outage: while offline, every call fails with
    /// [`Error::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("backend is closed".to_string()));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("backend is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn read_field(&self, table: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.check_reachable()?;
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn read_table(&self, table: &str) -> Result<HashMap<String, Vec<u8>>> {
        self.check_reachable()?;
        let state = self.state.lock().await;
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }

    async fn marker_exists(&self, key: &str) -> Result<bool> {
        self.check_reachable()?;
        let state = self.state.lock().await;
        Ok(state.markers.contains(key))
    }

    async fn commit(&self, txn: Transaction) -> Result<CommitOutcome> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;

        // The precondition is checked under the same lock that applies the
        // ops, matching the commit-time evaluation a real backend performs.
        if let Some(precondition) = &txn.precondition {
            let holds = match precondition {
                Precondition::FieldEquals {
                    table,
                    field,
                    expected,
                } => state
                    .tables
                    .get(table)
                    .and_then(|fields| fields.get(field))
                    .is_some_and(|current| current == expected),
                Precondition::FieldAbsent { table, field } => state
                    .tables
                    .get(table)
                    .is_none_or(|fields| !fields.contains_key(field)),
            };
            if !holds {
                return Ok(CommitOutcome::PreconditionFailed);
            }
        }

        for op in txn.ops {
            match op {
                WriteOp::SetField {
                    table,
                    field,
                    value,
                } => {
                    state.tables.entry(table).or_default().insert(field, value);
                }
                WriteOp::ClearTable { table } => {
                    state.tables.remove(&table);
                }
                WriteOp::SetMarker { key } => {
                    state.markers.insert(key);
                }
            }
        }

        Ok(CommitOutcome::Committed)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_field(table: &str, field: &str, value: &[u8]) -> Transaction {
        Transaction {
            ops: vec![WriteOp::SetField {
                table: table.to_string(),
                field: field.to_string(),
                value: value.to_vec(),
            }],
            precondition: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_read_field() {
        let backend = MemoryBackend::new();

        backend.commit(set_field("t", "f", b"v1")).await.unwrap();

        assert_eq!(
            backend.read_field("t", "f").await.unwrap(),
            Some(b"v1".to_vec())
        );
        assert_eq!(backend.read_field("t", "missing").await.unwrap(), None);
        assert_eq!(backend.read_field("missing", "f").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_table_drops_all_fields() {
        let backend = MemoryBackend::new();
        backend.commit(set_field("t", "a", b"1")).await.unwrap();
        backend.commit(set_field("t", "b", b"2")).await.unwrap();

        backend
            .commit(Transaction {
                ops: vec![WriteOp::ClearTable {
                    table: "t".to_string(),
                }],
                precondition: None,
            })
            .await
            .unwrap();

        assert!(backend.read_table("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marker_set_and_exists() {
        let backend = MemoryBackend::new();
        assert!(!backend.marker_exists("m").await.unwrap());

        backend
            .commit(Transaction {
                ops: vec![WriteOp::SetMarker {
                    key: "m".to_string(),
                }],
                precondition: None,
            })
            .await
            .unwrap();

        assert!(backend.marker_exists("m").await.unwrap());
    }

    #[tokio::test]
    async fn test_field_equals_precondition() {
        let backend = MemoryBackend::new();
        backend.commit(set_field("t", "f", b"old")).await.unwrap();

        let guarded = Transaction {
            precondition: Some(Precondition::FieldEquals {
                table: "t".to_string(),
                field: "f".to_string(),
                expected: b"old".to_vec(),
            }),
            ..set_field("t", "f", b"new")
        };
        assert_eq!(
            backend.commit(guarded.clone()).await.unwrap(),
            CommitOutcome::Committed
        );

        // The field no longer equals "old", so the same commit is rejected
        // and the stored value is untouched
        assert_eq!(
            backend.commit(guarded).await.unwrap(),
            CommitOutcome::PreconditionFailed
        );
        assert_eq!(
            backend.read_field("t", "f").await.unwrap(),
            Some(b"new".to_vec())
        );
    }

    #[tokio::test]
    async fn test_field_absent_precondition() {
        let backend = MemoryBackend::new();

        let guarded = Transaction {
            precondition: Some(Precondition::FieldAbsent {
                table: "t".to_string(),
                field: "f".to_string(),
            }),
            ..set_field("t", "f", b"first")
        };
        assert_eq!(
            backend.commit(guarded.clone()).await.unwrap(),
            CommitOutcome::Committed
        );
        assert_eq!(
            backend.commit(guarded).await.unwrap(),
            CommitOutcome::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);

        assert!(matches!(
            backend.read_field("t", "f").await,
            Err(Error::Unavailable(_))
        ));
        assert!(matches!(
            backend.commit(set_field("t", "f", b"v")).await,
            Err(Error::Unavailable(_))
        ));

        backend.set_offline(false);
        assert!(backend.read_field("t", "f").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_permanent() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();

        assert!(matches!(
            backend.marker_exists("m").await,
            Err(Error::Unavailable(_))
        ));
    }
}
