#![deny(clippy::all)]

use std::collections::HashMap;

use async_trait::async_trait;
use shared::Result;

// Ports are the pluggable extension points for backend implementations

/// A single write queued into a backend transaction.
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// Set one field of a hash table.
    SetField {
        table: String,
        field: String,
        value: Vec<u8>,
    },
    /// Drop a table and every field in it.
    ClearTable { table: String },
    /// Write the marker record whose existence signals a completed full load.
    SetMarker { key: String },
}

/// Commit-time guard, evaluated against live backend state.
#[derive(Clone, Debug)]
pub enum Precondition {
    /// The field must still hold exactly these bytes.
    FieldEquals {
        table: String,
        field: String,
        expected: Vec<u8>,
    },
    /// The field must still be absent.
    FieldAbsent { table: String, field: String },
}

/// A batch of writes across any number of tables, committed atomically.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    pub ops: Vec<WriteOp>,
    pub precondition: Option<Precondition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The precondition no longer held at commit time; nothing was written.
    PreconditionFailed,
}

/// Port for hash-oriented keyed storage backends.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Read one field of a table.
    async fn read_field(&self, table: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Read every field of a table.
    async fn read_table(&self, table: &str) -> Result<HashMap<String, Vec<u8>>>;

    /// Check whether a marker record exists.
    async fn marker_exists(&self, key: &str) -> Result<bool>;

    /// Atomically apply a transaction, honoring its precondition.
    async fn commit(&self, txn: Transaction) -> Result<CommitOutcome>;

    /// Release the backend connection; later calls fail as unavailable.
    async fn close(&self) -> Result<()>;
}
