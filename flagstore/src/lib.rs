//! Persistent, versioned key-value store client for shared feature-flag
//! data.
//!
//! The client layers an optimistic-concurrency write protocol and an
//! optional read-through cache over any backend implementing the
//! [`ports::StoreBackend`] port. Concurrent writers, in this process or
//! others, can never regress a key to an older version: every write is
//! committed conditionally on the exact record it was compared against.

pub mod cache;
pub mod domain;
pub mod persistence;
pub mod ports;
pub mod store;

pub use domain::{DataKind, JsonKind, StoredItem};
pub use persistence::MemoryBackend;
pub use ports::{CommitOutcome, Precondition, StoreBackend, Transaction, WriteOp};
pub use store::{FullDataSet, PersistentStore, PreWriteHook};
