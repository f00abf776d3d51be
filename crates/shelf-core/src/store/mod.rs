//! Record repository abstraction.
//!
//! The [`RecordStore`] trait is the only arbiter of "already known". It is
//! scoped to one source (one table), answers existence checks for a whole
//! page in one round-trip, and hands out [`StoreTx`] units of work whose
//! inserts become visible all together or not at all.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::StoredRecord;

/// Durable storage for the records of one source.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists_batch`](RecordStore::exists_batch) | Which of these ids are stored? One bulk query. |
/// | [`begin`](RecordStore::begin) | Open an all-or-nothing unit of work |
/// | [`get`](RecordStore::get) | Read one stored record |
/// | [`count`](RecordStore::count) | Number of stored records |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Return the subset of `ids` that is already stored.
    ///
    /// Must be answered with a single query regardless of how many ids are
    /// passed.
    async fn exists_batch(&self, ids: &HashSet<String>)
        -> Result<HashSet<String>, PersistenceError>;

    /// Start a unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, PersistenceError>;

    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, PersistenceError>;

    async fn count(&self) -> Result<u64, PersistenceError>;
}

/// One unit of work against a [`RecordStore`].
///
/// Nothing staged through [`insert_many`](StoreTx::insert_many) is visible
/// before [`commit`](StoreTx::commit). Dropping the transaction without
/// committing discards everything it staged.
#[async_trait]
pub trait StoreTx: Send {
    /// Stage records for insertion. A record whose id is already stored is a
    /// constraint failure, never an update.
    async fn insert_many(&mut self, records: &[StoredRecord]) -> Result<(), PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}
