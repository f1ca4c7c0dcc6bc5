//! The persistence port.
//!
//! Migrators never talk to the web application's storage directly; they
//! go through [`Store`], which exposes lookup-by-natural-key,
//! staged transactional insertion, and delete-by-primary-key. The
//! production implementation is [`crate::store_sqlite::SqliteStore`];
//! tests inject [`crate::store_memory::MemoryStore`].

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    Domain, MigrationRun, NaturalKey, RecordId, RunSummary, StagedWrite, ValidatedRecord,
};

#[async_trait]
pub trait Store: Send + Sync {
    /// Does a row with this natural key already exist?
    async fn exists(&self, key: &NaturalKey) -> Result<bool, StoreError>;

    /// Insert every staged write inside one open transaction and report
    /// the primary keys the inserts produced. The transaction stays open
    /// until [`StagedRun::commit`] or [`StagedRun::abort`]; dropping the
    /// handle rolls back. Either all staged rows commit or none do.
    async fn stage(&self, writes: &[StagedWrite]) -> Result<Box<dyn StagedRun>, StoreError>;

    /// Delete exactly these primary keys in one transaction. Returns the
    /// number of rows actually removed.
    async fn delete(&self, ids: &[RecordId]) -> Result<u64, StoreError>;

    /// Run history for one user, newest first.
    async fn list_runs(&self, user_id: &str) -> Result<Vec<RunSummary>, StoreError>;

    /// Transition a committed run to reverted after a successful rollback.
    async fn mark_run_reverted(&self, run_id: &str) -> Result<(), StoreError>;

    /// All committed rows of one domain for one user, in date order.
    /// Workout sessions are flattened back to one record per exercise.
    async fn export_rows(
        &self,
        domain: Domain,
        user_id: &str,
    ) -> Result<Vec<ValidatedRecord>, StoreError>;
}

/// An open, fully staged transaction.
#[async_trait]
pub trait StagedRun: Send {
    /// Primary keys of every row this transaction would insert, in
    /// staging order.
    fn record_ids(&self) -> &[RecordId];

    /// Commit the staged rows together with the finalized run summary.
    async fn commit(self: Box<Self>, run: &MigrationRun) -> Result<(), StoreError>;

    /// Roll the transaction back; nothing is persisted.
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
