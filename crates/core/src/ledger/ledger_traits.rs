//! Ledger repository trait.

use async_trait::async_trait;

use super::ledger_model::{CommitSummary, LedgerTransaction, NewManualTransaction, SyncCommit};
use crate::errors::Result;

/// Persistence contract for ledger rows and the account fields they drive.
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// Applies every write of one sync atomically.
    ///
    /// Rows are matched on `(account_id, external_id)`: existing rows are
    /// updated in place, others inserted. Cursor, chain, balance, status and
    /// the audit entry are written in the same transaction. A unique-index
    /// race surfaces as `Error::Conflict` with nothing committed.
    async fn commit_sync(&self, commit: SyncCommit) -> Result<CommitSummary>;

    /// Inserts a manual row and adds its amount to the account balance.
    async fn create_manual(&self, new_tx: NewManualTransaction) -> Result<LedgerTransaction>;

    /// Soft-deletes a manual row and subtracts its amount from the balance.
    ///
    /// Archiving an archived row is a no-op.
    async fn archive(&self, uid: &str) -> Result<LedgerTransaction>;

    fn get_by_uid(&self, uid: &str) -> Result<LedgerTransaction>;

    fn list_for_account(
        &self,
        account_id: &str,
        include_archived: bool,
    ) -> Result<Vec<LedgerTransaction>>;
}
