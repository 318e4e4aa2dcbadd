use log::{debug, info};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::ledger_model::{
    AuditStamp, CommitSummary, CursorUpdate, LedgerTransaction, NewManualTransaction, SyncCommit,
};
use super::ledger_traits::LedgerRepositoryTrait;
use super::reconcile::prepare_upserts;
use crate::accounts::{Account, SyncStatus};
use crate::categories::CategoryService;
use crate::errors::Result;
use crate::transactions::NormalizedTransaction;

/// Result of one sync's fetch loop, ready to reconcile.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    pub transactions: Vec<NormalizedTransaction>,
    pub cursor: CursorUpdate,
    pub balance: Option<Decimal>,
    pub status: SyncStatus,
    pub audit: Option<AuditStamp>,
}

/// Reconciles fetched transactions and manual entries into the ledger.
pub struct LedgerService {
    repository: Arc<dyn LedgerRepositoryTrait>,
    categories: Arc<CategoryService>,
}

impl LedgerService {
    pub fn new(
        repository: Arc<dyn LedgerRepositoryTrait>,
        categories: Arc<CategoryService>,
    ) -> Self {
        Self {
            repository,
            categories,
        }
    }

    /// Signs, categorizes and upserts a fetched batch in one commit.
    pub async fn reconcile(&self, account: &Account, batch: SyncBatch) -> Result<CommitSummary> {
        let rules = self.categories.rule_set(&account.user_id)?;
        let upserts = prepare_upserts(&batch.transactions, &rules);
        debug!(
            "Reconciling {} fetched transactions ({} unique) for account {}",
            batch.transactions.len(),
            upserts.len(),
            account.id
        );

        let summary = self
            .repository
            .commit_sync(SyncCommit {
                account_id: account.id.clone(),
                upserts,
                cursor: batch.cursor,
                balance: batch.balance,
                status: batch.status,
                audit: batch.audit,
            })
            .await?;

        info!(
            "Account {}: {} rows touched, {} new",
            account.id, summary.touched, summary.inserted
        );
        Ok(summary)
    }

    pub async fn create_manual_transaction(
        &self,
        new_tx: NewManualTransaction,
    ) -> Result<LedgerTransaction> {
        new_tx.validate()?;
        self.repository.create_manual(new_tx).await
    }

    pub async fn archive_transaction(&self, uid: &str) -> Result<LedgerTransaction> {
        self.repository.archive(uid).await
    }

    pub fn list_transactions(
        &self,
        account_id: &str,
        include_archived: bool,
    ) -> Result<Vec<LedgerTransaction>> {
        self.repository.list_for_account(account_id, include_archived)
    }
}
