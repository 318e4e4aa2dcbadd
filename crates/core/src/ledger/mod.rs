//! Ledger reconciliation: sign law, categorization, idempotent upserts and
//! manual-entry balance tracking.

mod ledger_model;
mod ledger_service;
mod ledger_traits;
mod reconcile;

pub use ledger_model::{
    AuditStamp, CommitSummary, CursorUpdate, LedgerTransaction, LedgerUpsert,
    NewManualTransaction, SyncCommit,
};
pub use ledger_service::{LedgerService, SyncBatch};
pub use ledger_traits::LedgerRepositoryTrait;
pub use reconcile::{apply_sign, prepare_upserts};
