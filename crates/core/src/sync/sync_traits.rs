use chrono::{DateTime, Utc};

use super::sync_audit_model::{SyncAuditEntry, SyncKind};
use crate::errors::Result;

/// Read side of the sync audit trail; entries are written by the ledger commit.
pub trait SyncAuditRepositoryTrait: Send + Sync {
    /// Number of `kind` syncs by `user_id` since `since`.
    fn count_since(&self, user_id: &str, kind: SyncKind, since: DateTime<Utc>) -> Result<u32>;

    fn list_for_account(&self, account_id: &str, limit: i64) -> Result<Vec<SyncAuditEntry>>;
}
