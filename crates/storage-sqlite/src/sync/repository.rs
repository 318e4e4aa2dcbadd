use diesel::dsl::count_star;
use diesel::prelude::*;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerlink_core::errors::Result;
use ledgerlink_core::sync::{SyncAuditEntry, SyncAuditRepositoryTrait, SyncKind};

use crate::db::{get_connection, DbPool};
use crate::errors::IntoCore;
use crate::schema::sync_audit;

use super::model::SyncAuditDB;

/// Reads the audit trail written by ledger commits.
pub struct SyncAuditRepository {
    pool: Arc<DbPool>,
}

impl SyncAuditRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl SyncAuditRepositoryTrait for SyncAuditRepository {
    fn count_since(&self, user_id: &str, kind: SyncKind, since: DateTime<Utc>) -> Result<u32> {
        let mut conn = get_connection(&self.pool)?;

        let count: i64 = sync_audit::table
            .filter(sync_audit::user_id.eq(user_id))
            .filter(sync_audit::kind.eq(kind.as_str()))
            .filter(sync_audit::created_at.ge(since.naive_utc()))
            .select(count_star())
            .first(&mut conn)
            .into_core()?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn list_for_account(&self, account_id: &str, limit: i64) -> Result<Vec<SyncAuditEntry>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = sync_audit::table
            .filter(sync_audit::account_id.eq(account_id))
            .order(sync_audit::created_at.desc())
            .limit(limit)
            .select(SyncAuditDB::as_select())
            .load::<SyncAuditDB>(&mut conn)
            .into_core()?;

        rows.into_iter()
            .map(|row| SyncAuditEntry::try_from(row).map_err(Into::into))
            .collect()
    }
}
