use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use std::str::FromStr;

use ledgerlink_core::sync::{SyncAuditEntry, SyncKind};

use crate::errors::StorageError;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_audit)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncAuditDB {
    pub id: String,
    pub account_id: String,
    pub user_id: String,
    pub kind: String,
    pub synced_count: i64,
    pub new_count: i64,
    pub created_at: NaiveDateTime,
}

impl SyncAuditDB {
    pub fn new(
        account_id: &str,
        user_id: &str,
        kind: SyncKind,
        synced_count: usize,
        new_count: usize,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            kind: kind.as_str().to_string(),
            synced_count: synced_count as i64,
            new_count: new_count as i64,
            created_at,
        }
    }
}

impl TryFrom<SyncAuditDB> for SyncAuditEntry {
    type Error = StorageError;

    fn try_from(db: SyncAuditDB) -> Result<Self, Self::Error> {
        let kind = SyncKind::from_str(&db.kind).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: db.id,
            account_id: db.account_id,
            user_id: db.user_id,
            kind,
            synced_count: db.synced_count,
            new_count: db.new_count,
            created_at: Utc.from_utc_datetime(&db.created_at),
        })
    }
}
