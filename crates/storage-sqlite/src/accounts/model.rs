//! Database model for accounts.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use ledgerlink_core::accounts::{Account, AccountType, NewAccount, SyncStatus};

use crate::errors::StorageError;

/// Database model for accounts
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountDB {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub provider: Option<String>,
    pub secret_ref: Option<String>,
    pub currency: String,
    pub balance: String,
    pub sync_status: String,
    pub sync_cursor: Option<String>,
    pub sync_chain: Option<String>,
    pub chain: Option<String>,
    pub address: Option<String>,
    pub account_mask: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Columns a sync commit may touch. `None` leaves a column unchanged;
/// `Some(None)` writes NULL.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::accounts)]
pub struct AccountSyncChangeset {
    pub sync_status: Option<String>,
    pub sync_cursor: Option<Option<String>>,
    pub sync_chain: Option<Option<String>>,
    pub balance: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

impl AccountDB {
    pub fn parsed_balance(&self) -> Result<Decimal, StorageError> {
        Decimal::from_str(&self.balance).map_err(|e| {
            StorageError::Corrupt(format!("balance of account {}: {}", self.id, e))
        })
    }
}

impl TryFrom<AccountDB> for Account {
    type Error = StorageError;

    fn try_from(db: AccountDB) -> Result<Self, Self::Error> {
        let balance = db.parsed_balance()?;
        let account_type = AccountType::from_str(&db.account_type)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let sync_status = SyncStatus::from_str(&db.sync_status)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            account_type,
            provider: db.provider,
            secret_ref: db.secret_ref,
            currency: db.currency,
            balance,
            sync_status,
            sync_cursor: db.sync_cursor,
            sync_chain: db.sync_chain,
            chain: db.chain,
            address: db.address,
            account_mask: db.account_mask,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

impl From<NewAccount> for AccountDB {
    fn from(domain: NewAccount) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: domain
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: domain.user_id,
            name: domain.name,
            account_type: domain.account_type.as_str().to_string(),
            provider: domain.provider,
            secret_ref: domain.secret_ref,
            currency: domain.currency,
            balance: domain.balance.to_string(),
            sync_status: SyncStatus::Idle.as_str().to_string(),
            sync_cursor: None,
            sync_chain: None,
            chain: domain.chain,
            address: domain.address,
            account_mask: domain.account_mask,
            created_at: now,
            updated_at: now,
        }
    }
}
