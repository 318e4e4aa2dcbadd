//! Database model for ledger rows.

use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use ledgerlink_core::ledger::{LedgerTransaction, LedgerUpsert, NewManualTransaction};
use ledgerlink_core::transactions::TxType;

use crate::errors::StorageError;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(primary_key(uid))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerRowDB {
    pub uid: String,
    pub account_id: String,
    pub ts: NaiveDateTime,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub counterparty: Option<String>,
    pub tx_type: Option<String>,
    pub external_id: Option<String>,
    pub is_manual: bool,
    pub archived: bool,
    pub raw: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields a re-sync overwrites on an existing row.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::transactions)]
pub struct LedgerRowChangeset {
    pub ts: NaiveDateTime,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub counterparty: Option<String>,
    pub tx_type: Option<String>,
    pub raw: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl LedgerRowDB {
    pub fn parsed_amount(&self) -> Result<Decimal, StorageError> {
        Decimal::from_str(&self.amount)
            .map_err(|e| StorageError::Corrupt(format!("amount of row {}: {}", self.uid, e)))
    }

    pub fn synced(account_id: &str, upsert: &LedgerUpsert, now: NaiveDateTime) -> Self {
        Self {
            uid: uuid::Uuid::now_v7().to_string(),
            account_id: account_id.to_string(),
            ts: upsert.ts.naive_utc(),
            amount: upsert.amount.to_string(),
            currency: upsert.currency.clone(),
            category: upsert.category.clone(),
            description: upsert.description.clone(),
            counterparty: upsert.counterparty.clone(),
            tx_type: Some(upsert.tx_type.as_str().to_string()),
            external_id: Some(upsert.external_id.clone()),
            is_manual: false,
            archived: false,
            raw: Some(upsert.raw.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn manual(new_tx: NewManualTransaction, currency: String, category: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            uid: uuid::Uuid::now_v7().to_string(),
            account_id: new_tx.account_id,
            ts: new_tx.ts.naive_utc(),
            amount: new_tx.amount.to_string(),
            currency,
            category,
            description: new_tx.description,
            counterparty: None,
            tx_type: None,
            external_id: None,
            is_manual: true,
            archived: false,
            raw: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl LedgerRowChangeset {
    pub fn from_upsert(upsert: &LedgerUpsert, now: NaiveDateTime) -> Self {
        Self {
            ts: upsert.ts.naive_utc(),
            amount: upsert.amount.to_string(),
            currency: upsert.currency.clone(),
            category: upsert.category.clone(),
            description: upsert.description.clone(),
            counterparty: upsert.counterparty.clone(),
            tx_type: Some(upsert.tx_type.as_str().to_string()),
            raw: Some(upsert.raw.to_string()),
            updated_at: now,
        }
    }
}

impl TryFrom<LedgerRowDB> for LedgerTransaction {
    type Error = StorageError;

    fn try_from(db: LedgerRowDB) -> Result<Self, Self::Error> {
        let amount = db.parsed_amount()?;
        let tx_type = db
            .tx_type
            .as_deref()
            .map(TxType::from_str)
            .transpose()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let raw = db
            .raw
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("raw payload of row {}: {}", db.uid, e)))?;
        Ok(Self {
            uid: db.uid,
            account_id: db.account_id,
            ts: Utc.from_utc_datetime(&db.ts),
            amount,
            currency: db.currency,
            category: db.category,
            description: db.description,
            counterparty: db.counterparty,
            tx_type,
            external_id: db.external_id,
            is_manual: db.is_manual,
            archived: db.archived,
            raw,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}
