//! Ledger domain models.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accounts::SyncStatus;
use crate::errors::{Result, ValidationError};
use crate::sync::SyncKind;
use crate::transactions::TxType;

/// A persisted, reconciled ledger row.
///
/// Synced rows always carry `external_id`; manual rows never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub uid: String,
    pub account_id: String,
    pub ts: DateTime<Utc>,
    /// Signed: negative leaves the account.
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub counterparty: Option<String>,
    pub tx_type: Option<TxType>,
    pub external_id: Option<String>,
    pub is_manual: bool,
    pub archived: bool,
    pub raw: Option<Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Mutable fields of a synced row, keyed by `(account_id, external_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpsert {
    pub external_id: String,
    pub ts: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub counterparty: Option<String>,
    pub tx_type: TxType,
    pub raw: Value,
}

/// What to do with the account's stored cursor when a sync commits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CursorUpdate {
    /// Leave cursor and chain as they are.
    #[default]
    Keep,
    /// Overwrite both; `cursor: None` clears it.
    Replace {
        cursor: Option<String>,
        chain: Option<String>,
    },
}

/// Who triggered a sync, recorded in the audit trail on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    pub user_id: String,
    pub kind: SyncKind,
}

/// Everything one sync call persists, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct SyncCommit {
    pub account_id: String,
    pub upserts: Vec<LedgerUpsert>,
    pub cursor: CursorUpdate,
    /// Live balance reported by the provider, when known.
    pub balance: Option<Decimal>,
    pub status: SyncStatus,
    pub audit: Option<AuditStamp>,
}

/// Rows touched vs. rows newly created by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub touched: usize,
    pub inserted: usize,
}

/// Input for a user-entered ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewManualTransaction {
    pub account_id: String,
    pub ts: DateTime<Utc>,
    pub amount: Decimal,
    /// Defaults to the account currency.
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl NewManualTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(ValidationError::MissingField("accountId".to_string()).into());
        }
        if self.amount.is_zero() {
            return Err(ValidationError::InvalidInput(
                "Manual transaction amount must not be zero".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
