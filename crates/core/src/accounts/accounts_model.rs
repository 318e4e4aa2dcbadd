//! Account domain models.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{errors::ValidationError, Error, Result};

/// How an account is synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Bank account reached through the aggregation API.
    Traditional,
    /// Brokerage account reached through the aggregation API.
    Investment,
    /// Self-custodied blockchain address.
    Web3,
    /// Centralized exchange account.
    Cex,
    /// Manually tracked, never synced.
    Manual,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Traditional => "traditional",
            AccountType::Investment => "investment",
            AccountType::Web3 => "web3",
            AccountType::Cex => "cex",
            AccountType::Manual => "manual",
        }
    }

    /// Accounts backed by the bank-aggregation adapter.
    pub fn is_bank(&self) -> bool {
        matches!(self, AccountType::Traditional | AccountType::Investment)
    }

    pub fn is_syncable(&self) -> bool {
        !matches!(self, AccountType::Manual)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "traditional" => Ok(AccountType::Traditional),
            "investment" => Ok(AccountType::Investment),
            "web3" => Ok(AccountType::Web3),
            "cex" => Ok(AccountType::Cex),
            "manual" => Ok(AccountType::Manual),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown account type '{}'",
                other
            ))),
        }
    }
}

/// Advisory marker for an account's sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncStatus::Idle),
            "syncing" => Ok(SyncStatus::Syncing),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown sync status '{}'",
                other
            ))),
        }
    }
}

/// Domain model representing an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub account_type: AccountType,
    /// Aggregator or exchange identifier (e.g. `plaid`, `kraken`).
    pub provider: Option<String>,
    /// Opaque reference into the secret store.
    pub secret_ref: Option<String>,
    pub currency: String,
    pub balance: Decimal,
    pub sync_status: SyncStatus,
    /// Adapter-owned pagination cursor.
    pub sync_cursor: Option<String>,
    /// Chain the cursor was issued for.
    pub sync_chain: Option<String>,
    /// CAIP-2 chain id for web3 accounts (e.g. `eip155:1`).
    pub chain: Option<String>,
    pub address: Option<String>,
    /// Masked account number used to match bank sub-accounts.
    pub account_mask: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// The stored cursor, if it was issued for the account's current chain.
    ///
    /// A chain change invalidates the cursor and forces a fresh sync.
    pub fn trusted_cursor(&self) -> Option<&str> {
        match (&self.sync_cursor, &self.sync_chain, &self.chain) {
            (Some(cursor), Some(cursor_chain), Some(chain)) if cursor_chain == chain => {
                Some(cursor.as_str())
            }
            _ => None,
        }
    }

    /// True when the persisted cursor belongs to another chain.
    pub fn chain_changed(&self) -> bool {
        self.sync_chain.is_some() && self.sync_chain != self.chain
    }
}

/// Input model for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub account_type: AccountType,
    pub provider: Option<String>,
    pub secret_ref: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub balance: Decimal,
    pub chain: Option<String>,
    pub address: Option<String>,
    pub account_mask: Option<String>,
}

impl NewAccount {
    /// Validates that the account carries what its sync path needs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "name".to_string(),
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "currency".to_string(),
            )));
        }
        match self.account_type {
            AccountType::Web3 => {
                require(&self.chain, "chain")?;
                require(&self.address, "address")?;
            }
            AccountType::Cex => {
                require(&self.provider, "provider")?;
                require(&self.secret_ref, "secretRef")?;
            }
            AccountType::Traditional | AccountType::Investment => {
                require(&self.secret_ref, "secretRef")?;
            }
            AccountType::Manual => {}
        }
        Ok(())
    }
}

fn require(value: &Option<String>, field: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(Error::Validation(ValidationError::MissingField(
            field.to_string(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn web3_account() -> Account {
        let now = chrono::Utc::now().naive_utc();
        Account {
            id: "acc-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Cold wallet".to_string(),
            account_type: AccountType::Web3,
            provider: None,
            secret_ref: None,
            currency: "USD".to_string(),
            balance: dec!(0),
            sync_status: SyncStatus::Idle,
            sync_cursor: Some(r#"{"offset":100}"#.to_string()),
            sync_chain: Some("eip155:1".to_string()),
            chain: Some("eip155:1".to_string()),
            address: Some("0xabc".to_string()),
            account_mask: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cursor_is_trusted_on_the_same_chain() {
        let account = web3_account();
        assert_eq!(account.trusted_cursor(), Some(r#"{"offset":100}"#));
        assert!(!account.chain_changed());
    }

    #[test]
    fn chain_change_invalidates_cursor() {
        let mut account = web3_account();
        account.chain = Some("eip155:137".to_string());
        assert_eq!(account.trusted_cursor(), None);
        assert!(account.chain_changed());
    }

    #[test]
    fn cursor_without_chain_is_not_trusted() {
        let mut account = web3_account();
        account.sync_chain = None;
        assert_eq!(account.trusted_cursor(), None);
    }

    #[test]
    fn web3_accounts_need_an_address() {
        let new_account = NewAccount {
            id: None,
            user_id: "user-1".to_string(),
            name: "Wallet".to_string(),
            account_type: AccountType::Web3,
            provider: None,
            secret_ref: None,
            currency: "USD".to_string(),
            balance: dec!(0),
            chain: Some("eip155:1".to_string()),
            address: None,
            account_mask: None,
        };
        assert!(matches!(
            new_account.validate(),
            Err(Error::Validation(ValidationError::MissingField(ref f))) if f == "address"
        ));
    }

    #[test]
    fn account_type_round_trips_through_str() {
        for t in [
            AccountType::Traditional,
            AccountType::Investment,
            AccountType::Web3,
            AccountType::Cex,
            AccountType::Manual,
        ] {
            assert_eq!(t.as_str().parse::<AccountType>().unwrap(), t);
        }
        assert!(AccountType::Investment.is_bank());
        assert!(!AccountType::Manual.is_syncable());
    }
}
