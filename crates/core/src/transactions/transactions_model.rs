//! Canonical transaction model shared by every source adapter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// Kind of movement a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Deposit,
    Withdrawal,
    Transfer,
    Trade,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Deposit => "deposit",
            TxType::Withdrawal => "withdrawal",
            TxType::Transfer => "transfer",
            TxType::Trade => "trade",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TxType::Deposit),
            "withdrawal" => Ok(TxType::Withdrawal),
            "transfer" => Ok(TxType::Transfer),
            "trade" => Ok(TxType::Trade),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown transaction type '{}'",
                other
            ))),
        }
    }
}

/// Whether value moves into or out of the watched account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inflow => "inflow",
            Direction::Outflow => "outflow",
        }
    }

    /// Direction implied by the sign of a net balance change.
    ///
    /// Returns `None` for zero so callers can skip no-op movements.
    pub fn from_net(net: Decimal) -> Option<Self> {
        if net.is_sign_positive() && !net.is_zero() {
            Some(Direction::Inflow)
        } else if net.is_sign_negative() && !net.is_zero() {
            Some(Direction::Outflow)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inflow" | "in" | "incoming" => Ok(Direction::Inflow),
            "outflow" | "out" | "outgoing" => Ok(Direction::Outflow),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown direction '{}'",
                other
            ))),
        }
    }
}

/// The normalized record every adapter produces.
///
/// `direction` is `None` only for bank-aggregation rows, whose amount already
/// carries the ledger sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub amount: Decimal,
    pub currency_code: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub tx_id: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_units: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_symbol: Option<String>,
    #[serde(default)]
    pub raw: Value,
    /// Fiat rendering attached by an optional converter. Never used for ledger math.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_amount: Option<String>,
}

impl NormalizedTransaction {
    pub fn is_inbound(&self) -> bool {
        match self.direction {
            Some(direction) => direction == Direction::Inflow,
            None => !self.amount.is_sign_negative(),
        }
    }
}
