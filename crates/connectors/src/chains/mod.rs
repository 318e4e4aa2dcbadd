//! Blockchain adapters, one module per network family.
//!
//! Every adapter pages newest-first and stops at the sync window's start:
//! items older than that are dropped and no further cursor is issued.
//! Direction always comes from the data (address equality, input/output
//! sums, balance diffs).

#[cfg(feature = "bitcoin")]
pub mod bitcoin;
#[cfg(feature = "cardano")]
pub mod cardano;
#[cfg(feature = "evm")]
pub mod evm;
#[cfg(feature = "solana")]
pub mod solana;
#[cfg(feature = "tron")]
pub mod tron;
#[cfg(feature = "xrpl")]
pub mod xrpl;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use ledgerlink_core::transactions::{Direction, NormalizedTransaction};

use crate::client::canonical;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;
use crate::settings::ConnectorSettings;
use crate::throttle::ThrottleRegistry;

/// A CAIP-2 chain id split into namespace and reference (`eip155` / `1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRef {
    pub namespace: String,
    pub reference: String,
}

impl ChainRef {
    pub fn parse(chain: &str) -> Result<Self> {
        let (namespace, reference) = chain
            .trim()
            .split_once(':')
            .ok_or_else(|| ConnectorError::Validation(format!("Invalid chain id '{}'", chain)))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ConnectorError::Validation(format!(
                "Invalid chain id '{}'",
                chain
            )));
        }
        Ok(Self {
            namespace: namespace.to_ascii_lowercase(),
            reference: reference.to_string(),
        })
    }
}

/// Shared pieces a chain builder wires into its sources.
pub(crate) struct SourceKit<'a> {
    pub settings: &'a ConnectorSettings,
    pub throttles: &'a ThrottleRegistry,
}

impl SourceKit<'_> {
    pub(crate) fn http(&self, provider: &'static str) -> HttpClient {
        HttpClient::new(
            provider,
            self.settings.request_timeout,
            self.settings.retry.clone(),
            self.throttles.get(provider),
        )
    }
}

/// What every chain adapter needs to know about the watched account.
#[derive(Debug, Clone)]
pub struct WatchedAddress {
    pub address: String,
    /// Window start; older items end pagination.
    pub since: Option<DateTime<Utc>>,
    pub page_size: u32,
}

impl WatchedAddress {
    pub(crate) fn is_before_window(&self, ts: DateTime<Utc>) -> bool {
        self.since.is_some_and(|since| ts < since)
    }

    /// Hex addresses compare case-insensitively, base58 ones exactly.
    pub(crate) fn is(&self, other: &str) -> bool {
        if self.address.starts_with("0x") {
            self.address.eq_ignore_ascii_case(other)
        } else {
            self.address == other
        }
    }
}

/// One asset movement touching the watched address.
#[derive(Debug, Clone)]
pub(crate) struct ChainTransfer {
    pub tx_id: String,
    /// Magnitude; the sign is derived from `direction`.
    pub amount: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub counterparty: Option<String>,
    pub on_chain_units: Option<String>,
    pub on_chain_symbol: Option<String>,
    pub raw: Value,
}

impl ChainTransfer {
    pub(crate) fn into_canonical(
        self,
        provider: &str,
        account_id: &str,
    ) -> Result<NormalizedTransaction> {
        let magnitude = self.amount.abs();
        let amount = match self.direction {
            Direction::Outflow => -magnitude,
            Direction::Inflow => magnitude,
        };
        // uint256 amounts can exceed what a decimal holds; keep the units only when they fit.
        let on_chain_units = self.on_chain_units.filter(|units| units.len() <= 28);
        canonical(
            provider,
            json!({
                "tx_id": self.tx_id,
                "account_id": account_id,
                "amount": amount.to_string(),
                "currency_code": self.currency,
                "timestamp": self.timestamp.to_rfc3339(),
                "type": "transfer",
                "direction": self.direction.as_str(),
                "counterparty": self.counterparty,
                "on_chain_units": on_chain_units,
                "on_chain_symbol": self.on_chain_symbol,
                "raw": self.raw,
            }),
        )
    }
}

/// Maps a JSON-RPC `error` member onto the taxonomy.
pub(crate) fn jsonrpc_check(provider: &str, body: &Value) -> Result<()> {
    let Some(error) = body.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let provider = provider.to_string();
    Err(match code {
        // -32005: "limit exceeded"; 429 is echoed by some gateways.
        -32005 | 429 => ConnectorError::RateLimited { provider },
        -32600 | -32601 | -32602 => ConnectorError::Rejected {
            provider,
            detail: message,
        },
        _ => ConnectorError::Transient {
            provider,
            detail: format!("RPC error {}: {}", code, message),
        },
    })
}

pub(crate) fn timestamp_from_secs(provider: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ConnectorError::malformed(provider, format!("bad timestamp {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_caip2_ids() {
        let chain = ChainRef::parse("eip155:137").unwrap();
        assert_eq!(chain.namespace, "eip155");
        assert_eq!(chain.reference, "137");
        assert!(ChainRef::parse("ethereum").is_err());
        assert!(ChainRef::parse("eip155:").is_err());
    }

    #[test]
    fn transfer_sign_follows_direction() {
        let transfer = ChainTransfer {
            tx_id: "0xabc:native".to_string(),
            amount: dec!(1.25),
            currency: "eth".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            direction: Direction::Outflow,
            counterparty: Some("0xbb".to_string()),
            on_chain_units: Some("1250000000000000000".to_string()),
            on_chain_symbol: Some("ETH".to_string()),
            raw: json!({ "hash": "0xabc" }),
        };
        let tx = transfer.into_canonical("TEST", "acc-1").unwrap();
        assert_eq!(tx.amount, dec!(-1.25));
        assert_eq!(tx.currency_code, "ETH");
        assert_eq!(tx.direction, Some(Direction::Outflow));
        assert_eq!(tx.raw, json!({ "hash": "0xabc" }));
    }

    #[test]
    fn rpc_errors_are_classified() {
        let limited = json!({ "error": { "code": -32005, "message": "limit exceeded" } });
        assert!(matches!(
            jsonrpc_check("RPC", &limited),
            Err(ConnectorError::RateLimited { .. })
        ));
        let invalid = json!({ "error": { "code": -32602, "message": "invalid address" } });
        assert!(matches!(
            jsonrpc_check("RPC", &invalid),
            Err(ConnectorError::Rejected { .. })
        ));
        assert!(jsonrpc_check("RPC", &json!({ "result": [] })).is_ok());
        assert!(jsonrpc_check("RPC", &json!({ "error": null, "result": [] })).is_ok());
    }

    #[test]
    fn window_and_address_checks() {
        let watched = WatchedAddress {
            address: "0xAbC".to_string(),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            page_size: 100,
        };
        assert!(watched.is("0xabc"));
        assert!(watched.is_before_window(Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()));
        assert!(!watched.is_before_window(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    }
}
