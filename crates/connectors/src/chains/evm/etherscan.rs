//! Etherscan v2 multichain explorer API.
//!
//! Native transfers (`txlist`) are paged first, then token transfers
//! (`tokentx`); the cursor names the action being paged.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{Direction, NormalizedTransaction};

use crate::chains::{timestamp_from_secs, ChainTransfer, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;
use crate::units::units_to_decimal;

pub(crate) const PROVIDER_ID: &str = "ETHERSCAN";

const ACTION_NATIVE: &str = "txlist";
const ACTION_TOKEN: &str = "tokentx";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerRow {
    hash: String,
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    token_decimal: Option<String>,
    #[serde(default)]
    log_index: Option<String>,
}

pub struct EtherscanSource {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    chain_id: String,
    watched: WatchedAddress,
    native_symbol: &'static str,
}

impl EtherscanSource {
    pub fn new(
        http: HttpClient,
        base_url: String,
        api_key: Option<String>,
        chain_id: String,
        watched: WatchedAddress,
        native_symbol: &'static str,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            chain_id,
            watched,
            native_symbol,
        }
    }
}

/// Explorer envelopes report errors as `{"status": "0", "result": "..."}`.
fn explorer_check(provider: &str, body: &Value) -> Result<()> {
    if body.get("status").and_then(Value::as_str) != Some("0") {
        return Ok(());
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if message.starts_with("No transactions found") {
        return Ok(());
    }
    let result = body.get("result").and_then(Value::as_str).unwrap_or(message);
    let provider = provider.to_string();
    Err(if result.contains("Max rate limit") || result.contains("rate limit reached") {
        ConnectorError::RateLimited { provider }
    } else if result.contains("Invalid API Key") || result.contains("Missing/Invalid API Key") {
        ConnectorError::Unauthorized {
            provider,
            detail: result.to_string(),
        }
    } else {
        ConnectorError::Rejected {
            provider,
            detail: result.to_string(),
        }
    })
}

fn position_of(cursor: Option<&Cursor>) -> (String, u32) {
    match cursor {
        Some(Cursor::Explorer(c)) if c.action == ACTION_NATIVE || c.action == ACTION_TOKEN => {
            (c.action.clone(), c.page.max(1))
        }
        _ => (ACTION_NATIVE.to_string(), 1),
    }
}

enum Row {
    Keep(Box<NormalizedTransaction>),
    /// Reverted call or zero-value transfer.
    Skip,
    BeforeWindow,
}

fn map_row(
    row: Value,
    action: &str,
    watched: &WatchedAddress,
    native_symbol: &str,
    account_id: &str,
) -> Result<Row> {
    let parsed: ExplorerRow =
        serde_json::from_value(row.clone()).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
    let secs = parsed
        .time_stamp
        .parse::<i64>()
        .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
    let timestamp = timestamp_from_secs(PROVIDER_ID, secs)?;
    if watched.is_before_window(timestamp) {
        return Ok(Row::BeforeWindow);
    }
    if parsed.is_error.as_deref() == Some("1") {
        return Ok(Row::Skip);
    }

    let (tx_id, currency, decimals, symbol) = if action == ACTION_NATIVE {
        (
            format!("{}:native", parsed.hash),
            native_symbol.to_string(),
            18,
            Some(native_symbol.to_string()),
        )
    } else {
        let decimals = parsed
            .token_decimal
            .as_deref()
            .and_then(|d| d.parse::<u32>().ok())
            .unwrap_or(18);
        (
            format!(
                "{}:token:{}",
                parsed.hash,
                parsed.log_index.as_deref().unwrap_or("0")
            ),
            parsed.contract_address.clone().unwrap_or_default(),
            decimals,
            parsed.token_symbol.clone(),
        )
    };

    let amount = units_to_decimal(&parsed.value, decimals).ok_or_else(|| {
        ConnectorError::malformed(PROVIDER_ID, format!("bad value '{}'", parsed.value))
    })?;
    if amount.is_zero() {
        return Ok(Row::Skip);
    }

    let direction = if watched.is(&parsed.from) {
        Direction::Outflow
    } else {
        Direction::Inflow
    };
    let counterparty = match direction {
        Direction::Outflow => parsed.to.clone(),
        Direction::Inflow => parsed.from.clone(),
    };

    let tx = ChainTransfer {
        tx_id,
        amount,
        currency,
        timestamp,
        direction,
        counterparty: Some(counterparty).filter(|c| !c.is_empty()),
        on_chain_units: Some(parsed.value.clone()),
        on_chain_symbol: symbol,
        raw: row,
    }
    .into_canonical(PROVIDER_ID, account_id)?;
    Ok(Row::Keep(Box::new(tx)))
}

/// Maps one explorer page. The flag is true when the window start was crossed.
fn map_rows(
    rows: Vec<Value>,
    action: &str,
    watched: &WatchedAddress,
    native_symbol: &str,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match map_row(row, action, watched, native_symbol, account_id)? {
            Row::BeforeWindow => return Ok((out, true)),
            Row::Keep(tx) => out.push(*tx),
            Row::Skip => {}
        }
    }
    Ok((out, false))
}

fn next_position(action: &str, page: u32, full_page: bool, crossed: bool) -> Option<Cursor> {
    if full_page && !crossed {
        Some(Cursor::explorer(action, page + 1))
    } else if action == ACTION_NATIVE {
        Some(Cursor::explorer(ACTION_TOKEN, 1))
    } else {
        None
    }
}

#[async_trait]
impl TransactionSource for EtherscanSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ConnectorError::MissingCredentials {
                provider: PROVIDER_ID.to_string(),
            })?;
        let (action, page) = position_of(cursor);
        debug!("Etherscan {} page {} for {}", action, page, self.watched.address);

        let query = [
            ("chainid", self.chain_id.clone()),
            ("module", "account".to_string()),
            ("action", action.clone()),
            ("address", self.watched.address.clone()),
            ("page", page.to_string()),
            ("offset", self.watched.page_size.to_string()),
            ("sort", "desc".to_string()),
            ("apikey", api_key),
        ];
        let body = self
            .http
            .get_json(&self.base_url, &query, Some(explorer_check))
            .await?;
        let rows = match body.get("result") {
            Some(Value::Array(rows)) => rows.clone(),
            // "No transactions found" carries an empty string or null.
            _ => Vec::new(),
        };
        let full_page = rows.len() >= self.watched.page_size as usize;

        let (transactions, crossed) =
            map_rows(rows, &action, &self.watched, self.native_symbol, account_id)?;
        Ok(SourcePage {
            transactions,
            next_cursor: next_position(&action, page, full_page, crossed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn watched() -> WatchedAddress {
        WatchedAddress {
            address: "0x00000000000000000000000000000000000000aa".to_string(),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            page_size: 2,
        }
    }

    #[test]
    fn maps_native_rows_and_skips_failed_calls() {
        let rows = vec![
            json!({
                "hash": "0xh2", "timeStamp": "1709287200",
                "from": "0x00000000000000000000000000000000000000bb",
                "to": "0x00000000000000000000000000000000000000aa",
                "value": "2000000000000000000", "isError": "0"
            }),
            json!({
                "hash": "0xh3", "timeStamp": "1709287100",
                "from": "0x00000000000000000000000000000000000000aa",
                "to": "0x00000000000000000000000000000000000000bb",
                "value": "5", "isError": "1"
            }),
        ];
        let (txs, crossed) = map_rows(rows, ACTION_NATIVE, &watched(), "ETH", "acc-1").unwrap();
        assert!(!crossed);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_id, "0xh2:native");
        assert_eq!(txs[0].amount, dec!(2));
        assert_eq!(txs[0].direction, Some(Direction::Inflow));
        assert_eq!(
            txs[0].counterparty.as_deref(),
            Some("0x00000000000000000000000000000000000000bb")
        );
    }

    #[test]
    fn maps_token_rows_with_their_decimals() {
        let rows = vec![json!({
            "hash": "0xh4", "timeStamp": "1709287200", "logIndex": "12",
            "from": "0x00000000000000000000000000000000000000aa",
            "to": "0x00000000000000000000000000000000000000cc",
            "value": "1500000", "contractAddress": "0xdac17f958d2ee523a2206206994597c13d831ec7",
            "tokenSymbol": "USDT", "tokenDecimal": "6"
        })];
        let (txs, _) = map_rows(rows, ACTION_TOKEN, &watched(), "ETH", "acc-1").unwrap();
        assert_eq!(txs[0].tx_id, "0xh4:token:12");
        assert_eq!(txs[0].amount, dec!(-1.5));
        assert_eq!(txs[0].currency_code, "0xdac17f958d2ee523a2206206994597c13d831ec7");
        assert_eq!(txs[0].on_chain_symbol.as_deref(), Some("USDT"));
    }

    #[test]
    fn stops_at_window_start() {
        let rows = vec![json!({
            "hash": "0xold", "timeStamp": "1600000000",
            "from": "0x00000000000000000000000000000000000000bb",
            "to": "0x00000000000000000000000000000000000000aa",
            "value": "1", "isError": "0"
        })];
        let (txs, crossed) = map_rows(rows, ACTION_NATIVE, &watched(), "ETH", "acc-1").unwrap();
        assert!(txs.is_empty());
        assert!(crossed);
        assert_eq!(
            next_position(ACTION_NATIVE, 1, true, crossed),
            Some(Cursor::explorer(ACTION_TOKEN, 1))
        );
        assert_eq!(next_position(ACTION_TOKEN, 3, true, true), None);
        assert_eq!(
            next_position(ACTION_TOKEN, 3, true, false),
            Some(Cursor::explorer(ACTION_TOKEN, 4))
        );
    }

    #[test]
    fn classifies_explorer_envelopes() {
        let limited = json!({ "status": "0", "message": "NOTOK", "result": "Max rate limit reached" });
        assert!(matches!(
            explorer_check(PROVIDER_ID, &limited),
            Err(ConnectorError::RateLimited { .. })
        ));
        let bad_key = json!({ "status": "0", "message": "NOTOK", "result": "Invalid API Key" });
        assert!(matches!(
            explorer_check(PROVIDER_ID, &bad_key),
            Err(ConnectorError::Unauthorized { .. })
        ));
        let empty = json!({ "status": "0", "message": "No transactions found", "result": [] });
        assert!(explorer_check(PROVIDER_ID, &empty).is_ok());
    }
}
