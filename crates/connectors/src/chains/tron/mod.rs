//! Tron (`tron:*`) through TronGrid.
//!
//! TRX transfers are paged first, then TRC-20 transfers. TronGrid pages with
//! an opaque `fingerprint`; the TRC-20 stage carries it inside a stage cursor.

mod base58;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{Direction, NormalizedTransaction};

use crate::chains::{ChainRef, ChainTransfer, SourceKit, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::fallback::FallbackChain;
use crate::http::HttpClient;
use crate::units::units_to_decimal;

pub use base58::tron_address;

pub(crate) const PROVIDER_ID: &str = "TRONGRID";

const NATIVE_SYMBOL: &str = "TRX";
const SUN_DECIMALS: u32 = 6;
const STAGE_TRC20: &str = "trc20";
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Native(Option<String>),
    Trc20(Option<String>),
}

impl Stage {
    fn from_cursor(cursor: Option<&Cursor>) -> Self {
        match cursor {
            Some(Cursor::Fingerprint(c)) => Stage::Native(Some(c.fingerprint.clone())),
            Some(Cursor::Stage(c)) if c.action == STAGE_TRC20 => Stage::Trc20(c.fingerprint.clone()),
            _ => Stage::Native(None),
        }
    }

    /// Cursor for the page after this one.
    fn next(&self, fingerprint: Option<String>, crossed: bool) -> Option<Cursor> {
        let fingerprint = fingerprint.filter(|_| !crossed);
        match (self, fingerprint) {
            (Stage::Native(_), Some(fp)) => Some(Cursor::fingerprint(fp)),
            (Stage::Native(_), None) => Some(Cursor::stage(STAGE_TRC20, None)),
            (Stage::Trc20(_), Some(fp)) => Some(Cursor::stage(STAGE_TRC20, Some(fp))),
            (Stage::Trc20(_), None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Trc20Row {
    transaction_id: String,
    block_timestamp: i64,
    from: String,
    to: String,
    value: String,
    token_info: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    symbol: Option<String>,
    address: String,
    #[serde(default)]
    decimals: u32,
}

pub struct TronGridSource {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    watched: WatchedAddress,
}

impl TronGridSource {
    pub fn new(
        http: HttpClient,
        base_url: String,
        api_key: Option<String>,
        watched: WatchedAddress,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            watched,
        }
    }
}

fn millis(provider: &str, ms: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ConnectorError::malformed(provider, format!("bad timestamp {}", ms)))
}

fn direction_of(watched: &WatchedAddress, from: &str, to: &str) -> Option<(Direction, String)> {
    match (watched.is(from), watched.is(to)) {
        (true, false) => Some((Direction::Outflow, to.to_string())),
        (false, true) => Some((Direction::Inflow, from.to_string())),
        _ => None,
    }
}

/// TRX transfers out of `/transactions`. Contract calls and failed
/// transactions carry no TRX movement and are skipped.
fn map_native(
    rows: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::new();
    for row in rows {
        let ts = row
            .get("block_timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "row without block_timestamp"))?;
        let timestamp = millis(PROVIDER_ID, ts)?;
        if watched.is_before_window(timestamp) {
            return Ok((out, true));
        }
        if row.pointer("/ret/0/contractRet").and_then(Value::as_str) != Some("SUCCESS") {
            continue;
        }
        let Some(contract) = row.pointer("/raw_data/contract/0") else {
            continue;
        };
        if contract.get("type").and_then(Value::as_str) != Some("TransferContract") {
            continue;
        }
        let value = contract.pointer("/parameter/value").unwrap_or(&Value::Null);
        let from = tron_address(value.get("owner_address").and_then(Value::as_str).unwrap_or_default());
        let to = tron_address(value.get("to_address").and_then(Value::as_str).unwrap_or_default());
        let Some((direction, counterparty)) = direction_of(watched, &from, &to) else {
            continue;
        };
        let sun = value.get("amount").and_then(Value::as_u64).unwrap_or(0);
        if sun == 0 {
            continue;
        }
        let tx_id = row
            .get("txID")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "row without txID"))?;
        let amount = units_to_decimal(&sun.to_string(), SUN_DECIMALS)
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "bad amount"))?;

        out.push(
            ChainTransfer {
                tx_id: format!("{}:native", tx_id),
                amount,
                currency: NATIVE_SYMBOL.to_string(),
                timestamp,
                direction,
                counterparty: Some(counterparty),
                on_chain_units: Some(sun.to_string()),
                on_chain_symbol: Some(NATIVE_SYMBOL.to_string()),
                raw: row.clone(),
            }
            .into_canonical(PROVIDER_ID, account_id)?,
        );
    }
    Ok((out, false))
}

fn map_trc20(
    rows: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::new();
    for row in rows {
        let parsed: Trc20Row = serde_json::from_value(row.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let timestamp = millis(PROVIDER_ID, parsed.block_timestamp)?;
        if watched.is_before_window(timestamp) {
            return Ok((out, true));
        }
        let Some((direction, counterparty)) = direction_of(watched, &parsed.from, &parsed.to)
        else {
            continue;
        };
        let amount = units_to_decimal(&parsed.value, parsed.token_info.decimals).ok_or_else(|| {
            ConnectorError::malformed(PROVIDER_ID, format!("bad value '{}'", parsed.value))
        })?;
        if amount.is_zero() {
            continue;
        }

        out.push(
            ChainTransfer {
                tx_id: format!(
                    "{}:token:{}",
                    parsed.transaction_id, parsed.token_info.address
                ),
                amount,
                currency: parsed.token_info.address.clone(),
                timestamp,
                direction,
                counterparty: Some(counterparty),
                on_chain_units: Some(parsed.value.clone()),
                on_chain_symbol: parsed.token_info.symbol.clone(),
                raw: row.clone(),
            }
            .into_canonical(PROVIDER_ID, account_id)?,
        );
    }
    Ok((out, false))
}

#[async_trait]
impl TransactionSource for TronGridSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let stage = Stage::from_cursor(cursor);
        let (path, fingerprint) = match &stage {
            Stage::Native(fp) => ("transactions", fp.clone()),
            Stage::Trc20(fp) => ("transactions/trc20", fp.clone()),
        };
        let mut query = vec![
            ("limit", self.watched.page_size.min(MAX_LIMIT).to_string()),
            ("only_confirmed", "true".to_string()),
            ("order_by", "block_timestamp,desc".to_string()),
        ];
        if let Some(fp) = fingerprint {
            query.push(("fingerprint", fp));
        }
        debug!("TronGrid {} for {}", path, self.watched.address);

        let url = format!("{}/v1/accounts/{}/{}", self.base_url, self.watched.address, path);
        let body = self
            .http
            .execute(
                || {
                    let mut request = self.http.client().get(&url).query(&query);
                    if let Some(key) = &self.api_key {
                        request = request.header("TRON-PRO-API-KEY", key);
                    }
                    Ok(request)
                },
                None,
            )
            .await?;
        let rows = match body.get("data") {
            Some(Value::Array(rows)) => rows.as_slice(),
            _ => &[],
        };

        let (transactions, crossed) = match stage {
            Stage::Native(_) => map_native(rows, &self.watched, account_id)?,
            Stage::Trc20(_) => map_trc20(rows, &self.watched, account_id)?,
        };
        let next_fingerprint = body
            .pointer("/meta/fingerprint")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SourcePage {
            transactions,
            next_cursor: stage.next(next_fingerprint, crossed),
        })
    }
}

pub(crate) fn build(
    kit: &SourceKit<'_>,
    _chain: &ChainRef,
    watched: WatchedAddress,
) -> Result<FallbackChain> {
    let source = TronGridSource::new(
        kit.http(PROVIDER_ID),
        kit.settings.endpoints.trongrid.clone(),
        kit.settings.keys.trongrid.clone(),
        watched,
    );
    Ok(FallbackChain::new(vec![Box::new(source)]))
}
