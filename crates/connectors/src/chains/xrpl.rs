//! XRP Ledger (`ripple:*`): `account_tx` against a public rippled node, with a
//! second node as fallback.
//!
//! Both API v1 (`tx`) and v2 (`tx_json` + `hash`) entry shapes are read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use ledgerlink_core::transactions::{parse_decimal, Direction, NormalizedTransaction};

use crate::chains::{timestamp_from_secs, ChainRef, ChainTransfer, SourceKit, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::fallback::FallbackChain;
use crate::http::HttpClient;

pub(crate) const PRIMARY_ID: &str = "XRPL";
pub(crate) const FALLBACK_ID: &str = "XRPL_FALLBACK";

const NATIVE_SYMBOL: &str = "XRP";
const DROP_DECIMALS: u32 = 6;
/// Seconds between the Unix epoch and the Ripple epoch (2000-01-01).
const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

pub struct XrplSource {
    id: &'static str,
    http: HttpClient,
    url: String,
    watched: WatchedAddress,
}

impl XrplSource {
    pub fn new(id: &'static str, http: HttpClient, url: String, watched: WatchedAddress) -> Self {
        Self {
            id,
            http,
            url,
            watched,
        }
    }
}

/// rippled reports failures inside `result` with HTTP 200.
fn rippled_check(provider: &str, body: &Value) -> Result<()> {
    let Some(result) = body.get("result") else {
        return Ok(());
    };
    if result.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }
    let code = result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let provider = provider.to_string();
    match code {
        // Unfunded account: nothing recorded yet.
        "actNotFound" => Ok(()),
        "slowDown" | "tooBusy" => Err(ConnectorError::RateLimited { provider }),
        "noNetwork" | "noCurrent" | "noClosed" | "lgrNotFound" => {
            Err(ConnectorError::Transient {
                provider,
                detail: code.to_string(),
            })
        }
        other => Err(ConnectorError::Rejected {
            provider,
            detail: other.to_string(),
        }),
    }
}

/// Three-letter codes pass through; 160-bit hex codes are decoded to ASCII.
fn currency_code(raw: &str) -> String {
    if raw.len() == 40 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        let decoded: String = (0..raw.len())
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&raw[i..i + 2], 16).ok())
            .filter(|b| *b != 0)
            .map(char::from)
            .collect();
        if !decoded.is_empty() && decoded.chars().all(|c| c.is_ascii_graphic()) {
            return decoded;
        }
    }
    raw.to_string()
}

/// XRP amounts are drop strings; issued amounts are `{currency, issuer, value}`.
fn parse_amount(provider: &str, amount: &Value) -> Result<(Decimal, String, Option<String>)> {
    match amount {
        Value::String(drops) => {
            let drops: i64 = drops
                .parse()
                .map_err(|_| ConnectorError::malformed(provider, format!("bad drops '{}'", drops)))?;
            Ok((
                Decimal::new(drops, DROP_DECIMALS),
                NATIVE_SYMBOL.to_string(),
                Some(NATIVE_SYMBOL.to_string()),
            ))
        }
        Value::Object(issued) => {
            let value = issued
                .get("value")
                .ok_or_else(|| ConnectorError::malformed(provider, "issued amount without value"))?;
            let value = parse_decimal(value).map_err(|e| ConnectorError::malformed(provider, e))?;
            let code = currency_code(
                issued
                    .get("currency")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            let issuer = issued.get("issuer").and_then(Value::as_str).unwrap_or_default();
            Ok((value, code.clone(), Some(format!("{}.{}", code, issuer))))
        }
        other => Err(ConnectorError::malformed(
            provider,
            format!("unsupported amount {}", other),
        )),
    }
}

fn entry_timestamp(provider: &str, entry: &Value, tx: &Value) -> Result<DateTime<Utc>> {
    if let Some(iso) = entry.get("close_time_iso").and_then(Value::as_str) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(iso) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    let ripple_secs = tx
        .get("date")
        .and_then(Value::as_i64)
        .ok_or_else(|| ConnectorError::malformed(provider, "transaction without date"))?;
    timestamp_from_secs(provider, ripple_secs + RIPPLE_EPOCH_OFFSET)
}

enum Entry {
    Keep(Box<NormalizedTransaction>),
    Skip,
    BeforeWindow,
}

fn map_entry(provider: &str, entry: &Value, watched: &WatchedAddress, account_id: &str) -> Result<Entry> {
    let tx = entry
        .get("tx")
        .or_else(|| entry.get("tx_json"))
        .ok_or_else(|| ConnectorError::malformed(provider, "entry without tx"))?;
    let timestamp = entry_timestamp(provider, entry, tx)?;
    if watched.is_before_window(timestamp) {
        return Ok(Entry::BeforeWindow);
    }

    let meta = entry.get("meta").unwrap_or(&Value::Null);
    let succeeded = meta.get("TransactionResult").and_then(Value::as_str) == Some("tesSUCCESS");
    if tx.get("TransactionType").and_then(Value::as_str) != Some("Payment") || !succeeded {
        return Ok(Entry::Skip);
    }

    let sender = tx.get("Account").and_then(Value::as_str).unwrap_or_default();
    let destination = tx.get("Destination").and_then(Value::as_str).unwrap_or_default();
    let (direction, counterparty) = if watched.is(sender) && watched.is(destination) {
        return Ok(Entry::Skip);
    } else if watched.is(sender) {
        (Direction::Outflow, destination)
    } else if watched.is(destination) {
        (Direction::Inflow, sender)
    } else {
        return Ok(Entry::Skip);
    };

    // Partial payments deliver less than `Amount`.
    let amount = meta
        .get("delivered_amount")
        .filter(|a| a.as_str() != Some("unavailable"))
        .or_else(|| tx.get("DeliverMax"))
        .or_else(|| tx.get("Amount"))
        .ok_or_else(|| ConnectorError::malformed(provider, "payment without amount"))?;
    let (amount, currency, symbol) = parse_amount(provider, amount)?;

    let hash = tx
        .get("hash")
        .or_else(|| entry.get("hash"))
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::malformed(provider, "entry without hash"))?;

    let transfer = ChainTransfer {
        tx_id: hash.to_string(),
        amount,
        currency,
        timestamp,
        direction,
        counterparty: Some(counterparty.to_string()).filter(|c| !c.is_empty()),
        on_chain_units: None,
        on_chain_symbol: symbol,
        raw: entry.clone(),
    };
    Ok(Entry::Keep(Box::new(transfer.into_canonical(provider, account_id)?)))
}

fn map_entries(
    provider: &str,
    entries: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match map_entry(provider, entry, watched, account_id)? {
            Entry::Keep(tx) => out.push(*tx),
            Entry::Skip => {}
            Entry::BeforeWindow => return Ok((out, true)),
        }
    }
    Ok((out, false))
}

#[async_trait]
impl TransactionSource for XrplSource {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let mut params = json!({
            "account": self.watched.address,
            "ledger_index_min": -1,
            "ledger_index_max": -1,
            "limit": self.watched.page_size,
            "forward": false,
        });
        if let Some(marker) = Cursor::marker_of(cursor) {
            params["marker"] = marker.clone();
        }
        debug!("{} account_tx for {}", self.id, self.watched.address);

        let body = self
            .http
            .post_json(
                &self.url,
                &json!({ "method": "account_tx", "params": [params] }),
                Some(rippled_check),
            )
            .await?;
        let result = body.get("result").unwrap_or(&Value::Null);
        let entries = match result.get("transactions") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        };

        let (transactions, crossed) = map_entries(self.id, entries, &self.watched, account_id)?;
        let next_cursor = match result.get("marker") {
            Some(marker) if !marker.is_null() && !crossed => Some(Cursor::marker(marker.clone())),
            _ => None,
        };
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}

pub(crate) fn build(
    kit: &SourceKit<'_>,
    _chain: &ChainRef,
    watched: WatchedAddress,
) -> Result<FallbackChain> {
    let endpoints = &kit.settings.endpoints;
    let primary = XrplSource::new(
        PRIMARY_ID,
        kit.http(PRIMARY_ID),
        endpoints.xrpl_primary.clone(),
        watched.clone(),
    );
    let fallback = XrplSource::new(
        FALLBACK_ID,
        kit.http(FALLBACK_ID),
        endpoints.xrpl_fallback.clone(),
        watched,
    );
    Ok(FallbackChain::new(vec![Box::new(primary), Box::new(fallback)]))
}
