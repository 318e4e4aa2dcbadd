//! Helius enhanced transactions API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{parse_decimal, NormalizedTransaction};

use crate::chains::{timestamp_from_secs, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

use super::{net_transfer, NetChange, LAMPORT_DECIMALS};

pub(crate) const PROVIDER_ID: &str = "HELIUS";

const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedTx {
    signature: String,
    timestamp: i64,
    #[serde(default)]
    native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    token_transfers: Vec<TokenTransfer>,
    #[serde(default)]
    transaction_error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeTransfer {
    from_user_account: Option<String>,
    to_user_account: Option<String>,
    amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    from_user_account: Option<String>,
    to_user_account: Option<String>,
    mint: String,
    token_amount: Value,
}

pub struct HeliusSource {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    watched: WatchedAddress,
}

impl HeliusSource {
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

#[derive(Default)]
struct Tally {
    net: Decimal,
    counterparty: Option<String>,
}

fn tally(
    tallies: &mut BTreeMap<String, Tally>,
    watched: &WatchedAddress,
    asset: &str,
    from: Option<&str>,
    to: Option<&str>,
    amount: Decimal,
) {
    let outgoing = from.is_some_and(|f| watched.is(f));
    let incoming = to.is_some_and(|t| watched.is(t));
    if outgoing == incoming {
        return;
    }
    let entry = tallies.entry(asset.to_string()).or_default();
    let (delta, other) = if outgoing { (-amount, to) } else { (amount, from) };
    entry.net += delta;
    if entry.counterparty.is_none() {
        entry.counterparty = other.map(str::to_string);
    }
}

fn map_transactions(
    rows: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::new();
    for row in rows {
        let tx: EnhancedTx = serde_json::from_value(row.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let timestamp = timestamp_from_secs(PROVIDER_ID, tx.timestamp)?;
        if watched.is_before_window(timestamp) {
            return Ok((out, true));
        }
        if tx.transaction_error.as_ref().is_some_and(|e| !e.is_null()) {
            continue;
        }

        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for transfer in &tx.native_transfers {
            let lamports = Decimal::new(transfer.amount, LAMPORT_DECIMALS);
            tally(
                &mut tallies,
                watched,
                "native",
                transfer.from_user_account.as_deref(),
                transfer.to_user_account.as_deref(),
                lamports,
            );
        }
        for transfer in &tx.token_transfers {
            let amount = parse_decimal(&transfer.token_amount)
                .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
            tally(
                &mut tallies,
                watched,
                &transfer.mint,
                transfer.from_user_account.as_deref(),
                transfer.to_user_account.as_deref(),
                amount,
            );
        }

        for (asset, t) in tallies {
            let change = NetChange {
                asset,
                net: t.net,
                counterparty: t.counterparty,
            };
            if let Some(transfer) = net_transfer(&tx.signature, change, timestamp, row) {
                out.push(transfer.into_canonical(PROVIDER_ID, account_id)?);
            }
        }
    }
    Ok((out, false))
}

#[async_trait]
impl TransactionSource for HeliusSource {
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
        let limit = self.watched.page_size.min(MAX_LIMIT);
        let mut query = vec![("api-key", api_key), ("limit", limit.to_string())];
        if let Some(before) = Cursor::before_of(cursor) {
            query.push(("before", before.to_string()));
        }
        debug!("Helius history for {}", self.watched.address);

        let url = format!("{}/addresses/{}/transactions", self.base_url, self.watched.address);
        let body = self.http.get_json(&url, &query, None).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "expected a transaction array"))?;

        let (transactions, crossed) = map_transactions(rows, &self.watched, account_id)?;
        let next_cursor = if crossed || rows.len() < limit as usize {
            None
        } else {
            rows.last()
                .and_then(|last| last.get("signature"))
                .and_then(Value::as_str)
                .map(Cursor::before)
        };
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}
