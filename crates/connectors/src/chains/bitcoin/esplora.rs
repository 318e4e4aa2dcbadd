//! Esplora REST API (Blockstream and compatible mirrors).
//!
//! Confirmed history comes 25 transactions per page, newest first; the next
//! page is addressed by the last txid seen.

use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::NormalizedTransaction;

use crate::chains::{timestamp_from_secs, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

use super::aggregate::{aggregate, Leg};
use super::SATOSHI_DECIMALS;

pub(crate) const PROVIDER_ID: &str = "ESPLORA";

const PAGE_SIZE: usize = 25;

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    #[serde(default)]
    vin: Vec<Input>,
    #[serde(default)]
    vout: Vec<Output>,
    status: Status,
}

#[derive(Debug, Deserialize)]
struct Input {
    prevout: Option<Output>,
}

#[derive(Debug, Deserialize)]
struct Output {
    scriptpubkey_address: Option<String>,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Status {
    block_time: Option<i64>,
}

pub struct EsploraSource {
    http: HttpClient,
    base_url: String,
    watched: WatchedAddress,
}

impl EsploraSource {
    pub fn new(http: HttpClient, base_url: String, watched: WatchedAddress) -> Self {
        Self {
            http,
            base_url,
            watched,
        }
    }
}

/// Net effect of one transaction on the watched address, with the first
/// foreign address on the other side.
fn net_leg(tx: &EsploraTx, watched: &WatchedAddress) -> (i128, Option<String>) {
    let mine = |addr: &Option<String>| addr.as_deref().is_some_and(|a| watched.is(a));
    let spent: i128 = tx
        .vin
        .iter()
        .filter_map(|i| i.prevout.as_ref())
        .filter(|o| mine(&o.scriptpubkey_address))
        .map(|o| o.value as i128)
        .sum();
    let received: i128 = tx
        .vout
        .iter()
        .filter(|o| mine(&o.scriptpubkey_address))
        .map(|o| o.value as i128)
        .sum();
    let net = received - spent;

    let counterparty = if net < 0 {
        tx.vout
            .iter()
            .find(|o| o.scriptpubkey_address.is_some() && !mine(&o.scriptpubkey_address))
            .and_then(|o| o.scriptpubkey_address.clone())
    } else {
        tx.vin
            .iter()
            .filter_map(|i| i.prevout.as_ref())
            .find(|o| o.scriptpubkey_address.is_some() && !mine(&o.scriptpubkey_address))
            .and_then(|o| o.scriptpubkey_address.clone())
    };
    (net, counterparty)
}

/// Maps one page. The flag is true when the window start was crossed.
fn map_page(
    rows: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut legs = Vec::with_capacity(rows.len());
    let mut crossed = false;
    for row in rows {
        let tx: EsploraTx = serde_json::from_value(row.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let Some(block_time) = tx.status.block_time else {
            continue;
        };
        let timestamp = timestamp_from_secs(PROVIDER_ID, block_time)?;
        if watched.is_before_window(timestamp) {
            crossed = true;
            break;
        }
        let (net, counterparty) = net_leg(&tx, watched);
        let amount = Decimal::try_from_i128_with_scale(net, SATOSHI_DECIMALS)
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        legs.push(Leg {
            hash: tx.txid,
            amount,
            timestamp,
            counterparty,
            raw: row.clone(),
        });
    }

    let transactions = aggregate(legs)
        .into_iter()
        .map(|transfer| transfer.into_canonical(PROVIDER_ID, account_id))
        .collect::<Result<Vec<_>>>()?;
    Ok((transactions, crossed))
}

#[async_trait]
impl TransactionSource for EsploraSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let mut url = format!("{}/address/{}/txs/chain", self.base_url, self.watched.address);
        if let Some(last_seen) = Cursor::before_of(cursor) {
            url = format!("{}/{}", url, last_seen);
        }
        debug!("Esplora {}", url);

        let body = self.http.get_json(&url, &[], None).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "expected a transaction array"))?;

        let (transactions, crossed) = map_page(rows, &self.watched, account_id)?;
        let next_cursor = if crossed || rows.len() < PAGE_SIZE {
            None
        } else {
            rows.last()
                .and_then(|last| last.get("txid"))
                .and_then(Value::as_str)
                .map(Cursor::before)
        };
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_core::transactions::Direction;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn watched() -> WatchedAddress {
        WatchedAddress {
            address: "bc1qme".to_string(),
            since: None,
            page_size: 25,
        }
    }

    #[test]
    fn nets_inputs_against_outputs() {
        let rows = vec![
            // Spend 100_000 sats, 30_000 back as change.
            json!({
                "txid": "f00d",
                "vin": [{ "prevout": { "scriptpubkey_address": "bc1qme", "value": 100000 } }],
                "vout": [
                    { "scriptpubkey_address": "bc1qshop", "value": 69000 },
                    { "scriptpubkey_address": "bc1qme", "value": 30000 }
                ],
                "status": { "confirmed": true, "block_time": 1709287200 }
            }),
            json!({
                "txid": "beef",
                "vin": [{ "prevout": { "scriptpubkey_address": "bc1qpayer", "value": 500000 } }],
                "vout": [{ "scriptpubkey_address": "bc1qme", "value": 250000 }],
                "status": { "confirmed": true, "block_time": 1709200000 }
            }),
        ];
        let (txs, crossed) = map_page(&rows, &watched(), "acc-btc").unwrap();
        assert!(!crossed);
        assert_eq!(txs[0].tx_id, "f00d:out");
        assert_eq!(txs[0].amount, dec!(-0.0007));
        assert_eq!(txs[0].counterparty.as_deref(), Some("bc1qshop"));
        assert_eq!(txs[1].tx_id, "beef:in");
        assert_eq!(txs[1].amount, dec!(0.0025));
        assert_eq!(txs[1].direction, Some(Direction::Inflow));
        assert_eq!(txs[1].counterparty.as_deref(), Some("bc1qpayer"));
    }

    #[test]
    fn unconfirmed_rows_are_skipped() {
        let rows = vec![json!({
            "txid": "cafe",
            "vin": [],
            "vout": [{ "scriptpubkey_address": "bc1qme", "value": 1 }],
            "status": { "confirmed": false }
        })];
        let (txs, _) = map_page(&rows, &watched(), "acc-btc").unwrap();
        assert!(txs.is_empty());
    }
}
