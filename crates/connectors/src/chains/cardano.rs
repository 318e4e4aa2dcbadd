//! Cardano (`cardano:*`) through Blockfrost.
//!
//! The address history lists transaction hashes newest first; each one's
//! UTxO set is then diffed for the watched address, one entry for ADA and one
//! per native asset.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{Direction, NormalizedTransaction};

use crate::chains::{timestamp_from_secs, ChainRef, ChainTransfer, SourceKit, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::fallback::FallbackChain;
use crate::http::HttpClient;
use crate::units::units_to_decimal;

pub(crate) const PROVIDER_ID: &str = "BLOCKFROST";

const LOVELACE: &str = "lovelace";
const NATIVE_SYMBOL: &str = "ADA";
const LOVELACE_DECIMALS: u32 = 6;
const MAX_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
struct AddressTx {
    tx_hash: String,
    block_time: i64,
}

#[derive(Debug, Deserialize)]
struct Utxos {
    #[serde(default)]
    inputs: Vec<Utxo>,
    #[serde(default)]
    outputs: Vec<Utxo>,
}

#[derive(Debug, Deserialize)]
struct Utxo {
    address: String,
    #[serde(default)]
    amount: Vec<Quantity>,
    /// Collateral inputs are only consumed when scripts fail.
    #[serde(default)]
    collateral: bool,
}

#[derive(Debug, Deserialize)]
struct Quantity {
    unit: String,
    quantity: String,
}

pub struct BlockfrostSource {
    http: HttpClient,
    base_url: String,
    project_id: Option<String>,
    watched: WatchedAddress,
}

impl BlockfrostSource {
    pub fn new(
        http: HttpClient,
        base_url: String,
        project_id: Option<String>,
        watched: WatchedAddress,
    ) -> Self {
        Self {
            http,
            base_url,
            project_id,
            watched,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)], project_id: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .execute(
                || {
                    Ok(self
                        .http
                        .client()
                        .get(&url)
                        .query(query)
                        .header("project_id", project_id))
                },
                None,
            )
            .await
    }
}

/// Net change per unit for the watched address, in base units.
fn net_units(utxos: &Utxos, watched: &WatchedAddress) -> BTreeMap<String, i128> {
    let mut net: BTreeMap<String, i128> = BTreeMap::new();
    let mut apply = |utxo: &Utxo, sign: i128| {
        if !watched.is(&utxo.address) {
            return;
        }
        for q in &utxo.amount {
            if let Ok(quantity) = q.quantity.parse::<i128>() {
                *net.entry(q.unit.clone()).or_default() += sign * quantity;
            }
        }
    };
    for input in utxos.inputs.iter().filter(|i| !i.collateral) {
        apply(input, -1);
    }
    for output in &utxos.outputs {
        apply(output, 1);
    }
    net
}

/// Other party for a movement: a foreign output for spends, a foreign input
/// for receipts.
fn counterparty(utxos: &Utxos, watched: &WatchedAddress, direction: Direction) -> Option<String> {
    let side = match direction {
        Direction::Outflow => &utxos.outputs,
        Direction::Inflow => &utxos.inputs,
    };
    side.iter()
        .find(|u| !watched.is(&u.address))
        .map(|u| u.address.clone())
}

fn map_utxos(
    hash: &str,
    block_time: i64,
    utxos_raw: &Value,
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<Vec<NormalizedTransaction>> {
    let utxos: Utxos = serde_json::from_value(utxos_raw.clone())
        .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
    let timestamp = timestamp_from_secs(PROVIDER_ID, block_time)?;

    let mut out = Vec::new();
    for (unit, net) in net_units(&utxos, watched) {
        let direction = match net.cmp(&0) {
            Ordering::Greater => Direction::Inflow,
            Ordering::Less => Direction::Outflow,
            Ordering::Equal => continue,
        };
        let magnitude = net.unsigned_abs().to_string();
        let (tx_id, currency, decimals, symbol) = if unit == LOVELACE {
            (
                format!("{}:native", hash),
                NATIVE_SYMBOL.to_string(),
                LOVELACE_DECIMALS,
                Some(NATIVE_SYMBOL.to_string()),
            )
        } else {
            // Native asset decimals live in off-chain metadata; amounts stay in base units.
            (format!("{}:token:{}", hash, unit), unit.clone(), 0, None)
        };
        let amount = units_to_decimal(&magnitude, decimals).ok_or_else(|| {
            ConnectorError::malformed(PROVIDER_ID, format!("bad quantity for {}", unit))
        })?;
        let transfer = ChainTransfer {
            tx_id,
            amount,
            currency,
            timestamp,
            direction,
            counterparty: counterparty(&utxos, watched, direction),
            on_chain_units: Some(magnitude),
            on_chain_symbol: symbol,
            raw: utxos_raw.clone(),
        };
        out.push(transfer.into_canonical(PROVIDER_ID, account_id)?);
    }
    Ok(out)
}

#[async_trait]
impl TransactionSource for BlockfrostSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let project_id = self
            .project_id
            .clone()
            .ok_or_else(|| ConnectorError::MissingCredentials {
                provider: PROVIDER_ID.to_string(),
            })?;
        let page = Cursor::page_of(cursor);
        let count = self.watched.page_size.min(MAX_COUNT);
        debug!("Blockfrost page {} for {}", page, self.watched.address);

        let history = match self
            .get(
                &format!("/addresses/{}/transactions", self.watched.address),
                &[
                    ("order", "desc".to_string()),
                    ("count", count.to_string()),
                    ("page", page.to_string()),
                ],
                &project_id,
            )
            .await
        {
            Ok(body) => body,
            // Addresses never seen on chain are unknown to Blockfrost.
            Err(ConnectorError::NotFound { .. }) => return Ok(SourcePage::last(Vec::new())),
            Err(e) => return Err(e),
        };
        let rows: Vec<AddressTx> =
            serde_json::from_value(history).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;

        let mut transactions = Vec::new();
        let mut crossed = false;
        for row in &rows {
            if self
                .watched
                .is_before_window(timestamp_from_secs(PROVIDER_ID, row.block_time)?)
            {
                crossed = true;
                break;
            }
            let utxos = self
                .get(&format!("/txs/{}/utxos", row.tx_hash), &[], &project_id)
                .await?;
            transactions.extend(map_utxos(
                &row.tx_hash,
                row.block_time,
                &utxos,
                &self.watched,
                account_id,
            )?);
        }

        let next_cursor = (!crossed && rows.len() >= count as usize).then(|| Cursor::page(page + 1));
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
    let source = BlockfrostSource::new(
        kit.http(PROVIDER_ID),
        kit.settings.endpoints.blockfrost.clone(),
        kit.settings.keys.blockfrost.clone(),
        watched,
    );
    Ok(FallbackChain::new(vec![Box::new(source)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const ME: &str = "addr1qxme";
    const TOKEN: &str = "f0ff48bbb7bbe9d59a40f1ce90e9e9d0ff5002ec48f232b49ca0fb9a6d79746f6b656e";

    #[test]
    fn diffs_utxos_per_unit() {
        let watched = WatchedAddress {
            address: ME.to_string(),
            since: None,
            page_size: 100,
        };
        let utxos = json!({
            "hash": "tx1",
            "inputs": [
                { "address": ME, "amount": [
                    { "unit": "lovelace", "quantity": "10000000" },
                    { "unit": TOKEN, "quantity": "50" }
                ] },
                { "address": ME, "collateral": true, "amount": [
                    { "unit": "lovelace", "quantity": "5000000" }
                ] }
            ],
            "outputs": [
                { "address": "addr1qxshop", "amount": [
                    { "unit": "lovelace", "quantity": "2500000" },
                    { "unit": TOKEN, "quantity": "50" }
                ] },
                { "address": ME, "amount": [{ "unit": "lovelace", "quantity": "7300000" }] }
            ]
        });
        let txs = map_utxos("tx1", 1709287200, &utxos, &watched, "acc-ada").unwrap();
        assert_eq!(txs.len(), 2);

        let ada = txs.iter().find(|t| t.tx_id == "tx1:native").unwrap();
        assert_eq!(ada.amount, dec!(-2.7));
        assert_eq!(ada.currency_code, "ADA");
        assert_eq!(ada.counterparty.as_deref(), Some("addr1qxshop"));

        let token = txs.iter().find(|t| t.tx_id == format!("tx1:token:{}", TOKEN)).unwrap();
        assert_eq!(token.amount, dec!(-50));
        assert_eq!(token.currency_code, TOKEN);
    }
}
