//! Plain Solana JSON-RPC: `getSignaturesForAddress`, then `getTransaction`
//! for each signature, diffing pre/post balances.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use ledgerlink_core::transactions::NormalizedTransaction;

use crate::chains::{jsonrpc_check, timestamp_from_secs, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;
use crate::units::units_to_decimal;

use super::{net_transfer, NetChange, LAMPORT_DECIMALS};

pub(crate) const PROVIDER_ID: &str = "SOLANA_RPC";

// Each signature costs one more call.
const MAX_LIMIT: u32 = 25;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    block_time: Option<i64>,
    #[serde(default)]
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxMeta {
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    mint: String,
    owner: Option<String>,
    ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u32,
}

pub struct RpcSource {
    http: HttpClient,
    url: String,
    watched: WatchedAddress,
}

impl RpcSource {
    pub fn new(http: HttpClient, url: String, watched: WatchedAddress) -> Self {
        Self { http, url, watched }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let body = self.http.post_json(&self.url, &request, Some(jsonrpc_check)).await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Index of the watched address among the transaction's account keys. Keys
/// are plain strings or `{"pubkey": ...}` objects depending on encoding.
fn account_index(tx: &Value, watched: &WatchedAddress) -> Option<usize> {
    let keys = tx.pointer("/transaction/message/accountKeys")?.as_array()?;
    keys.iter().position(|key| {
        let key = key
            .as_str()
            .or_else(|| key.get("pubkey").and_then(Value::as_str));
        key.is_some_and(|k| watched.is(k))
    })
}

/// Net changes of one `getTransaction` result for the watched address.
fn net_changes(tx: &Value, watched: &WatchedAddress) -> Result<Vec<NetChange>> {
    let meta: TxMeta = tx
        .get("meta")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?
        .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "transaction without meta"))?;

    let mut changes = Vec::new();
    if let Some(index) = account_index(tx, watched) {
        let pre = meta.pre_balances.get(index).copied().unwrap_or(0) as i128;
        let post = meta.post_balances.get(index).copied().unwrap_or(0) as i128;
        let net = Decimal::try_from_i128_with_scale(post - pre, LAMPORT_DECIMALS)
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        changes.push(NetChange {
            asset: "native".to_string(),
            net,
            counterparty: None,
        });
    }

    let mut tokens: BTreeMap<String, Decimal> = BTreeMap::new();
    let owned = |b: &&TokenBalance| b.owner.as_deref().is_some_and(|o| watched.is(o));
    for (balances, sign) in [
        (&meta.post_token_balances, Decimal::ONE),
        (&meta.pre_token_balances, Decimal::NEGATIVE_ONE),
    ] {
        for balance in balances.iter().filter(owned) {
            let amount = units_to_decimal(
                &balance.ui_token_amount.amount,
                balance.ui_token_amount.decimals,
            )
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "bad token amount"))?;
            *tokens.entry(balance.mint.clone()).or_default() += amount * sign;
        }
    }
    changes.extend(tokens.into_iter().map(|(mint, net)| NetChange {
        asset: mint,
        net,
        counterparty: None,
    }));
    Ok(changes)
}

fn map_transaction(
    signature: &str,
    tx: &Value,
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<Vec<NormalizedTransaction>> {
    let block_time = tx
        .get("blockTime")
        .and_then(Value::as_i64)
        .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "transaction without blockTime"))?;
    let timestamp = timestamp_from_secs(PROVIDER_ID, block_time)?;
    net_changes(tx, watched)?
        .into_iter()
        .filter_map(|change| net_transfer(signature, change, timestamp, tx))
        .map(|transfer| transfer.into_canonical(PROVIDER_ID, account_id))
        .collect()
}

#[async_trait]
impl TransactionSource for RpcSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let limit = self.watched.page_size.min(MAX_LIMIT);
        let mut options = json!({ "limit": limit });
        if let Some(before) = Cursor::before_of(cursor) {
            options["before"] = json!(before);
        }
        debug!("Solana RPC signatures for {}", self.watched.address);

        let result = self
            .call("getSignaturesForAddress", json!([self.watched.address, options]))
            .await?;
        let signatures: Vec<SignatureInfo> =
            serde_json::from_value(result).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;

        let mut transactions = Vec::new();
        let mut crossed = false;
        for info in &signatures {
            let Some(block_time) = info.block_time else {
                continue;
            };
            if self
                .watched
                .is_before_window(timestamp_from_secs(PROVIDER_ID, block_time)?)
            {
                crossed = true;
                break;
            }
            if info.err.as_ref().is_some_and(|e| !e.is_null()) {
                continue;
            }
            let tx = self
                .call(
                    "getTransaction",
                    json!([
                        info.signature,
                        { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
                    ]),
                )
                .await?;
            if tx.is_null() {
                continue;
            }
            transactions.extend(map_transaction(&info.signature, &tx, &self.watched, account_id)?);
        }

        let next_cursor = if crossed || signatures.len() < limit as usize {
            None
        } else {
            signatures.last().map(|s| Cursor::before(s.signature.clone()))
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
    use rust_decimal_macros::dec;

    const ME: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn diffs_balances_of_the_watched_account() {
        let watched = WatchedAddress {
            address: ME.to_string(),
            since: None,
            page_size: 25,
        };
        let tx = json!({
            "blockTime": 1709287200,
            "meta": {
                "err": null,
                "preBalances": [5000000000_u64, 2000000000_u64],
                "postBalances": [3999995000_u64, 3000000000_u64],
                "preTokenBalances": [
                    { "accountIndex": 2, "mint": MINT, "owner": ME,
                      "uiTokenAmount": { "amount": "1000000", "decimals": 6 } }
                ],
                "postTokenBalances": [
                    { "accountIndex": 2, "mint": MINT, "owner": ME,
                      "uiTokenAmount": { "amount": "4000000", "decimals": 6 } }
                ]
            },
            "transaction": {
                "message": { "accountKeys": [{ "pubkey": ME }, { "pubkey": "dest" }] }
            }
        });
        let txs = map_transaction("sigA", &tx, &watched, "acc-sol").unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].tx_id, "sigA:native");
        assert_eq!(txs[0].amount, dec!(-1.000005));
        assert_eq!(txs[1].tx_id, format!("sigA:token:{}", MINT));
        assert_eq!(txs[1].amount, dec!(3));
    }

    #[test]
    fn unchanged_balances_produce_nothing() {
        let watched = WatchedAddress {
            address: ME.to_string(),
            since: None,
            page_size: 25,
        };
        let tx = json!({
            "blockTime": 1709287200,
            "meta": { "preBalances": [10], "postBalances": [10] },
            "transaction": { "message": { "accountKeys": [ME] } }
        });
        assert!(map_transaction("sigB", &tx, &watched, "acc-sol").unwrap().is_empty());
    }
}
