//! Alchemy `alchemy_getAssetTransfers`.
//!
//! Transfers are queried once with the watched address as sender and once as
//! recipient; the cursor records which side is being paged and Alchemy's
//! `pageKey`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use ledgerlink_core::transactions::{Direction, NormalizedTransaction};

use crate::chains::{jsonrpc_check, ChainTransfer, WatchedAddress};
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;
use crate::units::hex_units_to_decimal;

pub(crate) const PROVIDER_ID: &str = "ALCHEMY";

const NATIVE_CATEGORIES: &[&str] = &["external", "internal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Side {
    From,
    To,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TransferCursor {
    side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransfersResult {
    #[serde(default)]
    transfers: Vec<Value>,
    #[serde(rename = "pageKey")]
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfer {
    hash: String,
    unique_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    asset: Option<String>,
    category: String,
    raw_contract: RawContract,
    metadata: Option<TransferMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    value: Option<String>,
    address: Option<String>,
    decimal: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferMetadata {
    block_timestamp: DateTime<Utc>,
}

pub struct AlchemySource {
    http: HttpClient,
    endpoint: Option<String>,
    watched: WatchedAddress,
    native_symbol: &'static str,
}

impl AlchemySource {
    /// `endpoint` is the full RPC URL including the API key, or `None` when no
    /// key is configured.
    pub fn new(
        http: HttpClient,
        endpoint: Option<String>,
        watched: WatchedAddress,
        native_symbol: &'static str,
    ) -> Self {
        Self {
            http,
            endpoint,
            watched,
            native_symbol,
        }
    }

    fn request_body(&self, position: &TransferCursor) -> Value {
        let mut params = json!({
            "fromBlock": "0x0",
            "toBlock": "latest",
            "category": ["external", "internal", "erc20"],
            "withMetadata": true,
            "excludeZeroValue": true,
            "maxCount": format!("0x{:x}", self.watched.page_size),
            "order": "desc",
        });
        let address_key = match position.side {
            Side::From => "fromAddress",
            Side::To => "toAddress",
        };
        params[address_key] = json!(self.watched.address);
        if let Some(page_key) = &position.page_key {
            params["pageKey"] = json!(page_key);
        }
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "alchemy_getAssetTransfers",
            "params": [params],
        })
    }
}

fn position_of(cursor: Option<&Cursor>) -> TransferCursor {
    Cursor::marker_of(cursor)
        .and_then(|marker| serde_json::from_value(marker.clone()).ok())
        .unwrap_or(TransferCursor {
            side: Side::From,
            page_key: None,
        })
}

/// Maps one page of transfers. The flag is true when the window start was
/// crossed.
fn map_transfers(
    rows: Vec<Value>,
    watched: &WatchedAddress,
    native_symbol: &str,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut out = Vec::with_capacity(rows.len());
    let mut crossed_window = false;

    for row in rows {
        let transfer: AssetTransfer = serde_json::from_value(row.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let timestamp = transfer
            .metadata
            .as_ref()
            .map(|m| m.block_timestamp)
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "transfer without metadata"))?;
        if watched.is_before_window(timestamp) {
            crossed_window = true;
            continue;
        }

        let is_native = NATIVE_CATEGORIES.contains(&transfer.category.as_str());
        let decimals = match &transfer.raw_contract.decimal {
            Some(hex) => u32::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(18),
            None if is_native => 18,
            None => {
                debug!("Skipping {} transfer without decimals", transfer.hash);
                continue;
            }
        };
        let Some(raw_value) = transfer.raw_contract.value.as_deref() else {
            continue;
        };
        let amount = hex_units_to_decimal(raw_value, decimals).ok_or_else(|| {
            ConnectorError::malformed(PROVIDER_ID, format!("bad value '{}'", raw_value))
        })?;

        let direction = if transfer.from.as_deref().is_some_and(|from| watched.is(from)) {
            Direction::Outflow
        } else {
            Direction::Inflow
        };
        let counterparty = match direction {
            Direction::Outflow => transfer.to.clone(),
            Direction::Inflow => transfer.from.clone(),
        };

        let tx_id = transfer_id(&transfer)?;
        let currency = if is_native {
            native_symbol.to_string()
        } else {
            transfer.raw_contract.address.clone().unwrap_or_default()
        };

        out.push(
            ChainTransfer {
                tx_id,
                amount,
                currency,
                timestamp,
                direction,
                counterparty,
                on_chain_units: crate::units::hex_to_decimal_string(raw_value),
                on_chain_symbol: transfer.asset.clone(),
                raw: row,
            }
            .into_canonical(PROVIDER_ID, account_id)?,
        );
    }
    Ok((out, crossed_window))
}

/// Stable ledger id for a transfer, independent of where it lands in a page.
///
/// External transfers are one per transaction. Internal and token transfers
/// take the trace or log position from Alchemy's `uniqueId`
/// (`<hash>:internal:<n>`, `<hash>:log:<n>`).
fn transfer_id(transfer: &AssetTransfer) -> Result<String> {
    if transfer.category == "external" {
        return Ok(format!("{}:native", transfer.hash));
    }
    let unique_id = transfer.unique_id.as_deref().ok_or_else(|| {
        ConnectorError::malformed(
            PROVIDER_ID,
            format!("{} transfer {} without uniqueId", transfer.category, transfer.hash),
        )
    })?;
    let suffix = unique_id
        .strip_prefix(transfer.hash.as_str())
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(unique_id);
    Ok(match suffix.strip_prefix("log:") {
        Some(log_index) => format!("{}:token:{}", transfer.hash, log_index),
        None => format!("{}:{}", transfer.hash, suffix),
    })
}

fn next_position(current: &TransferCursor, page_key: Option<String>, crossed: bool) -> Option<TransferCursor> {
    match (page_key, crossed) {
        (Some(page_key), false) => Some(TransferCursor {
            side: current.side,
            page_key: Some(page_key),
        }),
        _ if current.side == Side::From => Some(TransferCursor {
            side: Side::To,
            page_key: None,
        }),
        _ => None,
    }
}

#[async_trait]
impl TransactionSource for AlchemySource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ConnectorError::MissingCredentials {
                provider: PROVIDER_ID.to_string(),
            })?;
        let position = position_of(cursor);
        debug!("Alchemy transfers {:?} for {}", position.side, self.watched.address);

        let body = self
            .http
            .post_json(endpoint, &self.request_body(&position), Some(jsonrpc_check))
            .await?;
        let result: TransfersResult = body
            .get("result")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "missing result"))?;

        let (transactions, crossed) =
            map_transfers(result.transfers, &self.watched, self.native_symbol, account_id)?;
        let next_cursor = next_position(&position, result.page_key, crossed)
            .map(|next| Cursor::marker(json!(next)));

        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}
