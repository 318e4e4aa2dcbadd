//! Kraken private `Ledgers` endpoint.
//!
//! Ledger entries come 50 per call, newest first, addressed by `ofs`. Asset
//! codes (`XXBT`, `ZUSD`) are translated through the public asset table,
//! cached for the factory's lifetime with a fixed expiry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{parse_decimal, NormalizedTransaction};

use crate::cache::ExpiringCache;
use crate::client::{canonical, SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

use super::signing::{kraken_signature, NonceSource};

pub(crate) const PROVIDER_ID: &str = "KRAKEN";

const LEDGERS_PATH: &str = "/0/private/Ledgers";
const ASSETS_PATH: &str = "/0/public/Assets";
/// Kraken's fixed page length for ledger queries.
const PAGE_LENGTH: usize = 50;

pub type AssetTable = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct LedgerEntry {
    time: f64,
    #[serde(rename = "type")]
    entry_type: String,
    asset: String,
    amount: Value,
    #[serde(default)]
    fee: Option<Value>,
}

pub struct KrakenConnector {
    http: HttpClient,
    base_url: String,
    api_key: String,
    api_secret: String,
    since: Option<DateTime<Utc>>,
    assets: Arc<ExpiringCache<AssetTable>>,
    nonces: NonceSource,
}

impl KrakenConnector {
    pub fn new(
        http: HttpClient,
        base_url: String,
        api_key: String,
        api_secret: String,
        since: Option<DateTime<Utc>>,
        assets: Arc<ExpiringCache<AssetTable>>,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            api_secret,
            since,
            assets,
            nonces: NonceSource::default(),
        }
    }

    async fn asset_table(&self) -> Result<AssetTable> {
        self.assets
            .get_or_refresh(|| async {
                let url = format!("{}{}", self.base_url, ASSETS_PATH);
                let body = self.http.get_json(&url, &[], Some(kraken_check)).await?;
                Ok::<_, ConnectorError>(parse_asset_table(&body))
            })
            .await
    }

    async fn private_post(&self, path: &'static str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .execute(
                || {
                    let nonce = self.nonces.next();
                    let mut form = vec![("nonce", nonce.to_string())];
                    form.extend(params.iter().map(|(k, v)| (*k, v.clone())));
                    let post_data = encode_form(&form);
                    let signature = kraken_signature(path, nonce, &post_data, &self.api_secret)?;
                    Ok(self
                        .http
                        .client()
                        .post(&url)
                        .header("API-Key", &self.api_key)
                        .header("API-Sign", signature)
                        .header("Content-Type", "application/x-www-form-urlencoded")
                        .body(post_data))
                },
                Some(kraken_check),
            )
            .await
    }

    pub(crate) async fn fetch(
        &self,
        account_id: &str,
        cursor: Option<&Cursor>,
        page_limit: Option<usize>,
    ) -> Result<SourcePage> {
        let offset = Cursor::offset_of(cursor);
        let mut params = vec![("ofs", offset.to_string())];
        if let Some(since) = self.since {
            params.push(("start", since.timestamp().to_string()));
        }
        debug!("Kraken ledgers offset {}", offset);

        let assets = self.asset_table().await?;
        let body = self.private_post(LEDGERS_PATH, &params).await?;
        let result = body
            .get("result")
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "missing result"))?;
        let ledger = result
            .get("ledger")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let total = result.get("count").and_then(Value::as_u64);

        let mut transactions = map_ledger(&ledger, &assets, account_id)?;
        if let Some(limit) = page_limit {
            transactions.truncate(limit);
        }
        let next_cursor = Cursor::next_offset(offset, ledger.len(), PAGE_LENGTH, total);
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}

/// Kraken reports errors as `{"error": ["EAPI:Invalid key"], ...}` with HTTP 200.
fn kraken_check(provider: &str, body: &Value) -> Result<()> {
    let Some(errors) = body.get("error").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(first) = errors.iter().filter_map(Value::as_str).next() else {
        return Ok(());
    };
    let provider = provider.to_string();
    Err(match first {
        e if e.starts_with("EAPI:Rate limit") || e.starts_with("EGeneral:Too many requests") => {
            ConnectorError::RateLimited { provider }
        }
        e if e.starts_with("EService:Unavailable") || e.starts_with("EService:Busy") => {
            ConnectorError::Transient {
                provider,
                detail: e.to_string(),
            }
        }
        e if e.starts_with("EAPI:Invalid key")
            || e.starts_with("EAPI:Invalid signature")
            || e.starts_with("EAPI:Invalid nonce")
            || e.starts_with("EGeneral:Permission denied") =>
        {
            ConnectorError::Unauthorized {
                provider,
                detail: e.to_string(),
            }
        }
        e => ConnectorError::Rejected {
            provider,
            detail: e.to_string(),
        },
    })
}

fn parse_asset_table(body: &Value) -> AssetTable {
    body.get("result")
        .and_then(Value::as_object)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|(code, info)| {
                    let altname = info.get("altname").and_then(Value::as_str)?;
                    Some((code.clone(), display_code(altname)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Kraken-specific tickers that differ from the common ones.
fn display_code(altname: &str) -> String {
    match altname {
        "XBT" => "BTC".to_string(),
        "XDG" => "DOGE".to_string(),
        other => other.to_string(),
    }
}

fn resolve_asset(assets: &AssetTable, code: &str) -> String {
    if let Some(mapped) = assets.get(code) {
        return mapped.clone();
    }
    // Staking and funding variants (`ETH2.S`, `DOT.F`) keep their base code.
    let base = code.split('.').next().unwrap_or(code);
    assets
        .get(base)
        .cloned()
        .unwrap_or_else(|| display_code(base))
}

fn entry_type(kraken_type: &str) -> &'static str {
    match kraken_type {
        "trade" | "margin" | "rollover" | "settled" | "spend" | "receive" => "trade",
        "deposit" => "deposit",
        "withdrawal" => "withdrawal",
        _ => "transfer",
    }
}

fn map_ledger(
    ledger: &serde_json::Map<String, Value>,
    assets: &AssetTable,
    account_id: &str,
) -> Result<Vec<NormalizedTransaction>> {
    let mut rows: Vec<(&String, &Value, LedgerEntry)> = Vec::with_capacity(ledger.len());
    for (id, raw) in ledger {
        let entry: LedgerEntry = serde_json::from_value(raw.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        rows.push((id, raw, entry));
    }
    rows.sort_by(|a, b| b.2.time.total_cmp(&a.2.time));

    let mut out = Vec::with_capacity(rows.len());
    for (id, raw, entry) in rows {
        let amount =
            parse_decimal(&entry.amount).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let fee = match &entry.fee {
            Some(fee) => parse_decimal(fee).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?,
            None => Decimal::ZERO,
        };
        // The balance moves by amount minus fee.
        let net = amount - fee;
        if net.is_zero() {
            continue;
        }
        let direction = if net.is_sign_negative() { "outflow" } else { "inflow" };
        out.push(canonical(
            PROVIDER_ID,
            serde_json::json!({
                "tx_id": id,
                "account_id": account_id,
                "amount": net.to_string(),
                "currency_code": resolve_asset(assets, &entry.asset),
                "timestamp": entry.time,
                "type": entry_type(&entry.entry_type),
                "direction": direction,
                "raw": raw,
            }),
        )?);
    }
    Ok(out)
}

fn encode_form(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, form_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_escape(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{:02X}", other),
        })
        .collect()
}

#[async_trait]
impl TransactionSource for KrakenConnector {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        self.fetch(account_id, cursor, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_core::transactions::{Direction, TxType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn assets() -> AssetTable {
        parse_asset_table(&json!({
            "error": [],
            "result": {
                "XXBT": { "aclass": "currency", "altname": "XBT", "decimals": 10 },
                "ZUSD": { "aclass": "currency", "altname": "USD", "decimals": 4 },
                "ETH2": { "aclass": "currency", "altname": "ETH2", "decimals": 10 }
            }
        }))
    }

    #[test]
    fn maps_ledger_entries_newest_first() {
        let ledger = json!({
            "L4UESK-KG3EQ-UFO4T5": {
                "refid": "TJKLXX-PGMUI-4NTLXU", "time": 1709287200.1234, "type": "trade",
                "subtype": "", "aclass": "currency", "asset": "XXBT",
                "amount": "0.0100000000", "fee": "0.0000000000", "balance": "0.01"
            },
            "LQWERT-KG3EQ-UFO4T5": {
                "refid": "TJKLXX-PGMUI-4NTLXU", "time": 1709287200.1234, "type": "trade",
                "subtype": "", "aclass": "currency", "asset": "ZUSD",
                "amount": "-600.0000", "fee": "1.5600", "balance": "400.00"
            },
            "LOLDER-AAAAA-BBBBBB": {
                "refid": "QCCBH7-X", "time": 1709000000.0, "type": "deposit",
                "asset": "ZUSD", "amount": "1000.0000", "fee": "0.0000"
            }
        });
        let txs = map_ledger(ledger.as_object().unwrap(), &assets(), "acc-kr").unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[2].tx_id, "LOLDER-AAAAA-BBBBBB");
        assert_eq!(txs[2].tx_type, TxType::Deposit);

        let usd = txs.iter().find(|t| t.tx_id == "LQWERT-KG3EQ-UFO4T5").unwrap();
        assert_eq!(usd.amount, dec!(-601.56));
        assert_eq!(usd.currency_code, "USD");
        assert_eq!(usd.tx_type, TxType::Trade);
        assert_eq!(usd.direction, Some(Direction::Outflow));

        let btc = txs.iter().find(|t| t.tx_id == "L4UESK-KG3EQ-UFO4T5").unwrap();
        assert_eq!(btc.currency_code, "BTC");
        assert_eq!(btc.amount, dec!(0.01));
    }

    #[test]
    fn resolves_staking_variants() {
        let table = assets();
        assert_eq!(resolve_asset(&table, "ETH2.S"), "ETH2");
        assert_eq!(resolve_asset(&table, "DOT.S"), "DOT");
        assert_eq!(resolve_asset(&table, "XXBT"), "BTC");
    }

    #[test]
    fn classifies_api_errors() {
        let limited = json!({ "error": ["EAPI:Rate limit exceeded"] });
        assert!(matches!(
            kraken_check(PROVIDER_ID, &limited),
            Err(ConnectorError::RateLimited { .. })
        ));
        let bad_key = json!({ "error": ["EAPI:Invalid key"] });
        assert!(matches!(
            kraken_check(PROVIDER_ID, &bad_key),
            Err(ConnectorError::Unauthorized { .. })
        ));
        let busy = json!({ "error": ["EService:Unavailable"] });
        assert!(matches!(
            kraken_check(PROVIDER_ID, &busy),
            Err(ConnectorError::Transient { .. })
        ));
        assert!(kraken_check(PROVIDER_ID, &json!({ "error": [], "result": {} })).is_ok());
    }

    #[test]
    fn form_encoding_escapes_values() {
        let form = encode_form(&[("nonce", "1".to_string()), ("asset", "XBT,ETH".to_string())]);
        assert_eq!(form, "nonce=1&asset=XBT%2CETH");
    }
}
