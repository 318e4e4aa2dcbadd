//! Bitstamp v2 `user_transactions`.
//!
//! One row can touch several currencies (a trade moves both legs); every
//! non-zero currency column becomes its own entry, suffixed with the code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use ledgerlink_core::transactions::{parse_decimal, NormalizedTransaction};

use crate::client::{canonical, SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

use super::signing::{bitstamp_signature, now_millis};

pub(crate) const PROVIDER_ID: &str = "BITSTAMP";

const PATH: &str = "/api/v2/user_transactions/";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const PAGE_LIMIT: u32 = 500;

/// Row columns that are not currency amounts.
const META_KEYS: &[&str] = &["id", "datetime", "type", "fee", "order_id"];

pub struct BitstampConnector {
    http: HttpClient,
    base_url: String,
    api_key: String,
    api_secret: String,
    since: Option<DateTime<Utc>>,
}

impl BitstampConnector {
    pub fn new(
        http: HttpClient,
        base_url: String,
        api_key: String,
        api_secret: String,
        since: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            api_secret,
            since,
        }
    }

    fn host(&self) -> &str {
        self.base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }

    pub(crate) async fn fetch(
        &self,
        account_id: &str,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<SourcePage> {
        let offset = Cursor::offset_of(cursor);
        let mut form = format!("offset={}&limit={}&sort=desc", offset, limit);
        if let Some(since) = self.since {
            form.push_str(&format!("&since_timestamp={}", since.timestamp()));
        }
        debug!("Bitstamp user_transactions offset {}", offset);

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), PATH);
        let body = self
            .http
            .execute(
                || {
                    let nonce = uuid::Uuid::new_v4().to_string();
                    let timestamp = now_millis().to_string();
                    let message = format!(
                        "BITSTAMP {}POST{}{}{}{}{}v2{}",
                        self.api_key,
                        self.host(),
                        PATH,
                        CONTENT_TYPE,
                        nonce,
                        timestamp,
                        form
                    );
                    let signature = bitstamp_signature(&self.api_secret, &message)?;
                    Ok(self
                        .http
                        .client()
                        .post(&url)
                        .header("X-Auth", format!("BITSTAMP {}", self.api_key))
                        .header("X-Auth-Signature", signature)
                        .header("X-Auth-Nonce", nonce)
                        .header("X-Auth-Timestamp", timestamp)
                        .header("X-Auth-Version", "v2")
                        .header("Content-Type", CONTENT_TYPE)
                        .body(form.clone()))
                },
                Some(bitstamp_check),
            )
            .await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "expected a transaction array"))?;

        let transactions = map_rows(rows, account_id)?;
        let next_cursor = Cursor::next_offset(offset, rows.len(), limit as usize, None);
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}

/// Errors arrive as `{"status": "error", "reason": ..., "code": "API0005"}`.
fn bitstamp_check(provider: &str, body: &Value) -> Result<()> {
    if body.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }
    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    let reason = match body.get("reason") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => code.to_string(),
    };
    let provider = provider.to_string();
    // API0001..API0006: key, permission, signature and nonce failures.
    Err(if code.starts_with("API000") {
        ConnectorError::Unauthorized {
            provider,
            detail: reason,
        }
    } else {
        ConnectorError::Rejected {
            provider,
            detail: reason,
        }
    })
}

fn entry_type(code: &str) -> &'static str {
    match code {
        "0" => "deposit",
        "1" => "withdrawal",
        "2" => "trade",
        _ => "transfer",
    }
}

fn currency_columns(row: &Map<String, Value>) -> Result<Vec<(String, Decimal)>> {
    let mut columns = Vec::new();
    for (key, value) in row {
        // Pair columns (`btc_usd`) hold the trade price.
        if META_KEYS.contains(&key.as_str()) || key.contains('_') || value.is_null() {
            continue;
        }
        let amount = parse_decimal(value).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        if !amount.is_zero() {
            columns.push((key.clone(), amount));
        }
    }
    Ok(columns)
}

fn map_rows(rows: &[Value], account_id: &str) -> Result<Vec<NormalizedTransaction>> {
    let mut out = Vec::new();
    for row in rows {
        let map = row
            .as_object()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "row is not an object"))?;
        let id = map
            .get("id")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "row without id"))?;
        let datetime = map
            .get("datetime")
            .cloned()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "row without datetime"))?;
        let kind = entry_type(map.get("type").and_then(Value::as_str).unwrap_or_default());

        for (currency, amount) in currency_columns(map)? {
            let direction = if amount.is_sign_negative() { "outflow" } else { "inflow" };
            out.push(canonical(
                PROVIDER_ID,
                json!({
                    "tx_id": format!("{}:{}", id, currency),
                    "account_id": account_id,
                    "amount": amount.to_string(),
                    "currency_code": currency,
                    "timestamp": datetime,
                    "type": kind,
                    "direction": direction,
                    "raw": row,
                }),
            )?);
        }
    }
    Ok(out)
}

#[async_trait]
impl TransactionSource for BitstampConnector {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        self.fetch(account_id, cursor, PAGE_LIMIT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_core::transactions::{Direction, TxType};
    use rust_decimal_macros::dec;

    #[test]
    fn splits_trades_into_one_entry_per_currency() {
        let rows = vec![
            json!({
                "id": 1234, "datetime": "2024-03-01 10:00:00.123456", "type": "2",
                "fee": "0.30", "order_id": 99, "usd": "-120.50", "btc": "0.002",
                "eur": 0.0, "btc_usd": 60250.0
            }),
            json!({
                "id": 1200, "datetime": "2024-02-28 09:00:00", "type": "0",
                "fee": "0.00", "usd": "500.00", "btc": "0.0"
            }),
        ];
        let txs = map_rows(&rows, "acc-bs").unwrap();
        assert_eq!(txs.len(), 3);

        let usd = txs.iter().find(|t| t.tx_id == "1234:usd").unwrap();
        assert_eq!(usd.amount, dec!(-120.50));
        assert_eq!(usd.currency_code, "USD");
        assert_eq!(usd.tx_type, TxType::Trade);
        assert_eq!(usd.direction, Some(Direction::Outflow));

        let btc = txs.iter().find(|t| t.tx_id == "1234:btc").unwrap();
        assert_eq!(btc.amount, dec!(0.002));

        let deposit = txs.iter().find(|t| t.tx_id == "1200:usd").unwrap();
        assert_eq!(deposit.tx_type, TxType::Deposit);
    }

    #[test]
    fn classifies_error_envelopes() {
        let bad_signature = json!({ "status": "error", "reason": "Invalid signature", "code": "API0005" });
        assert!(matches!(
            bitstamp_check(PROVIDER_ID, &bad_signature),
            Err(ConnectorError::Unauthorized { .. })
        ));
        let other = json!({ "status": "error", "reason": { "__all__": ["Invalid offset"] }, "code": "API0101" });
        assert!(matches!(
            bitstamp_check(PROVIDER_ID, &other),
            Err(ConnectorError::Rejected { .. })
        ));
        assert!(bitstamp_check(PROVIDER_ID, &json!([])).is_ok());
    }
}
