//! Tatum v4 transaction history.
//!
//! Rows carry a signed BTC amount per transaction and address, newest first,
//! paged by offset.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use ledgerlink_core::transactions::{parse_decimal, NormalizedTransaction};

use crate::chains::WatchedAddress;
use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

use super::aggregate::{aggregate, Leg};

pub(crate) const PROVIDER_ID: &str = "TATUM";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    hash: String,
    amount: Value,
    /// Milliseconds since epoch.
    timestamp: i64,
    #[serde(default)]
    counter_address: Option<String>,
}

pub struct TatumSource {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    watched: WatchedAddress,
}

impl TatumSource {
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

/// Maps one page of history rows. The flag is true when the window start was
/// crossed.
fn map_rows(
    rows: &[Value],
    watched: &WatchedAddress,
    account_id: &str,
) -> Result<(Vec<NormalizedTransaction>, bool)> {
    let mut legs = Vec::with_capacity(rows.len());
    let mut crossed = false;
    for row in rows {
        let parsed: HistoryRow = serde_json::from_value(row.clone())
            .map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        let timestamp = chrono::DateTime::from_timestamp_millis(parsed.timestamp).ok_or_else(
            || ConnectorError::malformed(PROVIDER_ID, format!("bad timestamp {}", parsed.timestamp)),
        )?;
        if watched.is_before_window(timestamp) {
            crossed = true;
            break;
        }
        let amount =
            parse_decimal(&parsed.amount).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;
        legs.push(Leg {
            hash: parsed.hash,
            amount,
            timestamp,
            counterparty: parsed.counter_address,
            raw: row.clone(),
        });
    }

    let transactions = aggregate(legs)
        .into_iter()
        .map(|transfer| transfer.into_canonical(PROVIDER_ID, account_id))
        .collect::<Result<Vec<_>>>()?;
    Ok((transactions, crossed))
}

/// Leading rows of a full page that end on a transaction boundary.
///
/// Rows of one transaction are contiguous. When the page ends part-way through
/// one, its trailing rows are left for the next page so every leg is summed
/// into the same entry. A page holding a single transaction is taken whole.
fn complete_prefix(rows: &[Value]) -> usize {
    let hash_of = |row: &Value| row.get("hash").and_then(Value::as_str).map(str::to_string);
    let Some(last) = rows.last().and_then(hash_of) else {
        return rows.len();
    };
    match rows
        .iter()
        .rposition(|row| hash_of(row).as_deref() != Some(last.as_str()))
    {
        Some(index) => index + 1,
        None => rows.len(),
    }
}

#[async_trait]
impl TransactionSource for TatumSource {
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
        let offset = Cursor::offset_of(cursor);
        debug!("Tatum history offset {} for {}", offset, self.watched.address);

        let url = format!("{}/transaction/history", self.base_url);
        let query = [
            ("chain", "bitcoin-mainnet".to_string()),
            ("addresses", self.watched.address.clone()),
            ("pageSize", self.watched.page_size.to_string()),
            ("offset", offset.to_string()),
            ("sort", "DESC".to_string()),
        ];
        let body = self
            .http
            .execute(
                || {
                    Ok(self
                        .http
                        .client()
                        .get(&url)
                        .query(&query)
                        .header("x-api-key", &api_key))
                },
                None,
            )
            .await?;
        let rows = match body.get("result") {
            Some(Value::Array(rows)) => rows.as_slice(),
            _ => &[],
        };

        let page_size = self.watched.page_size as usize;
        let consumed = if rows.len() >= page_size {
            complete_prefix(rows)
        } else {
            rows.len()
        };
        let (transactions, crossed) = map_rows(&rows[..consumed], &self.watched, account_id)?;
        let next_cursor = if crossed {
            None
        } else {
            Cursor::next_offset(offset, rows.len(), page_size, None)
                .map(|_| Cursor::offset(offset + consumed as u64))
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
    use chrono::{TimeZone, Utc};
    use ledgerlink_core::transactions::Direction;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn maps_history_rows() {
        let watched = WatchedAddress {
            address: "bc1qwatched".to_string(),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            page_size: 50,
        };
        let rows = vec![
            json!({
                "chain": "bitcoin-mainnet", "hash": "aa11", "address": "bc1qwatched",
                "transactionType": "outgoing", "amount": "-0.0015",
                "timestamp": 1709287200000_i64, "counterAddress": "bc1qother"
            }),
            json!({
                "chain": "bitcoin-mainnet", "hash": "bb22", "address": "bc1qwatched",
                "transactionType": "incoming", "amount": "0.02",
                "timestamp": 1709200000000_i64
            }),
            json!({
                "chain": "bitcoin-mainnet", "hash": "cc33", "address": "bc1qwatched",
                "transactionType": "incoming", "amount": "1",
                "timestamp": 1600000000000_i64
            }),
        ];
        let (txs, crossed) = map_rows(&rows, &watched, "acc-btc").unwrap();
        assert!(crossed);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].tx_id, "aa11:out");
        assert_eq!(txs[0].amount, dec!(-0.0015));
        assert_eq!(txs[0].direction, Some(Direction::Outflow));
        assert_eq!(txs[0].counterparty.as_deref(), Some("bc1qother"));
        assert_eq!(txs[1].tx_id, "bb22:in");
        assert_eq!(txs[1].currency_code, "BTC");
    }

    fn leg_row(hash: &str, amount: &str) -> Value {
        json!({ "hash": hash, "amount": amount, "timestamp": 1709287200000_i64 })
    }

    #[test]
    fn full_page_stops_before_a_split_transaction() {
        let rows = vec![
            leg_row("aa11", "-0.1"),
            leg_row("bb22", "-0.2"),
            leg_row("bb22", "-0.3"),
        ];
        assert_eq!(complete_prefix(&rows), 1);

        // The held-back legs arrive with the rest of the transaction.
        let next_page = vec![
            leg_row("bb22", "-0.2"),
            leg_row("bb22", "-0.3"),
            leg_row("bb22", "-0.4"),
        ];
        let watched = WatchedAddress {
            address: "bc1qwatched".to_string(),
            since: None,
            page_size: 3,
        };
        let consumed = complete_prefix(&next_page);
        let (txs, _) = map_rows(&next_page[..consumed], &watched, "acc-btc").unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_id, "bb22:out");
        assert_eq!(txs[0].amount, dec!(-0.9));
    }

    #[test]
    fn page_of_one_transaction_is_taken_whole() {
        let rows = vec![leg_row("aa11", "-0.1"), leg_row("aa11", "-0.2")];
        assert_eq!(complete_prefix(&rows), 2);
        assert_eq!(complete_prefix(&[]), 0);
    }
}
