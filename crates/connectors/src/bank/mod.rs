//! Bank-aggregation adapter (Plaid-style API).
//!
//! Transactions are fetched over a date window with offset paging. The
//! aggregator reports outflows as positive amounts; the adapter flips the sign
//! so the ledger sees money out as negative, and leaves `direction` unset.

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use ledgerlink_core::secrets::Credentials;
use ledgerlink_core::sync::DateWindow;
use ledgerlink_core::transactions::{parse_decimal, NormalizedTransaction};

use crate::client::{canonical, SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
use crate::http::HttpClient;

pub(crate) const PROVIDER_ID: &str = "PLAID";

/// Aggregator cap on `options.count`.
const MAX_COUNT: u32 = 500;

/// An upstream account as the aggregator currently reports it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveAccount {
    pub account_id: String,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub balances: LiveBalances,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveBalances {
    #[serde(default, deserialize_with = "optional_decimal")]
    pub current: Option<Decimal>,
    #[serde(default, deserialize_with = "optional_decimal")]
    pub available: Option<Decimal>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

fn optional_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_decimal(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl LiveAccount {
    /// Balance to mirror locally: current, else available.
    pub fn balance(&self) -> Option<Decimal> {
        self.balances.current.or(self.balances.available)
    }
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    total_transactions: u64,
}

/// A bank-aggregation source: transactions plus the live account list used
/// to scope them to one upstream account and mirror its balance.
#[async_trait]
pub trait BankSource: TransactionSource {
    async fn live_accounts(&self) -> Result<Vec<LiveAccount>>;

    async fn validate_credentials(&self, account_id: &str) -> Result<()>;
}

pub struct PlaidConnector {
    http: HttpClient,
    base_url: String,
    client_id: String,
    secret: String,
    access_token: String,
    window: DateWindow,
    page_size: u32,
}

impl PlaidConnector {
    pub fn new(
        http: HttpClient,
        base_url: String,
        credentials: &Credentials,
        window: DateWindow,
        page_size: u32,
    ) -> Result<Self> {
        let missing = || ConnectorError::MissingCredentials {
            provider: PROVIDER_ID.to_string(),
        };
        Ok(Self {
            http,
            base_url,
            client_id: credentials.client_id.clone().ok_or_else(missing)?,
            secret: credentials
                .client_secret
                .clone()
                .or_else(|| credentials.api_secret.clone())
                .ok_or_else(missing)?,
            access_token: credentials.access_token.clone().ok_or_else(missing)?,
            window,
            page_size: page_size.clamp(1, MAX_COUNT),
        })
    }

    fn auth(&self) -> Value {
        json!({
            "client_id": self.client_id,
            "secret": self.secret,
            "access_token": self.access_token,
        })
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let (Value::Object(target), Value::Object(auth)) = (&mut body, self.auth()) {
            target.extend(auth);
        }
        let url = format!("{}{}", self.base_url, path);
        self.http
            .post_json(&url, &body, None)
            .await
            .map_err(remap_error)
    }

    async fn fetch(&self, account_id: &str, cursor: Option<&Cursor>, count: u32) -> Result<SourcePage> {
        let offset = Cursor::offset_of(cursor);
        debug!(
            "Plaid transactions {}..{} offset {}",
            self.window.start, self.window.end, offset
        );
        let body = self
            .post(
                "/transactions/get",
                json!({
                    "start_date": self.window.start.to_string(),
                    "end_date": self.window.end.to_string(),
                    "options": { "count": count, "offset": offset },
                }),
            )
            .await?;
        let response: TransactionsResponse =
            serde_json::from_value(body).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))?;

        let fetched = response.transactions.len();
        let transactions = map_transactions(response.transactions, account_id)?;
        let total = (response.total_transactions > 0).then_some(response.total_transactions);
        let next_cursor = Cursor::next_offset(offset, fetched, count as usize, total);
        Ok(SourcePage {
            transactions,
            next_cursor,
        })
    }
}

/// The aggregator answers auth problems with HTTP 400 and an `error_code`.
fn remap_error(err: ConnectorError) -> ConnectorError {
    match err {
        ConnectorError::Rejected { provider, detail }
            if ["INVALID_ACCESS_TOKEN", "ITEM_LOGIN_REQUIRED", "INVALID_API_KEYS"]
                .iter()
                .any(|code| detail.contains(code)) =>
        {
            ConnectorError::Unauthorized { provider, detail }
        }
        ConnectorError::Rejected { provider, detail } if detail.contains("PRODUCT_NOT_READY") => {
            ConnectorError::Transient { provider, detail }
        }
        other => other,
    }
}

fn map_transactions(rows: Vec<Value>, account_id: &str) -> Result<Vec<NormalizedTransaction>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.get("pending").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        let amount = row
            .get("amount")
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "transaction without amount"))
            .and_then(|a| parse_decimal(a).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e)))?;
        let currency = row
            .get("iso_currency_code")
            .filter(|v| !v.is_null())
            .or_else(|| row.get("unofficial_currency_code"))
            .cloned()
            .unwrap_or(Value::Null);
        let timestamp = row
            .get("datetime")
            .filter(|v| !v.is_null())
            .or_else(|| row.get("date"))
            .cloned()
            .unwrap_or(Value::Null);
        let merchant = row
            .get("merchant_name")
            .filter(|v| !v.is_null())
            .or_else(|| row.get("name"))
            .cloned()
            .unwrap_or(Value::Null);

        out.push(canonical(
            PROVIDER_ID,
            json!({
                "tx_id": row.get("transaction_id").cloned().unwrap_or(Value::Null),
                "account_id": account_id,
                "amount": (-amount).to_string(),
                "currency_code": currency,
                "timestamp": timestamp,
                "merchant_name": merchant,
                "raw": row,
            }),
        )?);
    }
    Ok(out)
}

#[async_trait]
impl TransactionSource for PlaidConnector {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        self.fetch(account_id, cursor, self.page_size).await
    }
}

#[async_trait]
impl BankSource for PlaidConnector {
    /// Accounts linked under the access token, with live balances.
    async fn live_accounts(&self) -> Result<Vec<LiveAccount>> {
        let body = self.post("/accounts/get", json!({})).await?;
        let accounts = body
            .get("accounts")
            .cloned()
            .ok_or_else(|| ConnectorError::malformed(PROVIDER_ID, "missing accounts"))?;
        serde_json::from_value(accounts).map_err(|e| ConnectorError::malformed(PROVIDER_ID, e))
    }

    /// One bounded fetch; rejected tokens come back as a validation failure.
    async fn validate_credentials(&self, account_id: &str) -> Result<()> {
        match self.fetch(account_id, None, 1).await {
            Ok(_) => {
                info!("Bank credentials accepted");
                Ok(())
            }
            Err(ConnectorError::Unauthorized { detail, .. }) => Err(ConnectorError::Validation(
                format!("Bank link rejected: {}", detail),
            )),
            Err(e) => Err(e),
        }
    }
}
