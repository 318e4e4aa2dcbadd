//! Centralized-exchange adapters.

pub(crate) mod bitstamp;
pub(crate) mod kraken;
mod signing;

pub use bitstamp::BitstampConnector;
pub use kraken::{AssetTable, KrakenConnector};

use async_trait::async_trait;
use log::info;

use crate::client::{SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};

/// Exchanges this build can sync, keyed by the account's `provider`.
pub enum ExchangeConnector {
    Kraken(KrakenConnector),
    Bitstamp(BitstampConnector),
}

impl ExchangeConnector {
    pub fn provider_id(&self) -> &'static str {
        match self {
            Self::Kraken(c) => c.id(),
            Self::Bitstamp(c) => c.id(),
        }
    }

    /// One bounded fetch; rejected keys come back as a validation failure.
    pub async fn validate_credentials(&self, account_id: &str) -> Result<()> {
        let result = match self {
            Self::Kraken(c) => c.fetch(account_id, None, Some(1)).await,
            Self::Bitstamp(c) => c.fetch(account_id, None, 1).await,
        };
        match result {
            Ok(_) => {
                info!("{} credentials accepted", self.provider_id());
                Ok(())
            }
            Err(ConnectorError::Unauthorized { detail, .. }) => Err(ConnectorError::Validation(
                format!("{} rejected the API key: {}", self.provider_id(), detail),
            )),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TransactionSource for ExchangeConnector {
    fn id(&self) -> &'static str {
        self.provider_id()
    }

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage> {
        match self {
            Self::Kraken(c) => c.fetch_page(account_id, cursor).await,
            Self::Bitstamp(c) => c.fetch_page(account_id, cursor).await,
        }
    }
}
