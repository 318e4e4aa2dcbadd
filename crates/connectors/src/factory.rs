//! Connector selection.
//!
//! The factory owns everything that outlives a single sync (per-provider
//! throttles, the exchange asset cache) and builds a fresh [`Connector`] for
//! each account. Adapter families compiled out of this build report
//! `Unsupported` instead of failing at startup.

#[cfg(feature = "exchange")]
use std::sync::Arc;
#[cfg(feature = "exchange")]
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use ledgerlink_core::accounts::{Account, AccountType};
use ledgerlink_core::secrets::Credentials;
use ledgerlink_core::sync::DateWindow;

#[cfg(feature = "bank")]
use crate::bank::{BankSource, PlaidConnector};
#[cfg(feature = "exchange")]
use crate::cache::ExpiringCache;
use crate::chains::{ChainRef, SourceKit, WatchedAddress};
use crate::client::{ConnectorClient, FetchOutcome};
#[cfg(any(feature = "bank", feature = "exchange"))]
use crate::client::{single_source_outcome, TransactionSource};
#[cfg(any(feature = "bank", feature = "exchange"))]
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, Result};
#[cfg(feature = "exchange")]
use crate::exchange::{AssetTable, BitstampConnector, ExchangeConnector, KrakenConnector};
use crate::fallback::FallbackChain;
use crate::settings::ConnectorSettings;
use crate::throttle::ThrottleRegistry;

#[cfg(feature = "exchange")]
const ASSET_TABLE_TTL: Duration = Duration::from_secs(60 * 60);

/// What the factory needs to know about the account being synced.
#[derive(Debug, Clone, Default)]
pub struct AccountContext {
    pub account_id: String,
    /// Exchange identifier for `cex` accounts (`kraken`, `bitstamp`).
    pub provider: Option<String>,
    /// CAIP-2 chain id for `web3` accounts.
    pub chain: Option<String>,
    pub address: Option<String>,
    pub account_mask: Option<String>,
    pub credentials: Option<Credentials>,
    pub window: Option<DateWindow>,
}

impl AccountContext {
    pub fn from_account(
        account: &Account,
        credentials: Option<Credentials>,
        window: Option<DateWindow>,
    ) -> Self {
        Self {
            account_id: account.id.clone(),
            provider: account.provider.clone(),
            chain: account.chain.clone(),
            address: account.address.clone(),
            account_mask: account.account_mask.clone(),
            credentials,
            window,
        }
    }

    fn required_credentials(&self, provider: &str) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ConnectorError::MissingCredentials {
                provider: provider.to_string(),
            })
    }
}

/// Closed set of adapters the orchestrator can drive.
pub enum Connector {
    #[cfg(feature = "bank")]
    Bank(Box<dyn BankSource>),
    #[cfg(feature = "exchange")]
    Exchange(ExchangeConnector),
    Chain(FallbackChain),
}

impl Connector {
    /// One bounded call against bank and exchange APIs. Chain connectors
    /// read public data and have nothing to validate.
    pub async fn validate_credentials(&self, account_id: &str) -> Result<()> {
        match self {
            #[cfg(feature = "bank")]
            Connector::Bank(bank) => bank.validate_credentials(account_id).await,
            #[cfg(feature = "exchange")]
            Connector::Exchange(exchange) => exchange.validate_credentials(account_id).await,
            Connector::Chain(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectorClient for Connector {
    async fn fetch_transactions(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<FetchOutcome> {
        match self {
            // Window-driven sources re-derive their position from dates, so
            // their offsets only live for one sync.
            #[cfg(feature = "bank")]
            Connector::Bank(bank) => {
                let decoded = cursor.and_then(Cursor::decode);
                single_source_outcome(bank.fetch_page(account_id, decoded.as_ref()).await, false)
            }
            #[cfg(feature = "exchange")]
            Connector::Exchange(exchange) => {
                let decoded = cursor.and_then(Cursor::decode);
                single_source_outcome(
                    exchange.fetch_page(account_id, decoded.as_ref()).await,
                    false,
                )
            }
            Connector::Chain(chain) => chain.fetch_transactions(account_id, cursor).await,
        }
    }
}

pub struct ConnectorFactory {
    settings: ConnectorSettings,
    throttles: ThrottleRegistry,
    #[cfg(feature = "exchange")]
    kraken_assets: Arc<ExpiringCache<AssetTable>>,
}

impl ConnectorFactory {
    pub fn new(settings: ConnectorSettings) -> Self {
        let throttles = ThrottleRegistry::new(&settings.min_call_spacing);
        Self {
            settings,
            throttles,
            #[cfg(feature = "exchange")]
            kraken_assets: Arc::new(ExpiringCache::new(ASSET_TABLE_TTL)),
        }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    fn kit(&self) -> SourceKit<'_> {
        SourceKit {
            settings: &self.settings,
            throttles: &self.throttles,
        }
    }

    pub fn build_connector(&self, kind: AccountType, context: AccountContext) -> Result<Connector> {
        debug!("Building {} connector for {}", kind, context.account_id);
        match kind {
            AccountType::Traditional | AccountType::Investment => self.bank_connector(context),
            AccountType::Cex => self.exchange_connector(context),
            AccountType::Web3 => self.chain_connector(context).map(Connector::Chain),
            AccountType::Manual => Err(ConnectorError::Validation(
                "Manual accounts have no upstream source".to_string(),
            )),
        }
    }

    #[cfg(feature = "bank")]
    fn bank_connector(&self, context: AccountContext) -> Result<Connector> {
        let provider = crate::bank::PROVIDER_ID;
        let credentials = context.required_credentials(provider)?;
        let window = context.window.ok_or_else(|| {
            ConnectorError::Validation("Bank sync requires a date window".to_string())
        })?;
        let connector = PlaidConnector::new(
            self.kit().http(provider),
            self.settings.endpoints.plaid.clone(),
            credentials,
            window,
            self.settings.page_size,
        )?;
        Ok(Connector::Bank(Box::new(connector)))
    }

    #[cfg(not(feature = "bank"))]
    fn bank_connector(&self, _context: AccountContext) -> Result<Connector> {
        Err(ConnectorError::Unsupported(
            "bank aggregation support is not compiled in".to_string(),
        ))
    }

    #[cfg(feature = "exchange")]
    fn exchange_connector(&self, context: AccountContext) -> Result<Connector> {
        let exchange = context
            .provider
            .as_deref()
            .map(|p| p.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                ConnectorError::Validation("Exchange account without a provider".to_string())
            })?;
        let since = context.window.map(|w| w.start_utc());

        let connector = match exchange.as_str() {
            "kraken" => {
                let (key, secret) = api_pair(context.required_credentials("KRAKEN")?, "KRAKEN")?;
                ExchangeConnector::Kraken(KrakenConnector::new(
                    self.kit().http(crate::exchange::kraken::PROVIDER_ID),
                    self.settings.endpoints.kraken.clone(),
                    key,
                    secret,
                    since,
                    Arc::clone(&self.kraken_assets),
                ))
            }
            "bitstamp" => {
                let (key, secret) =
                    api_pair(context.required_credentials("BITSTAMP")?, "BITSTAMP")?;
                ExchangeConnector::Bitstamp(BitstampConnector::new(
                    self.kit().http(crate::exchange::bitstamp::PROVIDER_ID),
                    self.settings.endpoints.bitstamp.clone(),
                    key,
                    secret,
                    since,
                ))
            }
            other => {
                return Err(ConnectorError::Unsupported(format!(
                    "exchange '{}'",
                    other
                )))
            }
        };
        Ok(Connector::Exchange(connector))
    }

    #[cfg(not(feature = "exchange"))]
    fn exchange_connector(&self, _context: AccountContext) -> Result<Connector> {
        Err(ConnectorError::Unsupported(
            "exchange support is not compiled in".to_string(),
        ))
    }

    fn chain_connector(&self, context: AccountContext) -> Result<FallbackChain> {
        let chain_id = context
            .chain
            .as_deref()
            .ok_or_else(|| ConnectorError::Validation("Wallet account without a chain".to_string()))?;
        let address = context
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                ConnectorError::Validation("Wallet account without an address".to_string())
            })?;
        let chain = ChainRef::parse(chain_id)?;
        let watched = WatchedAddress {
            address: address.to_string(),
            since: context.window.map(|w| w.start_utc()),
            page_size: self.settings.page_size,
        };
        let kit = self.kit();

        match chain.namespace.as_str() {
            #[cfg(feature = "evm")]
            "eip155" => crate::chains::evm::build(&kit, &chain, watched),
            #[cfg(feature = "bitcoin")]
            "bip122" => crate::chains::bitcoin::build(&kit, &chain, watched),
            #[cfg(feature = "solana")]
            "solana" => crate::chains::solana::build(&kit, &chain, watched),
            #[cfg(feature = "xrpl")]
            "ripple" | "xrpl" => crate::chains::xrpl::build(&kit, &chain, watched),
            #[cfg(feature = "cardano")]
            "cardano" | "cip34" => crate::chains::cardano::build(&kit, &chain, watched),
            #[cfg(feature = "tron")]
            "tron" => crate::chains::tron::build(&kit, &chain, watched),
            other => Err(ConnectorError::Unsupported(format!(
                "chain namespace '{}'",
                other
            ))),
        }
    }
}

#[cfg(feature = "exchange")]
fn api_pair(credentials: &Credentials, provider: &str) -> Result<(String, String)> {
    match (&credentials.api_key, &credentials.api_secret) {
        (Some(key), Some(secret)) => Ok((key.clone(), secret.clone())),
        _ => Err(ConnectorError::MissingCredentials {
            provider: provider.to_string(),
        }),
    }
}

#[cfg(all(
    test,
    feature = "bank",
    feature = "exchange",
    feature = "evm",
    feature = "bitcoin",
    feature = "solana",
    feature = "xrpl",
    feature = "cardano",
    feature = "tron"
))]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn factory() -> ConnectorFactory {
        ConnectorFactory::new(ConnectorSettings::default())
    }

    fn wallet(chain: &str, address: &str) -> AccountContext {
        AccountContext {
            account_id: "acc-1".to_string(),
            chain: Some(chain.to_string()),
            address: Some(address.to_string()),
            ..Default::default()
        }
    }

    fn chain_ids(connector: Connector) -> Vec<&'static str> {
        match connector {
            Connector::Chain(chain) => chain.provider_ids(),
            _ => panic!("expected a chain connector"),
        }
    }

    #[test]
    fn resolves_chain_families() {
        let factory = factory();
        let cases = [
            ("eip155:1", vec!["ALCHEMY", "ETHERSCAN"]),
            ("bip122:000000000019d6689c085ae165831e93", vec!["TATUM", "ESPLORA"]),
            ("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp", vec!["HELIUS", "SOLANA_RPC"]),
            ("ripple:0", vec!["XRPL", "XRPL_FALLBACK"]),
            ("cardano:mainnet", vec!["BLOCKFROST"]),
            ("tron:mainnet", vec!["TRONGRID"]),
        ];
        for (chain, expected) in cases {
            let connector = factory
                .build_connector(AccountType::Web3, wallet(chain, "addr"))
                .unwrap();
            assert_eq!(chain_ids(connector), expected, "{}", chain);
        }
    }

    #[test]
    fn rejects_bad_wallet_configuration() {
        let factory = factory();
        assert!(matches!(
            factory.build_connector(AccountType::Web3, wallet("ethereum", "0xaa")),
            Err(ConnectorError::Validation(_))
        ));
        assert!(matches!(
            factory.build_connector(AccountType::Web3, wallet("eip155:1", "  ")),
            Err(ConnectorError::Validation(_))
        ));
        assert!(matches!(
            factory.build_connector(AccountType::Web3, wallet("cosmos:cosmoshub-4", "c1")),
            Err(ConnectorError::Unsupported(_))
        ));
        assert!(matches!(
            factory.build_connector(AccountType::Manual, AccountContext::default()),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn exchanges_need_a_known_provider_and_key_pair() {
        let factory = factory();
        let mut context = AccountContext {
            account_id: "acc-cex".to_string(),
            provider: Some("Kraken".to_string()),
            credentials: Some(Credentials {
                api_key: Some("k".to_string()),
                api_secret: Some("c2VjcmV0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            factory.build_connector(AccountType::Cex, context.clone()),
            Ok(Connector::Exchange(ExchangeConnector::Kraken(_)))
        ));

        context.provider = Some("mtgox".to_string());
        assert!(matches!(
            factory.build_connector(AccountType::Cex, context.clone()),
            Err(ConnectorError::Unsupported(_))
        ));

        context.provider = Some("bitstamp".to_string());
        context.credentials = None;
        assert!(matches!(
            factory.build_connector(AccountType::Cex, context),
            Err(ConnectorError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn bank_connector_needs_window_and_token() {
        let factory = factory();
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let credentials = Credentials {
            client_id: Some("cid".to_string()),
            client_secret: Some("sec".to_string()),
            access_token: Some("access-sandbox-1".to_string()),
            ..Default::default()
        };
        let context = AccountContext {
            account_id: "acc-bank".to_string(),
            credentials: Some(credentials),
            window: Some(window),
            ..Default::default()
        };
        assert!(matches!(
            factory.build_connector(AccountType::Traditional, context.clone()),
            Ok(Connector::Bank(_))
        ));
        assert!(matches!(
            factory.build_connector(
                AccountType::Investment,
                AccountContext {
                    window: None,
                    ..context
                }
            ),
            Err(ConnectorError::Validation(_))
        ));
    }
}
