//! Connector configuration. The factory never reads the environment; the
//! binary builds this from its own config.

use std::collections::HashMap;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// API keys for the indexing services. A missing key makes that provider
/// report `MissingCredentials`, which falls through to the next provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub alchemy: Option<String>,
    pub etherscan: Option<String>,
    pub helius: Option<String>,
    pub tatum: Option<String>,
    pub blockfrost: Option<String>,
    pub trongrid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub plaid: String,
    pub kraken: String,
    pub bitstamp: String,
    /// `{network}` is replaced by the Alchemy network name.
    pub alchemy: String,
    pub etherscan: String,
    pub tatum: String,
    pub esplora: String,
    pub helius: String,
    pub solana_rpc: String,
    pub xrpl_primary: String,
    pub xrpl_fallback: String,
    pub blockfrost: String,
    pub trongrid: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            plaid: plaid_base_url("production").to_string(),
            kraken: "https://api.kraken.com".to_string(),
            bitstamp: "https://www.bitstamp.net".to_string(),
            alchemy: "https://{network}.g.alchemy.com/v2".to_string(),
            etherscan: "https://api.etherscan.io/v2/api".to_string(),
            tatum: "https://api.tatum.io/v4/data".to_string(),
            esplora: "https://blockstream.info/api".to_string(),
            helius: "https://api.helius.xyz/v0".to_string(),
            solana_rpc: "https://api.mainnet-beta.solana.com".to_string(),
            xrpl_primary: "https://s1.ripple.com:51234/".to_string(),
            xrpl_fallback: "https://xrplcluster.com/".to_string(),
            blockfrost: "https://cardano-mainnet.blockfrost.io/api/v0".to_string(),
            trongrid: "https://api.trongrid.io".to_string(),
        }
    }
}

/// Bank-aggregation base URL for a Plaid-style environment name.
pub fn plaid_base_url(env: &str) -> &'static str {
    match env {
        "sandbox" => "https://sandbox.plaid.com",
        "development" => "https://development.plaid.com",
        _ => "https://production.plaid.com",
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub keys: ProviderKeys,
    pub endpoints: Endpoints,
    pub request_timeout: Duration,
    pub page_size: u32,
    pub retry: RetryPolicy,
    /// Minimum spacing between consecutive calls, by provider id.
    pub min_call_spacing: HashMap<String, Duration>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        // Public endpoints without keys get polite spacing.
        let min_call_spacing = HashMap::from([
            ("ETHERSCAN".to_string(), Duration::from_millis(250)),
            ("ESPLORA".to_string(), Duration::from_millis(200)),
            ("SOLANA_RPC".to_string(), Duration::from_millis(250)),
            ("XRPL_FALLBACK".to_string(), Duration::from_millis(200)),
            ("KRAKEN".to_string(), Duration::from_secs(1)),
        ]);
        Self {
            keys: ProviderKeys::default(),
            endpoints: Endpoints::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            min_call_spacing,
        }
    }
}
