//! EVM chains (`eip155:*`): Alchemy transfers API first, then an
//! Etherscan-compatible explorer.

mod alchemy;
mod etherscan;

pub use alchemy::AlchemySource;
pub use etherscan::EtherscanSource;

use crate::chains::{ChainRef, SourceKit, WatchedAddress};
use crate::errors::{ConnectorError, Result};
use crate::fallback::FallbackChain;

/// Alchemy network name for a CAIP-2 `eip155` reference.
pub fn network_name(reference: &str) -> Result<&'static str> {
    match reference {
        "1" => Ok("eth-mainnet"),
        "10" => Ok("opt-mainnet"),
        "137" => Ok("polygon-mainnet"),
        "8453" => Ok("base-mainnet"),
        "42161" => Ok("arb-mainnet"),
        "11155111" => Ok("eth-sepolia"),
        other => Err(ConnectorError::Validation(format!(
            "Unsupported EVM chain id '{}'",
            other
        ))),
    }
}

/// Symbol of the chain's gas token.
pub fn native_symbol(reference: &str) -> &'static str {
    match reference {
        "137" => "POL",
        _ => "ETH",
    }
}

pub(crate) fn build(kit: &SourceKit<'_>, chain: &ChainRef, watched: WatchedAddress) -> Result<FallbackChain> {
    let network = network_name(&chain.reference)?;
    let symbol = native_symbol(&chain.reference);
    let endpoints = &kit.settings.endpoints;

    let alchemy_url = kit.settings.keys.alchemy.as_ref().map(|key| {
        format!("{}/{}", endpoints.alchemy.replace("{network}", network), key)
    });
    let primary = AlchemySource::new(
        kit.http(alchemy::PROVIDER_ID),
        alchemy_url,
        watched.clone(),
        symbol,
    );
    let fallback = EtherscanSource::new(
        kit.http(etherscan::PROVIDER_ID),
        endpoints.etherscan.clone(),
        kit.settings.keys.etherscan.clone(),
        chain.reference.clone(),
        watched,
        symbol,
    );
    Ok(FallbackChain::new(vec![Box::new(primary), Box::new(fallback)]))
}
