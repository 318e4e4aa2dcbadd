//! Bitcoin (`bip122:*`): Tatum's address history first, then Esplora.

mod aggregate;
mod esplora;
mod tatum;

pub use esplora::EsploraSource;
pub use tatum::TatumSource;

use crate::chains::{ChainRef, SourceKit, WatchedAddress};
use crate::errors::Result;
use crate::fallback::FallbackChain;

pub(crate) const NATIVE_SYMBOL: &str = "BTC";
pub(crate) const SATOSHI_DECIMALS: u32 = 8;

pub(crate) fn build(
    kit: &SourceKit<'_>,
    _chain: &ChainRef,
    watched: WatchedAddress,
) -> Result<FallbackChain> {
    let endpoints = &kit.settings.endpoints;
    let primary = TatumSource::new(
        kit.http(tatum::PROVIDER_ID),
        endpoints.tatum.clone(),
        kit.settings.keys.tatum.clone(),
        watched.clone(),
    );
    let fallback = EsploraSource::new(
        kit.http(esplora::PROVIDER_ID),
        endpoints.esplora.clone(),
        watched,
    );
    Ok(FallbackChain::new(vec![Box::new(primary), Box::new(fallback)]))
}
