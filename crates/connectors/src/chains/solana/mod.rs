//! Solana (`solana:*`): Helius enhanced history first, then plain RPC.
//!
//! Both sources reduce a transaction to its net effect on the watched
//! address: one entry for SOL and one per SPL mint that moved.

mod helius;
mod rpc;

pub use helius::HeliusSource;
pub use rpc::RpcSource;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use ledgerlink_core::transactions::Direction;

use crate::chains::{ChainRef, ChainTransfer, SourceKit, WatchedAddress};
use crate::errors::Result;
use crate::fallback::FallbackChain;

pub(crate) const NATIVE_SYMBOL: &str = "SOL";
pub(crate) const LAMPORT_DECIMALS: u32 = 9;

/// Net movement of one asset within a transaction.
pub(crate) struct NetChange {
    /// `native` or the SPL mint.
    pub asset: String,
    pub net: Decimal,
    pub counterparty: Option<String>,
}

pub(crate) fn net_transfer(
    signature: &str,
    change: NetChange,
    timestamp: DateTime<Utc>,
    raw: &Value,
) -> Option<ChainTransfer> {
    let direction = Direction::from_net(change.net)?;
    let (tx_id, currency, symbol) = if change.asset == "native" {
        (
            format!("{}:native", signature),
            NATIVE_SYMBOL.to_string(),
            Some(NATIVE_SYMBOL.to_string()),
        )
    } else {
        (
            format!("{}:token:{}", signature, change.asset),
            change.asset.clone(),
            None,
        )
    };
    Some(ChainTransfer {
        tx_id,
        amount: change.net.abs(),
        currency,
        timestamp,
        direction,
        counterparty: change.counterparty,
        on_chain_units: None,
        on_chain_symbol: symbol,
        raw: raw.clone(),
    })
}

pub(crate) fn build(
    kit: &SourceKit<'_>,
    _chain: &ChainRef,
    watched: WatchedAddress,
) -> Result<FallbackChain> {
    let endpoints = &kit.settings.endpoints;
    let primary = HeliusSource::new(
        kit.http(helius::PROVIDER_ID),
        endpoints.helius.clone(),
        kit.settings.keys.helius.clone(),
        watched.clone(),
    );
    let fallback = RpcSource::new(
        kit.http(rpc::PROVIDER_ID),
        endpoints.solana_rpc.clone(),
        watched,
    );
    Ok(FallbackChain::new(vec![Box::new(primary), Box::new(fallback)]))
}
