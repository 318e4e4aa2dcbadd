//! Ledgerlink source connectors
//!
//! Pulls raw account activity from bank aggregators, centralized exchanges
//! and public blockchains, and hands it back as canonical
//! [`NormalizedTransaction`](ledgerlink_core::transactions::NormalizedTransaction)s.
//!
//! # Architecture
//!
//! ```text
//!                    +--------------------+
//!                    |  ConnectorFactory  |  (account type -> adapter)
//!                    +--------------------+
//!                              |
//!           +------------------+------------------+
//!           v                  v                  v
//!     +-----------+     +-------------+    +---------------+
//!     |   Bank    |     |  Exchange   |    | FallbackChain |  (sticky, per chain)
//!     +-----------+     +-------------+    +---------------+
//!           |                  |                  |
//!           v                  v                  v
//!     +---------------------------------------------------+
//!     |  HttpClient  (throttle -> retry/backoff -> check) |
//!     +---------------------------------------------------+
//! ```
//!
//! # Core Types
//!
//! - [`ConnectorClient`] - What the sync orchestrator drives, one page at a time
//! - [`TransactionSource`] - A single upstream provider
//! - [`Cursor`] - Opaque, serialized resume position
//! - [`ConnectorError`] - Classified failures (retry vs. fall back vs. give up)
//!
//! Adapter families are behind cargo features (`bank`, `exchange`, `evm`,
//! `bitcoin`, `solana`, `xrpl`, `cardano`, `tron`), all on by default.

pub mod cache;
pub mod chains;
pub mod client;
pub mod cursor;
pub mod errors;
pub mod factory;
pub mod fallback;
pub mod http;
pub mod retry;
pub mod settings;
pub mod throttle;
pub mod units;

#[cfg(feature = "bank")]
pub mod bank;
#[cfg(feature = "exchange")]
pub mod exchange;

pub use client::{ConnectorClient, FetchOutcome, FetchPage, SourcePage, TransactionSource};
pub use cursor::Cursor;
pub use errors::{ConnectorError, FallbackClass, Result, RetryClass};
pub use factory::{AccountContext, Connector, ConnectorFactory};
pub use fallback::FallbackChain;
pub use retry::{Backoff, RetryPolicy};
pub use settings::{ConnectorSettings, Endpoints, ProviderKeys};

#[cfg(feature = "bank")]
pub use bank::{BankSource, LiveAccount, LiveBalances, PlaidConnector};
