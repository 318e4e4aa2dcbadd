//! The adapter contract.
//!
//! [`ConnectorClient`] is what the orchestrator calls: one page per call,
//! cursor in, cursor out. [`TransactionSource`] is a single provider behind a
//! connector; fallback chains compose several of them.

use async_trait::async_trait;
use serde_json::Value;

use ledgerlink_core::transactions::{normalize, NormalizedTransaction};

use crate::cursor::Cursor;
use crate::errors::{ConnectorError, FallbackClass, Result};

/// One page of canonical transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPage {
    pub transactions: Vec<NormalizedTransaction>,
    /// `None` on the final page.
    pub next_cursor: Option<String>,
    /// False when the cursor must not outlive this sync (e.g. it was issued
    /// by a fallback provider, or the source re-derives position from dates).
    pub persist_cursor: bool,
}

/// Result of one fetch call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Page(FetchPage),
    /// Soft overload: skip this account for the current cycle.
    Overloaded { provider: String },
}

#[async_trait]
pub trait ConnectorClient: Send + Sync {
    async fn fetch_transactions(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<FetchOutcome>;
}

/// Page returned by a single provider, before cursor encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub transactions: Vec<NormalizedTransaction>,
    pub next_cursor: Option<Cursor>,
}

impl SourcePage {
    pub fn last(transactions: Vec<NormalizedTransaction>) -> Self {
        Self {
            transactions,
            next_cursor: None,
        }
    }
}

/// A single upstream provider.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn id(&self) -> &'static str;

    async fn fetch_page(&self, account_id: &str, cursor: Option<&Cursor>) -> Result<SourcePage>;
}

/// Funnels a provider row through [`normalize`], reporting shape errors
/// against the provider.
pub(crate) fn canonical(provider: &str, payload: Value) -> Result<NormalizedTransaction> {
    normalize(&payload).map_err(|e| ConnectorError::malformed(provider, e))
}

/// Wraps a single provider's result for connectors without fallbacks.
pub(crate) fn single_source_outcome(
    result: Result<SourcePage>,
    persist_cursor: bool,
) -> Result<FetchOutcome> {
    match result {
        Ok(page) => Ok(FetchOutcome::Page(FetchPage {
            transactions: page.transactions,
            next_cursor: page.next_cursor.map(|c| c.encode()),
            persist_cursor,
        })),
        Err(e) if e.fallback_class() == FallbackClass::SkipCycle => {
            Ok(FetchOutcome::Overloaded {
                provider: e.provider().unwrap_or("unknown").to_string(),
            })
        }
        Err(e) => Err(e),
    }
}
