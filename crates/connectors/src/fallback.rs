//! Primary-then-fallback provider chains.
//!
//! Providers are tried in order. An *unavailable* failure (missing key, 5xx,
//! malformed payload) moves on to the next provider; a soft overload skips
//! the whole cycle without touching the fallbacks; anything else fails.
//!
//! Cursors belong to the provider that issued them. A persisted cursor is
//! always the primary's, so fallbacks start fresh, and once a provider has
//! served a page every later page of the same sync goes back to it.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::client::{ConnectorClient, FetchOutcome, FetchPage, SourcePage, TransactionSource};
use crate::cursor::Cursor;
use crate::errors::{ConnectorError, FallbackClass, Result};

pub struct FallbackChain {
    sources: Vec<Box<dyn TransactionSource>>,
    sticky: Mutex<Option<usize>>,
}

impl FallbackChain {
    pub fn new(sources: Vec<Box<dyn TransactionSource>>) -> Self {
        Self {
            sources,
            sticky: Mutex::new(None),
        }
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    fn lock_sticky(&self) -> MutexGuard<'_, Option<usize>> {
        self.sticky.lock().unwrap_or_else(|poisoned| {
            warn!("Fallback chain mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn served(&self, index: usize, page: SourcePage) -> FetchOutcome {
        *self.lock_sticky() = Some(index);
        FetchOutcome::Page(FetchPage {
            transactions: page.transactions,
            next_cursor: page.next_cursor.map(|c| c.encode()),
            // Only the primary's cursors are stable across syncs.
            persist_cursor: index == 0,
        })
    }

    async fn resume_sticky(
        &self,
        index: usize,
        account_id: &str,
        cursor: &Cursor,
    ) -> Result<FetchOutcome> {
        let source = self.sources.get(index).ok_or_else(|| {
            ConnectorError::Unsupported(format!("no provider at position {}", index))
        })?;
        debug!("Resuming pagination on {}", source.id());
        match source.fetch_page(account_id, Some(cursor)).await {
            Ok(page) => Ok(self.served(index, page)),
            Err(e) if e.fallback_class() == FallbackClass::SkipCycle => {
                info!("{} overloaded mid-pagination, skipping cycle", source.id());
                Ok(FetchOutcome::Overloaded {
                    provider: source.id().to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ConnectorClient for FallbackChain {
    async fn fetch_transactions(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<FetchOutcome> {
        let decoded = cursor.and_then(Cursor::decode);
        let sticky = *self.lock_sticky();
        if let (Some(cursor), Some(index)) = (decoded.as_ref(), sticky) {
            return self.resume_sticky(index, account_id, cursor).await;
        }

        let mut last_error: Option<ConnectorError> = None;
        for (index, source) in self.sources.iter().enumerate() {
            let source_cursor = if index == 0 { decoded.as_ref() } else { None };
            if index > 0 {
                info!("Falling back to {} for account {}", source.id(), account_id);
            }

            match source.fetch_page(account_id, source_cursor).await {
                Ok(page) => return Ok(self.served(index, page)),
                Err(e) => match e.fallback_class() {
                    FallbackClass::SkipCycle => {
                        info!(
                            "{} overloaded, skipping account {} this cycle",
                            source.id(),
                            account_id
                        );
                        return Ok(FetchOutcome::Overloaded {
                            provider: source.id().to_string(),
                        });
                    }
                    FallbackClass::Fail => return Err(e),
                    FallbackClass::NextProvider => {
                        warn!("{} unavailable: {}", source.id(), e);
                        last_error = Some(e);
                    }
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| ConnectorError::Unsupported("no providers configured".to_string())))
    }
}
