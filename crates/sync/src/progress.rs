//! Progress reporting for account syncs.

use serde::{Deserialize, Serialize};

/// Where a sync currently is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Starting,
    Fetching,
    Complete,
    /// Provider overloaded; retried next cycle.
    Skipped,
    Failed,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStage::Starting => write!(f, "starting"),
            SyncStage::Fetching => write!(f, "fetching"),
            SyncStage::Complete => write!(f, "complete"),
            SyncStage::Skipped => write!(f, "skipped"),
            SyncStage::Failed => write!(f, "failed"),
        }
    }
}

/// Payload for sync progress events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressPayload {
    pub account_id: String,
    pub stage: SyncStage,
    /// Pages fetched so far (1-based once fetching starts).
    pub page: usize,
    pub transactions_fetched: usize,
    pub message: Option<String>,
}

impl SyncProgressPayload {
    pub fn new(account_id: impl Into<String>, stage: SyncStage) -> Self {
        Self {
            account_id: account_id.into(),
            stage,
            page: 0,
            transactions_fetched: 0,
            message: None,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_transactions_fetched(mut self, count: usize) -> Self {
        self.transactions_fetched = count;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Receives sync progress events.
///
/// The worker logs them; an API layer could forward them to clients.
pub trait SyncProgressReporter: Send + Sync {
    fn report_progress(&self, payload: SyncProgressPayload);
}

/// Reporter for contexts that don't surface progress.
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressReporter;

impl SyncProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _payload: SyncProgressPayload) {
        // No-op
    }
}
