use tracing::{debug, info, warn};

use ledgerlink_sync::{SyncProgressPayload, SyncProgressReporter, SyncStage};

/// Forwards sync progress to the log.
#[derive(Debug, Clone, Default)]
pub struct LogProgressReporter;

impl SyncProgressReporter for LogProgressReporter {
    fn report_progress(&self, payload: SyncProgressPayload) {
        let message = payload.message.as_deref().unwrap_or("");
        match payload.stage {
            SyncStage::Fetching => debug!(
                account = %payload.account_id,
                page = payload.page,
                fetched = payload.transactions_fetched,
                "page fetched"
            ),
            SyncStage::Failed => warn!(account = %payload.account_id, "sync failed: {}", message),
            stage => info!(account = %payload.account_id, "sync {}: {}", stage, message),
        }
    }
}
