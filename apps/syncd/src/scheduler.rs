//! Periodic sync of every syncable account.

use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use ledgerlink_core::errors::Error;
use ledgerlink_sync::SyncRequest;

use crate::main_lib::AppState;

/// Delay before the first cycle so a restart loop doesn't hammer providers.
const INITIAL_DELAY_SECS: u64 = 30;

pub async fn run_scheduler(state: Arc<AppState>) {
    info!(
        "Sync scheduler started ({}s interval)",
        state.config.sync_interval.as_secs()
    );
    tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

    let mut ticker = interval(state.config.sync_interval.max(Duration::from_secs(60)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        run_cycle(&state).await;
    }
}

/// One pass over all syncable accounts, one at a time.
pub async fn run_cycle(state: &AppState) {
    let accounts = match state.accounts.list_syncable() {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Failed to list accounts: {}", e);
            return;
        }
    };
    info!("Scheduled sync of {} accounts", accounts.len());

    let (mut synced, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for account in accounts {
        let request = SyncRequest::scheduled(&account.id, state.config.plan);
        match state.sync_service.sync(request).await {
            Ok(report) if report.skipped_provider.is_some() => skipped += 1,
            Ok(report) => {
                synced += 1;
                info!(
                    account = %account.id,
                    synced = report.synced_count,
                    new = report.new_transactions,
                    "account synced"
                );
            }
            Err(Error::SyncLimit(reason)) => {
                skipped += 1;
                info!(account = %account.id, "sync not allowed: {}", reason);
            }
            Err(e) => {
                failed += 1;
                warn!(account = %account.id, "sync failed: {}", e);
            }
        }
    }
    info!(
        "Scheduled sync finished: {} synced, {} skipped, {} failed",
        synced, skipped, failed
    );
}
