//! Account sync orchestration.
//!
//! One call to [`SyncService::sync`] is one unit of work: pages are fetched
//! strictly in sequence (each cursor depends on the previous page) and every
//! write lands in a single ledger commit at the end. A failure before that
//! commit leaves ledger rows, cursor and balance exactly as they were.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerlink_connectors::{
    AccountContext, Connector, ConnectorClient, FallbackClass, FetchOutcome, TransactionSource,
};
use ledgerlink_core::accounts::{Account, AccountRepositoryTrait, AccountType, SyncStatus};
use ledgerlink_core::errors::{ProviderError, Result, ValidationError};
use ledgerlink_core::ledger::{AuditStamp, CursorUpdate, LedgerService, SyncBatch};
use ledgerlink_core::secrets::{load_credentials, SecretStore};
use ledgerlink_core::sync::{
    resolve_window_with_lookback, DateWindow, Plan, SyncAuditRepositoryTrait, SyncKind,
    SyncPolicy, DEFAULT_EXCHANGE_LOOKBACK_DAYS, DEFAULT_LOOKBACK_DAYS,
};
use ledgerlink_core::transactions::NormalizedTransaction;

use crate::progress::{SyncProgressPayload, SyncProgressReporter, SyncStage};
use crate::scope::{match_live_account, retain_sub_account, retain_window};
use crate::traits::ConnectorProvider;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub default_lookback_days: i64,
    pub exchange_lookback_days: i64,
    /// Pages fetched per sync before the cursor is parked for the next run.
    pub max_pages: usize,
    pub policy: SyncPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: DEFAULT_LOOKBACK_DAYS,
            exchange_lookback_days: DEFAULT_EXCHANGE_LOOKBACK_DAYS,
            max_pages: 50,
            policy: SyncPolicy::default(),
        }
    }
}

/// A sync trigger.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub account_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub kind: SyncKind,
    /// Subscription tier of the account owner, resolved by the caller.
    pub plan: Plan,
}

impl SyncRequest {
    /// A user-triggered sync; `initial` marks the one-time post-link run.
    pub fn manual(account_id: impl Into<String>, plan: Plan, initial: bool) -> Self {
        Self {
            account_id: account_id.into(),
            start_date: None,
            end_date: None,
            kind: if initial {
                SyncKind::Initial
            } else {
                SyncKind::Manual
            },
            plan,
        }
    }

    pub fn scheduled(account_id: impl Into<String>, plan: Plan) -> Self {
        Self {
            kind: SyncKind::Scheduled,
            ..Self::manual(account_id, plan, false)
        }
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }
}

/// Outcome of one sync call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub account_id: String,
    /// Ledger rows inserted or updated.
    pub synced_count: usize,
    pub new_transactions: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub plan: Plan,
    /// Set when a provider was overloaded and the rest of the cycle was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_provider: Option<String>,
    /// The page budget ran out before the end of a date window. Only chain
    /// accounts resume from a stored cursor, so the rest of the window is not
    /// fetched by this sync.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// What the page loop collected.
#[derive(Debug, Default)]
struct Fetched {
    transactions: Vec<NormalizedTransaction>,
    pages: usize,
    /// Cursor to resume from; `None` once the final page was read.
    cursor: Option<String>,
    /// Whether `cursor` may outlive this sync.
    persist_cursor: bool,
    overloaded: Option<String>,
    /// Stopped by the page budget with more pages upstream.
    budget_exhausted: bool,
}

/// Runs account syncs.
pub struct SyncService<P: SyncProgressReporter> {
    accounts: Arc<dyn AccountRepositoryTrait>,
    audit: Arc<dyn SyncAuditRepositoryTrait>,
    ledger: Arc<LedgerService>,
    secrets: Arc<dyn SecretStore>,
    connectors: Arc<dyn ConnectorProvider>,
    progress_reporter: Arc<P>,
    config: SyncConfig,
}

impl<P: SyncProgressReporter> SyncService<P> {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        audit: Arc<dyn SyncAuditRepositoryTrait>,
        ledger: Arc<LedgerService>,
        secrets: Arc<dyn SecretStore>,
        connectors: Arc<dyn ConnectorProvider>,
        progress_reporter: Arc<P>,
        config: SyncConfig,
    ) -> Self {
        Self {
            accounts,
            audit,
            ledger,
            secrets,
            connectors,
            progress_reporter,
            config,
        }
    }

    /// Syncs one account.
    ///
    /// Refusals (manual account, plan limit, bad dates) happen before the
    /// account is touched. Once the status flag is set, any error flips it
    /// to `failed` and nothing else is written.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncReport> {
        let account = self.accounts.get_by_id(&request.account_id)?;
        if !account.account_type.is_syncable() {
            return Err(ValidationError::InvalidInput(format!(
                "Account {} is tracked manually and cannot be synced",
                account.id
            ))
            .into());
        }
        self.check_plan(&account, &request)?;
        let window = self.resolve_window(&account, &request)?;

        info!(
            "Syncing {} account {} ({} sync, {} -> {})",
            account.account_type, account.id, request.kind, window.start, window.end
        );
        self.progress_reporter.report_progress(
            SyncProgressPayload::new(&account.id, SyncStage::Starting)
                .with_message(format!("{} -> {}", window.start, window.end)),
        );

        self.accounts
            .set_sync_status(&account.id, SyncStatus::Syncing)
            .await?;

        match self.run(&account, &request, window).await {
            Ok(report) => {
                let stage = if report.skipped_provider.is_some() {
                    SyncStage::Skipped
                } else {
                    SyncStage::Complete
                };
                self.progress_reporter.report_progress(
                    SyncProgressPayload::new(&account.id, stage)
                        .with_transactions_fetched(report.synced_count)
                        .with_message(format!("{} new", report.new_transactions)),
                );
                Ok(report)
            }
            Err(err) => {
                error!("Sync of account {} failed: {}", account.id, err);
                if let Err(status_err) = self
                    .accounts
                    .set_sync_status(&account.id, SyncStatus::Failed)
                    .await
                {
                    error!(
                        "Failed to mark account {} as failed: {}",
                        account.id, status_err
                    );
                }
                self.progress_reporter.report_progress(
                    SyncProgressPayload::new(&account.id, SyncStage::Failed)
                        .with_message(err.user_message()),
                );
                Err(err)
            }
        }
    }

    fn check_plan(&self, account: &Account, request: &SyncRequest) -> Result<()> {
        let manual_syncs = if request.plan == Plan::Basic && request.kind == SyncKind::Manual {
            let since = Utc::now() - Duration::hours(24);
            self.audit
                .count_since(&account.user_id, SyncKind::Manual, since)?
        } else {
            0
        };
        debug!(
            "Plan {} for user {}: {} manual syncs in the last 24h",
            request.plan, account.user_id, manual_syncs
        );
        self.config
            .policy
            .check(request.plan, request.kind, manual_syncs)
    }

    fn resolve_window(&self, account: &Account, request: &SyncRequest) -> Result<DateWindow> {
        let lookback = match account.account_type {
            AccountType::Cex => self.config.exchange_lookback_days,
            _ => self.config.default_lookback_days,
        };
        resolve_window_with_lookback(
            request.start_date,
            request.end_date,
            lookback,
            Utc::now().date_naive(),
        )
    }

    async fn run(
        &self,
        account: &Account,
        request: &SyncRequest,
        window: DateWindow,
    ) -> Result<SyncReport> {
        let credentials =
            load_credentials(self.secrets.as_ref(), account.secret_ref.as_deref(), &account.user_id)?;
        let context = AccountContext::from_account(account, credentials, Some(window));
        let connector = self
            .connectors
            .build_connector(account.account_type, context)?;

        let start_cursor = match account.account_type {
            AccountType::Web3 => {
                if account.chain_changed() {
                    info!(
                        "Account {} moved from {:?} to {:?}, starting over",
                        account.id, account.sync_chain, account.chain
                    );
                }
                account.trusted_cursor().map(str::to_string)
            }
            _ => None,
        };

        let mut fetched = self.fetch_pages(account, &connector, start_cursor).await?;
        let audit = Some(AuditStamp {
            user_id: account.user_id.clone(),
            kind: request.kind,
        });

        if fetched.pages == 0 {
            if let Some(provider) = fetched.overloaded {
                return self.skip_cycle(account, request, window, audit, provider).await;
            }
        }

        let mut balance: Option<Decimal> = None;
        match (&connector, account.account_type) {
            (Connector::Bank(bank), _) => {
                let live = match bank.live_accounts().await {
                    Ok(live) => live,
                    // Without the live list the fetched rows can't be scoped
                    // to this account, so the whole cycle is dropped.
                    Err(e) if e.fallback_class() == FallbackClass::SkipCycle => {
                        return self
                            .skip_cycle(account, request, window, audit, bank.id().to_string())
                            .await;
                    }
                    Err(e) => return Err(e.into()),
                };
                if let Some(upstream) = match_live_account(account.account_mask.as_deref(), &live)?
                {
                    retain_sub_account(&mut fetched.transactions, &upstream.account_id);
                    balance = upstream.balance();
                }
            }
            (_, AccountType::Cex) => retain_window(&mut fetched.transactions, &window),
            _ => {}
        }

        let truncated = fetched.budget_exhausted && account.account_type != AccountType::Web3;
        if truncated {
            warn!(
                "Account {} has more than {} pages in {} -> {}; older rows were not fetched",
                account.id, self.config.max_pages, window.start, window.end
            );
        }

        let cursor = cursor_update(account, &fetched);
        let summary = self
            .ledger
            .reconcile(
                account,
                SyncBatch {
                    transactions: fetched.transactions,
                    cursor,
                    balance,
                    status: SyncStatus::Success,
                    audit,
                },
            )
            .await?;

        Ok(SyncReport {
            truncated,
            ..report(
                account,
                window,
                request.plan,
                summary.touched,
                summary.inserted,
                fetched.overloaded,
            )
        })
    }

    /// Provider overloaded: nothing is reconciled, the status flag goes back
    /// to idle and the attempt still counts in the audit trail.
    async fn skip_cycle(
        &self,
        account: &Account,
        request: &SyncRequest,
        window: DateWindow,
        audit: Option<AuditStamp>,
        provider: String,
    ) -> Result<SyncReport> {
        info!(
            "{} is overloaded, skipping account {} this cycle",
            provider, account.id
        );
        self.ledger
            .reconcile(
                account,
                SyncBatch {
                    status: SyncStatus::Idle,
                    audit,
                    ..Default::default()
                },
            )
            .await?;
        Ok(report(account, window, request.plan, 0, 0, Some(provider)))
    }

    /// Sequential page loop.
    ///
    /// Stops on the final page, on the page budget, or on an overloaded
    /// provider; in the last two cases `cursor` is where the next sync
    /// resumes.
    async fn fetch_pages(
        &self,
        account: &Account,
        connector: &Connector,
        start_cursor: Option<String>,
    ) -> Result<Fetched> {
        let mut fetched = Fetched {
            cursor: start_cursor,
            persist_cursor: true,
            ..Default::default()
        };

        loop {
            if fetched.pages >= self.config.max_pages {
                debug!(
                    "Account {} hit the page budget ({})",
                    account.id, self.config.max_pages
                );
                fetched.budget_exhausted = true;
                break;
            }

            let outcome = connector
                .fetch_transactions(&account.id, fetched.cursor.as_deref())
                .await?;
            let page = match outcome {
                FetchOutcome::Page(page) => page,
                FetchOutcome::Overloaded { provider } => {
                    fetched.overloaded = Some(provider);
                    break;
                }
            };

            if page.next_cursor.is_some() && page.next_cursor == fetched.cursor {
                return Err(ProviderError::new(
                    account.provider.clone().unwrap_or_else(|| account.account_type.to_string()),
                    "Pagination appears stuck (same cursor returned twice)",
                )
                .into());
            }

            fetched.pages += 1;
            debug!(
                "Account {}: page {} with {} transactions",
                account.id,
                fetched.pages,
                page.transactions.len()
            );
            fetched.transactions.extend(page.transactions);
            fetched.cursor = page.next_cursor;
            fetched.persist_cursor = page.persist_cursor;

            self.progress_reporter.report_progress(
                SyncProgressPayload::new(&account.id, SyncStage::Fetching)
                    .with_page(fetched.pages)
                    .with_transactions_fetched(fetched.transactions.len()),
            );

            if fetched.cursor.is_none() {
                break;
            }
        }
        Ok(fetched)
    }
}

/// Chain accounts keep their cursor between syncs; everything else derives
/// its position from the date window.
fn cursor_update(account: &Account, fetched: &Fetched) -> CursorUpdate {
    if account.account_type != AccountType::Web3 {
        return CursorUpdate::Keep;
    }
    if fetched.persist_cursor {
        CursorUpdate::Replace {
            cursor: fetched.cursor.clone(),
            chain: account.chain.clone(),
        }
    } else if account.chain_changed() {
        CursorUpdate::Replace {
            cursor: None,
            chain: account.chain.clone(),
        }
    } else {
        CursorUpdate::Keep
    }
}

fn report(
    account: &Account,
    window: DateWindow,
    plan: Plan,
    synced_count: usize,
    new_transactions: usize,
    skipped_provider: Option<String>,
) -> SyncReport {
    SyncReport {
        account_id: account.id.clone(),
        synced_count,
        new_transactions,
        start_date: window.start,
        end_date: window.end,
        plan,
        skipped_provider,
        truncated: false,
    }
}

