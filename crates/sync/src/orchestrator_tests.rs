use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use ledgerlink_connectors::{
    AccountContext, BankSource, Connector, ConnectorError, Cursor, FallbackChain, LiveAccount,
    LiveBalances, SourcePage, TransactionSource,
};
use ledgerlink_core::accounts::{
    Account, AccountRepositoryTrait, AccountType, NewAccount, SyncStatus,
};
use ledgerlink_core::categories::{CategoryRule, CategoryRuleRepositoryTrait, CategoryService};
use ledgerlink_core::errors::{Error, Result};
use ledgerlink_core::ledger::{
    CommitSummary, CursorUpdate, LedgerRepositoryTrait, LedgerService, LedgerTransaction,
    NewManualTransaction, SyncCommit,
};
use ledgerlink_core::secrets::SecretStore;
use ledgerlink_core::sync::{Plan, SyncAuditEntry, SyncAuditRepositoryTrait, SyncKind};
use ledgerlink_core::transactions::{Direction, NormalizedTransaction, TxType};

use crate::orchestrator::{SyncConfig, SyncRequest, SyncService};
use crate::progress::NoOpProgressReporter;
use crate::traits::ConnectorProvider;

const CHAIN: &str = "eip155:1";

// --- mocks -----------------------------------------------------------------

struct MockAccounts {
    account: Account,
    statuses: Mutex<Vec<SyncStatus>>,
}

#[async_trait]
impl AccountRepositoryTrait for MockAccounts {
    async fn create(&self, _new_account: NewAccount) -> Result<Account> {
        unimplemented!()
    }

    fn get_by_id(&self, _account_id: &str) -> Result<Account> {
        Ok(self.account.clone())
    }

    fn list_syncable(&self) -> Result<Vec<Account>> {
        Ok(vec![self.account.clone()])
    }

    async fn set_sync_status(&self, _account_id: &str, status: SyncStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

struct MockAudit {
    manual_count: u32,
}

impl SyncAuditRepositoryTrait for MockAudit {
    fn count_since(&self, _user_id: &str, _kind: SyncKind, _since: DateTime<Utc>) -> Result<u32> {
        Ok(self.manual_count)
    }

    fn list_for_account(&self, _account_id: &str, _limit: i64) -> Result<Vec<SyncAuditEntry>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct MockLedger {
    commits: Mutex<Vec<SyncCommit>>,
    known: Mutex<HashSet<String>>,
}

#[async_trait]
impl LedgerRepositoryTrait for MockLedger {
    async fn commit_sync(&self, commit: SyncCommit) -> Result<CommitSummary> {
        let mut known = self.known.lock().unwrap();
        let inserted = commit
            .upserts
            .iter()
            .filter(|u| known.insert(u.external_id.clone()))
            .count();
        let summary = CommitSummary {
            touched: commit.upserts.len(),
            inserted,
        };
        self.commits.lock().unwrap().push(commit);
        Ok(summary)
    }

    async fn create_manual(&self, _new_tx: NewManualTransaction) -> Result<LedgerTransaction> {
        unimplemented!()
    }

    async fn archive(&self, _uid: &str) -> Result<LedgerTransaction> {
        unimplemented!()
    }

    fn get_by_uid(&self, _uid: &str) -> Result<LedgerTransaction> {
        unimplemented!()
    }

    fn list_for_account(
        &self,
        _account_id: &str,
        _include_archived: bool,
    ) -> Result<Vec<LedgerTransaction>> {
        Ok(Vec::new())
    }
}

struct NoRules;

#[async_trait]
impl CategoryRuleRepositoryTrait for NoRules {
    fn list_for_user(&self, _user_id: &str) -> Result<Vec<CategoryRule>> {
        Ok(Vec::new())
    }

    async fn upsert(
        &self,
        _user_id: &str,
        _merchant_key: &str,
        _category: &str,
    ) -> Result<CategoryRule> {
        unimplemented!()
    }
}

struct NoSecrets;

impl SecretStore for NoSecrets {
    fn get_secret(&self, _secret_ref: &str, _owner: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn store_secret(&self, _payload: &str, _owner: &str, _purpose: &str) -> Result<String> {
        unimplemented!()
    }
}

/// Replays canned pages, recording the cursors it was asked for.
struct ScriptedSource {
    id: &'static str,
    responses: Mutex<VecDeque<std::result::Result<SourcePage, ConnectorError>>>,
    seen: Arc<Mutex<Vec<Option<Cursor>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(
        id: &'static str,
        responses: Vec<std::result::Result<SourcePage, ConnectorError>>,
    ) -> Self {
        Self {
            id,
            responses: Mutex::new(responses.into()),
            seen: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TransactionSource for ScriptedSource {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn fetch_page(
        &self,
        _account_id: &str,
        cursor: Option<&Cursor>,
    ) -> ledgerlink_connectors::Result<SourcePage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(cursor.cloned());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SourcePage::default()))
    }
}

/// Bank source with scripted pages and a fixed live-account answer.
struct MockBank {
    pages: ScriptedSource,
    live: Mutex<Option<std::result::Result<Vec<LiveAccount>, ConnectorError>>>,
}

#[async_trait]
impl TransactionSource for MockBank {
    fn id(&self) -> &'static str {
        self.pages.id
    }

    async fn fetch_page(
        &self,
        account_id: &str,
        cursor: Option<&Cursor>,
    ) -> ledgerlink_connectors::Result<SourcePage> {
        self.pages.fetch_page(account_id, cursor).await
    }
}

#[async_trait]
impl BankSource for MockBank {
    async fn live_accounts(&self) -> ledgerlink_connectors::Result<Vec<LiveAccount>> {
        self.live
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn validate_credentials(&self, _account_id: &str) -> ledgerlink_connectors::Result<()> {
        Ok(())
    }
}

/// Hands out one prepared bank connector or fallback chain.
struct MockProvider {
    sources: Mutex<Option<Vec<Box<dyn TransactionSource>>>>,
    bank: Mutex<Option<Box<dyn BankSource>>>,
}

impl ConnectorProvider for MockProvider {
    fn build_connector(
        &self,
        _kind: AccountType,
        _context: AccountContext,
    ) -> ledgerlink_connectors::Result<Connector> {
        if let Some(bank) = self.bank.lock().unwrap().take() {
            return Ok(Connector::Bank(bank));
        }
        let sources = self.sources.lock().unwrap().take().unwrap_or_default();
        Ok(Connector::Chain(FallbackChain::new(sources)))
    }
}

// --- fixtures --------------------------------------------------------------

fn wallet() -> Account {
    let now = Utc::now().naive_utc();
    Account {
        id: "acc-1".to_string(),
        user_id: "user-1".to_string(),
        name: "Wallet".to_string(),
        account_type: AccountType::Web3,
        provider: None,
        secret_ref: None,
        currency: "USD".to_string(),
        balance: dec!(0),
        sync_status: SyncStatus::Idle,
        sync_cursor: None,
        sync_chain: None,
        chain: Some(CHAIN.to_string()),
        address: Some("0x00000000000000000000000000000000000000aa".to_string()),
        account_mask: None,
        created_at: now,
        updated_at: now,
    }
}

fn checking() -> Account {
    Account {
        name: "Checking".to_string(),
        account_type: AccountType::Traditional,
        provider: Some("plaid".to_string()),
        chain: None,
        address: None,
        account_mask: Some("0000".to_string()),
        ..wallet()
    }
}

fn live_account(upstream_id: &str, mask: &str, current: rust_decimal::Decimal) -> LiveAccount {
    LiveAccount {
        account_id: upstream_id.to_string(),
        mask: Some(mask.to_string()),
        name: None,
        balances: LiveBalances {
            current: Some(current),
            available: None,
            iso_currency_code: Some("USD".to_string()),
        },
    }
}

fn bank_row(id: &str, upstream_id: &str) -> NormalizedTransaction {
    NormalizedTransaction {
        amount: dec!(-12.5),
        currency_code: "USD".to_string(),
        tx_type: TxType::Withdrawal,
        direction: None,
        raw: json!({ "transaction_id": id, "account_id": upstream_id }),
        ..transfer(id)
    }
}

fn transfer(id: &str) -> NormalizedTransaction {
    NormalizedTransaction {
        amount: dec!(1.5),
        currency_code: "ETH".to_string(),
        timestamp: Utc::now(),
        merchant_name: None,
        counterparty: None,
        tx_id: id.to_string(),
        account_id: "acc-1".to_string(),
        tx_type: TxType::Transfer,
        direction: Some(Direction::Outflow),
        on_chain_units: None,
        on_chain_symbol: None,
        raw: json!({ "hash": id }),
        display_amount: None,
    }
}

fn page(ids: &[&str], next: Option<Cursor>) -> std::result::Result<SourcePage, ConnectorError> {
    Ok(SourcePage {
        transactions: ids.iter().map(|id| transfer(id)).collect(),
        next_cursor: next,
    })
}

struct Harness {
    service: SyncService<NoOpProgressReporter>,
    accounts: Arc<MockAccounts>,
    ledger: Arc<MockLedger>,
    provider: Arc<MockProvider>,
}

fn harness(
    account: Account,
    sources: Vec<Box<dyn TransactionSource>>,
    manual_count: u32,
    config: SyncConfig,
) -> Harness {
    let accounts = Arc::new(MockAccounts {
        account,
        statuses: Mutex::new(Vec::new()),
    });
    let ledger = Arc::new(MockLedger::default());
    let ledger_service = Arc::new(LedgerService::new(
        ledger.clone(),
        Arc::new(CategoryService::new(Arc::new(NoRules))),
    ));
    let provider = Arc::new(MockProvider {
        sources: Mutex::new(Some(sources)),
        bank: Mutex::new(None),
    });
    let service = SyncService::new(
        accounts.clone(),
        Arc::new(MockAudit { manual_count }),
        ledger_service,
        Arc::new(NoSecrets),
        provider.clone(),
        Arc::new(NoOpProgressReporter),
        config,
    );
    Harness {
        service,
        accounts,
        ledger,
        provider,
    }
}

fn manual_request(plan: Plan) -> SyncRequest {
    SyncRequest::manual("acc-1", plan, false)
}

impl Harness {
    fn use_bank(
        &self,
        pages: Vec<std::result::Result<SourcePage, ConnectorError>>,
        live: std::result::Result<Vec<LiveAccount>, ConnectorError>,
    ) {
        *self.provider.bank.lock().unwrap() = Some(Box::new(MockBank {
            pages: ScriptedSource::new("BANK", pages),
            live: Mutex::new(Some(live)),
        }));
    }

    fn commits(&self) -> Vec<SyncCommit> {
        self.ledger.commits.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<SyncStatus> {
        self.accounts.statuses.lock().unwrap().clone()
    }
}

// --- tests -----------------------------------------------------------------

#[tokio::test]
async fn pages_until_the_final_page_and_clears_the_cursor() {
    let source = ScriptedSource::new(
        "PRIMARY",
        vec![
            page(&["a", "b"], Some(Cursor::offset(2))),
            page(&["c"], None),
        ],
    );
    let seen = source.seen.clone();
    let h = harness(wallet(), vec![Box::new(source)], 0, SyncConfig::default());

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.synced_count, 3);
    assert_eq!(report.new_transactions, 3);
    assert_eq!(report.plan, Plan::Premium);
    assert_eq!(
        (report.end_date - report.start_date).num_days(),
        30,
        "default lookback"
    );
    assert_eq!(*seen.lock().unwrap(), vec![None, Some(Cursor::offset(2))]);

    let commits = h.commits();
    assert_eq!(commits.len(), 1);
    let commit = &commits[0];
    assert_eq!(commit.upserts.len(), 3);
    assert!(commit.upserts.iter().all(|u| u.amount < dec!(0)));
    assert_eq!(
        commit.cursor,
        CursorUpdate::Replace {
            cursor: None,
            chain: Some(CHAIN.to_string())
        }
    );
    assert_eq!(commit.status, SyncStatus::Success);
    assert_eq!(commit.audit.as_ref().map(|a| a.kind), Some(SyncKind::Manual));
    assert_eq!(h.statuses(), vec![SyncStatus::Syncing]);
}

#[tokio::test]
async fn resyncing_the_same_page_adds_nothing_new() {
    let h = harness(
        wallet(),
        vec![Box::new(ScriptedSource::new("PRIMARY", vec![page(&["a", "b"], None)]))],
        0,
        SyncConfig::default(),
    );
    h.service.sync(manual_request(Plan::Premium)).await.unwrap();

    // Sources are consumed per build; hand the same page to a second run.
    *h.provider.sources.lock().unwrap() = Some(vec![Box::new(ScriptedSource::new(
        "PRIMARY",
        vec![page(&["a", "b"], None)],
    ))]);
    let second = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(second.synced_count, 2);
    assert_eq!(second.new_transactions, 0);
}

#[tokio::test]
async fn resumes_from_a_cursor_issued_for_the_same_chain() {
    let mut account = wallet();
    account.sync_cursor = Some(r#"{"offset":200}"#.to_string());
    account.sync_chain = Some(CHAIN.to_string());
    let source = ScriptedSource::new("PRIMARY", vec![page(&["x"], None)]);
    let seen = source.seen.clone();
    let h = harness(account, vec![Box::new(source)], 0, SyncConfig::default());

    h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Some(Cursor::offset(200))]);
}

#[tokio::test]
async fn chain_change_discards_the_stored_cursor() {
    let mut account = wallet();
    account.sync_cursor = Some(r#"{"offset":200}"#.to_string());
    account.sync_chain = Some("eip155:137".to_string());
    let source = ScriptedSource::new("PRIMARY", vec![page(&["x"], None)]);
    let seen = source.seen.clone();
    let h = harness(account, vec![Box::new(source)], 0, SyncConfig::default());

    h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn overloaded_first_page_skips_the_cycle() {
    let primary = ScriptedSource::new(
        "PRIMARY",
        vec![Err(ConnectorError::Overloaded {
            provider: "PRIMARY".to_string(),
        })],
    );
    let fallback = ScriptedSource::new("FALLBACK", vec![page(&["a"], None)]);
    let fallback_calls = fallback.calls.clone();
    let h = harness(
        wallet(),
        vec![Box::new(primary), Box::new(fallback)],
        0,
        SyncConfig::default(),
    );

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.synced_count, 0);
    assert_eq!(report.skipped_provider.as_deref(), Some("PRIMARY"));
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);

    let commits = h.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].upserts.is_empty());
    assert_eq!(commits[0].cursor, CursorUpdate::Keep);
    assert_eq!(commits[0].status, SyncStatus::Idle);
    assert!(commits[0].audit.is_some());
}

#[tokio::test]
async fn overload_mid_loop_commits_what_was_fetched() {
    let source = ScriptedSource::new(
        "PRIMARY",
        vec![
            page(&["a", "b"], Some(Cursor::offset(2))),
            Err(ConnectorError::Overloaded {
                provider: "PRIMARY".to_string(),
            }),
        ],
    );
    let h = harness(wallet(), vec![Box::new(source)], 0, SyncConfig::default());

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.new_transactions, 2);
    assert_eq!(report.skipped_provider.as_deref(), Some("PRIMARY"));

    let commits = h.commits();
    assert_eq!(
        commits[0].cursor,
        CursorUpdate::Replace {
            cursor: Some(Cursor::offset(2).encode()),
            chain: Some(CHAIN.to_string())
        }
    );
}

#[tokio::test]
async fn fallback_cursors_are_not_persisted() {
    let primary = ScriptedSource::new(
        "PRIMARY",
        vec![Err(ConnectorError::MissingCredentials {
            provider: "PRIMARY".to_string(),
        })],
    );
    let fallback = ScriptedSource::new("FALLBACK", vec![page(&["a"], Some(Cursor::before("a")))]);
    let fallback_calls = fallback.calls.clone();
    let config = SyncConfig {
        max_pages: 1,
        ..SyncConfig::default()
    };
    let h = harness(wallet(), vec![Box::new(primary), Box::new(fallback)], 0, config);

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.new_transactions, 1);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.commits()[0].cursor, CursorUpdate::Keep);
}

#[tokio::test]
async fn page_budget_parks_the_cursor_for_the_next_sync() {
    let source = ScriptedSource::new(
        "PRIMARY",
        vec![
            page(&["a"], Some(Cursor::offset(1))),
            page(&["b"], Some(Cursor::offset(2))),
        ],
    );
    let config = SyncConfig {
        max_pages: 2,
        ..SyncConfig::default()
    };
    let h = harness(wallet(), vec![Box::new(source)], 0, config);

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert!(!report.truncated);
    assert_eq!(
        h.commits()[0].cursor,
        CursorUpdate::Replace {
            cursor: Some(Cursor::offset(2).encode()),
            chain: Some(CHAIN.to_string())
        }
    );
}

#[tokio::test]
async fn stuck_cursor_fails_without_committing() {
    let mut account = wallet();
    account.sync_cursor = Some(Cursor::offset(5).encode());
    account.sync_chain = Some(CHAIN.to_string());
    let source = ScriptedSource::new("PRIMARY", vec![page(&["a"], Some(Cursor::offset(5)))]);
    let h = harness(account, vec![Box::new(source)], 0, SyncConfig::default());

    let result = h.service.sync(manual_request(Plan::Premium)).await;
    assert!(matches!(result, Err(Error::Provider(_))));
    assert!(h.commits().is_empty());
    assert_eq!(h.statuses(), vec![SyncStatus::Syncing, SyncStatus::Failed]);
}

#[tokio::test]
async fn hard_provider_errors_mark_the_account_failed() {
    let source = ScriptedSource::new(
        "PRIMARY",
        vec![Err(ConnectorError::Rejected {
            provider: "PRIMARY".to_string(),
            detail: "bad address".to_string(),
        })],
    );
    let h = harness(wallet(), vec![Box::new(source)], 0, SyncConfig::default());

    let err = h.service.sync(manual_request(Plan::Premium)).await.unwrap_err();
    assert_eq!(err.user_message(), "Sync failed, try again later");
    assert!(h.commits().is_empty());
    assert_eq!(h.statuses(), vec![SyncStatus::Syncing, SyncStatus::Failed]);
}

#[tokio::test]
async fn free_plan_is_refused_before_any_write() {
    let h = harness(wallet(), Vec::new(), 0, SyncConfig::default());
    let result = h.service.sync(manual_request(Plan::Free)).await;
    assert!(matches!(result, Err(Error::SyncLimit(_))));
    assert!(h.statuses().is_empty());
}

#[tokio::test]
async fn basic_plan_cap_spares_the_initial_sync() {
    let h = harness(
        wallet(),
        vec![Box::new(ScriptedSource::new("PRIMARY", vec![page(&["a"], None)]))],
        3,
        SyncConfig::default(),
    );
    assert!(matches!(
        h.service.sync(manual_request(Plan::Basic)).await,
        Err(Error::SyncLimit(_))
    ));

    let report = h
        .service
        .sync(SyncRequest::manual("acc-1", Plan::Basic, true))
        .await
        .unwrap();
    assert_eq!(report.new_transactions, 1);
    assert_eq!(
        h.commits()[0].audit.as_ref().map(|a| a.kind),
        Some(SyncKind::Initial)
    );
}

#[tokio::test]
async fn manual_accounts_cannot_sync() {
    let mut account = wallet();
    account.account_type = AccountType::Manual;
    let h = harness(account, Vec::new(), 0, SyncConfig::default());
    assert!(matches!(
        h.service.sync(manual_request(Plan::Premium)).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn inverted_dates_are_rejected() {
    let h = harness(wallet(), Vec::new(), 0, SyncConfig::default());
    let request = manual_request(Plan::Premium).with_dates(
        chrono::NaiveDate::from_ymd_opt(2024, 2, 1),
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
    );
    assert!(matches!(h.service.sync(request).await, Err(Error::Validation(_))));
    assert!(h.statuses().is_empty());
}

#[test]
fn sync_report_uses_the_trigger_field_names() {
    let report = crate::SyncReport {
        account_id: "acc-1".to_string(),
        synced_count: 3,
        new_transactions: 1,
        start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        plan: Plan::Basic,
        skipped_provider: None,
        truncated: false,
    };
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["synced_count"], 3);
    assert_eq!(value["new_transactions"], 1);
    assert_eq!(value["start_date"], "2024-01-01");
    assert_eq!(value["plan"], "basic");
    assert!(value.get("skipped_provider").is_none());
    assert!(value.get("truncated").is_none());
}

#[tokio::test]
async fn bank_sync_keeps_only_the_matched_sub_account() {
    let h = harness(checking(), Vec::new(), 0, SyncConfig::default());
    h.use_bank(
        vec![Ok(SourcePage {
            transactions: vec![bank_row("t1", "up-1"), bank_row("t2", "up-2")],
            next_cursor: None,
        })],
        Ok(vec![
            live_account("up-1", "0000", dec!(880.25)),
            live_account("up-2", "1111", dec!(5)),
        ]),
    );

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.synced_count, 1);

    let commits = h.commits();
    assert_eq!(commits[0].upserts.len(), 1);
    assert_eq!(commits[0].upserts[0].external_id, "t1");
    assert_eq!(commits[0].balance, Some(dec!(880.25)));
    assert_eq!(commits[0].cursor, CursorUpdate::Keep);
    assert_eq!(commits[0].status, SyncStatus::Success);
}

#[tokio::test]
async fn rate_limited_live_accounts_skips_the_cycle() {
    let h = harness(checking(), Vec::new(), 0, SyncConfig::default());
    h.use_bank(
        vec![page(&["t1"], None)],
        Err(ConnectorError::RateLimited {
            provider: "BANK".to_string(),
        }),
    );

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert_eq!(report.synced_count, 0);
    assert_eq!(report.skipped_provider.as_deref(), Some("BANK"));

    let commits = h.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].upserts.is_empty());
    assert_eq!(commits[0].balance, None);
    assert_eq!(commits[0].cursor, CursorUpdate::Keep);
    assert_eq!(commits[0].status, SyncStatus::Idle);
    assert!(!h.statuses().contains(&SyncStatus::Failed));
}

#[tokio::test]
async fn rejected_live_accounts_fails_the_sync() {
    let h = harness(checking(), Vec::new(), 0, SyncConfig::default());
    h.use_bank(
        vec![page(&["t1"], None)],
        Err(ConnectorError::Unauthorized {
            provider: "BANK".to_string(),
            detail: "ITEM_LOGIN_REQUIRED".to_string(),
        }),
    );

    assert!(h.service.sync(manual_request(Plan::Premium)).await.is_err());
    assert!(h.commits().is_empty());
    assert_eq!(h.statuses().last(), Some(&SyncStatus::Failed));
}

#[tokio::test]
async fn page_budget_on_a_date_window_sync_reports_truncation() {
    let exchange = Account {
        account_type: AccountType::Cex,
        provider: Some("kraken".to_string()),
        chain: None,
        address: None,
        ..wallet()
    };
    let source = ScriptedSource::new(
        "EXCHANGE",
        vec![
            page(&["a"], Some(Cursor::offset(1))),
            page(&["b"], Some(Cursor::offset(2))),
        ],
    );
    let config = SyncConfig {
        max_pages: 1,
        ..SyncConfig::default()
    };
    let h = harness(exchange, vec![Box::new(source)], 0, config);

    let report = h.service.sync(manual_request(Plan::Premium)).await.unwrap();
    assert!(report.truncated);
    assert_eq!(report.synced_count, 1);
    assert_eq!(h.commits()[0].cursor, CursorUpdate::Keep);
}
