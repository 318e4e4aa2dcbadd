use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use ledgerlink_core::categories::CATEGORY_UNCATEGORIZED;
use ledgerlink_core::errors::{Result, ValidationError};
use ledgerlink_core::ledger::{
    CommitSummary, CursorUpdate, LedgerRepositoryTrait, LedgerTransaction, NewManualTransaction,
    SyncCommit,
};

use crate::accounts::{AccountDB, AccountSyncChangeset};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{ledger_write_error, StorageError};
use crate::schema::{accounts, sync_audit, transactions};
use crate::sync::SyncAuditDB;

use super::model::{LedgerRowChangeset, LedgerRowDB};

// Keeps `IN (...)` lists well below SQLite's bound-parameter limit.
const EXTERNAL_ID_CHUNK: usize = 500;

pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn load_account(conn: &mut SqliteConnection, account_id: &str) -> Result<AccountDB> {
    Ok(accounts::table
        .find(account_id)
        .select(AccountDB::as_select())
        .first::<AccountDB>(conn)
        .map_err(StorageError::from)?)
}

fn write_balance(conn: &mut SqliteConnection, account_id: &str, balance: Decimal) -> Result<()> {
    let changes = AccountSyncChangeset {
        balance: Some(balance.to_string()),
        updated_at: Some(chrono::Utc::now().naive_utc()),
        ..Default::default()
    };
    diesel::update(accounts::table.find(account_id))
        .set(&changes)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Maps `external_id -> uid` for the rows of `account_id` already in the ledger.
fn existing_uids(
    conn: &mut SqliteConnection,
    account_id: &str,
    external_ids: &[&str],
) -> Result<HashMap<String, String>> {
    let mut found = HashMap::with_capacity(external_ids.len());
    for chunk in external_ids.chunks(EXTERNAL_ID_CHUNK) {
        let rows: Vec<(String, Option<String>)> = transactions::table
            .filter(transactions::account_id.eq(account_id))
            .filter(transactions::external_id.eq_any(chunk.to_vec()))
            .select((transactions::uid, transactions::external_id))
            .load(conn)
            .map_err(StorageError::from)?;
        for (uid, external_id) in rows {
            if let Some(external_id) = external_id {
                found.insert(external_id, uid);
            }
        }
    }
    Ok(found)
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn commit_sync(&self, commit: SyncCommit) -> Result<CommitSummary> {
        self.writer
            .exec(move |conn| -> Result<CommitSummary> {
                let account = load_account(conn, &commit.account_id)?;
                let now = chrono::Utc::now().naive_utc();

                let external_ids: Vec<&str> = commit
                    .upserts
                    .iter()
                    .map(|u| u.external_id.as_str())
                    .collect();
                let mut existing = existing_uids(conn, &account.id, &external_ids)?;

                let mut summary = CommitSummary::default();
                for upsert in &commit.upserts {
                    match existing.get(&upsert.external_id) {
                        Some(uid) => {
                            diesel::update(transactions::table.find(uid))
                                .set(&LedgerRowChangeset::from_upsert(upsert, now))
                                .execute(conn)
                                .map_err(|e| ledger_write_error(e, &account.id))?;
                        }
                        None => {
                            let row = LedgerRowDB::synced(&account.id, upsert, now);
                            diesel::insert_into(transactions::table)
                                .values(&row)
                                .execute(conn)
                                .map_err(|e| ledger_write_error(e, &account.id))?;
                            existing.insert(upsert.external_id.clone(), row.uid);
                            summary.inserted += 1;
                        }
                    }
                    summary.touched += 1;
                }

                let mut changes = AccountSyncChangeset {
                    sync_status: Some(commit.status.as_str().to_string()),
                    balance: commit.balance.map(|b| b.to_string()),
                    updated_at: Some(now),
                    ..Default::default()
                };
                if let CursorUpdate::Replace { cursor, chain } = commit.cursor {
                    changes.sync_cursor = Some(cursor);
                    changes.sync_chain = Some(chain);
                }
                diesel::update(accounts::table.find(&account.id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                if let Some(stamp) = commit.audit {
                    let entry = SyncAuditDB::new(
                        &account.id,
                        &stamp.user_id,
                        stamp.kind,
                        summary.touched,
                        summary.inserted,
                        now,
                    );
                    diesel::insert_into(sync_audit::table)
                        .values(&entry)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }

                debug!(
                    "Committed sync for {}: {} touched, {} inserted",
                    account.id, summary.touched, summary.inserted
                );
                Ok(summary)
            })
            .await
    }

    async fn create_manual(&self, new_tx: NewManualTransaction) -> Result<LedgerTransaction> {
        new_tx.validate()?;

        self.writer
            .exec(move |conn| -> Result<LedgerTransaction> {
                let account = load_account(conn, &new_tx.account_id)?;
                let balance = account.parsed_balance()?;

                let currency = new_tx
                    .currency
                    .clone()
                    .unwrap_or_else(|| account.currency.clone());
                let category = new_tx
                    .category
                    .clone()
                    .unwrap_or_else(|| CATEGORY_UNCATEGORIZED.to_string());
                let amount = new_tx.amount;
                let row = LedgerRowDB::manual(new_tx, currency, category);

                diesel::insert_into(transactions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| ledger_write_error(e, &account.id))?;
                write_balance(conn, &account.id, balance + amount)?;

                Ok(LedgerTransaction::try_from(row)?)
            })
            .await
    }

    async fn archive(&self, uid: &str) -> Result<LedgerTransaction> {
        let uid = uid.to_string();

        self.writer
            .exec(move |conn| -> Result<LedgerTransaction> {
                let row = transactions::table
                    .find(&uid)
                    .select(LedgerRowDB::as_select())
                    .first::<LedgerRowDB>(conn)
                    .map_err(StorageError::from)?;

                if !row.is_manual {
                    return Err(ValidationError::InvalidInput(format!(
                        "Transaction {} is synced and cannot be archived",
                        uid
                    ))
                    .into());
                }
                if row.archived {
                    return Ok(LedgerTransaction::try_from(row)?);
                }

                let account = load_account(conn, &row.account_id)?;
                let balance = account.parsed_balance()?;
                let amount = row.parsed_amount()?;

                let archived = diesel::update(transactions::table.find(&uid))
                    .set((
                        transactions::archived.eq(true),
                        transactions::updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .returning(LedgerRowDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                write_balance(conn, &account.id, balance - amount)?;

                Ok(LedgerTransaction::try_from(archived)?)
            })
            .await
    }

    fn get_by_uid(&self, uid: &str) -> Result<LedgerTransaction> {
        let mut conn = get_connection(&self.pool)?;
        let row = transactions::table
            .find(uid)
            .select(LedgerRowDB::as_select())
            .first::<LedgerRowDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(LedgerTransaction::try_from(row)?)
    }

    fn list_for_account(
        &self,
        account_id: &str,
        include_archived: bool,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = transactions::table
            .filter(transactions::account_id.eq(account_id))
            .into_boxed();
        if !include_archived {
            query = query.filter(transactions::archived.eq(false));
        }

        let rows = query
            .order((transactions::ts.desc(), transactions::uid.asc()))
            .select(LedgerRowDB::as_select())
            .load::<LedgerRowDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| LedgerTransaction::try_from(row).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRepository;
    use crate::db::test_support::{setup, wallet};
    use crate::sync::SyncAuditRepository;
    use chrono::{Duration, TimeZone, Utc};
    use ledgerlink_core::accounts::{AccountRepositoryTrait, AccountType, SyncStatus};
    use ledgerlink_core::errors::Error;
    use ledgerlink_core::ledger::{AuditStamp, LedgerUpsert};
    use ledgerlink_core::sync::{SyncAuditRepositoryTrait, SyncKind};
    use ledgerlink_core::transactions::TxType;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn upsert(external_id: &str, amount: Decimal) -> LedgerUpsert {
        LedgerUpsert {
            external_id: external_id.to_string(),
            ts: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            amount,
            currency: "ETH".to_string(),
            category: "Transfer".to_string(),
            description: None,
            counterparty: Some("0xbb".to_string()),
            tx_type: TxType::Transfer,
            raw: json!({ "hash": external_id }),
        }
    }

    fn commit(upserts: Vec<LedgerUpsert>, cursor: CursorUpdate) -> SyncCommit {
        SyncCommit {
            account_id: "acc-1".to_string(),
            upserts,
            cursor,
            balance: None,
            status: SyncStatus::Success,
            audit: None,
        }
    }

    async fn fixture() -> (tempfile::TempDir, AccountRepository, LedgerRepository) {
        let (dir, pool, writer) = setup();
        let accounts = AccountRepository::new(pool.clone(), writer.clone());
        accounts.create(wallet("acc-1")).await.unwrap();
        (dir, accounts, LedgerRepository::new(pool, writer))
    }

    #[tokio::test]
    async fn resync_updates_in_place() {
        let (_dir, _accounts, ledger) = fixture().await;

        let first = ledger
            .commit_sync(commit(
                vec![upsert("0xa", dec!(-1.5)), upsert("0xb", dec!(2))],
                CursorUpdate::Keep,
            ))
            .await
            .unwrap();
        assert_eq!(first, CommitSummary { touched: 2, inserted: 2 });

        let mut changed = upsert("0xa", dec!(-1.5));
        changed.category = "Investment".to_string();
        let second = ledger
            .commit_sync(commit(vec![changed, upsert("0xb", dec!(2))], CursorUpdate::Keep))
            .await
            .unwrap();
        assert_eq!(second, CommitSummary { touched: 2, inserted: 0 });

        let rows = ledger.list_for_account("acc-1", false).unwrap();
        assert_eq!(rows.len(), 2);
        let a = rows
            .iter()
            .find(|r| r.external_id.as_deref() == Some("0xa"))
            .unwrap();
        assert_eq!(a.category, "Investment");
        assert_eq!(a.amount, dec!(-1.5));
        assert!(!a.is_manual);
    }

    #[tokio::test]
    async fn cursor_replace_and_keep() {
        let (_dir, accounts, ledger) = fixture().await;

        ledger
            .commit_sync(commit(
                vec![],
                CursorUpdate::Replace {
                    cursor: Some("page-2".to_string()),
                    chain: Some("eip155:1".to_string()),
                },
            ))
            .await
            .unwrap();
        let account = accounts.get_by_id("acc-1").unwrap();
        assert_eq!(account.sync_cursor.as_deref(), Some("page-2"));
        assert_eq!(account.sync_chain.as_deref(), Some("eip155:1"));
        assert_eq!(account.sync_status, SyncStatus::Success);

        let mut keep = commit(vec![], CursorUpdate::Keep);
        keep.status = SyncStatus::Idle;
        keep.balance = Some(dec!(42.5));
        ledger.commit_sync(keep).await.unwrap();
        let account = accounts.get_by_id("acc-1").unwrap();
        assert_eq!(account.sync_cursor.as_deref(), Some("page-2"));
        assert_eq!(account.sync_status, SyncStatus::Idle);
        assert_eq!(account.balance, dec!(42.5));

        ledger
            .commit_sync(commit(
                vec![],
                CursorUpdate::Replace {
                    cursor: None,
                    chain: Some("eip155:10".to_string()),
                },
            ))
            .await
            .unwrap();
        let account = accounts.get_by_id("acc-1").unwrap();
        assert_eq!(account.sync_cursor, None);
        assert_eq!(account.sync_chain.as_deref(), Some("eip155:10"));
    }

    #[tokio::test]
    async fn audit_entry_is_written_with_counts() {
        let (_dir, _accounts, ledger) = fixture().await;

        let mut with_audit = commit(vec![upsert("0xa", dec!(1))], CursorUpdate::Keep);
        with_audit.audit = Some(AuditStamp {
            user_id: "user-1".to_string(),
            kind: SyncKind::Manual,
        });
        ledger.commit_sync(with_audit).await.unwrap();

        let audit = SyncAuditRepository::new(ledger.pool.clone());
        let since = Utc::now() - Duration::hours(24);
        assert_eq!(audit.count_since("user-1", SyncKind::Manual, since).unwrap(), 1);
        let entries = audit.list_for_account("acc-1", 10).unwrap();
        assert_eq!(entries[0].synced_count, 1);
        assert_eq!(entries[0].new_count, 1);
    }

    #[tokio::test]
    async fn missing_account_commits_nothing() {
        let (_dir, _accounts, ledger) = fixture().await;
        let mut orphan = commit(vec![upsert("0xa", dec!(1))], CursorUpdate::Keep);
        orphan.account_id = "missing".to_string();

        assert!(ledger.commit_sync(orphan).await.is_err());
        assert!(ledger.list_for_account("missing", true).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_job_rolls_back_earlier_writes() {
        let (_dir, _accounts, ledger) = fixture().await;

        let result = ledger
            .writer
            .exec(|conn| -> Result<()> {
                let row = LedgerRowDB::synced(
                    "acc-1",
                    &upsert("0xa", dec!(1)),
                    Utc::now().naive_utc(),
                );
                diesel::insert_into(transactions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Err(Error::Unexpected("boom".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Unexpected(_))));
        assert!(ledger.list_for_account("acc-1", true).unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_entry_round_trips_balance() {
        let (_dir, accounts, ledger) = fixture().await;
        let mut cash = wallet("acc-cash");
        cash.account_type = AccountType::Manual;
        cash.balance = dec!(1000.00);
        accounts.create(cash).await.unwrap();

        let entry = ledger
            .create_manual(NewManualTransaction {
                account_id: "acc-cash".to_string(),
                ts: Utc::now(),
                amount: dec!(-120.50),
                currency: None,
                category: None,
                description: Some("Groceries".to_string()),
            })
            .await
            .unwrap();
        assert!(entry.is_manual);
        assert_eq!(entry.external_id, None);
        assert_eq!(entry.currency, "USD");
        assert_eq!(entry.category, CATEGORY_UNCATEGORIZED);
        assert_eq!(accounts.get_by_id("acc-cash").unwrap().balance, dec!(879.50));

        let archived = ledger.archive(&entry.uid).await.unwrap();
        assert!(archived.archived);
        assert_eq!(accounts.get_by_id("acc-cash").unwrap().balance, dec!(1000.00));

        // Second archive leaves the balance alone.
        ledger.archive(&entry.uid).await.unwrap();
        assert_eq!(accounts.get_by_id("acc-cash").unwrap().balance, dec!(1000.00));

        assert!(ledger.list_for_account("acc-cash", false).unwrap().is_empty());
        assert_eq!(ledger.list_for_account("acc-cash", true).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn synced_rows_cannot_be_archived() {
        let (_dir, _accounts, ledger) = fixture().await;
        ledger
            .commit_sync(commit(vec![upsert("0xa", dec!(1))], CursorUpdate::Keep))
            .await
            .unwrap();
        let uid = ledger.list_for_account("acc-1", false).unwrap()[0].uid.clone();

        assert!(matches!(
            ledger.archive(&uid).await,
            Err(Error::Validation(_))
        ));
        assert!(!ledger.get_by_uid(&uid).unwrap().archived);
    }
}
