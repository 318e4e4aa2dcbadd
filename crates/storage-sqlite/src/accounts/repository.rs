use async_trait::async_trait;
use diesel::prelude::*;
use std::sync::Arc;

use ledgerlink_core::accounts::{Account, AccountRepositoryTrait, NewAccount, SyncStatus};
use ledgerlink_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::accounts;

use super::model::{AccountDB, AccountSyncChangeset};

/// Repository for managing account data in the database
pub struct AccountRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl AccountRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl AccountRepositoryTrait for AccountRepository {
    async fn create(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;

        self.writer
            .exec(move |conn| {
                let account_db: AccountDB = new_account.into();
                diesel::insert_into(accounts::table)
                    .values(&account_db)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(Account::try_from(account_db)?)
            })
            .await
    }

    fn get_by_id(&self, account_id: &str) -> Result<Account> {
        let mut conn = get_connection(&self.pool)?;

        let account = accounts::table
            .select(AccountDB::as_select())
            .find(account_id)
            .first::<AccountDB>(&mut conn)
            .map_err(StorageError::from)?;

        Ok(Account::try_from(account)?)
    }

    fn list_syncable(&self) -> Result<Vec<Account>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = accounts::table
            .filter(accounts::account_type.ne("manual"))
            .select(AccountDB::as_select())
            .order(accounts::created_at.asc())
            .load::<AccountDB>(&mut conn)
            .map_err(StorageError::from)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(Account::try_from(row)?);
        }
        Ok(result)
    }

    async fn set_sync_status(&self, account_id: &str, status: SyncStatus) -> Result<()> {
        let account_id = account_id.to_string();
        self.writer
            .exec(move |conn| {
                let changes = AccountSyncChangeset {
                    sync_status: Some(status.as_str().to_string()),
                    updated_at: Some(chrono::Utc::now().naive_utc()),
                    ..Default::default()
                };
                let updated = diesel::update(accounts::table.find(&account_id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(StorageError::from(diesel::result::Error::NotFound).into());
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup, wallet};
    use ledgerlink_core::accounts::AccountType;
    use ledgerlink_core::errors::{DatabaseError, Error};

    #[tokio::test]
    async fn create_and_read_back() {
        let (_dir, pool, writer) = setup();
        let repo = AccountRepository::new(pool, writer);

        let created = repo.create(wallet("acc-1")).await.unwrap();
        let loaded = repo.get_by_id("acc-1").unwrap();
        assert_eq!(created.id, loaded.id);
        assert_eq!(created.address, loaded.address);
        assert_eq!(loaded.sync_status, SyncStatus::Idle);
        assert_eq!(loaded.account_type, AccountType::Web3);
    }

    #[tokio::test]
    async fn manual_accounts_are_not_syncable() {
        let (_dir, pool, writer) = setup();
        let repo = AccountRepository::new(pool, writer);

        repo.create(wallet("acc-1")).await.unwrap();
        let mut manual = wallet("acc-2");
        manual.account_type = AccountType::Manual;
        repo.create(manual).await.unwrap();

        let syncable = repo.list_syncable().unwrap();
        assert_eq!(syncable.len(), 1);
        assert_eq!(syncable[0].id, "acc-1");
    }

    #[tokio::test]
    async fn status_updates_are_persisted() {
        let (_dir, pool, writer) = setup();
        let repo = AccountRepository::new(pool, writer);
        repo.create(wallet("acc-1")).await.unwrap();

        repo.set_sync_status("acc-1", SyncStatus::Syncing).await.unwrap();
        assert_eq!(repo.get_by_id("acc-1").unwrap().sync_status, SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let (_dir, pool, writer) = setup();
        let repo = AccountRepository::new(pool, writer);
        assert!(matches!(
            repo.get_by_id("missing"),
            Err(Error::Database(DatabaseError::NotFound(_)))
        ));
        assert!(matches!(
            repo.set_sync_status("missing", SyncStatus::Failed).await,
            Err(Error::Database(DatabaseError::NotFound(_)))
        ));
    }
}
