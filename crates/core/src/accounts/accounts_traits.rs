//! Account repository trait.
//!
//! Defines the contract for account persistence without any database-specific
//! types, allowing for different storage implementations.

use async_trait::async_trait;

use super::accounts_model::{Account, NewAccount, SyncStatus};
use crate::errors::Result;

/// Trait defining the contract for Account repository operations.
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    /// Creates a new account.
    async fn create(&self, new_account: NewAccount) -> Result<Account>;

    /// Retrieves an account by its ID.
    fn get_by_id(&self, account_id: &str) -> Result<Account>;

    /// Lists every account that has a sync path (everything but manual).
    fn list_syncable(&self) -> Result<Vec<Account>>;

    /// Sets the advisory sync marker.
    async fn set_sync_status(&self, account_id: &str, status: SyncStatus) -> Result<()>;
}
