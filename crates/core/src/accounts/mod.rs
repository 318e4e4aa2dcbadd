//! Accounts module - domain models and repository trait.

mod accounts_model;
mod accounts_traits;

pub use accounts_model::{Account, AccountType, NewAccount, SyncStatus};
pub use accounts_traits::AccountRepositoryTrait;
