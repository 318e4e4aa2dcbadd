//! SQLite storage implementation for accounts.

mod model;
mod repository;

pub use model::{AccountDB, AccountSyncChangeset};
pub use repository::AccountRepository;
