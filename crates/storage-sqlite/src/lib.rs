//! SQLite storage implementation for Ledgerlink.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `ledgerlink-core`:
//! - Database connection pooling and the single-writer actor
//! - Embedded migrations
//! - Repositories for accounts, ledger rows, category rules and the sync audit
//!
//! Every write goes through [`WriteHandle::exec`], which runs the job inside one
//! immediate transaction. A sync commit (rows, cursor, balance, status, audit)
//! is therefore all-or-nothing.
//!
//! ```text
//! core (domain)          sync (orchestrator)
//!       │                      │
//!       └──────────┬───────────┘
//!                  ▼
//!          storage-sqlite (this crate)
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

pub mod accounts;
pub mod categories;
pub mod ledger;
pub mod sync;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

pub use errors::{IntoCore, StorageError};

pub use ledgerlink_core::errors::{DatabaseError, Error, Result};
