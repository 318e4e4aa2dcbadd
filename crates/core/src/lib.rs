//! Ledgerlink Core - canonical transaction model, reconciliation rules and sync policy.
//!
//! This crate is database-agnostic: it defines the domain types and the
//! repository traits implemented by `ledgerlink-storage-sqlite`, and the
//! canonical model every adapter in `ledgerlink-connectors` produces.

pub mod accounts;
pub mod categories;
pub mod errors;
pub mod ledger;
pub mod secrets;
pub mod sync;
pub mod transactions;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
