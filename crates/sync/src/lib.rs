//! Ledgerlink sync orchestrator
//!
//! Drives one account sync end to end: plan check, date window, connector
//! selection, the sequential page loop, bank balance reconciliation and the
//! single ledger commit.

pub mod orchestrator;
pub mod progress;
mod scope;
pub mod traits;

pub use orchestrator::{SyncConfig, SyncReport, SyncRequest, SyncService};
pub use progress::{NoOpProgressReporter, SyncProgressPayload, SyncProgressReporter, SyncStage};
pub use traits::ConnectorProvider;

#[cfg(test)]
mod orchestrator_tests;
