//! Sync policy: plan tiers, date windows and the audit trail.

mod sync_audit_model;
mod sync_plan;
mod sync_traits;
mod sync_window;

pub use sync_audit_model::{SyncAuditEntry, SyncKind};
pub use sync_plan::{Plan, SyncPolicy, DEFAULT_BASIC_MANUAL_SYNCS_PER_DAY};
pub use sync_traits::SyncAuditRepositoryTrait;
pub use sync_window::{
    resolve_window, resolve_window_with_lookback, DateWindow, DEFAULT_EXCHANGE_LOOKBACK_DAYS,
    DEFAULT_LOOKBACK_DAYS,
};
