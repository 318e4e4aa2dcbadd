//! Sync audit trail models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// What triggered a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// User-requested; counts against the plan's daily cap.
    Manual,
    /// The one-time sync right after linking an account.
    Initial,
    /// Background worker run.
    Scheduled,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Manual => "manual",
            SyncKind::Initial => "initial",
            SyncKind::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncKind::Manual),
            "initial" => Ok(SyncKind::Initial),
            "scheduled" => Ok(SyncKind::Scheduled),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown sync kind '{}'",
                other
            ))),
        }
    }
}

/// One recorded sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAuditEntry {
    pub id: String,
    pub account_id: String,
    pub user_id: String,
    pub kind: SyncKind,
    pub synced_count: i64,
    pub new_count: i64,
    pub created_at: DateTime<Utc>,
}
