//! Subscription-tier sync frequency policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::sync_audit_model::SyncKind;
use crate::errors::{Error, Result, ValidationError};

/// Manual syncs allowed per rolling 24h on the capped tier.
pub const DEFAULT_BASIC_MANUAL_SYNCS_PER_DAY: u32 = 3;

/// Subscription tier, resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// No syncing at all.
    Free,
    /// Manual syncs capped per rolling day.
    Basic,
    /// Unlimited.
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Premium => "premium",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "basic" => Ok(Plan::Basic),
            "premium" => Ok(Plan::Premium),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown plan '{}'",
                other
            ))),
        }
    }
}

/// Decides whether a sync may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub basic_manual_cap: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            basic_manual_cap: DEFAULT_BASIC_MANUAL_SYNCS_PER_DAY,
        }
    }
}

impl SyncPolicy {
    /// `manual_syncs_last_24h` comes from the audit trail.
    ///
    /// The free tier is blocked for every kind of sync. The initial sync and
    /// scheduled syncs bypass the basic tier's cap.
    pub fn check(&self, plan: Plan, kind: SyncKind, manual_syncs_last_24h: u32) -> Result<()> {
        match plan {
            Plan::Free => Err(Error::SyncLimit(
                "Syncing is not available on the free plan".to_string(),
            )),
            Plan::Premium => Ok(()),
            Plan::Basic => match kind {
                SyncKind::Initial | SyncKind::Scheduled => Ok(()),
                SyncKind::Manual if manual_syncs_last_24h < self.basic_manual_cap => Ok(()),
                SyncKind::Manual => Err(Error::SyncLimit(format!(
                    "Daily limit of {} manual syncs reached",
                    self.basic_manual_cap
                ))),
            },
        }
    }
}
