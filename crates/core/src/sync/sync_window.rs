//! Effective date window of a sync.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::AccountType;
use crate::errors::{Result, ValidationError};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_EXCHANGE_LOOKBACK_DAYS: i64 = 90;

/// Inclusive calendar-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ValidationError::InvalidInput(format!(
                "Start date {} is after end date {}",
                start, end
            ))
            .into());
        }
        Ok(Self { start, end })
    }

    /// First instant of the window.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the window (end day is inclusive).
    pub fn end_exclusive_utc(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start_utc() && ts < self.end_exclusive_utc()
    }
}

/// Caller dates win; otherwise look back 30 days (90 for exchanges) from `today`.
pub fn resolve_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    account_type: AccountType,
    today: NaiveDate,
) -> Result<DateWindow> {
    let lookback = match account_type {
        AccountType::Cex => DEFAULT_EXCHANGE_LOOKBACK_DAYS,
        _ => DEFAULT_LOOKBACK_DAYS,
    };
    resolve_window_with_lookback(start, end, lookback, today)
}

/// Same as [`resolve_window`] with an explicit default lookback.
pub fn resolve_window_with_lookback(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    lookback_days: i64,
    today: NaiveDate,
) -> Result<DateWindow> {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or(end - Duration::days(lookback_days));
    DateWindow::new(start, end)
}
