//! Narrowing fetched pages down to what belongs to the local account.

use log::{debug, warn};

use ledgerlink_connectors::LiveAccount;
use ledgerlink_core::errors::{Result, ValidationError};
use ledgerlink_core::sync::DateWindow;
use ledgerlink_core::transactions::NormalizedTransaction;

/// Picks the upstream sub-account backing a local bank account.
///
/// With a mask, exactly the live account carrying it; a mask nothing matches
/// is a configuration error. Without one, a lone live account is used and
/// anything else leaves the item unscoped.
pub(crate) fn match_live_account<'a>(
    mask: Option<&str>,
    live: &'a [LiveAccount],
) -> Result<Option<&'a LiveAccount>> {
    match mask.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mask) => live
            .iter()
            .find(|a| a.mask.as_deref().map(str::trim) == Some(mask))
            .map(Some)
            .ok_or_else(|| {
                ValidationError::InvalidInput(format!(
                    "No linked bank account ends in {}",
                    mask
                ))
                .into()
            }),
        None if live.len() == 1 => Ok(live.first()),
        None => {
            warn!(
                "Bank item has {} accounts and no mask to pick one, keeping all transactions",
                live.len()
            );
            Ok(None)
        }
    }
}

/// Keeps transactions posted to `upstream_account_id`.
pub(crate) fn retain_sub_account(
    transactions: &mut Vec<NormalizedTransaction>,
    upstream_account_id: &str,
) {
    let before = transactions.len();
    transactions.retain(|tx| {
        tx.raw.get("account_id").and_then(|v| v.as_str()) == Some(upstream_account_id)
    });
    debug!(
        "Kept {} of {} bank transactions for sub-account {}",
        transactions.len(),
        before,
        upstream_account_id
    );
}

/// Drops transactions outside the window; exchanges only bound the start
/// server-side.
pub(crate) fn retain_window(transactions: &mut Vec<NormalizedTransaction>, window: &DateWindow) {
    transactions.retain(|tx| window.contains(tx.timestamp));
}
