//! Pure reconciliation rules: sign law, categorization and de-duplication.

use rust_decimal::Decimal;
use std::collections::HashMap;

use super::ledger_model::LedgerUpsert;
use crate::categories::{categorize, CategoryRuleSet};
use crate::transactions::{Direction, NormalizedTransaction};

/// Forces the ledger sign from `direction`; without one the native sign stays.
pub fn apply_sign(amount: Decimal, direction: Option<Direction>) -> Decimal {
    match direction {
        Some(Direction::Outflow) => -amount.abs(),
        Some(Direction::Inflow) => amount.abs(),
        None => amount,
    }
}

/// Builds ledger upserts for a fetched batch.
///
/// Later deliveries of the same `tx_id` replace earlier ones while keeping the
/// first-seen position, so a batch never carries two rows for one external id.
pub fn prepare_upserts(
    transactions: &[NormalizedTransaction],
    rules: &CategoryRuleSet,
) -> Vec<LedgerUpsert> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(transactions.len());
    let mut upserts: Vec<LedgerUpsert> = Vec::with_capacity(transactions.len());

    for tx in transactions {
        let upsert = to_upsert(tx, rules);
        match positions.get(tx.tx_id.as_str()) {
            Some(&idx) => upserts[idx] = upsert,
            None => {
                positions.insert(tx.tx_id.as_str(), upserts.len());
                upserts.push(upsert);
            }
        }
    }
    upserts
}

fn to_upsert(tx: &NormalizedTransaction, rules: &CategoryRuleSet) -> LedgerUpsert {
    LedgerUpsert {
        external_id: tx.tx_id.clone(),
        ts: tx.timestamp,
        amount: apply_sign(tx.amount, tx.direction),
        currency: tx.currency_code.clone(),
        category: categorize(tx, rules),
        description: describe(tx),
        counterparty: tx.counterparty.clone(),
        tx_type: tx.tx_type,
        raw: tx.raw.clone(),
    }
}

fn describe(tx: &NormalizedTransaction) -> Option<String> {
    tx.merchant_name
        .clone()
        .or_else(|| {
            tx.counterparty.as_ref().map(|cp| match tx.direction {
                Some(Direction::Inflow) => format!("From {}", cp),
                Some(Direction::Outflow) => format!("To {}", cp),
                None => cp.clone(),
            })
        })
}
