//! Folding per-output rows into one entry per transaction and direction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use ledgerlink_core::transactions::Direction;

use crate::chains::ChainTransfer;

use super::NATIVE_SYMBOL;

/// A signed movement reported for one transaction.
#[derive(Debug, Clone)]
pub(crate) struct Leg {
    pub hash: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub counterparty: Option<String>,
    pub raw: Value,
}

pub(crate) fn tx_id(hash: &str, direction: Direction) -> String {
    match direction {
        Direction::Inflow => format!("{}:in", hash),
        Direction::Outflow => format!("{}:out", hash),
    }
}

/// Sums legs by `(hash, direction)`, keeping first-seen order. Zero legs are
/// dropped; `raw` collects the contributing rows.
pub(crate) fn aggregate(legs: Vec<Leg>) -> Vec<ChainTransfer> {
    let mut out: Vec<ChainTransfer> = Vec::new();
    for leg in legs {
        let Some(direction) = Direction::from_net(leg.amount) else {
            continue;
        };
        let id = tx_id(&leg.hash, direction);
        match out.iter_mut().find(|t| t.tx_id == id) {
            Some(existing) => {
                existing.amount += leg.amount.abs();
                if let Value::Array(rows) = &mut existing.raw {
                    rows.push(leg.raw);
                }
                if existing.counterparty.is_none() {
                    existing.counterparty = leg.counterparty;
                }
            }
            None => out.push(ChainTransfer {
                tx_id: id,
                amount: leg.amount.abs(),
                currency: NATIVE_SYMBOL.to_string(),
                timestamp: leg.timestamp,
                direction,
                counterparty: leg.counterparty,
                on_chain_units: None,
                on_chain_symbol: Some(NATIVE_SYMBOL.to_string()),
                raw: Value::Array(vec![leg.raw]),
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn leg(hash: &str, amount: Decimal) -> Leg {
        Leg {
            hash: hash.to_string(),
            amount,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            counterparty: None,
            raw: json!({ "hash": hash, "amount": amount.to_string() }),
        }
    }

    #[test]
    fn sums_same_direction_and_splits_opposite() {
        let transfers = aggregate(vec![
            leg("t1", dec!(-0.5)),
            leg("t1", dec!(-0.25)),
            leg("t1", dec!(0.1)),
            leg("t2", dec!(0)),
            leg("t3", dec!(1)),
        ]);
        assert_eq!(transfers.len(), 3);
        assert_eq!(transfers[0].tx_id, "t1:out");
        assert_eq!(transfers[0].amount, dec!(0.75));
        assert_eq!(transfers[0].raw.as_array().unwrap().len(), 2);
        assert_eq!(transfers[1].tx_id, "t1:in");
        assert_eq!(transfers[1].amount, dec!(0.1));
        assert_eq!(transfers[2].tx_id, "t3:in");
    }
}
