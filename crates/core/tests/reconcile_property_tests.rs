//! Property-based tests for normalization and ledger sign rules.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

use ledgerlink_core::categories::CategoryRuleSet;
use ledgerlink_core::ledger::{apply_sign, prepare_upserts};
use ledgerlink_core::transactions::{normalize, normalize_currency, Direction, NormalizedTransaction, TxType};

// =============================================================================
// Generators
// =============================================================================

fn arb_amount() -> impl Strategy<Value = Decimal> {
    (any::<i64>(), 0u32..12).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn arb_direction() -> impl Strategy<Value = Option<Direction>> {
    prop_oneof![
        Just(None),
        Just(Some(Direction::Inflow)),
        Just(Some(Direction::Outflow)),
    ]
}

fn arb_tx() -> impl Strategy<Value = NormalizedTransaction> {
    (arb_amount(), arb_direction(), "[a-f0-9]{4}").prop_map(|(amount, direction, id)| {
        NormalizedTransaction {
            amount,
            currency_code: "USD".to_string(),
            timestamp: Utc::now(),
            merchant_name: None,
            counterparty: None,
            tx_id: id,
            account_id: "acc".to_string(),
            tx_type: TxType::Transfer,
            direction,
            on_chain_units: None,
            on_chain_symbol: None,
            raw: json!({}),
            display_amount: None,
        }
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn outflows_are_never_positive(amount in arb_amount()) {
        prop_assert!(apply_sign(amount, Some(Direction::Outflow)) <= Decimal::ZERO);
    }

    #[test]
    fn inflows_are_never_negative(amount in arb_amount()) {
        prop_assert!(apply_sign(amount, Some(Direction::Inflow)) >= Decimal::ZERO);
    }

    #[test]
    fn sign_never_changes_magnitude(amount in arb_amount(), direction in arb_direction()) {
        prop_assert_eq!(apply_sign(amount, direction).abs(), amount.abs());
    }

    #[test]
    fn upserts_have_unique_external_ids(batch in prop::collection::vec(arb_tx(), 0..40)) {
        let upserts = prepare_upserts(&batch, &CategoryRuleSet::default());
        let mut ids: Vec<_> = upserts.iter().map(|u| u.external_id.clone()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), before);
    }

    #[test]
    fn preparing_twice_is_idempotent(batch in prop::collection::vec(arb_tx(), 0..20)) {
        let rules = CategoryRuleSet::default();
        prop_assert_eq!(prepare_upserts(&batch, &rules), prepare_upserts(&batch, &rules));
    }

    #[test]
    fn evm_contracts_pass_through(hex in "[a-fA-F0-9]{40}") {
        let contract = format!("0x{}", hex);
        prop_assert_eq!(normalize_currency(&contract), contract);
    }

    #[test]
    fn short_codes_are_uppercased(code in "[a-z]{2,6}") {
        prop_assert_eq!(normalize_currency(&code), code.to_uppercase());
    }

    #[test]
    fn normalize_keeps_amount_exact(amount in arb_amount()) {
        let payload = json!({
            "amount": amount.to_string(),
            "currency_code": "btc",
            "timestamp": "2024-01-01T00:00:00Z",
            "tx_id": "x",
            "account_id": "acc",
        });
        let tx = normalize(&payload).unwrap();
        prop_assert_eq!(tx.amount, amount);
    }
}
