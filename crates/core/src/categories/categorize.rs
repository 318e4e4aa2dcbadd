use super::categories_model::{
    CategoryRuleSet, CATEGORY_INCOME, CATEGORY_INVESTMENT, CATEGORY_TRANSFER,
    CATEGORY_UNCATEGORIZED,
};
use crate::transactions::{NormalizedTransaction, TxType};

/// Picks a category: learned merchant rule first, then type heuristics.
pub fn categorize(tx: &NormalizedTransaction, rules: &CategoryRuleSet) -> String {
    let learned = tx
        .merchant_name
        .as_deref()
        .or(tx.counterparty.as_deref())
        .and_then(|merchant| rules.lookup(merchant));
    if let Some(category) = learned {
        return category.to_string();
    }

    match tx.tx_type {
        TxType::Trade => CATEGORY_INVESTMENT.to_string(),
        TxType::Transfer if tx.is_inbound() => CATEGORY_INCOME.to_string(),
        TxType::Transfer => CATEGORY_TRANSFER.to_string(),
        _ => CATEGORY_UNCATEGORIZED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryRule;
    use crate::transactions::Direction;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn tx(tx_type: TxType, direction: Option<Direction>, merchant: Option<&str>) -> NormalizedTransaction {
        NormalizedTransaction {
            amount: dec!(10),
            currency_code: "USD".to_string(),
            timestamp: Utc::now(),
            merchant_name: merchant.map(str::to_string),
            counterparty: None,
            tx_id: "t1".to_string(),
            account_id: "acc".to_string(),
            tx_type,
            direction,
            on_chain_units: None,
            on_chain_symbol: None,
            raw: Value::Null,
            display_amount: None,
        }
    }

    fn rules() -> CategoryRuleSet {
        let now = Utc::now().naive_utc();
        CategoryRuleSet::new(vec![CategoryRule {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            merchant_key: "blue bottle coffee".to_string(),
            category: "Coffee".to_string(),
            hits: 3,
            created_at: now,
            updated_at: now,
        }])
    }

    #[test]
    fn learned_rule_wins_over_heuristics() {
        let t = tx(TxType::Trade, None, Some("  Blue   Bottle COFFEE "));
        assert_eq!(categorize(&t, &rules()), "Coffee");
    }

    #[test]
    fn trades_are_investments() {
        let t = tx(TxType::Trade, Some(Direction::Outflow), None);
        assert_eq!(categorize(&t, &CategoryRuleSet::default()), CATEGORY_INVESTMENT);
    }

    #[test]
    fn transfers_split_by_direction() {
        let inbound = tx(TxType::Transfer, Some(Direction::Inflow), None);
        let outbound = tx(TxType::Transfer, Some(Direction::Outflow), None);
        assert_eq!(categorize(&inbound, &CategoryRuleSet::default()), CATEGORY_INCOME);
        assert_eq!(categorize(&outbound, &CategoryRuleSet::default()), CATEGORY_TRANSFER);
    }

    #[test]
    fn everything_else_is_uncategorized() {
        let t = tx(TxType::Withdrawal, None, Some("Unknown shop"));
        assert_eq!(categorize(&t, &rules()), CATEGORY_UNCATEGORIZED);
    }
}
