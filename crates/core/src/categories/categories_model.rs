//! Learned merchant category rules.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CATEGORY_INVESTMENT: &str = "Investment";
pub const CATEGORY_INCOME: &str = "Income";
pub const CATEGORY_TRANSFER: &str = "Transfer";
pub const CATEGORY_UNCATEGORIZED: &str = "Uncategorized";

/// A merchant -> category mapping learned from a user's own edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRule {
    pub id: String,
    pub user_id: String,
    /// Normalized merchant key, see [`merchant_key`].
    pub merchant_key: String,
    pub category: String,
    pub hits: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Rules for one user, indexed by merchant key.
#[derive(Debug, Clone, Default)]
pub struct CategoryRuleSet {
    by_merchant: HashMap<String, String>,
}

impl CategoryRuleSet {
    pub fn new(rules: impl IntoIterator<Item = CategoryRule>) -> Self {
        let by_merchant = rules
            .into_iter()
            .map(|rule| (rule.merchant_key, rule.category))
            .collect();
        Self { by_merchant }
    }

    pub fn lookup(&self, merchant: &str) -> Option<&str> {
        let key = merchant_key(merchant);
        if key.is_empty() {
            return None;
        }
        self.by_merchant.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_merchant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_merchant.is_empty()
    }
}

/// Trimmed, lowercased, inner whitespace collapsed.
pub fn merchant_key(merchant: &str) -> String {
    merchant
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
