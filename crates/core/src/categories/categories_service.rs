use log::debug;
use std::sync::Arc;

use super::categories_model::{merchant_key, CategoryRule, CategoryRuleSet};
use super::categories_traits::CategoryRuleRepositoryTrait;
use crate::errors::{Result, ValidationError};

/// Loads and learns merchant category rules.
pub struct CategoryService {
    repository: Arc<dyn CategoryRuleRepositoryTrait>,
}

impl CategoryService {
    pub fn new(repository: Arc<dyn CategoryRuleRepositoryTrait>) -> Self {
        Self { repository }
    }

    /// Snapshot of a user's rules, loaded once per sync.
    pub fn rule_set(&self, user_id: &str) -> Result<CategoryRuleSet> {
        let rules = self.repository.list_for_user(user_id)?;
        debug!("Loaded {} category rules for user {}", rules.len(), user_id);
        Ok(CategoryRuleSet::new(rules))
    }

    /// Records that `merchant` belongs in `category` for future syncs.
    pub async fn learn_rule(
        &self,
        user_id: &str,
        merchant: &str,
        category: &str,
    ) -> Result<CategoryRule> {
        let key = merchant_key(merchant);
        if key.is_empty() {
            return Err(ValidationError::MissingField("merchant".to_string()).into());
        }
        if category.trim().is_empty() {
            return Err(ValidationError::MissingField("category".to_string()).into());
        }
        self.repository.upsert(user_id, &key, category.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryRules {
        rules: Mutex<Vec<CategoryRule>>,
    }

    #[async_trait]
    impl CategoryRuleRepositoryTrait for InMemoryRules {
        fn list_for_user(&self, user_id: &str) -> Result<Vec<CategoryRule>> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn upsert(
            &self,
            user_id: &str,
            merchant_key: &str,
            category: &str,
        ) -> Result<CategoryRule> {
            let now = Utc::now().naive_utc();
            let mut rules = self.rules.lock().unwrap();
            rules.retain(|r| !(r.user_id == user_id && r.merchant_key == merchant_key));
            let rule = CategoryRule {
                id: format!("{}:{}", user_id, merchant_key),
                user_id: user_id.to_string(),
                merchant_key: merchant_key.to_string(),
                category: category.to_string(),
                hits: 1,
                created_at: now,
                updated_at: now,
            };
            rules.push(rule.clone());
            Ok(rule)
        }
    }

    #[tokio::test]
    async fn learned_rules_are_visible_in_the_next_rule_set() {
        let service = CategoryService::new(Arc::new(InMemoryRules::default()));
        service.learn_rule("u1", " Corner  Deli ", "Groceries").await.unwrap();

        let rules = service.rule_set("u1").unwrap();
        assert_eq!(rules.lookup("corner deli"), Some("Groceries"));
        assert!(service.rule_set("u2").unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_merchant_is_rejected() {
        let service = CategoryService::new(Arc::new(InMemoryRules::default()));
        assert!(service.learn_rule("u1", "   ", "Groceries").await.is_err());
    }
}
