use async_trait::async_trait;

use super::categories_model::CategoryRule;
use crate::errors::Result;

/// Persistence for learned category rules.
#[async_trait]
pub trait CategoryRuleRepositoryTrait: Send + Sync {
    fn list_for_user(&self, user_id: &str) -> Result<Vec<CategoryRule>>;

    /// Inserts the rule or repoints an existing merchant key to a new category.
    async fn upsert(&self, user_id: &str, merchant_key: &str, category: &str)
        -> Result<CategoryRule>;
}
