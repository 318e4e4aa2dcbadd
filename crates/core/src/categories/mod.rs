//! Auto-categorization: learned merchant rules with type-based fallbacks.

mod categories_model;
mod categories_service;
mod categories_traits;
mod categorize;

pub use categories_model::{
    merchant_key, CategoryRule, CategoryRuleSet, CATEGORY_INCOME, CATEGORY_INVESTMENT,
    CATEGORY_TRANSFER, CATEGORY_UNCATEGORIZED,
};
pub use categories_service::CategoryService;
pub use categories_traits::CategoryRuleRepositoryTrait;
pub use categorize::categorize;
