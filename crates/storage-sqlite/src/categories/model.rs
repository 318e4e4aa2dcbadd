use chrono::NaiveDateTime;
use diesel::prelude::*;

use ledgerlink_core::categories::CategoryRule;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::category_rules)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CategoryRuleDB {
    pub id: String,
    pub user_id: String,
    pub merchant_key: String,
    pub category: String,
    pub hits: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<CategoryRuleDB> for CategoryRule {
    fn from(db: CategoryRuleDB) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            merchant_key: db.merchant_key,
            category: db.category,
            hits: db.hits,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
