use async_trait::async_trait;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use ledgerlink_core::categories::{CategoryRule, CategoryRuleRepositoryTrait};
use ledgerlink_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::category_rules;

use super::model::CategoryRuleDB;

pub struct CategoryRuleRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CategoryRuleRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        CategoryRuleRepository { pool, writer }
    }
}

#[async_trait]
impl CategoryRuleRepositoryTrait for CategoryRuleRepository {
    fn list_for_user(&self, user_id: &str) -> Result<Vec<CategoryRule>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = category_rules::table
            .filter(category_rules::user_id.eq(user_id))
            .order(category_rules::hits.desc())
            .select(CategoryRuleDB::as_select())
            .load::<CategoryRuleDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(CategoryRule::from).collect())
    }

    async fn upsert(&self, user_id: &str, merchant_key: &str, category: &str) -> Result<CategoryRule> {
        let user_id = user_id.to_string();
        let merchant_key = merchant_key.to_string();
        let category = category.to_string();

        self.writer
            .exec(move |conn| -> Result<CategoryRule> {
                let now = chrono::Utc::now().naive_utc();
                let existing = category_rules::table
                    .filter(category_rules::user_id.eq(&user_id))
                    .filter(category_rules::merchant_key.eq(&merchant_key))
                    .select(CategoryRuleDB::as_select())
                    .first::<CategoryRuleDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                let row = match existing {
                    Some(rule) => diesel::update(category_rules::table.find(&rule.id))
                        .set((
                            category_rules::category.eq(&category),
                            category_rules::hits.eq(rule.hits + 1),
                            category_rules::updated_at.eq(now),
                        ))
                        .returning(CategoryRuleDB::as_returning())
                        .get_result(conn)
                        .map_err(StorageError::from)?,
                    None => {
                        let rule = CategoryRuleDB {
                            id: Uuid::new_v4().to_string(),
                            user_id,
                            merchant_key,
                            category,
                            hits: 1,
                            created_at: now,
                            updated_at: now,
                        };
                        diesel::insert_into(category_rules::table)
                            .values(&rule)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        rule
                    }
                };
                Ok(row.into())
            })
            .await
    }
}
