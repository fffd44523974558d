//! Delivery target repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::TargetDbModel;
use crate::{Error, Result};

/// Delivery target repository trait.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn get_target(&self, id: &str) -> Result<TargetDbModel>;
    async fn list_by_feed(&self, feed_id: &str) -> Result<Vec<TargetDbModel>>;
    async fn count_by_feed(&self, feed_id: &str) -> Result<i64>;
    async fn create_target(&self, target: &TargetDbModel) -> Result<()>;
    async fn delete_target(&self, id: &str) -> Result<()>;
    /// Clear a deleted role from whichever mention column references it.
    async fn clear_mention_role(&self, target_id: &str, role_id: &str) -> Result<()>;
}

/// SQLx implementation of TargetRepository.
pub struct SqlxTargetRepository {
    pool: SqlitePool,
}

impl SqlxTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqlxTargetRepository {
    async fn get_target(&self, id: &str) -> Result<TargetDbModel> {
        sqlx::query_as::<_, TargetDbModel>("SELECT * FROM targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Target", id))
    }

    async fn list_by_feed(&self, feed_id: &str) -> Result<Vec<TargetDbModel>> {
        let targets = sqlx::query_as::<_, TargetDbModel>(
            "SELECT * FROM targets WHERE feed_id = ? ORDER BY created_at",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn count_by_feed(&self, feed_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn create_target(&self, target: &TargetDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO targets (
                id, feed_id, client_id, channel_id, guild_id, subscriber_id,
                mention_role_id, alt_mention_role_id, mention_text, mention_color,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&target.id)
        .bind(&target.feed_id)
        .bind(&target.client_id)
        .bind(&target.channel_id)
        .bind(&target.guild_id)
        .bind(&target.subscriber_id)
        .bind(&target.mention_role_id)
        .bind(&target.alt_mention_role_id)
        .bind(&target.mention_text)
        .bind(&target.mention_color)
        .bind(&target.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::validation(format!(
                    "channel {} already subscribed to feed {}",
                    target.channel_id, target.feed_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_target(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_mention_role(&self, target_id: &str, role_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE targets SET
                mention_role_id = CASE WHEN mention_role_id = ?2 THEN NULL ELSE mention_role_id END,
                alt_mention_role_id = CASE WHEN alt_mention_role_id = ?2 THEN NULL ELSE alt_mention_role_id END
            WHERE id = ?1
            "#,
        )
        .bind(target_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
