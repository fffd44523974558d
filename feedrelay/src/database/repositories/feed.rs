//! Tracked feed repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::FeedDbModel;
use crate::{Error, Result};

/// Tracked feed repository trait.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn get_feed(&self, id: &str) -> Result<FeedDbModel>;
    async fn get_feed_by_identity(&self, site: &str, account_id: &str)
    -> Result<Option<FeedDbModel>>;
    async fn list_enabled_by_site(&self, site: &str) -> Result<Vec<FeedDbModel>>;
    async fn create_feed(&self, feed: &FeedDbModel) -> Result<()>;
    async fn update_display_name(&self, id: &str, display_name: &str) -> Result<()>;
    async fn set_cursor(&self, id: &str, cursor: &str) -> Result<()>;
    /// Admin reset: clears the cursor so the next poll re-baselines.
    async fn reset_cursor(&self, id: &str) -> Result<()>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;
    async fn delete_feed(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of FeedRepository.
pub struct SqlxFeedRepository {
    pool: SqlitePool,
}

impl SqlxFeedRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedRepository for SqlxFeedRepository {
    async fn get_feed(&self, id: &str) -> Result<FeedDbModel> {
        sqlx::query_as::<_, FeedDbModel>("SELECT * FROM tracked_feeds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("TrackedFeed", id))
    }

    async fn get_feed_by_identity(
        &self,
        site: &str,
        account_id: &str,
    ) -> Result<Option<FeedDbModel>> {
        let feed = sqlx::query_as::<_, FeedDbModel>(
            "SELECT * FROM tracked_feeds WHERE site = ? AND account_id = ?",
        )
        .bind(site)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    async fn list_enabled_by_site(&self, site: &str) -> Result<Vec<FeedDbModel>> {
        let feeds = sqlx::query_as::<_, FeedDbModel>(
            "SELECT * FROM tracked_feeds WHERE site = ? AND enabled = 1 ORDER BY account_id",
        )
        .bind(site)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    async fn create_feed(&self, feed: &FeedDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracked_feeds (
                id, site, account_id, display_name, cursor, enabled,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feed.id)
        .bind(&feed.site)
        .bind(&feed.account_id)
        .bind(&feed.display_name)
        .bind(&feed.cursor)
        .bind(feed.enabled)
        .bind(&feed.created_at)
        .bind(&feed.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::validation(format!(
                    "feed already tracked: {}/{}",
                    feed.site, feed.account_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_display_name(&self, id: &str, display_name: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_feeds SET display_name = ?, updated_at = ? WHERE id = ?")
            .bind(display_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_cursor(&self, id: &str, cursor: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_feeds SET cursor = ?, updated_at = ? WHERE id = ?")
            .bind(cursor)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_cursor(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_feeds SET cursor = NULL, updated_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE tracked_feeds SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_feed(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tracked_feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
