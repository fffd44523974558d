//! Scheduled event record repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ScheduledEventDbModel;

/// Scheduled event record repository trait.
#[async_trait]
pub trait ScheduledEventRepository: Send + Sync {
    /// Look up the active record for one (guild, feed[, sub-item]) key.
    async fn get_by_key(
        &self,
        guild_id: &str,
        feed_id: &str,
        sub_item_id: Option<&str>,
    ) -> Result<Option<ScheduledEventDbModel>>;
    async fn list_by_feed(&self, feed_id: &str) -> Result<Vec<ScheduledEventDbModel>>;
    async fn create_event(&self, event: &ScheduledEventDbModel) -> Result<()>;
    async fn update_event(
        &self,
        id: &str,
        title: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Result<()>;
    async fn delete_event(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ScheduledEventRepository.
pub struct SqlxScheduledEventRepository {
    pool: SqlitePool,
}

impl SqlxScheduledEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledEventRepository for SqlxScheduledEventRepository {
    async fn get_by_key(
        &self,
        guild_id: &str,
        feed_id: &str,
        sub_item_id: Option<&str>,
    ) -> Result<Option<ScheduledEventDbModel>> {
        let event = sqlx::query_as::<_, ScheduledEventDbModel>(
            r#"
            SELECT * FROM scheduled_events
            WHERE guild_id = ? AND feed_id = ? AND COALESCE(sub_item_id, '') = COALESCE(?, '')
            "#,
        )
        .bind(guild_id)
        .bind(feed_id)
        .bind(sub_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_by_feed(&self, feed_id: &str) -> Result<Vec<ScheduledEventDbModel>> {
        let events = sqlx::query_as::<_, ScheduledEventDbModel>(
            "SELECT * FROM scheduled_events WHERE feed_id = ? ORDER BY start_time",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn create_event(&self, event: &ScheduledEventDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_events (
                id, guild_id, feed_id, sub_item_id, external_event_id,
                title, start_time, end_time, status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.guild_id)
        .bind(&event.feed_id)
        .bind(&event.sub_item_id)
        .bind(&event.external_event_id)
        .bind(&event.title)
        .bind(&event.start_time)
        .bind(&event.end_time)
        .bind(&event.status)
        .bind(&event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_event(
        &self,
        id: &str,
        title: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_events SET
                title = ?, start_time = ?, end_time = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(start_time)
        .bind(end_time)
        .bind(status)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduled_events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
