//! Per-channel feature flag repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ChannelFeaturesDbModel;
use crate::domain::FeatureKind;

/// Feature flag repository trait.
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Get a channel's feature flags, with defaults when no row exists.
    async fn get_features(&self, channel_id: &str) -> Result<ChannelFeaturesDbModel>;
    /// Enable or disable one feature for a channel.
    async fn set_feature(&self, channel_id: &str, feature: FeatureKind, enabled: bool)
    -> Result<()>;
    /// Disable one feature for a channel.
    ///
    /// Returns `true` only when the flag actually flipped from enabled to
    /// disabled, so callers can gate one-time notices on it.
    async fn disable_feature(&self, channel_id: &str, feature: FeatureKind) -> Result<bool>;
}

/// SQLx implementation of FeatureRepository.
pub struct SqlxFeatureRepository {
    pool: SqlitePool,
}

impl SqlxFeatureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_row(&self, channel_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO channel_features (channel_id, updated_at) VALUES (?, ?)",
        )
        .bind(channel_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeatureRepository for SqlxFeatureRepository {
    async fn get_features(&self, channel_id: &str) -> Result<ChannelFeaturesDbModel> {
        let row = sqlx::query_as::<_, ChannelFeaturesDbModel>(
            "SELECT * FROM channel_features WHERE channel_id = ?",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or_else(|| ChannelFeaturesDbModel::defaults(channel_id)))
    }

    async fn set_feature(
        &self,
        channel_id: &str,
        feature: FeatureKind,
        enabled: bool,
    ) -> Result<()> {
        self.ensure_row(channel_id).await?;
        // Column name comes from a fixed enum mapping, never user input.
        let sql = format!(
            "UPDATE channel_features SET {} = ?, updated_at = ? WHERE channel_id = ?",
            feature.column()
        );
        sqlx::query(&sql)
            .bind(enabled)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn disable_feature(&self, channel_id: &str, feature: FeatureKind) -> Result<bool> {
        self.ensure_row(channel_id).await?;
        let sql = format!(
            "UPDATE channel_features SET {col} = 0, updated_at = ? WHERE channel_id = ? AND {col} = 1",
            col = feature.column()
        );
        let result = sqlx::query(&sql)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
