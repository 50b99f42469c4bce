//! Settings repository implementation
//!
//! Key/value rows in `app_settings`; read fresh on every core operation.

use async_trait::async_trait;
use prank_core::{traits::SettingsRepository, AppError, AppResult};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of SettingsRepository
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    #[instrument(skip(self))]
    async fn get_all(&self) -> AppResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM app_settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading settings: {}", e);
                AppError::Database(format!("Failed to load settings: {}", e))
            })?;

        debug!("Loaded {} settings", rows.len());

        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error saving setting {}: {}", key, e);
            AppError::Database(format!("Failed to save setting: {}", e))
        })?;

        Ok(())
    }
}
