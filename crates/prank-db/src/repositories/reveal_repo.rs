//! Reveal notification repository implementation
//!
//! The primary key on `call_request_id` makes the claim the idempotency
//! guard: only the first claimer sends.

use async_trait::async_trait;
use prank_core::{
    models::RevealStatus, traits::RevealNotificationRepository, AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of RevealNotificationRepository
pub struct PgRevealNotificationRepository {
    pool: PgPool,
}

impl PgRevealNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevealNotificationRepository for PgRevealNotificationRepository {
    #[instrument(skip(self, recipient))]
    async fn claim(&self, call_request_id: Uuid, recipient: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reveal_notifications (call_request_id, status, recipient)
            VALUES ($1, 'pending', $2)
            ON CONFLICT (call_request_id) DO NOTHING
            "#,
        )
        .bind(call_request_id)
        .bind(recipient)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error claiming reveal for {}: {}", call_request_id, e);
            AppError::Database(format!("Failed to claim reveal notification: {}", e))
        })?;

        let claimed = result.rows_affected() > 0;
        debug!("Reveal claim for {}: {}", call_request_id, claimed);
        Ok(claimed)
    }

    #[instrument(skip(self, message, provider_message_id, error))]
    async fn finish(
        &self,
        call_request_id: Uuid,
        status: RevealStatus,
        message: Option<&str>,
        provider_message_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE reveal_notifications
            SET status = $2,
                message = $3,
                provider_message_id = $4,
                error = $5,
                updated_at = NOW()
            WHERE call_request_id = $1
            "#,
        )
        .bind(call_request_id)
        .bind(status.as_str())
        .bind(message)
        .bind(provider_message_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finishing reveal for {}: {}", call_request_id, e);
            AppError::Database(format!("Failed to update reveal notification: {}", e))
        })?;

        Ok(())
    }
}
