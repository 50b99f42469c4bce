//! Call request repository implementation
//!
//! Status writes are conditional so concurrent webhook deliveries and
//! dispatches cannot overwrite each other.

use chrono::{DateTime, Utc};
use prank_core::{
    models::{CallRequest, CallStatus, ProviderKind, StatusUpdate},
    traits::CallRequestRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const CALL_REQUEST_COLUMNS: &str = r#"
    id, user_id, victim_first_name, victim_last_name, victim_phone,
    victim_gender, language, voice_gender, voice_id, prank_theme,
    real_detail, personality, creativity_level, scheduled_at,
    call_provider, provider_call_id, call_status, recording_url,
    duration_seconds, max_duration, send_reveal_sms, created_at, updated_at
"#;

/// PostgreSQL implementation of CallRequestRepository
pub struct PgCallRequestRepository {
    pool: PgPool,
}

impl PgCallRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database status string to enum
    fn parse_status(s: &str) -> CallStatus {
        CallStatus::from_str(s).unwrap_or_else(|| {
            warn!("Unknown call_status '{}' in database, treating as pending", s);
            CallStatus::Pending
        })
    }
}

#[async_trait]
impl CallRequestRepository for PgCallRequestRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRequest>> {
        debug!("Finding call request by id: {}", id);

        let query = format!(
            "SELECT {} FROM call_requests WHERE id = $1",
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call request {}: {}", id, e);
                AppError::Database(format!("Failed to find call request: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> AppResult<Option<CallRequest>> {
        debug!("Finding call request by provider call id: {}", provider_call_id);

        let query = format!(
            "SELECT {} FROM call_requests WHERE provider_call_id = $1",
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(provider_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Database error finding call request by provider id {}: {}",
                    provider_call_id, e
                );
                AppError::Database(format!("Failed to find call request: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<CallRequest>> {
        let query = format!(
            r#"
            SELECT {}
            FROM call_requests
            WHERE call_status = 'scheduled'
              AND scheduled_at <= $1
            ORDER BY scheduled_at
            LIMIT $2
            "#,
            CALL_REQUEST_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding due scheduled calls: {}", e);
                AppError::Database(format!("Failed to fetch scheduled calls: {}", e))
            })?;

        debug!("Found {} due scheduled call requests", rows.len());

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_initiated(
        &self,
        id: Uuid,
        provider: ProviderKind,
        provider_call_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_requests
            SET call_status = 'initiated',
                call_provider = $2,
                provider_call_id = $3,
                updated_at = NOW()
            WHERE id = $1
              AND provider_call_id IS NULL
              AND call_status IN ('pending', 'scheduled')
            "#,
        )
        .bind(id)
        .bind(provider.as_str())
        .bind(provider_call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking call request {} initiated: {}", id, e);
            if e.to_string().contains("unique constraint") {
                AppError::Conflict(format!(
                    "Provider call {} is already linked to another request",
                    provider_call_id
                ))
            } else {
                AppError::Database(format!("Failed to update call request: {}", e))
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        update: &StatusUpdate,
    ) -> AppResult<bool> {
        let recording_url = if update.status.allows_recording() {
            update.recording_url.as_deref()
        } else {
            None
        };

        let result = sqlx::query(
            r#"
            UPDATE call_requests
            SET call_status = $3,
                recording_url = COALESCE($4, recording_url),
                duration_seconds = COALESCE($5, duration_seconds),
                updated_at = NOW()
            WHERE id = $1
              AND call_status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(recording_url)
        .bind(update.duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating status of call request {}: {}", id, e);
            AppError::Database(format!("Failed to update call status: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRequestRow {
    id: Uuid,
    user_id: Uuid,
    victim_first_name: String,
    victim_last_name: Option<String>,
    victim_phone: String,
    victim_gender: Option<String>,
    language: String,
    voice_gender: Option<String>,
    voice_id: Option<String>,
    prank_theme: String,
    real_detail: Option<String>,
    personality: Option<String>,
    creativity_level: i32,
    scheduled_at: Option<DateTime<Utc>>,
    call_provider: Option<String>,
    provider_call_id: Option<String>,
    call_status: String,
    recording_url: Option<String>,
    duration_seconds: Option<i32>,
    max_duration: i32,
    send_reveal_sms: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CallRequestRow> for CallRequest {
    fn from(row: CallRequestRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            victim_first_name: row.victim_first_name,
            victim_last_name: row.victim_last_name,
            victim_phone: row.victim_phone,
            victim_gender: row.victim_gender,
            language: row.language,
            voice_gender: row.voice_gender,
            voice_id: row.voice_id,
            prank_theme: row.prank_theme,
            real_detail: row.real_detail,
            personality: row.personality,
            creativity_level: row.creativity_level,
            scheduled_at: row.scheduled_at,
            call_provider: row.call_provider.as_deref().and_then(ProviderKind::from_str),
            provider_call_id: row.provider_call_id,
            call_status: PgCallRequestRepository::parse_status(&row.call_status),
            recording_url: row.recording_url,
            duration_seconds: row.duration_seconds,
            max_duration: row.max_duration,
            send_reveal_sms: row.send_reveal_sms,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
