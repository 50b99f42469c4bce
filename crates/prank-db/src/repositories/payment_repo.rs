//! Payment record and promo code repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prank_core::{
    models::{PaymentRecord, PromoCode},
    traits::{PaymentRecordRepository, PromoCodeRepository},
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of PaymentRecordRepository
pub struct PgPaymentRecordRepository {
    pool: PgPool,
}

impl PgPaymentRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRecordRepository for PgPaymentRecordRepository {
    #[instrument(skip(self))]
    async fn find_by_session(&self, session_id: &str) -> AppResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<sqlx::Postgres, PaymentRecordRow>(
            r#"
            SELECT session_id, user_id, package_id, credits_granted,
                   amount_cents, promo_code, created_at
            FROM payment_records
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payment {}: {}", session_id, e);
            AppError::Database(format!("Failed to find payment record: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<PaymentRecord>, i64)> {
        debug!("Listing payment records limit {} offset {}", limit, offset);

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payment_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting payments: {}", e);
                AppError::Database(format!("Failed to count payment records: {}", e))
            })?;

        let rows = sqlx::query_as::<sqlx::Postgres, PaymentRecordRow>(
            r#"
            SELECT session_id, user_id, package_id, credits_granted,
                   amount_cents, promo_code, created_at
            FROM payment_records
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing payments: {}", e);
            AppError::Database(format!("Failed to fetch payment records: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// PostgreSQL implementation of PromoCodeRepository
pub struct PgPromoCodeRepository {
    pool: PgPool,
}

impl PgPromoCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromoCodeRepository for PgPromoCodeRepository {
    #[instrument(skip(self))]
    async fn find_by_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        let row = sqlx::query_as::<sqlx::Postgres, PromoCodeRow>(
            r#"
            SELECT code, percent_off, max_uses, times_used, expires_at, active, created_at
            FROM promo_codes
            WHERE code = $1
            "#,
        )
        .bind(PromoCode::normalize(code))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding promo code: {}", e);
            AppError::Database(format!("Failed to find promo code: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRecordRow {
    session_id: String,
    user_id: Uuid,
    package_id: String,
    credits_granted: i32,
    amount_cents: Option<i64>,
    promo_code: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRecordRow> for PaymentRecord {
    fn from(row: PaymentRecordRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            package_id: row.package_id,
            credits_granted: row.credits_granted,
            amount_cents: row.amount_cents,
            promo_code: row.promo_code,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PromoCodeRow {
    code: String,
    percent_off: i32,
    max_uses: Option<i32>,
    times_used: i32,
    expires_at: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<PromoCodeRow> for PromoCode {
    fn from(row: PromoCodeRow) -> Self {
        Self {
            code: row.code,
            percent_off: row.percent_off,
            max_uses: row.max_uses,
            times_used: row.times_used,
            expires_at: row.expires_at,
            active: row.active,
            created_at: row.created_at,
        }
    }
}
