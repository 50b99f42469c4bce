//! Credit ledger implementation
//!
//! Credits live on `profiles.prank_credits`. Each decrement is recorded in
//! `credit_consumptions` keyed by call request id and each grant in
//! `payment_records` keyed by session id; the marker row and the balance
//! change always commit together.

use async_trait::async_trait;
use prank_core::{
    models::{ConsumeOutcome, GrantOutcome, PaymentGrant},
    traits::CreditLedger,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of CreditLedger
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    #[instrument(skip(self))]
    async fn balance(&self, user_id: Uuid) -> AppResult<i32> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT prank_credits FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error reading credits for {}: {}", user_id, e);
                    AppError::Database(format!("Failed to read credits: {}", e))
                })?;

        row.map(|(credits,)| credits)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))
    }

    #[instrument(skip(self))]
    async fn consume_for_call(
        &self,
        user_id: Uuid,
        call_request_id: Uuid,
    ) -> AppResult<ConsumeOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let marker = sqlx::query(
            r#"
            INSERT INTO credit_consumptions (call_request_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (call_request_id) DO NOTHING
            "#,
        )
        .bind(call_request_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to record consumption for {}: {}", call_request_id, e);
            AppError::Database(format!("Failed to record consumption: {}", e))
        })?;

        if marker.rows_affected() == 0 {
            debug!("Credit already consumed for call request {}", call_request_id);
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }

        let remaining: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE profiles
            SET prank_credits = prank_credits - 1,
                updated_at = NOW()
            WHERE id = $1
              AND prank_credits > 0
            RETURNING prank_credits
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to decrement credits for {}: {}", user_id, e);
            AppError::Database(format!("Failed to decrement credits: {}", e))
        })?;

        let Some((remaining,)) = remaining else {
            // Dropping the transaction rolls back the marker row
            warn!(
                "User {} has no credits left for call request {}",
                user_id, call_request_id
            );
            return Ok(ConsumeOutcome::InsufficientCredits);
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Consumed 1 credit for call request {} (user {}, {} left)",
            call_request_id, user_id, remaining
        );

        Ok(ConsumeOutcome::Consumed { remaining })
    }

    #[instrument(skip(self, grant), fields(session_id = %grant.session_id))]
    async fn grant_for_payment(&self, grant: &PaymentGrant) -> AppResult<GrantOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let marker = sqlx::query(
            r#"
            INSERT INTO payment_records (
                session_id, user_id, package_id, credits_granted, amount_cents, promo_code
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(&grant.session_id)
        .bind(grant.user_id)
        .bind(&grant.package_id)
        .bind(grant.credits)
        .bind(grant.amount_cents)
        .bind(&grant.promo_code)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to record payment {}: {}", grant.session_id, e);
            AppError::Database(format!("Failed to record payment: {}", e))
        })?;

        if marker.rows_affected() == 0 {
            drop(tx);
            let total = self.balance(grant.user_id).await?;
            debug!("Payment session {} was already reconciled", grant.session_id);
            return Ok(GrantOutcome::AlreadyGranted { total });
        }

        let total: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE profiles
            SET prank_credits = prank_credits + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING prank_credits
            "#,
        )
        .bind(grant.user_id)
        .bind(grant.credits)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to add credits for {}: {}", grant.user_id, e);
            AppError::Database(format!("Failed to add credits: {}", e))
        })?;

        let (total,) =
            total.ok_or_else(|| AppError::NotFound(format!("Profile {} not found", grant.user_id)))?;

        if let Some(code) = &grant.promo_code {
            sqlx::query(
                r#"
                UPDATE promo_codes
                SET times_used = times_used + 1
                WHERE code = $1
                "#,
            )
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to count promo code use {}: {}", code, e);
                AppError::Database(format!("Failed to update promo code: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Granted {} credits to user {} for session {} (total {})",
            grant.credits, grant.user_id, grant.session_id, total
        );

        Ok(GrantOutcome::Granted {
            credits_added: grant.credits,
            total,
        })
    }
}
