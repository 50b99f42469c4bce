//! Audit log repository implementation
//!
//! Provides PostgreSQL-backed storage for audit logs.

use async_trait::async_trait;
use prank_core::{
    models::{AuditLog, AuditLogData},
    traits::AuditLogRepository,
    AppError, AppResult,
};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of AuditLogRepository
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    #[instrument(skip(self, data))]
    async fn insert(&self, data: AuditLogData) -> AppResult<()> {
        debug!("Creating audit log: {} on {}", data.action, data.entity_type);

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                user_id, actor, action, entity_type,
                entity_id, details, ip_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(data.user_id)
        .bind(&data.actor)
        .bind(&data.action)
        .bind(&data.entity_type)
        .bind(&data.entity_id)
        .bind(&data.details)
        .bind(&data.ip_address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating audit log: {}", e);
            AppError::Database(format!("Failed to create audit log: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<AuditLog>, i64)> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting audit logs: {}", e);
                AppError::Database(format!("Failed to count audit logs: {}", e))
            })?;

        let logs = sqlx::query(
            r#"
            SELECT
                id, user_id, actor, action, entity_type,
                entity_id, details, ip_address, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .map(|row: sqlx::postgres::PgRow| AuditLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            actor: row.get("actor"),
            action: row.get("action"),
            entity_type: row.get("entity_type"),
            entity_id: row.get("entity_id"),
            details: row.get("details"),
            ip_address: row.get("ip_address"),
            created_at: row.get("created_at"),
        })
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching audit logs: {}", e);
            AppError::Database(format!("Failed to fetch audit logs: {}", e))
        })?;

        Ok((logs, total.0))
    }
}
