//! Profile repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prank_core::{
    models::{Profile, UserRole},
    traits::ProfileRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ProfileRepository
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let row = sqlx::query_as::<sqlx::Postgres, ProfileRow>(
            r#"
            SELECT id, email, verified_phone, prank_credits, role, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding profile {}: {}", user_id, e);
            AppError::Database(format!("Failed to find profile: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: Option<String>,
    verified_phone: Option<String>,
    prank_credits: i32,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            verified_phone: row.verified_phone,
            prank_credits: row.prank_credits,
            role: UserRole::from_str(&row.role).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
