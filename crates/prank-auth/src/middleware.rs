//! Actix-web authentication extractors
//!
//! Provides extractors for authenticated callers, admins, and the external
//! scheduler trigger.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use prank_core::error::AppError;
use prank_core::models::UserRole;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extract the bearer token from the Authorization header
fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Extract JWT token from request
///
/// Checks the Authorization header first, then a cookie named "token".
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    bearer_token(req).or_else(|| req.cookie("token").map(|c| c.value().to_string()))
}

/// Authenticated caller extractor
///
/// Validates the JWT and exposes the caller's user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: UserRole,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Display name for audit entries
    pub fn actor(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.user_id.to_string())
    }

    fn from_claims(claims: Claims) -> Result<Self, AppError> {
        Ok(Self {
            user_id: claims.user_id()?,
            email: claims.email.clone(),
            role: claims.role,
            claims,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt_service = match req.app_data::<web::Data<Arc<JwtService>>>() {
            Some(service) => service.get_ref().clone(),
            None => {
                warn!("JwtService not found in app data");
                return ready(Err(AppError::Unauthorized(
                    "Authentication service not configured".to_string(),
                )
                .into()));
            }
        };

        let token = match extract_token_from_request(req) {
            Some(t) => t,
            None => {
                debug!("No authentication token found in request");
                return ready(Err(AppError::Unauthorized(
                    "No authentication token provided".to_string(),
                )
                .into()));
            }
        };

        let user = jwt_service
            .validate_token(&token)
            .and_then(AuthenticatedUser::from_claims);

        match user {
            Ok(user) => {
                debug!(
                    user_id = %user.user_id,
                    role = %user.role,
                    "User authenticated successfully"
                );
                ready(Ok(user))
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(e.into()))
            }
        }
    }
}

/// Admin user extractor
///
/// Requires the admin role; responds 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth_user = match AuthenticatedUser::from_request(req, payload).into_inner() {
            Ok(user) => user,
            Err(e) => return ready(Err(e)),
        };

        if !auth_user.is_admin() {
            warn!(
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "User attempted admin access without privileges"
            );
            return ready(Err(AppError::Forbidden.into()));
        }

        debug!(user_id = %auth_user.user_id, "Admin access granted");

        ready(Ok(AdminUser(auth_user)))
    }
}

/// Shared secret presented by the periodic scheduler trigger
#[derive(Clone)]
pub struct CronSecret(String);

impl CronSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.is_empty() || expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for CronSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CronSecret([REDACTED])")
    }
}

/// Scheduler trigger extractor
///
/// Requires `Authorization: Bearer <cron secret>`.
#[derive(Debug, Clone, Copy)]
pub struct CronCaller;

impl FromRequest for CronCaller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(secret) = req.app_data::<web::Data<CronSecret>>() else {
            warn!("CronSecret not found in app data");
            return ready(Err(AppError::Unauthorized(
                "Scheduler authentication not configured".to_string(),
            )
            .into()));
        };

        match bearer_token(req) {
            Some(token) if secret.matches(&token) => ready(Ok(CronCaller)),
            _ => {
                warn!("Rejected scheduler trigger with missing or wrong secret");
                ready(Err(AppError::Unauthorized(
                    "Invalid scheduler credentials".to_string(),
                )
                .into()))
            }
        }
    }
}
