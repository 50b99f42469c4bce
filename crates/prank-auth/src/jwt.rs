//! Identity-provider token verification
//!
//! Tokens are HS256 JWTs signed with the project secret shared with the
//! identity provider. `JwtService` can also sign tokens for local tooling
//! and tests.

use crate::claims::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use prank_core::error::AppError;
use prank_core::models::UserRole;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Clock skew tolerated on `exp`
const LEEWAY_SECS: u64 = 30;

#[derive(Clone)]
pub struct JwtService {
    /// Lifetime of locally signed tokens
    expiration_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// ```
    /// use prank_auth::JwtService;
    ///
    /// let jwt_service = JwtService::new("project-jwt-secret", 3600);
    /// ```
    pub fn new(secret: &str, expiration_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        // Identity-provider tokens carry an audience ("authenticated") we do not pin
        validation.validate_aud = false;

        Self {
            expiration_secs,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims`; a zero `exp` gets the configured lifetime
    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        let mut claims = claims.clone();
        if claims.exp == 0 {
            claims.exp = (Utc::now() + Duration::seconds(self.expiration_secs)).timestamp();
        }

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!(sub = %claims.sub, error = %e, "Failed to sign token");
            AppError::InvalidToken(format!("Token creation failed: {}", e))
        })
    }

    pub fn create_token_for_user(&self, user_id: Uuid, role: UserRole) -> Result<String, AppError> {
        self.create_token(&Claims::new(user_id, None, role))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Expired tokens map to `AppError::TokenExpired`, anything else that
    /// fails verification to `AppError::InvalidToken`.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => {
                    warn!(error = %e, "Rejected token");
                    AppError::InvalidToken(format!("Token validation failed: {}", e))
                }
            })?;

        debug!(sub = %claims.sub, role = %claims.role, "Token verified");
        Ok(claims)
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("expiration_secs", &self.expiration_secs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
