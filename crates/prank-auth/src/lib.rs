//! Authentication and authorization for the prank call service
//!
//! Accounts are managed by the external identity provider, which issues
//! HS256 JWTs whose subject is the user id. This crate validates those
//! tokens and exposes Actix-web extractors for callers, admins, and the
//! periodic scheduler trigger.
//!
//! # Examples
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use prank_auth::{AdminUser, AuthenticatedUser};
//!
//! async fn my_credits(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
//! }
//!
//! async fn admin_route(_admin: AdminUser) -> HttpResponse {
//!     HttpResponse::Ok().finish()
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser, CronCaller, CronSecret};
