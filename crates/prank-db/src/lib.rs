//! Prank call service database layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the prank call service. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for every trait in `prank_core::traits`
//! - Transactional, idempotent credit consumption and payment grants

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use prank_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
