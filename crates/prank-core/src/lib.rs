//! Prank call service core library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the prank call service. It includes:
//!
//! - Domain models (CallRequest, credit ledger, settings, payments)
//! - Repository and provider traits consumed by the service layer
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
