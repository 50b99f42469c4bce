//! API layer for the prank call service
//!
//! Actix-web handlers for the call lifecycle RPCs, the provider webhooks,
//! the scheduler trigger, payments, and the admin console.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::configure;
pub use state::AppState;
