//! Data Transfer Objects (DTOs) for API requests and responses

pub mod admin;
pub mod calls;
pub mod common;
pub mod payments;

pub use admin::*;
pub use calls::*;
pub use common::*;
pub use payments::*;
