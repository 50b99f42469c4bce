//! Third-party provider clients
//!
//! Thin reqwest clients implementing the provider traits of `prank_core`:
//!
//! - [`twilio::TwilioVoiceClient`] and [`vapi::VapiClient`] place and end calls
//! - [`twilio::TwilioSmsClient`] sends reveal messages
//! - [`stripe::StripeClient`] creates and retrieves checkout sessions
//! - [`moderation::LlmModerationClient`] classifies prank themes
//!
//! Every client uses a bounded request timeout and converts failures into
//! [`ProviderError`], which maps onto `AppError::Provider`.

pub mod error;
pub mod http;
pub mod moderation;
pub mod stripe;
pub mod twilio;
pub mod vapi;

pub use error::ProviderError;
pub use moderation::LlmModerationClient;
pub use stripe::StripeClient;
pub use twilio::{TwilioSmsClient, TwilioVoiceClient};
pub use vapi::VapiClient;
