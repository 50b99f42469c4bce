//! Twilio voice and messaging
//!
//! Calls are placed through the Calls REST resource with a call-control
//! webhook (TwiML) and a status callback; reveal messages go through the
//! Messages resource. Both authenticate with the account SID and token.

pub mod sms;
pub mod status;
pub mod twiml;
pub mod voice;

pub use sms::TwilioSmsClient;
pub use status::normalize_call_status;
pub use voice::TwilioVoiceClient;

use crate::error::ProviderError;
use prank_core::config::TwilioConfig;

pub(crate) const PROVIDER: &str = "twilio";

/// Fail fast when credentials are missing
pub(crate) fn check_credentials(config: &TwilioConfig) -> Result<(), ProviderError> {
    if config.account_sid.trim().is_empty() || config.auth_token.trim().is_empty() {
        return Err(ProviderError::Config(
            "account_sid and auth_token are required".to_string(),
        ));
    }
    if config.from_number.trim().is_empty() {
        return Err(ProviderError::Config("from_number is required".to_string()));
    }
    Ok(())
}

pub(crate) fn account_url(config: &TwilioConfig, resource: &str) -> String {
    format!(
        "{}/Accounts/{}/{}",
        config.api_base_url.trim_end_matches('/'),
        config.account_sid,
        resource
    )
}
