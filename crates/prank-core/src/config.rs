//! Application configuration
//!
//! Process-wide configuration loaded with the `config` crate from defaults,
//! optional config files, and `PRANK__`-prefixed environment variables.
//! Provider credentials live here; admin-editable runtime settings
//! (provider selection, consumption policy) live in the database instead.

use crate::models::Package;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub twilio: TwilioConfig,
    pub vapi: VapiConfig,
    pub stripe: StripeConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads (0 = one per core)
    #[serde(default)]
    pub workers: usize,

    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply pending migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret shared with the identity provider
    pub jwt_secret: String,

    /// JWT token expiration in seconds (used when this service issues tokens)
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: i64,

    /// Bearer secret the periodic scheduler trigger must present
    pub cron_secret: String,
}

fn default_jwt_expiration() -> i64 {
    3600
}

/// Outbound HTTP client configuration shared by every provider client
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Timeout for a single provider request in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Twilio voice and messaging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    /// Caller id used for outbound calls and reveal SMS
    #[serde(default)]
    pub from_number: String,

    /// Public base URL where Twilio reaches our webhooks
    #[serde(default)]
    pub webhook_base_url: String,

    /// Realtime media bridge (wss://) the call audio is streamed to
    #[serde(default)]
    pub media_stream_url: Option<String>,

    /// Extension appended to recording references
    #[serde(default = "default_recording_extension")]
    pub recording_extension: String,

    #[serde(default = "default_twilio_api_base")]
    pub api_base_url: String,
}

fn default_recording_extension() -> String {
    ".mp3".to_string()
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

/// VAPI voice-AI configuration
#[derive(Debug, Deserialize, Clone)]
pub struct VapiConfig {
    #[serde(default)]
    pub api_key: String,

    /// VAPI phone number identifier used as caller
    #[serde(default)]
    pub phone_number_id: String,

    /// Pre-built assistant; when absent an inline assistant is sent
    #[serde(default)]
    pub assistant_id: Option<String>,

    /// URL VAPI posts status updates and end-of-call reports to
    #[serde(default)]
    pub server_url: Option<String>,

    #[serde(default = "default_vapi_api_base")]
    pub api_base_url: String,

    #[serde(default = "default_vapi_model")]
    pub model: String,
}

fn default_vapi_api_base() -> String {
    "https://api.vapi.ai".to_string()
}

fn default_vapi_model() -> String {
    "gpt-4o".to_string()
}

/// Stripe checkout configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub success_url: String,

    #[serde(default)]
    pub cancel_url: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base_url: String,
}

fn default_currency() -> String {
    "eur".to_string()
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}

/// LLM moderation gateway configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModerationConfig {
    /// OpenAI-compatible chat completions endpoint; keyword rules only when absent
    #[serde(default)]
    pub gateway_url: Option<String>,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_moderation_model")]
    pub model: String,

    /// Additional blocked keywords on top of the built-in rule list
    #[serde(default)]
    pub extra_keywords: Vec<String>,
}

fn default_moderation_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Purchasable credit packages
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_packages")]
    pub packages: Vec<Package>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            packages: default_packages(),
        }
    }
}

fn default_packages() -> Vec<Package> {
    vec![
        Package::one_time("single", "1 Prank", 1, 299),
        Package::one_time("pack_3", "3 Pranks", 3, 799),
        Package::one_time("pack_10", "10 Pranks", 10, 1999),
        Package::recurring("monthly", "Monthly Prankster", 5, 999),
    ]
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 0)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.jwt_expiration_secs", 3600)?
            .set_default("http.timeout_secs", 15)?
            .set_default("twilio.recording_extension", ".mp3")?
            .set_default("stripe.currency", "eur")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with PRANK_ prefix
            .add_source(
                Environment::with_prefix("PRANK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("moderation.extra_keywords")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PRANK").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
