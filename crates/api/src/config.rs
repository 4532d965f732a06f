//! Application configuration

use std::env;

/// Well-known development default for the cron shared secret. Deployments
/// that forget to set CRON_SECRET accept this value; main logs a warning
/// at startup when it is in effect.
pub const DEFAULT_CRON_SECRET: &str = "dev-cron-secret";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Cron authentication
    pub cron_secret: String,

    // Email
    pub resend_api_key: String,
    pub email_from: String,

    // Branding for outbound email
    pub dashboard_url: String,
    pub support_email: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            cron_secret: env::var("CRON_SECRET")
                .unwrap_or_else(|_| DEFAULT_CRON_SECRET.to_string()),

            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "FieldHQ <noreply@fieldhq.app>".to_string()),

            dashboard_url: env::var("DASHBOARD_URL")
                .unwrap_or_else(|_| "https://app.fieldhq.app".to_string()),
            support_email: env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@fieldhq.app".to_string()),
        })
    }

    /// Whether the insecure development cron secret is in effect
    pub fn cron_secret_is_default(&self) -> bool {
        self.cron_secret == DEFAULT_CRON_SECRET
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
