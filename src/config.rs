// src/config.rs

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,

    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub signed_url_ttl: Duration,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    /// Price id whose successful payment intents top up the credit balance.
    pub credits_price_id: Option<String>,
    pub checkout_currency: String,

    pub jwt_secret: String,

    pub openai_api_key: String,
    pub openai_api_base: String,

    pub resend_api_key: Option<String>,
    pub resend_api_base: String,
    pub request_email_from: String,
    pub request_email_to: Option<String>,

    pub ffprobe_path: String,
    pub max_upload_bytes: usize,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_upload_mb: usize = parsed("MAX_UPLOAD_MB", 25)?;
        let signed_url_ttl_secs: u64 = parsed("SIGNED_URL_TTL_SECS", 3600)?;

        Ok(Self {
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 8065)?,
            database_url: required("DATABASE_URL")?,

            s3_bucket: required("S3_BUCKET")?,
            s3_endpoint: optional("S3_ENDPOINT"),
            signed_url_ttl: Duration::from_secs(signed_url_ttl_secs),

            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: optional("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com/v1".to_string()),
            credits_price_id: optional("CREDITS_PRICE_ID"),
            checkout_currency: optional("CHECKOUT_CURRENCY").unwrap_or_else(|| "usd".to_string()),

            jwt_secret: required("JWT_SECRET")?,

            openai_api_key: required("OPENAI_API_KEY")?,
            openai_api_base: optional("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),

            resend_api_key: optional("RESEND_API_KEY"),
            resend_api_base: optional("RESEND_API_BASE")
                .unwrap_or_else(|| "https://api.resend.com".to_string()),
            request_email_from: optional("REQUEST_EMAIL_FROM")
                .unwrap_or_else(|| "Tools <request@localhost>".to_string()),
            request_email_to: optional("REQUEST_EMAIL_TO"),

            ffprobe_path: optional("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    /// Settings suitable for tests: every secret is a fixed dummy value and
    /// every outbound base URL points nowhere.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            database_url: "postgres://localhost/test".to_string(),
            s3_bucket: "test-bucket".to_string(),
            s3_endpoint: None,
            signed_url_ttl: Duration::from_secs(3600),
            stripe_secret_key: "sk_test".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_api_base: "http://localhost".to_string(),
            credits_price_id: Some("price_credits".to_string()),
            checkout_currency: "usd".to_string(),
            jwt_secret: "test-jwt-secret".to_string(),
            openai_api_key: "test-openai".to_string(),
            openai_api_base: "http://localhost".to_string(),
            resend_api_key: None,
            resend_api_base: "http://localhost".to_string(),
            request_email_from: "Tools <request@localhost>".to_string(),
            request_email_to: None,
            ffprobe_path: "ffprobe".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}
