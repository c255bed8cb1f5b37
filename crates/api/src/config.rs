//! Configuration management

use std::env;
use std::time::Duration;

use scholarsync_billing::{BillingConfig, StripeConfig};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_address: String,
    /// Shared secret the event trigger and action callers send in `x-webhook-secret`
    pub webhook_secret: String,
    /// Upstream connection settings for the billing services
    pub billing: BillingConfig,
}

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let http_timeout_secs = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("HTTP_TIMEOUT_SECS"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            webhook_secret: required("WEBHOOK_SECRET")?,
            billing: BillingConfig {
                graphql_endpoint: required("GRAPHQL_ENDPOINT")?,
                graphql_admin_secret: required("GRAPHQL_ADMIN_SECRET")?,
                shopify_api_endpoint: required("SHOPIFY_API_ENDPOINT")?,
                shopify_api_key: required("SHOPIFY_API_KEY")?,
                stripe: StripeConfig {
                    secret_key: required("STRIPE_SECRET_KEY")?,
                    api_base: lookup("STRIPE_API_BASE"),
                },
                http_timeout: Duration::from_secs(http_timeout_secs),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
