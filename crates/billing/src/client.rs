//! Stripe client wrapper

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Overrides the Stripe API base URL (stripe-mock, proxies)
    pub api_base: Option<String>,
}

/// Shared Stripe client; cheap to clone
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = match &config.api_base {
            Some(base) => stripe::Client::from_url(base.as_str(), config.secret_key),
            None => stripe::Client::new(config.secret_key),
        };
        Self { inner }
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }
}
