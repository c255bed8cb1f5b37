//! Application state

use std::sync::Arc;

use scholarsync_billing::{BillingResult, BillingService};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Subscription hooks and plan purchase services
    pub billing: Arc<BillingService>,
}

impl AppState {
    /// Build state with billing services wired to the configured upstreams
    pub fn new(config: Config) -> BillingResult<Self> {
        let billing = BillingService::new(config.billing.clone())?;
        Ok(Self::with_billing(config, billing))
    }

    pub fn with_billing(config: Config, billing: BillingService) -> Self {
        Self {
            config,
            billing: Arc::new(billing),
        }
    }
}
