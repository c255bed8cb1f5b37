// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries upstream response bodies
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ScholarSync Billing Module
//!
//! Keeps the internal subscription store, Stripe and the Shopify customer
//! list in agreement.
//!
//! ## Features
//!
//! - **Subscription Hooks**: React to subscription row updates by removing the subscribed tag
//! - **Plan Purchase**: Bill a student's plan and register the billed party on Shopify
//! - **Internal Store**: GraphQL access to students, plans and subscriptions
//! - **Commerce Customers**: Shopify customer creation and tag maintenance
//! - **Payments**: Stripe subscription creation and re-pricing

pub mod client;
pub mod commerce;
pub mod error;
pub mod graphql;
pub mod hooks;
pub mod payments;
pub mod purchase;
pub mod store;


use std::sync::Arc;
use std::time::Duration;

// Client
pub use client::{StripeClient, StripeConfig};

// Commerce
pub use commerce::{
    without_subscribed_tag, CommercePlatform, CustomerInfo, MockCommercePlatform, ShopifyClient,
    SUBSCRIBED_TAG,
};

// Error
pub use error::{BillingError, BillingResult};

// Hooks
pub use hooks::SubscriptionHooks;

// Payments
pub use payments::{
    status_from_stripe, MockPaymentProcessor, PaymentProcessor, StripePayments,
    SubscriptionRequest,
};

// Purchase
pub use purchase::{Caller, PurchasePlanArgs, PurchaseService};

// Store
pub use store::{GraphqlStore, InternalStore, MockInternalStore};

/// Connection settings for every upstream the billing services talk to
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub graphql_endpoint: String,
    pub graphql_admin_secret: String,
    pub shopify_api_endpoint: String,
    pub shopify_api_key: String,
    pub stripe: StripeConfig,
    pub http_timeout: Duration,
}

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub hooks: SubscriptionHooks,
    pub purchase: PurchaseService,
}

impl BillingService {
    /// Wire the GraphQL store, Shopify and Stripe clients from config
    pub fn new(config: BillingConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let store: Arc<dyn InternalStore> = Arc::new(GraphqlStore::new(
            http.clone(),
            &config.graphql_endpoint,
            &config.graphql_admin_secret,
        ));
        let commerce: Arc<dyn CommercePlatform> = Arc::new(ShopifyClient::new(
            http,
            &config.shopify_api_endpoint,
            &config.shopify_api_key,
        ));
        let payments: Arc<dyn PaymentProcessor> = Arc::new(StripePayments::new(
            StripeClient::new(config.stripe),
            store.clone(),
        ));

        Ok(Self::from_parts(store, commerce, payments))
    }

    /// Assemble from already-built collaborators
    pub fn from_parts(
        store: Arc<dyn InternalStore>,
        commerce: Arc<dyn CommercePlatform>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            hooks: SubscriptionHooks::new(store.clone(), commerce.clone()),
            purchase: PurchaseService::new(store, payments, commerce),
        }
    }
}
