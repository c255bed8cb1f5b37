//! Payment processor subscriptions
//!
//! A purchase either creates a new Stripe subscription for the billed customer
//! or, when the student is already subscribed, moves the existing
//! subscription onto the purchased price.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use scholarsync_shared::SubscriptionStatus;
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{
    CreateSubscription, CreateSubscriptionItems, CustomerId, PromotionCodeId, Subscription,
    SubscriptionId, SubscriptionStatus as StripeSubStatus, UpdateSubscription,
    UpdateSubscriptionItems,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::store::{InternalStore, NewSubscription, PlanStudent};

/// Everything needed to create or re-price a student's subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Payment-processor customer that is billed (parent or student)
    pub customer_id: String,
    pub price_id: String,
    pub student: PlanStudent,
    pub promo_code_id: Option<String>,
}

#[automock]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Returns the payment-processor subscription id
    async fn create_or_add_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> BillingResult<String>;
}

/// Map a Stripe subscription status onto the internal store's enumeration
pub fn status_from_stripe(status: StripeSubStatus) -> SubscriptionStatus {
    match status {
        StripeSubStatus::Active => SubscriptionStatus::Active,
        StripeSubStatus::Canceled | StripeSubStatus::IncompleteExpired => {
            SubscriptionStatus::Canceled
        }
        StripeSubStatus::Incomplete => SubscriptionStatus::Incomplete,
        StripeSubStatus::PastDue => SubscriptionStatus::PastDue,
        StripeSubStatus::Paused => SubscriptionStatus::Pending,
        StripeSubStatus::Trialing => SubscriptionStatus::Trialing,
        StripeSubStatus::Unpaid => SubscriptionStatus::Unpaid,
    }
}

/// Existing subscription the purchase should be applied to, if any
fn existing_subscription_id(student: &PlanStudent) -> Option<&str> {
    student
        .subscription
        .as_ref()
        .filter(|s| s.status != SubscriptionStatus::Canceled)
        .and_then(|s| s.stripe_subscription_id.as_deref())
}

fn parse_promotion_code(promo_code_id: Option<&str>) -> BillingResult<Option<PromotionCodeId>> {
    promo_code_id
        .map(|id| {
            id.parse::<PromotionCodeId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid promotion code ID: {}", e)))
        })
        .transpose()
}

/// Stripe implementation of [`PaymentProcessor`]
pub struct StripePayments {
    stripe: StripeClient,
    store: Arc<dyn InternalStore>,
}

impl StripePayments {
    pub fn new(stripe: StripeClient, store: Arc<dyn InternalStore>) -> Self {
        Self { stripe, store }
    }

    async fn create_subscription(&self, request: &SubscriptionRequest) -> BillingResult<String> {
        let customer_id = request
            .customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut metadata = HashMap::new();
        metadata.insert("student_id".to_string(), request.student.id.clone());

        let mut params = CreateSubscription::new(customer_id);
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(metadata);
        params.promotion_code = parse_promotion_code(request.promo_code_id.as_deref())?;

        let subscription = Subscription::create(self.stripe.inner(), params).await?;

        self.store
            .upsert_subscription(NewSubscription {
                student_id: request.student.id.clone(),
                parent_id: request.student.parent_id.clone(),
                stripe_subscription_id: subscription.id.to_string(),
                status: status_from_stripe(subscription.status),
            })
            .await?;

        tracing::info!(
            student_id = %request.student.id,
            subscription_id = %subscription.id,
            status = ?subscription.status,
            "Created subscription"
        );

        Ok(subscription.id.to_string())
    }

    async fn add_to_subscription(
        &self,
        request: &SubscriptionRequest,
        subscription_id: &str,
    ) -> BillingResult<String> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;

        let current = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;

        let item_id = current
            .items
            .data
            .first()
            .map(|item| item.id.to_string())
            .ok_or_else(|| BillingError::StripeApi("No subscription items found".to_string()))?;

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item_id),
                price: Some(request.price_id.clone()),
                ..Default::default()
            }]),
            promotion_code: parse_promotion_code(request.promo_code_id.as_deref())?,
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        let subscription = Subscription::update(self.stripe.inner(), &sub_id, params).await?;

        tracing::info!(
            student_id = %request.student.id,
            subscription_id = %subscription.id,
            price_id = %request.price_id,
            "Moved existing subscription to new price"
        );

        Ok(subscription.id.to_string())
    }
}

#[async_trait]
impl PaymentProcessor for StripePayments {
    async fn create_or_add_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> BillingResult<String> {
        match existing_subscription_id(&request.student) {
            Some(subscription_id) => {
                let subscription_id = subscription_id.to_string();
                self.add_to_subscription(&request, &subscription_id).await
            }
            None => self.create_subscription(&request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockInternalStore, StudentSubscription};
    use mockall::predicate::eq;
    use mockito::Matcher;

    fn student(subscription: Option<StudentSubscription>) -> PlanStudent {
        PlanStudent {
            id: "S1".to_string(),
            first_name: "Sam".to_string(),
            last_name: "Student".to_string(),
            email: "sam@example.com".to_string(),
            parent_id: None,
            shopify_customer_id: None,
            subscription,
            stripe: None,
            parent: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_from_stripe(StripeSubStatus::Active),
            SubscriptionStatus::Active
        );
        assert_eq!(
            status_from_stripe(StripeSubStatus::IncompleteExpired),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            status_from_stripe(StripeSubStatus::Paused),
            SubscriptionStatus::Pending
        );
        assert_eq!(
            status_from_stripe(StripeSubStatus::PastDue),
            SubscriptionStatus::PastDue
        );
    }

    #[test]
    fn test_live_subscription_is_reused() {
        let s = student(Some(StudentSubscription {
            status: SubscriptionStatus::PastDue,
            stripe_subscription_id: Some("sub_123".to_string()),
            cancel_at: None,
        }));
        assert_eq!(existing_subscription_id(&s), Some("sub_123"));
    }

    #[test]
    fn test_canceled_or_missing_subscription_creates_new() {
        let canceled = student(Some(StudentSubscription {
            status: SubscriptionStatus::Canceled,
            stripe_subscription_id: Some("sub_old".to_string()),
            cancel_at: Some("2021-06-01T00:00:00Z".to_string()),
        }));
        assert_eq!(existing_subscription_id(&canceled), None);
        assert_eq!(existing_subscription_id(&student(None)), None);
    }

    // =========================================================================
    // Stripe round trips (mockito stands in for the Stripe API)
    // =========================================================================

    fn stripe_subscription(id: &str, item_id: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "object": "subscription",
            "automatic_tax": { "enabled": false },
            "billing_cycle_anchor": 1_700_000_000,
            "cancel_at_period_end": false,
            "created": 1_700_000_000,
            "currency": "usd",
            "current_period_end": 1_702_592_000,
            "current_period_start": 1_700_000_000,
            "customer": "cus_parent",
            "items": {
                "object": "list",
                "data": [{ "id": item_id, "object": "subscription_item" }],
                "has_more": false,
                "url": "/v1/subscription_items"
            },
            "livemode": false,
            "metadata": { "student_id": "S1" },
            "start_date": 1_700_000_000,
            "status": status
        })
    }

    fn payments_for(server: &mockito::Server, store: MockInternalStore) -> StripePayments {
        let stripe = StripeClient::new(crate::client::StripeConfig {
            secret_key: "sk_test_123".to_string(),
            api_base: Some(server.url()),
        });
        StripePayments::new(stripe, Arc::new(store))
    }

    fn request(student: PlanStudent) -> SubscriptionRequest {
        SubscriptionRequest {
            customer_id: "cus_parent".to_string(),
            price_id: "price_monthly".to_string(),
            student,
            promo_code_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_path_records_subscription() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/v1/subscriptions")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("customer".to_string(), "cus_parent".to_string()),
                Matcher::UrlEncoded("items[0][price]".to_string(), "price_monthly".to_string()),
                Matcher::UrlEncoded("metadata[student_id]".to_string(), "S1".to_string()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(stripe_subscription("sub_new", "si_new", "incomplete").to_string())
            .expect(1)
            .create_async()
            .await;

        let mut store = MockInternalStore::new();
        store
            .expect_upsert_subscription()
            .with(eq(NewSubscription {
                student_id: "S1".to_string(),
                parent_id: None,
                stripe_subscription_id: "sub_new".to_string(),
                status: SubscriptionStatus::Incomplete,
            }))
            .times(1)
            .returning(|_| Ok(()));

        let id = payments_for(&server, store)
            .create_or_add_subscription(request(student(None)))
            .await
            .unwrap();

        create.assert_async().await;
        assert_eq!(id, "sub_new");
    }

    #[tokio::test]
    async fn test_add_path_moves_first_item_with_prorations() {
        let mut server = mockito::Server::new_async().await;
        let retrieve = server
            .mock("GET", Matcher::Regex(r"^/v1/subscriptions/sub_live".to_string()))
            .with_header("content-type", "application/json")
            .with_body(stripe_subscription("sub_live", "si_first", "active").to_string())
            .expect(1)
            .create_async()
            .await;
        let update = server
            .mock("POST", "/v1/subscriptions/sub_live")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("items[0][id]".to_string(), "si_first".to_string()),
                Matcher::UrlEncoded("items[0][price]".to_string(), "price_monthly".to_string()),
                Matcher::UrlEncoded(
                    "proration_behavior".to_string(),
                    "create_prorations".to_string(),
                ),
            ]))
            .with_header("content-type", "application/json")
            .with_body(stripe_subscription("sub_live", "si_first", "active").to_string())
            .expect(1)
            .create_async()
            .await;

        let mut store = MockInternalStore::new();
        store.expect_upsert_subscription().never();

        let live = student(Some(StudentSubscription {
            status: SubscriptionStatus::Active,
            stripe_subscription_id: Some("sub_live".to_string()),
            cancel_at: None,
        }));
        let id = payments_for(&server, store)
            .create_or_add_subscription(request(live))
            .await
            .unwrap();

        retrieve.assert_async().await;
        update.assert_async().await;
        assert_eq!(id, "sub_live");
    }

    #[test]
    fn test_promotion_code_parsing() {
        assert!(parse_promotion_code(None).unwrap().is_none());
        assert!(parse_promotion_code(Some("promo_1Jabc")).unwrap().is_some());
    }
}
