//! Plan purchase mutation
//!
//! Charges the billed party through the payment processor, then makes sure
//! the account has a commerce customer. The payment step runs first and is
//! never rolled back: if the commerce step fails afterwards the subscription
//! stays in effect and the error is returned to the caller.

use std::sync::Arc;

use scholarsync_shared::{SubscriptionStatus, UserRole};

use crate::commerce::{CommercePlatform, CustomerInfo};
use crate::error::{BillingError, BillingResult};
use crate::payments::{PaymentProcessor, SubscriptionRequest};
use crate::store::{InternalStore, PlanStudent, StudentUpdate};

/// Authenticated caller of the mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub role: UserRole,
    pub user_id: String,
}

/// Mutation arguments
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePlanArgs {
    pub student_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub promo_code: Option<String>,
}

#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn InternalStore>,
    payments: Arc<dyn PaymentProcessor>,
    commerce: Arc<dyn CommercePlatform>,
}

impl PurchaseService {
    pub fn new(
        store: Arc<dyn InternalStore>,
        payments: Arc<dyn PaymentProcessor>,
        commerce: Arc<dyn CommercePlatform>,
    ) -> Self {
        Self {
            store,
            payments,
            commerce,
        }
    }

    /// Purchase `plan_id` for `student_id`; returns the payment-processor subscription id
    pub async fn purchase_plan(
        &self,
        caller: &Caller,
        args: PurchasePlanArgs,
    ) -> BillingResult<String> {
        let PurchasePlanArgs {
            student_id,
            plan_id,
            promo_code,
        } = args;

        // An absent code is sent as "" because `_eq: null` matches every row
        let data = self
            .store
            .get_plan_and_student(&student_id, &plan_id, promo_code.as_deref().unwrap_or(""))
            .await?
            .ok_or_else(|| BillingError::UnexpectedError(String::new()))?;

        let is_parent = caller.role == UserRole::Parent;
        let student = match data.student {
            Some(student)
                if !is_parent || student.parent_id.as_deref() == Some(caller.user_id.as_str()) =>
            {
                student
            }
            _ => {
                tracing::warn!(
                    student_id = %student_id,
                    caller_id = %caller.user_id,
                    role = %caller.role,
                    "Student not found or not owned by caller"
                );
                return Err(BillingError::MissingReference("student".to_string()));
            }
        };

        let product = data
            .product
            .ok_or_else(|| BillingError::MissingReference("plan".to_string()))?;

        let price = product
            .prices
            .first()
            .ok_or_else(|| BillingError::UnexpectedError("(plan_price)".to_string()))?;

        let customer_id = billed_customer_id(&student).ok_or(BillingError::NoStripeAccount)?;

        let subscription_id = self
            .payments
            .create_or_add_subscription(SubscriptionRequest {
                customer_id,
                price_id: price.id.clone(),
                student: student.clone(),
                promo_code_id: data.promo_codes.first().map(|p| p.id.clone()),
            })
            .await?;

        tracing::info!(
            student_id = %student_id,
            plan_id = %plan_id,
            subscription_id = %subscription_id,
            "Plan purchased"
        );

        // The id is stored on the student even for a parent, so either record counts
        let already_registered = student.shopify_customer_id.is_some()
            || student
                .parent
                .as_ref()
                .is_some_and(|p| p.shopify_customer_id.is_some());
        if already_registered {
            return Ok(subscription_id);
        }

        self.ensure_commerce_customer(&student_id, &student).await?;

        Ok(subscription_id)
    }

    /// First purchase: create the commerce customer and store its id on the student
    ///
    /// The id lands on the student record even when the customer was created
    /// for the parent.
    async fn ensure_commerce_customer(
        &self,
        student_id: &str,
        student: &PlanStudent,
    ) -> BillingResult<()> {
        let user_info = match &student.parent {
            Some(parent) => {
                let is_active = parent
                    .subscriptions
                    .iter()
                    .find(|s| s.student_id == student_id)
                    .map(|s| s.status == SubscriptionStatus::Active)
                    .unwrap_or(false);
                CustomerInfo {
                    first_name: parent.first_name.clone(),
                    last_name: parent.last_name.clone(),
                    email: parent.email.clone(),
                    is_active,
                }
            }
            None => CustomerInfo {
                first_name: student.first_name.clone(),
                last_name: student.last_name.clone(),
                email: student.email.clone(),
                is_active: student
                    .subscription
                    .as_ref()
                    .map(|s| s.status.is_active())
                    .unwrap_or(false),
            },
        };

        let Some(shopify_customer_id) = self.commerce.create_or_add_customer(user_info).await?
        else {
            tracing::warn!(
                student_id = %student_id,
                "Commerce platform returned no customer, nothing persisted"
            );
            return Ok(());
        };

        self.store
            .update_student(
                student_id,
                StudentUpdate {
                    shopify_customer_id: shopify_customer_id.clone(),
                },
            )
            .await?;

        tracing::info!(
            student_id = %student_id,
            customer_id = %shopify_customer_id,
            for_parent = student.parent.is_some(),
            "Stored commerce customer on student"
        );

        Ok(())
    }
}

/// Payment-processor customer to bill: the parent's when there is a parent
fn billed_customer_id(student: &PlanStudent) -> Option<String> {
    student
        .parent
        .as_ref()
        .and_then(|p| p.stripe.as_ref())
        .or(student.stripe.as_ref())
        .map(|s| s.customer_id.clone())
}
