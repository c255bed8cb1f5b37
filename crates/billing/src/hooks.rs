//! Database event hooks for subscription rows

use std::sync::Arc;

use scholarsync_shared::{SubscriptionRow, SubscriptionStatus};

use crate::commerce::CommercePlatform;
use crate::error::BillingResult;
use crate::store::InternalStore;

/// Keeps the commerce platform's subscribed tag in line with subscription row changes
#[derive(Clone)]
pub struct SubscriptionHooks {
    store: Arc<dyn InternalStore>,
    commerce: Arc<dyn CommercePlatform>,
}

impl SubscriptionHooks {
    pub fn new(store: Arc<dyn InternalStore>, commerce: Arc<dyn CommercePlatform>) -> Self {
        Self { store, commerce }
    }

    /// Handle an UPDATE on a subscription row
    ///
    /// Returns `true` only when the subscribed tag was removed from a commerce
    /// customer. "Student not found", "status unchanged" and "nothing to do" all
    /// return `false`.
    pub async fn on_subscription_updated(
        &self,
        updated: &SubscriptionRow,
        old: &SubscriptionRow,
    ) -> BillingResult<bool> {
        let student = self
            .store
            .subscriptions_by_student_id(&updated.student_id)
            .await?;

        let Some(student) = student else {
            tracing::error!(
                student_id = %updated.student_id,
                subscription_id = %updated.id,
                "Subscription's student data not found"
            );
            return Ok(false);
        };

        tracing::info!(
            student_id = %student.id,
            has_parent = student.parent.is_some(),
            "Subscription's student data retrieved"
        );

        if updated.status == old.status {
            tracing::debug!(
                subscription_id = %updated.id,
                status = %updated.status,
                "Subscription status unchanged"
            );
            return Ok(false);
        }

        // Only reacts when the previous status was not ACTIVE
        match student.tagged_customer_id() {
            Some(customer_id) if old.status != SubscriptionStatus::Active => {
                let removed = self.commerce.remove_subscribed_tag(customer_id).await?;

                tracing::info!(
                    subscription_id = %updated.id,
                    customer_id = %customer_id,
                    old_status = %old.status,
                    new_status = %updated.status,
                    removed = removed.is_some(),
                    "Processed subscribed tag removal"
                );

                Ok(removed.is_some())
            }
            _ => Ok(false),
        }
    }
}
