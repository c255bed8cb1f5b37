//! Internal store access
//!
//! The internal store is the system of record for users, subscriptions and
//! plans. Handlers talk to it through [`InternalStore`] so tests can swap in a
//! mock; [`GraphqlStore`] is the production implementation.

use async_trait::async_trait;
use mockall::automock;
use scholarsync_shared::SubscriptionStatus;
use graphql_client::{GraphQLQuery, QueryBody};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::graphql::{GraphqlEndpoint, GraphqlFailure};

const SUBSCRIPTIONS_BY_STUDENT_ID: &str = r#"
query SubscriptionsByStudentId($studentId: uuid!) {
    student(id: $studentId) {
        id
        shopifyCustomerId
        parent {
            id
            shopifyCustomerId
        }
    }
}
"#;

const GET_PLAN_AND_STUDENT: &str = r#"
query GetPlanAndStudent($studentId: uuid!, $planId: String!, $promoCode: String) {
    promoCodes: promo_codes(where: { code: { _eq: $promoCode } }) {
        id
    }
    product(id: $planId) {
        id
        prices(where: { active: { _eq: true } }) {
            id
        }
    }
    student(id: $studentId) {
        id
        firstName
        lastName
        email
        stripe {
            customerId
        }
        subscription {
            status
            stripeSubscriptionId
            cancelAt
        }
        shopifyCustomerId
        parentId: parent_id
        parent {
            id
            firstName
            lastName
            email
            shopifyCustomerId
            stripe {
                customerId
            }
            subscriptions(order_by: [{ createdAt: asc }]) {
                studentId: student_id
                stripeSubscriptionId
                status
            }
        }
    }
}
"#;

const UPDATE_STUDENT: &str = r#"
mutation UpdateStudent($id: uuid!, $set: students_set_input!) {
    updateStudent: update_students_by_pk(pk_columns: { id: $id }, _set: $set) {
        id
    }
}
"#;

const UPSERT_SUBSCRIPTION: &str = r#"
mutation UpsertSubscription($object: subscriptions_insert_input!) {
    subscription: insert_subscriptions_one(
        object: $object
        on_conflict: {
            constraint: subscriptions_student_id_key
            update_columns: [status, stripe_subscription_id, parent_id]
        }
    ) {
        id
    }
}
"#;

// =========================================================================
// Read models
// =========================================================================

/// Payment-processor customer linked to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeCustomerRef {
    pub customer_id: String,
}

/// Parent as seen by the subscription-change hook
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedParent {
    pub id: String,
    #[serde(default)]
    pub shopify_customer_id: Option<String>,
}

/// Student (with optional parent) as seen by the subscription-change hook
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStudent {
    pub id: String,
    #[serde(default)]
    pub shopify_customer_id: Option<String>,
    #[serde(default)]
    pub parent: Option<LinkedParent>,
}

impl SubscriptionStudent {
    /// Commerce customer id of the account that carries the tag: the parent when present
    pub fn tagged_customer_id(&self) -> Option<&str> {
        match &self.parent {
            Some(parent) => parent.shopify_customer_id.as_deref(),
            None => self.shopify_customer_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionsByStudentIdData {
    student: Option<SubscriptionStudent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub prices: Vec<Price>,
}

/// The student's own subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSubscription {
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub cancel_at: Option<String>,
}

/// One of the parent's subscriptions (one per child)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSubscription {
    pub student_id: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanParent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub shopify_customer_id: Option<String>,
    #[serde(default)]
    pub stripe: Option<StripeCustomerRef>,
    #[serde(default)]
    pub subscriptions: Vec<ParentSubscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStudent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub shopify_customer_id: Option<String>,
    #[serde(default)]
    pub subscription: Option<StudentSubscription>,
    #[serde(default)]
    pub stripe: Option<StripeCustomerRef>,
    #[serde(default)]
    pub parent: Option<PlanParent>,
}

/// Result of the combined plan/student lookup done by the purchase mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanAndStudent {
    #[serde(default)]
    pub promo_codes: Vec<PromoCode>,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub student: Option<PlanStudent>,
}

// =========================================================================
// Write models
// =========================================================================

/// Columns set on a student record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    pub shopify_customer_id: String,
}

/// Subscription row written after the payment processor created a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubscription {
    pub student_id: String,
    pub parent_id: Option<String>,
    pub stripe_subscription_id: String,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStudentData {
    update_student: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct UpsertSubscriptionData {
    subscription: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: String,
}

// =========================================================================
// Operations
// =========================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentIdVariables {
    student_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanAndStudentVariables {
    student_id: String,
    plan_id: String,
    promo_code: String,
}

#[derive(Debug, Serialize)]
struct UpdateStudentVariables {
    id: String,
    set: StudentUpdate,
}

#[derive(Debug, Serialize)]
struct UpsertSubscriptionVariables {
    object: NewSubscription,
}

struct SubscriptionsByStudentId;

impl GraphQLQuery for SubscriptionsByStudentId {
    type Variables = StudentIdVariables;
    type ResponseData = SubscriptionsByStudentIdData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: SUBSCRIPTIONS_BY_STUDENT_ID,
            operation_name: "SubscriptionsByStudentId",
        }
    }
}

struct GetPlanAndStudent;

impl GraphQLQuery for GetPlanAndStudent {
    type Variables = PlanAndStudentVariables;
    type ResponseData = PlanAndStudent;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: GET_PLAN_AND_STUDENT,
            operation_name: "GetPlanAndStudent",
        }
    }
}

struct UpdateStudent;

impl GraphQLQuery for UpdateStudent {
    type Variables = UpdateStudentVariables;
    type ResponseData = UpdateStudentData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: UPDATE_STUDENT,
            operation_name: "UpdateStudent",
        }
    }
}

struct UpsertSubscription;

impl GraphQLQuery for UpsertSubscription {
    type Variables = UpsertSubscriptionVariables;
    type ResponseData = UpsertSubscriptionData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: UPSERT_SUBSCRIPTION,
            operation_name: "UpsertSubscription",
        }
    }
}

#[automock]
#[async_trait]
pub trait InternalStore: Send + Sync {
    /// Student (and parent) owning the subscriptions of `student_id`
    async fn subscriptions_by_student_id(
        &self,
        student_id: &str,
    ) -> BillingResult<Option<SubscriptionStudent>>;

    /// Promo codes, product prices and student in one round trip
    async fn get_plan_and_student(
        &self,
        student_id: &str,
        plan_id: &str,
        promo_code: &str,
    ) -> BillingResult<Option<PlanAndStudent>>;

    async fn update_student(&self, student_id: &str, update: StudentUpdate) -> BillingResult<()>;

    async fn upsert_subscription(&self, subscription: NewSubscription) -> BillingResult<()>;
}

/// [`InternalStore`] backed by the store's GraphQL API
#[derive(Debug, Clone)]
pub struct GraphqlStore {
    endpoint: GraphqlEndpoint,
}

impl GraphqlStore {
    pub const ADMIN_SECRET_HEADER: &'static str = "x-hasura-admin-secret";

    pub fn new(http: reqwest::Client, url: &str, admin_secret: &str) -> Self {
        Self {
            endpoint: GraphqlEndpoint::new(http, url, Self::ADMIN_SECRET_HEADER, admin_secret),
        }
    }
}

fn store_error(e: GraphqlFailure) -> BillingError {
    BillingError::Graphql(e.to_string())
}

#[async_trait]
impl InternalStore for GraphqlStore {
    async fn subscriptions_by_student_id(
        &self,
        student_id: &str,
    ) -> BillingResult<Option<SubscriptionStudent>> {
        let data = self
            .endpoint
            .execute::<SubscriptionsByStudentId>(StudentIdVariables {
                student_id: student_id.to_string(),
            })
            .await
            .map_err(store_error)?;

        Ok(data.and_then(|d| d.student))
    }

    async fn get_plan_and_student(
        &self,
        student_id: &str,
        plan_id: &str,
        promo_code: &str,
    ) -> BillingResult<Option<PlanAndStudent>> {
        self.endpoint
            .execute::<GetPlanAndStudent>(PlanAndStudentVariables {
                student_id: student_id.to_string(),
                plan_id: plan_id.to_string(),
                promo_code: promo_code.to_string(),
            })
            .await
            .map_err(store_error)
    }

    async fn update_student(&self, student_id: &str, update: StudentUpdate) -> BillingResult<()> {
        let data = self
            .endpoint
            .execute::<UpdateStudent>(UpdateStudentVariables {
                id: student_id.to_string(),
                set: update,
            })
            .await
            .map_err(store_error)?;

        if data.and_then(|d| d.update_student).is_none() {
            tracing::error!(student_id = %student_id, "Student update matched no rows");
            return Err(BillingError::Graphql(format!(
                "student {} was not updated",
                student_id
            )));
        }

        tracing::debug!(student_id = %student_id, "Student record updated");
        Ok(())
    }

    async fn upsert_subscription(&self, subscription: NewSubscription) -> BillingResult<()> {
        let student_id = subscription.student_id.clone();
        let data = self
            .endpoint
            .execute::<UpsertSubscription>(UpsertSubscriptionVariables {
                object: subscription,
            })
            .await
            .map_err(store_error)?;

        if data.and_then(|d| d.subscription).is_none() {
            return Err(BillingError::Graphql(format!(
                "subscription for student {} was not stored",
                student_id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn store_for(server: &mockito::Server) -> GraphqlStore {
        GraphqlStore::new(
            reqwest::Client::new(),
            &format!("{}/v1/graphql", server.url()),
            "admin-secret",
        )
    }

    #[tokio::test]
    async fn test_subscriptions_by_student_id_reads_parent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/graphql")
            .match_header("x-hasura-admin-secret", "admin-secret")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "SubscriptionsByStudentId",
                "variables": { "studentId": "S1" }
            })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": {
                        "student": {
                            "id": "S1",
                            "parent": { "id": "P1", "shopifyCustomerId": "gid://shopify/Customer/9" }
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let student = store_for(&server)
            .subscriptions_by_student_id("S1")
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(student.id, "S1");
        assert_eq!(
            student.tagged_customer_id(),
            Some("gid://shopify/Customer/9")
        );
    }

    #[tokio::test]
    async fn test_missing_student_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/graphql")
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": { "student": null } }).to_string())
            .create_async()
            .await;

        let student = store_for(&server)
            .subscriptions_by_student_id("S404")
            .await
            .unwrap();

        assert!(student.is_none());
    }

    #[tokio::test]
    async fn test_graphql_errors_are_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/graphql")
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "errors": [{ "message": "field 'student' not found in type: 'query_root'" }] })
                    .to_string(),
            )
            .create_async()
            .await;

        let err = store_for(&server)
            .get_plan_and_student("S1", "plan", "")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Graphql(msg) if msg.contains("query_root")));
    }

    #[tokio::test]
    async fn test_update_student_sends_shopify_customer_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/graphql")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "UpdateStudent",
                "variables": { "id": "S1", "set": { "shopifyCustomerId": "SHOP1" } }
            })))
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": { "updateStudent": { "id": "S1" } } }).to_string())
            .create_async()
            .await;

        store_for(&server)
            .update_student(
                "S1",
                StudentUpdate {
                    shopify_customer_id: "SHOP1".to_string(),
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_student_without_match_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/graphql")
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": { "updateStudent": null } }).to_string())
            .create_async()
            .await;

        let result = store_for(&server)
            .update_student(
                "S1",
                StudentUpdate {
                    shopify_customer_id: "SHOP1".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(BillingError::Graphql(_))));
    }

    #[test]
    fn test_plan_and_student_deserializes_parent_subscriptions() {
        let data: PlanAndStudent = serde_json::from_value(json!({
            "promoCodes": [{ "id": "promo_1" }],
            "product": { "id": "plan", "prices": [{ "id": "price_1" }] },
            "student": {
                "id": "S1",
                "firstName": "Sam",
                "lastName": "Student",
                "email": "sam@example.com",
                "parentId": "U1",
                "subscription": null,
                "stripe": null,
                "parent": {
                    "id": "U1",
                    "firstName": "Pat",
                    "lastName": "Parent",
                    "email": "pat@example.com",
                    "stripe": { "customerId": "C1" },
                    "subscriptions": [
                        { "studentId": "S1", "status": "ACTIVE", "stripeSubscriptionId": "sub_1" }
                    ]
                }
            }
        }))
        .unwrap();

        let parent = data.student.unwrap().parent.unwrap();
        assert_eq!(parent.stripe.unwrap().customer_id, "C1");
        assert_eq!(parent.subscriptions[0].status, SubscriptionStatus::Active);
        assert_eq!(data.promo_codes[0].id, "promo_1");
    }
}
