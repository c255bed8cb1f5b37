//! Commerce platform customers
//!
//! Customers on the commerce platform are segmented by a single tag,
//! [`SUBSCRIBED_TAG`], which marketing uses to target subscribers. This module
//! creates those customers and removes the tag; it never deletes a customer.

use async_trait::async_trait;
use graphql_client::{GraphQLQuery, QueryBody};
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::graphql::{GraphqlEndpoint, GraphqlFailure};

pub const SUBSCRIBED_TAG: &str = "subscribed";

const GET_CUSTOMER_BY_ID: &str = r#"
query GetCustomerById($id: ID!) {
    customer(id: $id) {
        tags
    }
}
"#;

const UPDATE_CUSTOMER: &str = r#"
mutation customerUpdate($input: CustomerInput!) {
    customerUpdate(input: $input) {
        customer {
            id
        }
        userErrors {
            field
            message
        }
    }
}
"#;

const CREATE_CUSTOMER: &str = r#"
mutation customerCreate($input: CustomerInput!) {
    customerCreate(input: $input) {
        customer {
            id
        }
        userErrors {
            field
            message
        }
    }
}
"#;

/// Identity used to create a commerce customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Whether the customer starts out with the subscribed tag
    pub is_active: bool,
}

#[automock]
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Create a customer, tagged as subscribed when `is_active`
    ///
    /// `Ok(None)` means the platform created nothing; callers treat it as failure.
    async fn create_or_add_customer(
        &self,
        user_info: CustomerInfo,
    ) -> BillingResult<Option<String>>;

    /// Drop the subscribed tag from a customer, keeping its other tags
    async fn remove_subscribed_tag(&self, customer_id: &str) -> BillingResult<Option<String>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CustomerIdVariables {
    id: String,
}

#[derive(Debug, Serialize)]
struct CustomerInputVariables {
    input: CustomerInput,
}

#[derive(Debug, Deserialize)]
struct CustomerTags {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetCustomerData {
    customer: Option<CustomerTags>,
}

#[derive(Debug, Deserialize)]
struct CustomerRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerMutationOutput {
    customer: Option<CustomerRef>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerData {
    customer_create: Option<CustomerMutationOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCustomerData {
    customer_update: Option<CustomerMutationOutput>,
}

struct GetCustomerById;

impl GraphQLQuery for GetCustomerById {
    type Variables = CustomerIdVariables;
    type ResponseData = GetCustomerData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: GET_CUSTOMER_BY_ID,
            operation_name: "GetCustomerById",
        }
    }
}

struct CustomerCreate;

impl GraphQLQuery for CustomerCreate {
    type Variables = CustomerInputVariables;
    type ResponseData = CreateCustomerData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: CREATE_CUSTOMER,
            operation_name: "customerCreate",
        }
    }
}

struct CustomerUpdate;

impl GraphQLQuery for CustomerUpdate {
    type Variables = CustomerInputVariables;
    type ResponseData = UpdateCustomerData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: UPDATE_CUSTOMER,
            operation_name: "customerUpdate",
        }
    }
}

/// Customer id from a create/update result; user errors are logged, not raised
fn customer_id_from(operation: &str, output: Option<CustomerMutationOutput>) -> Option<String> {
    let output = output?;
    for error in &output.user_errors {
        tracing::warn!(
            operation = %operation,
            field = ?error.field,
            message = %error.message,
            "Commerce platform rejected customer input"
        );
    }
    output.customer.map(|c| c.id)
}

fn commerce_error(e: GraphqlFailure) -> BillingError {
    BillingError::Commerce(e.to_string())
}

/// Tags left after removing the subscribed tag
pub fn without_subscribed_tag(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().filter(|t| t != SUBSCRIBED_TAG).collect()
}

/// Shopify Admin API implementation of [`CommercePlatform`]
#[derive(Debug, Clone)]
pub struct ShopifyClient {
    endpoint: GraphqlEndpoint,
}

impl ShopifyClient {
    pub const ACCESS_TOKEN_HEADER: &'static str = "X-Shopify-Access-Token";

    pub fn new(http: reqwest::Client, endpoint: &str, access_token: &str) -> Self {
        Self {
            endpoint: GraphqlEndpoint::new(
                http,
                endpoint,
                Self::ACCESS_TOKEN_HEADER,
                access_token,
            ),
        }
    }

    async fn current_tags(&self, customer_id: &str) -> BillingResult<Vec<String>> {
        let data = self
            .endpoint
            .execute::<GetCustomerById>(CustomerIdVariables {
                id: customer_id.to_string(),
            })
            .await
            .map_err(commerce_error)?;

        match data.and_then(|d| d.customer) {
            Some(customer) => Ok(customer.tags),
            None => {
                tracing::warn!(
                    customer_id = %customer_id,
                    "Commerce customer not found, writing empty tag set"
                );
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl CommercePlatform for ShopifyClient {
    async fn create_or_add_customer(
        &self,
        user_info: CustomerInfo,
    ) -> BillingResult<Option<String>> {
        let tags = if user_info.is_active {
            vec![SUBSCRIBED_TAG.to_string()]
        } else {
            Vec::new()
        };
        let input = CustomerInput {
            id: None,
            email: Some(user_info.email.clone()),
            first_name: Some(user_info.first_name.clone()),
            last_name: Some(user_info.last_name.clone()),
            tags,
        };

        let data = self
            .endpoint
            .execute::<CustomerCreate>(CustomerInputVariables { input })
            .await
            .map_err(commerce_error)?;

        let customer_id = customer_id_from("customerCreate", data.and_then(|d| d.customer_create));

        tracing::info!(
            email = %user_info.email,
            is_active = user_info.is_active,
            customer_id = ?customer_id,
            "Created commerce customer"
        );

        Ok(customer_id)
    }

    async fn remove_subscribed_tag(&self, customer_id: &str) -> BillingResult<Option<String>> {
        // Read-then-write: a tag change made between the two calls is overwritten
        let tags = without_subscribed_tag(self.current_tags(customer_id).await?);

        let input = CustomerInput {
            id: Some(customer_id.to_string()),
            email: None,
            first_name: None,
            last_name: None,
            tags,
        };

        let data = self
            .endpoint
            .execute::<CustomerUpdate>(CustomerInputVariables { input })
            .await
            .map_err(commerce_error)?;

        let updated = customer_id_from("customerUpdate", data.and_then(|d| d.customer_update));

        tracing::info!(
            customer_id = %customer_id,
            updated = updated.is_some(),
            "Removed subscribed tag from commerce customer"
        );

        Ok(updated)
    }
}
