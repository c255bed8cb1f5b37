//! GraphQL-over-HTTP transport
//!
//! Both the internal store and the commerce platform take `graphql_client`
//! query bodies POSTed with a single authentication header.

use graphql_client::{GraphQLQuery, Response};
use reqwest::Client;

#[derive(Debug, thiserror::Error)]
pub enum GraphqlFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Errors(String),
}

/// A GraphQL endpoint plus the header used to authenticate against it
#[derive(Debug, Clone)]
pub struct GraphqlEndpoint {
    http: Client,
    url: String,
    auth_header: &'static str,
    auth_value: String,
}

impl GraphqlEndpoint {
    pub fn new(
        http: Client,
        url: impl Into<String>,
        auth_header: &'static str,
        auth_value: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            auth_header,
            auth_value: auth_value.into(),
        }
    }

    /// Execute an operation and return its `data`
    ///
    /// A non-empty `errors` array fails the call even when partial data came back.
    pub async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Option<Q::ResponseData>, GraphqlFailure> {
        let body = Q::build_query(variables);
        let operation_name = body.operation_name;

        let response = self
            .http
            .post(&self.url)
            .header(self.auth_header, &self.auth_value)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                operation = %operation_name,
                status = status,
                "GraphQL endpoint returned an error status"
            );
            return Err(GraphqlFailure::Status { status, body });
        }

        let parsed: Response<Q::ResponseData> = response.json().await?;

        match parsed.errors {
            Some(errors) if !errors.is_empty() => {
                let messages = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::error!(operation = %operation_name, errors = %messages, "GraphQL errors");
                Err(GraphqlFailure::Errors(messages))
            }
            _ => Ok(parsed.data),
        }
    }
}
