//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// A referenced record (student, plan) does not exist or is not visible to the caller
    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("unexpected error {0}")]
    UnexpectedError(String),

    #[error("no stripe account")]
    NoStripeAccount,

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Commerce platform error: {0}")]
    Commerce(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl BillingError {
    /// Error code reported to the action caller in `extensions.code`
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::MissingReference(_) => "rs_missing_reference",
            BillingError::UnexpectedError(_) => "rs_unexpected_error",
            BillingError::NoStripeAccount => "rs_no_stripe_account",
            BillingError::StripeApi(_) => "rs_payment_failed",
            BillingError::Graphql(_) | BillingError::Commerce(_) | BillingError::Http(_) => {
                "rs_upstream_error"
            }
        }
    }

    /// Whether the error is caused by the request rather than a failing dependency
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::MissingReference(_)
                | BillingError::UnexpectedError(_)
                | BillingError::NoStripeAccount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_messages() {
        assert_eq!(
            BillingError::MissingReference("student".to_string()).to_string(),
            "missing reference: student"
        );
        assert_eq!(
            BillingError::UnexpectedError("(plan_price)".to_string()).to_string(),
            "unexpected error (plan_price)"
        );
        assert_eq!(BillingError::NoStripeAccount.to_string(), "no stripe account");
    }

    #[test]
    fn test_client_errors_are_separated_from_upstream() {
        assert!(BillingError::NoStripeAccount.is_client_error());
        assert!(!BillingError::Graphql("boom".to_string()).is_client_error());
        assert_eq!(
            BillingError::Commerce("down".to_string()).code(),
            "rs_upstream_error"
        );
    }
}
