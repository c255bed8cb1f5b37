// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ScholarSync shared types
//!
//! Domain vocabulary used by both the billing handlers and the API server:
//! caller roles, subscription statuses and the subscription row shape carried
//! by database event triggers.

pub mod rows;
pub mod types;

pub use rows::SubscriptionRow;
pub use types::{ParseRoleError, SubscriptionStatus, UserRole};
