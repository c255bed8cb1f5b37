//! Rows delivered by database event triggers

use serde::{Deserialize, Serialize};

use crate::types::SubscriptionStatus;

/// A `subscriptions` row as it appears in `event.data.old` / `event.data.new`
///
/// Column names are snake_case on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRow {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_trigger_payload() {
        let row: SubscriptionRow = serde_json::from_value(serde_json::json!({
            "id": "sub-1",
            "student_id": "S1",
            "status": "CANCELED",
            "created_at": "2021-05-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(row.student_id, "S1");
        assert_eq!(row.status, SubscriptionStatus::Canceled);
        assert!(row.parent_id.is_none());
        assert!(row.stripe_subscription_id.is_none());
    }
}
