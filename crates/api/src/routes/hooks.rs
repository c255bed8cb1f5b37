//! Database event trigger routes

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use scholarsync_shared::SubscriptionRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const SUBSCRIPTIONS_TABLE: &str = "subscriptions";
const UPDATE_OP: &str = "UPDATE";

// =============================================================================
// Payload Types
// =============================================================================

/// Event trigger delivery
#[derive(Debug, Deserialize)]
pub struct EventPayload {
    pub event: Event,
    pub table: TableRef,
    #[serde(default)]
    pub trigger: Option<TriggerRef>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    pub op: String,
    pub data: EventData,
}

/// Row images; which ones are present depends on `op`
#[derive(Debug, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default)]
    pub new: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TableRef {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRef {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct HookResponse {
    pub handled: bool,
}

fn row_image(image: Option<Value>, which: &str) -> ApiResult<SubscriptionRow> {
    let image = image.ok_or_else(|| ApiError::InvalidPayload(format!("missing {} row", which)))?;
    serde_json::from_value(image)
        .map_err(|e| ApiError::InvalidPayload(format!("{} row: {}", which, e)))
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /hooks/subscriptions
pub async fn subscription_event(
    State(state): State<AppState>,
    payload: Result<Json<EventPayload>, JsonRejection>,
) -> ApiResult<Json<HookResponse>> {
    let Json(payload) = payload.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;

    let trigger = payload.trigger.as_ref().map(|t| t.name.as_str()).unwrap_or("");

    if payload.table.name != SUBSCRIPTIONS_TABLE || payload.event.op != UPDATE_OP {
        tracing::info!(
            trigger = %trigger,
            table = %payload.table.name,
            op = %payload.event.op,
            "Ignoring event"
        );
        return Ok(Json(HookResponse { handled: false }));
    }

    let updated = row_image(payload.event.data.new, "new")?;
    let old = row_image(payload.event.data.old, "old")?;

    tracing::debug!(
        trigger = %trigger,
        subscription_id = %updated.id,
        student_id = %updated.student_id,
        "Subscription update received"
    );

    let handled = state
        .billing
        .hooks
        .on_subscription_updated(&updated, &old)
        .await?;

    Ok(Json(HookResponse { handled }))
}
