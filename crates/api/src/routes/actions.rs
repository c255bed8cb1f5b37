//! GraphQL gateway action routes

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use scholarsync_billing::PurchasePlanArgs;
use scholarsync_shared::UserRole;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{authorize, Identity, SessionVariables},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Roles allowed to purchase a plan
const PURCHASE_ROLES: [UserRole; 2] = [UserRole::Parent, UserRole::Student];

#[derive(Debug, Deserialize)]
pub struct ActionName {
    pub name: String,
}

/// Action call envelope
#[derive(Debug, Deserialize)]
pub struct ActionPayload<I> {
    #[serde(default)]
    pub action: Option<ActionName>,
    pub input: I,
    #[serde(default)]
    pub session_variables: SessionVariables,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePlanResponse {
    pub subscription_id: String,
}

/// POST /actions/purchase-plan
pub async fn purchase_plan(
    State(state): State<AppState>,
    payload: Result<Json<ActionPayload<PurchasePlanArgs>>, JsonRejection>,
) -> ApiResult<Json<PurchasePlanResponse>> {
    let Json(payload) = payload.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;

    let identity = Identity::from_session(&payload.session_variables)?;
    authorize(&identity, &PURCHASE_ROLES)?;

    tracing::info!(
        action = payload.action.as_ref().map(|a| a.name.as_str()).unwrap_or(""),
        user_id = %identity.user_id,
        role = %identity.role,
        student_id = %payload.input.student_id,
        plan_id = %payload.input.plan_id,
        "Purchase plan requested"
    );

    let subscription_id = state
        .billing
        .purchase
        .purchase_plan(&identity.into(), payload.input)
        .await?;

    Ok(Json(PurchasePlanResponse { subscription_id }))
}
