//! API routes

pub mod actions;
pub mod hooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_webhook_secret, state::AppState};

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Gateway callbacks, all behind the shared secret
    let gateway_routes = Router::new()
        .route("/hooks/subscriptions", post(hooks::subscription_event))
        .route("/actions/purchase-plan", post(actions::purchase_plan))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_webhook_secret,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(gateway_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
