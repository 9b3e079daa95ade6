// GET /health: adapter readiness. Unauthenticated, always 200.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::web::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backends = state.moderator.backends();
    let signals: BTreeMap<&str, String> = backends
        .readiness
        .iter()
        .map(|(name, readiness)| (*name, readiness.to_string()))
        .collect();

    Json(serde_json::json!({
        "status": if backends.all_ready() { "ok" } else { "degraded" },
        "signals": signals,
        "inFlight": state.moderator.cache().in_flight(),
    }))
}
