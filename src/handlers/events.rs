use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::migration::{EventDisposition, ProvisioningEvent};

use super::AppState;

/// POST /internal/events/database-provisioned - delivery bridge for the
/// "tenant database provisioned" event.
///
/// The message layer delivers at least once and redelivers on any non-2xx
/// response, so the handler's disposition maps directly onto the status
/// code: Ack is 200, Retry is 503.
pub async fn database_provisioned(
    State(state): State<AppState>,
    Json(event): Json<ProvisioningEvent>,
) -> impl IntoResponse {
    match state.orchestrator.handle_provisioning_event(&event).await {
        EventDisposition::Ack => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": { "disposition": "ack" } })),
        ),
        EventDisposition::Retry => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "data": { "disposition": "retry" } })),
        ),
    }
}
