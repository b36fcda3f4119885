use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::migration::MigrationResult;

use super::AppState;

/// Role required for migration re-triggering
const ADMIN_ROLE: &str = "platform-admin";

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    /// Absent means the shared database
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// POST /admin/migrations/trigger - re-run the shared-database migration, or
/// a specific tenant's, without redeploying. Requires an admin principal.
///
/// Always answers with a structured result; a failed run maps to a 500 with
/// the failure details, never an unhandled fault.
pub async fn trigger_migration(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    body: Option<Json<TriggerRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal.ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    if !principal.has_role(ADMIN_ROLE) {
        return Err(ApiError::forbidden("Migration trigger requires an admin role"));
    }

    let Json(request) = body.unwrap_or_default();

    tracing::info!(
        "Admin-triggered migration requested by {} for {}",
        principal.subject().unwrap_or("<unknown>"),
        request
            .tenant_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "shared database".to_string())
    );

    let result = match request.tenant_id {
        Some(tenant_id) => state.orchestrator.migrate_tenant(tenant_id).await,
        None => state.orchestrator.migrate_shared().await,
    };

    Ok(trigger_response(request.tenant_id, result))
}

fn trigger_response(tenant_id: Option<Uuid>, result: MigrationResult) -> impl IntoResponse {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let body = json!({
        "success": result.success,
        "data": {
            "tenant_id": tenant_id,
            "scripts_applied": result.scripts_applied,
            "duration_ms": result.duration_ms,
            "applied_scripts": result.applied_scripts,
            "provider": result.provider,
            "error": result.error,
        }
    });

    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::DatabaseProvider;
    use axum::response::IntoResponse;

    #[test]
    fn failed_runs_map_to_500_with_structured_body() {
        let result = MigrationResult {
            success: false,
            scripts_applied: 1,
            duration_ms: 12,
            applied_scripts: vec!["0001_init.sql".to_string()],
            provider: DatabaseProvider::PostgreSql,
            error: Some("script failed".to_string()),
        };

        let response = trigger_response(None, result).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn successful_runs_map_to_200() {
        let result = MigrationResult {
            success: true,
            scripts_applied: 0,
            duration_ms: 3,
            applied_scripts: Vec::new(),
            provider: DatabaseProvider::PostgreSql,
            error: None,
        };

        let response = trigger_response(Some(Uuid::new_v4()), result).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
