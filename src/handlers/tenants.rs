use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::tenancy::{
    DatabaseMetadata, DatabaseProvider, DatabaseStrategy, MigrationStatus, NewTenant, StatusReport,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub slug: String,
    pub display_name: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    pub strategy: DatabaseStrategy,
    pub provider: DatabaseProvider,
    #[serde(default)]
    pub required_services: Vec<String>,
}

fn default_plan() -> String {
    "standard".to_string()
}

/// POST /tenants - register a new tenant; strategy and provider are fixed
/// for the tenant's lifetime
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state
        .registry
        .create_tenant(NewTenant {
            slug: body.slug,
            display_name: body.display_name,
            plan: body.plan,
            strategy: body.strategy,
            provider: body.provider,
            required_services: body.required_services,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": tenant })),
    ))
}

/// GET /tenants/:tenant_id
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.registry.get_tenant(tenant_id).await?;
    Ok(Json(json!({ "success": true, "data": tenant })))
}

/// GET /tenants/by-slug/:slug
pub async fn get_tenant_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state
        .registry
        .get_tenant_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tenant not found: {}", slug)))?;
    Ok(Json(json!({ "success": true, "data": tenant })))
}

/// GET /tenants
pub async fn list_tenants(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tenants = state.registry.list_tenants().await?;
    Ok(Json(json!({ "success": true, "data": tenants })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub last_version: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// PUT /tenants/:tenant_id/services/:service/migration-status
///
/// Idempotent per-service status report. `PartiallyProvisioned` is a rollup
/// value and is rejected here.
pub async fn update_migration_status(
    State(state): State<AppState>,
    Path((tenant_id, service)): Path<(Uuid, String)>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status: MigrationStatus = body
        .status
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;

    state
        .registry
        .update_migration_status(
            tenant_id,
            &service,
            StatusReport {
                status,
                last_version: body.last_version,
                error_message: body.error_message,
            },
        )
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct DatabaseInfoRequest {
    pub write_connection: String,
    #[serde(default)]
    pub read_connection: Option<String>,
    #[serde(default)]
    pub has_separate_read_database: bool,
}

/// PUT /tenants/:tenant_id/services/:service/database-info - the provisioner
/// registers where a service's databases live for this tenant
pub async fn upsert_database_info(
    State(state): State<AppState>,
    Path((tenant_id, service)): Path<(Uuid, String)>,
    Json(body): Json<DatabaseInfoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.has_separate_read_database != body.read_connection.is_some() {
        return Err(ApiError::bad_request(
            "read_connection must be present exactly when has_separate_read_database is true",
        ));
    }

    state
        .registry
        .upsert_database_metadata(
            tenant_id,
            &DatabaseMetadata {
                service_name: service,
                write_connection: body.write_connection,
                read_connection: body.read_connection,
                has_separate_read_database: body.has_separate_read_database,
            },
        )
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// GET /tenants/:tenant_id/services/:service/database-info
pub async fn get_database_info(
    State(state): State<AppState>,
    Path((tenant_id, service)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.registry.get_database_info(tenant_id, &service).await?;
    Ok(Json(json!({ "success": true, "data": info })))
}

/// GET /tenants/:tenant_id/services/:service/readiness
pub async fn service_readiness(
    State(state): State<AppState>,
    Path((tenant_id, service)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ready = state
        .registry
        .check_service_readiness(tenant_id, &service)
        .await?;
    Ok(Json(json!({ "success": true, "data": { "ready": ready } })))
}

/// GET /tenants/:tenant_id/readiness - tenant-level rollup over all services
pub async fn tenant_readiness(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (status, services) = state.registry.tenant_status(tenant_id).await?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "status": status.to_string(),
            "ready": status == MigrationStatus::Completed,
            "services": services,
        }
    })))
}
