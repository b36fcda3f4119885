use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use teck_platform::config;
use teck_platform::database::DatabaseManager;
use teck_platform::handlers::{admin, events, tenants, AppState};
use teck_platform::middleware::{identity_mint_middleware, identity_validate_middleware};
use teck_platform::migration::{MigrationOrchestrator, MigrationRunnerConfig};
use teck_platform::services::{RegistryClient, RegistryHandle};
use teck_platform::tenancy::TenantRegistry;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up SHARED_DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!(
        "Starting {} in {:?} mode",
        config.service.name,
        config.environment
    );

    let runner_config = match MigrationRunnerConfig::from_config(&config.migrations) {
        Ok(runner_config) => runner_config,
        Err(e) => {
            tracing::error!("Invalid migration configuration: {}", e);
            std::process::exit(1);
        }
    };

    let shared_pool = match DatabaseManager::shared_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Cannot reach the shared database: {}", e);
            std::process::exit(1);
        }
    };
    let registry = Arc::new(TenantRegistry::new(shared_pool));

    // The registry deployable reports status in process; every other service
    // reports over HTTP
    let registry_handle = if config.service.is_registry {
        RegistryHandle::Local(registry.clone())
    } else {
        RegistryHandle::Remote(RegistryClient::new(config.service.registry_url.clone()))
    };

    let orchestrator = Arc::new(MigrationOrchestrator::new(
        config.service.name.clone(),
        runner_config,
        registry_handle,
        config.shared_database.write_url.clone(),
    ));

    // Startup gate: the shared database must be on the current schema before
    // any traffic is accepted. A half-upgraded fleet must not serve requests.
    let result = orchestrator.migrate_shared().await;
    if !result.success {
        tracing::error!(
            "Shared database migration failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    tracing::info!(
        "Shared database is current ({} scripts applied in {} ms)",
        result.scripts_applied,
        result.duration_ms
    );

    let state = AppState {
        registry,
        orchestrator,
    };
    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", config.service.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("{} listening on http://{}", config.service.name, bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app(state: AppState) -> Router {
    let trust = Arc::new(config::config().trust.clone());

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Tenant registry API
        .merge(tenant_routes())
        // Admin operations
        .merge(admin_routes())
        // Message-delivery bridge
        .merge(event_routes())
        .with_state(state)
        // Trust boundary: the edge minter runs first (outermost), the
        // internal validator consumes what it minted
        .layer(from_fn_with_state(
            trust.clone(),
            identity_validate_middleware,
        ))
        .layer(from_fn_with_state(trust, identity_mint_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route("/tenants/:tenant_id", get(tenants::get_tenant))
        .route("/tenants/by-slug/:slug", get(tenants::get_tenant_by_slug))
        .route(
            "/tenants/:tenant_id/readiness",
            get(tenants::tenant_readiness),
        )
        .route(
            "/tenants/:tenant_id/services/:service/migration-status",
            put(tenants::update_migration_status),
        )
        .route(
            "/tenants/:tenant_id/services/:service/database-info",
            get(tenants::get_database_info).put(tenants::upsert_database_info),
        )
        .route(
            "/tenants/:tenant_id/services/:service/readiness",
            get(tenants::service_readiness),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/migrations/trigger", post(admin::trigger_migration))
}

fn event_routes() -> Router<AppState> {
    Router::new().route(
        "/internal/events/database-provisioned",
        post(events::database_provisioned),
    )
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Teck Platform",
            "version": version,
            "description": "Tenant trust, connection routing and migration control plane",
            "endpoints": {
                "health": "/health (public)",
                "tenants": "/tenants[/:tenant_id] (internal)",
                "migration_status": "/tenants/:tenant_id/services/:service/migration-status (internal)",
                "database_info": "/tenants/:tenant_id/services/:service/database-info (internal)",
                "readiness": "/tenants/:tenant_id[/services/:service]/readiness (internal)",
                "admin": "/admin/migrations/trigger (admin role)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
