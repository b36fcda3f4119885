pub mod admin;
pub mod events;
pub mod tenants;

use std::sync::Arc;

use crate::migration::MigrationOrchestrator;
use crate::tenancy::TenantRegistry;

/// Shared handler state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TenantRegistry>,
    pub orchestrator: Arc<MigrationOrchestrator>,
}
