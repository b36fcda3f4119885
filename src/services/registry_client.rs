use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::tenancy::{DatabaseMetadata, RegistryError, StatusReport, TenantRegistry};

#[derive(Debug, Error)]
pub enum RegistryCallError {
    /// Unknown tenant or service; terminal for this call, never retried
    #[error("Not found in registry: {0}")]
    NotFound(String),

    #[error("Registry call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry rejected the call: {0}")]
    Remote(String),
}

/// HTTP client for the central tenant registry API, used by orchestrators
/// running in other deployables.
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn update_migration_status(
        &self,
        tenant_id: Uuid,
        service_name: &str,
        report: &StatusReport,
    ) -> Result<(), RegistryCallError> {
        let url = format!(
            "{}/tenants/{}/services/{}/migration-status",
            self.base_url, tenant_id, service_name
        );

        let response = self
            .http
            .put(&url)
            .json(&json!({
                "status": report.status.to_string(),
                "last_version": report.last_version,
                "error_message": report.error_message,
            }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(RegistryCallError::NotFound(format!(
                "tenant {} / service {}",
                tenant_id, service_name
            ))),
            s => Err(RegistryCallError::Remote(format!(
                "status update returned {}",
                s
            ))),
        }
    }

    pub async fn get_database_info(
        &self,
        tenant_id: Uuid,
        service_name: &str,
    ) -> Result<DatabaseMetadata, RegistryCallError> {
        let url = format!(
            "{}/tenants/{}/services/{}/database-info",
            self.base_url, tenant_id, service_name
        );

        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryCallError::NotFound(format!(
                "tenant {} / service {}",
                tenant_id, service_name
            )));
        }
        if !response.status().is_success() {
            return Err(RegistryCallError::Remote(format!(
                "database-info returned {}",
                response.status()
            )));
        }

        let envelope: Envelope<DatabaseMetadata> = response.json().await?;
        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(RegistryCallError::Remote(
                envelope
                    .message
                    .unwrap_or_else(|| "malformed database-info response".to_string()),
            )),
        }
    }
}

/// Registry access for the orchestrator. The central registry deployable
/// calls its own aggregate in process; every other service goes over HTTP.
pub enum RegistryHandle {
    Local(Arc<TenantRegistry>),
    Remote(RegistryClient),
}

impl RegistryHandle {
    pub async fn update_migration_status(
        &self,
        tenant_id: Uuid,
        service_name: &str,
        report: StatusReport,
    ) -> Result<(), RegistryCallError> {
        match self {
            RegistryHandle::Local(registry) => registry
                .update_migration_status(tenant_id, service_name, report)
                .await
                .map_err(map_local_err),
            RegistryHandle::Remote(client) => {
                client
                    .update_migration_status(tenant_id, service_name, &report)
                    .await
            }
        }
    }

    pub async fn get_database_info(
        &self,
        tenant_id: Uuid,
        service_name: &str,
    ) -> Result<DatabaseMetadata, RegistryCallError> {
        match self {
            RegistryHandle::Local(registry) => registry
                .get_database_info(tenant_id, service_name)
                .await
                .map_err(map_local_err),
            RegistryHandle::Remote(client) => client.get_database_info(tenant_id, service_name).await,
        }
    }
}

fn map_local_err(err: RegistryError) -> RegistryCallError {
    match err {
        RegistryError::TenantNotFound(id) => RegistryCallError::NotFound(format!("tenant {}", id)),
        RegistryError::ServiceNotFound { tenant, service } => {
            RegistryCallError::NotFound(format!("tenant {} / service {}", tenant, service))
        }
        other => RegistryCallError::Remote(other.to_string()),
    }
}
