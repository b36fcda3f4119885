use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use sqlx::PgPool;
use uuid::Uuid;

use crate::database::DatabaseManager;
use crate::services::{RegistryCallError, RegistryHandle};
use crate::tenancy::{DatabaseProvider, DatabaseStrategy, MigrationStatus, StatusReport};

use super::events::{EventDisposition, ProvisioningEvent};
use super::executor::PostgresScriptExecutor;
use super::runner::{MigrationResult, MigrationRunner, MigrationRunnerConfig};

/// What a provisioning event asks this service to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningAction {
    /// Shared databases migrate at startup; nothing to do here
    SkipShared,
    /// The database does not exist yet; a later signal will follow
    SkipNotCreated,
    /// Migrate this tenant's database now
    Migrate,
}

pub fn provisioning_action(event: &ProvisioningEvent) -> ProvisioningAction {
    if event.strategy == DatabaseStrategy::Shared {
        ProvisioningAction::SkipShared
    } else if !event.database_created {
        ProvisioningAction::SkipNotCreated
    } else {
        ProvisioningAction::Migrate
    }
}

/// Outcome of one tenant-scoped migration run
enum TenantRun {
    Completed(MigrationResult),
    Failed {
        result: MigrationResult,
        /// Terminal failures (unknown tenant/service) are not worth retrying
        terminal: bool,
    },
    /// Another instance holds the migration lock for this tenant+service
    LockBusy,
}

fn disposition_for(run: &TenantRun) -> EventDisposition {
    match run {
        TenantRun::Completed(_) => EventDisposition::Ack,
        TenantRun::Failed { terminal: true, .. } => EventDisposition::Ack,
        TenantRun::Failed { terminal: false, .. } => EventDisposition::Retry,
        TenantRun::LockBusy => EventDisposition::Retry,
    }
}

/// Advisory lock key for one (tenant, service) migration target
fn advisory_lock_key(tenant_id: Uuid, service_name: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    tenant_id.hash(&mut hasher);
    service_name.hash(&mut hasher);
    hasher.finish() as i64
}

/// Decides when the Migration Runner executes and propagates the outcome.
///
/// Two triggers: the startup gate for the shared database, and provisioning
/// events for dedicated/external tenant databases. Both can also be invoked
/// on demand through the admin endpoint.
pub struct MigrationOrchestrator {
    service_name: String,
    runner: MigrationRunner,
    registry: RegistryHandle,
    shared_write_url: String,
}

impl MigrationOrchestrator {
    pub fn new(
        service_name: impl Into<String>,
        runner_config: MigrationRunnerConfig,
        registry: RegistryHandle,
        shared_write_url: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            runner: MigrationRunner::new(runner_config),
            registry,
            shared_write_url: shared_write_url.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Migrate the process-wide shared database. Runs at startup before the
    /// service accepts traffic; the caller exits non-zero on failure so a
    /// half-upgraded fleet never serves requests.
    pub async fn migrate_shared(&self) -> MigrationResult {
        tracing::info!("Migrating shared database for {}", self.service_name);

        let pool = match self.connect(&self.shared_write_url).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };
        let executor = self.executor(pool);
        self.runner.run(&executor).await
    }

    /// Handle a "tenant database provisioned" event. The returned disposition
    /// tells the message layer whether to acknowledge or redeliver; failures
    /// are reported as status AND retried, so transient infrastructure
    /// problems self-heal without manual replay.
    pub async fn handle_provisioning_event(&self, event: &ProvisioningEvent) -> EventDisposition {
        match provisioning_action(event) {
            ProvisioningAction::SkipShared => {
                tracing::debug!(
                    "Provisioning event for shared tenant {} needs no per-tenant migration",
                    event.tenant_id
                );
                EventDisposition::Ack
            }
            ProvisioningAction::SkipNotCreated => {
                tracing::info!(
                    "Database for tenant {} not created yet; awaiting a later provisioning signal",
                    event.tenant_id
                );
                EventDisposition::Ack
            }
            ProvisioningAction::Migrate => {
                let run = self.run_tenant_migration(event.tenant_id).await;
                if let TenantRun::LockBusy = run {
                    tracing::info!(
                        "Migration for tenant {} already running elsewhere; requesting redelivery",
                        event.tenant_id
                    );
                }
                disposition_for(&run)
            }
        }
    }

    /// Admin-triggered migration of one tenant's database. Always produces a
    /// structured result.
    pub async fn migrate_tenant(&self, tenant_id: Uuid) -> MigrationResult {
        match self.run_tenant_migration(tenant_id).await {
            TenantRun::Completed(result) | TenantRun::Failed { result, .. } => result,
            TenantRun::LockBusy => self.immediate_failure(format!(
                "A migration for tenant {} is already in progress",
                tenant_id
            )),
        }
    }

    async fn run_tenant_migration(&self, tenant_id: Uuid) -> TenantRun {
        self.report(tenant_id, MigrationStatus::InProgress, None, None)
            .await;

        let info = match self
            .registry
            .get_database_info(tenant_id, &self.service_name)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                let terminal = matches!(e, RegistryCallError::NotFound(_));
                let result = self.immediate_failure(format!("Database info unavailable: {}", e));
                return self.report_failed(tenant_id, result, terminal).await;
            }
        };

        let pool = match self.connect(&info.write_connection).await {
            Ok(pool) => pool,
            Err(result) => return self.report_failed(tenant_id, result, false).await,
        };

        let lock_key = advisory_lock_key(tenant_id, &self.service_name);
        let mut lock_conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                let result = self.immediate_failure(format!("Connection failed: {}", e));
                return self.report_failed(tenant_id, result, false).await;
            }
        };

        let locked: bool = match sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_key)
            .fetch_one(&mut *lock_conn)
            .await
        {
            Ok(locked) => locked,
            Err(e) => {
                let result = self.immediate_failure(format!("Lock acquisition failed: {}", e));
                return self.report_failed(tenant_id, result, false).await;
            }
        };
        if !locked {
            // Another instance is migrating and owns the status record; no
            // corrective report here, redelivery picks up its outcome
            return TenantRun::LockBusy;
        }

        let executor = self.executor(pool);
        let result = self.runner.run(&executor).await;

        // Session locks outlive pool checkout; release explicitly
        let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(lock_key)
            .execute(&mut *lock_conn)
            .await;
        drop(lock_conn);

        if result.success {
            self.report(
                tenant_id,
                MigrationStatus::Completed,
                result.last_version(),
                None,
            )
            .await;
            TenantRun::Completed(result)
        } else {
            self.report(
                tenant_id,
                MigrationStatus::Failed,
                result.last_version(),
                result.error.clone(),
            )
            .await;
            TenantRun::Failed {
                result,
                terminal: false,
            }
        }
    }

    /// Every failure after the InProgress report goes through here, so the
    /// registry never shows a run as InProgress past its end.
    async fn report_failed(
        &self,
        tenant_id: Uuid,
        result: MigrationResult,
        terminal: bool,
    ) -> TenantRun {
        self.report(
            tenant_id,
            MigrationStatus::Failed,
            None,
            result.error.clone(),
        )
        .await;
        TenantRun::Failed { result, terminal }
    }

    /// Report status upstream. The local outcome stays authoritative even if
    /// the remote report is lost, so reporting failures are only logged.
    async fn report(
        &self,
        tenant_id: Uuid,
        status: MigrationStatus,
        last_version: Option<String>,
        error_message: Option<String>,
    ) {
        let report = StatusReport {
            status,
            last_version,
            error_message,
        };
        if let Err(e) = self
            .registry
            .update_migration_status(tenant_id, &self.service_name, report)
            .await
        {
            tracing::warn!(
                "Failed to report migration status for tenant {}: {}",
                tenant_id,
                e
            );
        }
    }

    async fn connect(&self, url: &str) -> Result<PgPool, MigrationResult> {
        if self.runner.config().provider != DatabaseProvider::PostgreSql {
            return Err(self.immediate_failure(format!(
                "Unsupported database provider for migration execution: {}",
                self.runner.config().provider
            )));
        }
        DatabaseManager::pool_for(url)
            .await
            .map_err(|e| self.immediate_failure(format!("Connection failed: {}", e)))
    }

    fn executor(&self, pool: PgPool) -> PostgresScriptExecutor {
        PostgresScriptExecutor::new(
            pool,
            self.runner.config().journal_schema.clone(),
            self.runner.config().journal_table.clone(),
        )
    }

    fn immediate_failure(&self, message: String) -> MigrationResult {
        let started = Instant::now();
        MigrationResult {
            success: false,
            scripts_applied: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            applied_scripts: Vec::new(),
            provider: self.runner.config().provider,
            error: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(strategy: DatabaseStrategy, created: bool) -> ProvisioningEvent {
        ProvisioningEvent {
            tenant_id: Uuid::new_v4(),
            strategy,
            provider: DatabaseProvider::PostgreSql,
            database_created: created,
            metadata: None,
        }
    }

    #[test]
    fn shared_strategy_is_skipped() {
        let e = event(DatabaseStrategy::Shared, true);
        assert_eq!(provisioning_action(&e), ProvisioningAction::SkipShared);
    }

    #[test]
    fn uncreated_database_is_skipped_without_error() {
        // A later retry of the provisioning signal is expected; this is a
        // deliberate no-op, not a failure
        let e = event(DatabaseStrategy::Dedicated, false);
        assert_eq!(provisioning_action(&e), ProvisioningAction::SkipNotCreated);

        let e = event(DatabaseStrategy::External, false);
        assert_eq!(provisioning_action(&e), ProvisioningAction::SkipNotCreated);
    }

    #[test]
    fn created_dedicated_and_external_databases_migrate() {
        let e = event(DatabaseStrategy::Dedicated, true);
        assert_eq!(provisioning_action(&e), ProvisioningAction::Migrate);

        let e = event(DatabaseStrategy::External, true);
        assert_eq!(provisioning_action(&e), ProvisioningAction::Migrate);
    }

    #[test]
    fn only_transient_failures_request_redelivery() {
        let result = MigrationResult {
            success: false,
            scripts_applied: 0,
            duration_ms: 0,
            applied_scripts: Vec::new(),
            provider: DatabaseProvider::PostgreSql,
            error: Some("boom".to_string()),
        };

        let run = TenantRun::Failed {
            result: result.clone(),
            terminal: false,
        };
        assert_eq!(disposition_for(&run), EventDisposition::Retry);

        let run = TenantRun::Failed {
            result: result.clone(),
            terminal: true,
        };
        assert_eq!(disposition_for(&run), EventDisposition::Ack);

        assert_eq!(disposition_for(&TenantRun::LockBusy), EventDisposition::Retry);

        let mut ok = result;
        ok.success = true;
        ok.error = None;
        assert_eq!(
            disposition_for(&TenantRun::Completed(ok)),
            EventDisposition::Ack
        );
    }

    #[tokio::test]
    async fn failure_after_in_progress_reports_failed() -> anyhow::Result<()> {
        use axum::extract::State;
        use axum::routing::{get, put};
        use axum::{Json, Router};
        use std::sync::{Arc, Mutex};

        use crate::services::RegistryClient;

        type Reports = Arc<Mutex<Vec<String>>>;

        async fn record_status(
            State(reports): State<Reports>,
            Json(body): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            let status = body["status"].as_str().unwrap_or_default().to_string();
            reports.lock().unwrap().push(status);
            Json(serde_json::json!({ "success": true }))
        }

        async fn missing_database_info() -> (axum::http::StatusCode, Json<serde_json::Value>) {
            (
                axum::http::StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "success": false, "message": "no such service" })),
            )
        }

        let reports: Reports = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/tenants/:tenant_id/services/:service/migration-status",
                put(record_status),
            )
            .route(
                "/tenants/:tenant_id/services/:service/database-info",
                get(missing_database_info),
            )
            .with_state(reports.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let orchestrator = MigrationOrchestrator::new(
            "catalog-api",
            MigrationRunnerConfig {
                scripts_path: std::path::PathBuf::from("migrations"),
                provider: DatabaseProvider::PostgreSql,
                journal_schema: None,
                journal_table: "SchemaVersions".to_string(),
                transactional: true,
                command_timeout: std::time::Duration::from_secs(300),
                log_script_output: false,
            },
            RegistryHandle::Remote(RegistryClient::new(format!("http://{}", addr))),
            "postgres://localhost/unused",
        );

        let run = orchestrator.run_tenant_migration(Uuid::new_v4()).await;
        assert!(matches!(run, TenantRun::Failed { terminal: true, .. }));

        // The InProgress report is never left standing after a failed run
        let recorded = reports.lock().unwrap().clone();
        assert_eq!(recorded, vec!["InProgress", "Failed"]);
        Ok(())
    }

    #[test]
    fn lock_keys_are_stable_and_distinct_per_service() {
        let tenant = Uuid::new_v4();
        let a = advisory_lock_key(tenant, "catalog-api");
        let b = advisory_lock_key(tenant, "catalog-api");
        let c = advisory_lock_key(tenant, "orders-api");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
