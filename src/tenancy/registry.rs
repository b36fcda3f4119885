use sqlx::{postgres::PgRow, PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use super::model::{
    is_service_ready, rollup_status, DatabaseMetadata, DatabaseProvider, DatabaseStrategy,
    MigrationStatus, MigrationStatusRecord, TenantRecord,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Service '{service}' not found for tenant {tenant}")]
    ServiceNotFound { tenant: Uuid, service: String },

    #[error("Tenant slug already in use: {0}")]
    SlugTaken(String),

    #[error("{0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Input for tenant creation. Strategy and provider are immutable afterwards.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub slug: String,
    pub display_name: String,
    pub plan: String,
    pub strategy: DatabaseStrategy,
    pub provider: DatabaseProvider,
    /// Services that must migrate before the tenant is ready; each gets a
    /// Pending status row at creation time
    pub required_services: Vec<String>,
}

/// Outcome of reporting a migration run for one service
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: MigrationStatus,
    pub last_version: Option<String>,
    pub error_message: Option<String>,
}

/// Tenant Lifecycle Aggregate: owns canonical tenant rows, per-service
/// database metadata and migration status, and answers readiness queries.
pub struct TenantRegistry {
    pool: PgPool,
}

/// Reject rollup-only status values before they reach storage. The
/// per-service update operation never accepts `PartiallyProvisioned`.
pub fn validate_reported_status(status: MigrationStatus) -> Result<(), RegistryError> {
    if status == MigrationStatus::PartiallyProvisioned {
        return Err(RegistryError::InvalidStatus(
            "PartiallyProvisioned is a tenant-level rollup and cannot be reported for a service"
                .to_string(),
        ));
    }
    Ok(())
}

impl TenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_tenant(&self, new_tenant: NewTenant) -> Result<TenantRecord, RegistryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO tenants (id, slug, display_name, plan, strategy, provider, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            ON CONFLICT (slug) DO NOTHING
            RETURNING id, slug, display_name, plan, strategy, provider, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_tenant.slug)
        .bind(&new_tenant.display_name)
        .bind(&new_tenant.plan)
        .bind(new_tenant.strategy.to_string())
        .bind(new_tenant.provider.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let row = row.ok_or_else(|| RegistryError::SlugTaken(new_tenant.slug.clone()))?;
        let tenant = tenant_from_row(&row)?;

        // Seed Pending status rows so readiness is answerable immediately
        for service in &new_tenant.required_services {
            sqlx::query(
                r#"
                INSERT INTO tenant_migration_status (tenant_id, service_name, status)
                VALUES ($1, $2, 'Pending')
                ON CONFLICT (tenant_id, service_name) DO NOTHING
                "#,
            )
            .bind(tenant.id)
            .bind(service)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!("Created tenant {} ({})", tenant.slug, tenant.id);
        Ok(tenant)
    }

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<TenantRecord, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, display_name, plan, strategy, provider, is_active,
                   created_at, updated_at
            FROM tenants WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RegistryError::TenantNotFound(tenant_id))?;

        tenant_from_row(&row)
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, display_name, plan, strategy, provider, is_active,
                   created_at, updated_at
            FROM tenants WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(tenant_from_row).transpose()
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantRecord>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, display_name, plan, strategy, provider, is_active,
                   created_at, updated_at
            FROM tenants ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tenant_from_row).collect()
    }

    /// Register or replace where one service's databases live for a tenant
    pub async fn upsert_database_metadata(
        &self,
        tenant_id: Uuid,
        metadata: &DatabaseMetadata,
    ) -> Result<(), RegistryError> {
        self.get_tenant(tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO tenant_databases
                (tenant_id, service_name, write_connection, read_connection,
                 has_separate_read_database)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, service_name) DO UPDATE SET
                write_connection = EXCLUDED.write_connection,
                read_connection = EXCLUDED.read_connection,
                has_separate_read_database = EXCLUDED.has_separate_read_database
            "#,
        )
        .bind(tenant_id)
        .bind(&metadata.service_name)
        .bind(&metadata.write_connection)
        .bind(&metadata.read_connection)
        .bind(metadata.has_separate_read_database)
        .execute(&self.pool)
        .await?;

        // First sighting of a service also creates its Pending status row
        sqlx::query(
            r#"
            INSERT INTO tenant_migration_status (tenant_id, service_name, status)
            VALUES ($1, $2, 'Pending')
            ON CONFLICT (tenant_id, service_name) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(&metadata.service_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_database_info(
        &self,
        tenant_id: Uuid,
        service_name: &str,
    ) -> Result<DatabaseMetadata, RegistryError> {
        self.get_tenant(tenant_id).await?;

        let row = sqlx::query(
            r#"
            SELECT service_name, write_connection, read_connection,
                   has_separate_read_database
            FROM tenant_databases
            WHERE tenant_id = $1 AND service_name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RegistryError::ServiceNotFound {
            tenant: tenant_id,
            service: service_name.to_string(),
        })?;

        Ok(DatabaseMetadata {
            service_name: row.try_get("service_name")?,
            write_connection: row.try_get("write_connection")?,
            read_connection: row.try_get("read_connection")?,
            has_separate_read_database: row.try_get("has_separate_read_database")?,
        })
    }

    /// Idempotent upsert of one service's migration status.
    ///
    /// Unknown tenant is a not-found error. An unknown service auto-creates
    /// its status row (a newly deployed service may report before anything
    /// else registered it); `PartiallyProvisioned` is rejected outright.
    pub async fn update_migration_status(
        &self,
        tenant_id: Uuid,
        service_name: &str,
        report: StatusReport,
    ) -> Result<(), RegistryError> {
        validate_reported_status(report.status)?;
        self.get_tenant(tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO tenant_migration_status
                (tenant_id, service_name, status, last_version, error_message,
                 started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5,
                    CASE WHEN $3 = 'InProgress' THEN now() END,
                    CASE WHEN $3 IN ('Completed', 'Failed') THEN now() END)
            ON CONFLICT (tenant_id, service_name) DO UPDATE SET
                status = EXCLUDED.status,
                last_version = COALESCE(EXCLUDED.last_version,
                                        tenant_migration_status.last_version),
                error_message = EXCLUDED.error_message,
                started_at = CASE WHEN EXCLUDED.status = 'InProgress' THEN now()
                                  ELSE tenant_migration_status.started_at END,
                completed_at = CASE WHEN EXCLUDED.status IN ('Completed', 'Failed') THEN now()
                                    ELSE tenant_migration_status.completed_at END
            "#,
        )
        .bind(tenant_id)
        .bind(service_name)
        .bind(report.status.to_string())
        .bind(&report.last_version)
        .bind(&report.error_message)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Migration status for tenant {} service {}: {}",
            tenant_id,
            service_name,
            report.status
        );
        Ok(())
    }

    pub async fn migration_statuses(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<MigrationStatusRecord>, RegistryError> {
        self.get_tenant(tenant_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT service_name, status, last_version, error_message,
                   started_at, completed_at
            FROM tenant_migration_status
            WHERE tenant_id = $1
            ORDER BY service_name
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(status_from_row).collect()
    }

    /// A service is ready for a tenant iff its migration status is Completed
    pub async fn check_service_readiness(
        &self,
        tenant_id: Uuid,
        service_name: &str,
    ) -> Result<bool, RegistryError> {
        self.get_tenant(tenant_id).await?;

        let row = sqlx::query(
            r#"
            SELECT status FROM tenant_migration_status
            WHERE tenant_id = $1 AND service_name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;

        let status = match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Some(status.parse().map_err(RegistryError::InvalidStatus)?)
            }
            None => None,
        };
        Ok(is_service_ready(status))
    }

    /// Tenant-level rollup plus the per-service records it was computed from
    pub async fn tenant_status(
        &self,
        tenant_id: Uuid,
    ) -> Result<(MigrationStatus, Vec<MigrationStatusRecord>), RegistryError> {
        let records = self.migration_statuses(tenant_id).await?;
        Ok((rollup_status(&records), records))
    }
}

fn tenant_from_row(row: &PgRow) -> Result<TenantRecord, RegistryError> {
    let strategy: String = row.try_get("strategy")?;
    let provider: String = row.try_get("provider")?;
    Ok(TenantRecord {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        display_name: row.try_get("display_name")?,
        plan: row.try_get("plan")?,
        strategy: strategy.parse().map_err(RegistryError::InvalidStatus)?,
        provider: provider.parse().map_err(RegistryError::InvalidStatus)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn status_from_row(row: &PgRow) -> Result<MigrationStatusRecord, RegistryError> {
    let status: String = row.try_get("status")?;
    Ok(MigrationStatusRecord {
        service_name: row.try_get("service_name")?,
        status: status.parse().map_err(RegistryError::InvalidStatus)?,
        last_version: row.try_get("last_version")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
    })
}
