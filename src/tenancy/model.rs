use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Where a tenant's data physically lives. Immutable after tenant creation;
/// changing it requires a new tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseStrategy {
    /// Co-located with other tenants in the process-wide shared database
    Shared,
    /// One database per tenant, owned by the platform
    Dedicated,
    /// Customer-supplied database, owned by the customer
    External,
}

impl fmt::Display for DatabaseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatabaseStrategy::Shared => "Shared",
            DatabaseStrategy::Dedicated => "Dedicated",
            DatabaseStrategy::External => "External",
        };
        f.write_str(s)
    }
}

impl FromStr for DatabaseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shared" => Ok(DatabaseStrategy::Shared),
            "Dedicated" => Ok(DatabaseStrategy::Dedicated),
            "External" => Ok(DatabaseStrategy::External),
            other => Err(format!("Unknown database strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseProvider {
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    SqlServer,
    #[serde(rename = "MySQL")]
    MySql,
}

impl fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatabaseProvider::PostgreSql => "PostgreSQL",
            DatabaseProvider::SqlServer => "SqlServer",
            DatabaseProvider::MySql => "MySQL",
        };
        f.write_str(s)
    }
}

impl FromStr for DatabaseProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PostgreSQL" => Ok(DatabaseProvider::PostgreSql),
            "SqlServer" => Ok(DatabaseProvider::SqlServer),
            "MySQL" => Ok(DatabaseProvider::MySql),
            other => Err(format!("Unknown database provider: {}", other)),
        }
    }
}

/// Per-service migration state. `PartiallyProvisioned` is a tenant-level
/// rollup only; it is never stored against a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    PartiallyProvisioned,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Pending => "Pending",
            MigrationStatus::InProgress => "InProgress",
            MigrationStatus::Completed => "Completed",
            MigrationStatus::Failed => "Failed",
            MigrationStatus::PartiallyProvisioned => "PartiallyProvisioned",
        };
        f.write_str(s)
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(MigrationStatus::Pending),
            "InProgress" => Ok(MigrationStatus::InProgress),
            "Completed" => Ok(MigrationStatus::Completed),
            "Failed" => Ok(MigrationStatus::Failed),
            "PartiallyProvisioned" => Ok(MigrationStatus::PartiallyProvisioned),
            other => Err(format!("Unknown migration status: {}", other)),
        }
    }
}

/// Canonical tenant row owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub plan: String,
    pub strategy: DatabaseStrategy,
    pub provider: DatabaseProvider,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per (tenant, service) database location. The write/read connection fields
/// are credential locators resolved externally (vault reference or URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub service_name: String,
    pub write_connection: String,
    pub read_connection: Option<String>,
    pub has_separate_read_database: bool,
}

/// Per (tenant, service) migration progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatusRecord {
    pub service_name: String,
    pub status: MigrationStatus,
    pub last_version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A service is ready for a tenant only once its migration status is
/// Completed. No record at all means not ready; transitional and failed
/// states gate traffic the same way.
pub fn is_service_ready(status: Option<MigrationStatus>) -> bool {
    matches!(status, Some(MigrationStatus::Completed))
}

/// Tenant-level rollup over all per-service status records, computed at read
/// time. Never stored, so it cannot diverge from the per-service truth.
pub fn rollup_status(records: &[MigrationStatusRecord]) -> MigrationStatus {
    if records.is_empty() {
        return MigrationStatus::Pending;
    }

    let completed = records
        .iter()
        .filter(|r| r.status == MigrationStatus::Completed)
        .count();
    let failed = records
        .iter()
        .any(|r| r.status == MigrationStatus::Failed);
    let in_progress = records
        .iter()
        .any(|r| r.status == MigrationStatus::InProgress);

    if completed == records.len() {
        MigrationStatus::Completed
    } else if completed > 0 {
        // Some services succeeded while others failed or are still pending
        MigrationStatus::PartiallyProvisioned
    } else if failed {
        MigrationStatus::Failed
    } else if in_progress {
        MigrationStatus::InProgress
    } else {
        MigrationStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service: &str, status: MigrationStatus) -> MigrationStatusRecord {
        MigrationStatusRecord {
            service_name: service.to_string(),
            status,
            last_version: None,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn rollup_of_nothing_is_pending() {
        assert_eq!(rollup_status(&[]), MigrationStatus::Pending);
    }

    #[test]
    fn rollup_all_completed() {
        let records = vec![
            record("catalog-api", MigrationStatus::Completed),
            record("orders-api", MigrationStatus::Completed),
        ];
        assert_eq!(rollup_status(&records), MigrationStatus::Completed);
    }

    #[test]
    fn rollup_mixed_is_partially_provisioned() {
        let records = vec![
            record("catalog-api", MigrationStatus::Completed),
            record("orders-api", MigrationStatus::Failed),
        ];
        assert_eq!(rollup_status(&records), MigrationStatus::PartiallyProvisioned);

        let records = vec![
            record("catalog-api", MigrationStatus::Completed),
            record("orders-api", MigrationStatus::Pending),
        ];
        assert_eq!(rollup_status(&records), MigrationStatus::PartiallyProvisioned);
    }

    #[test]
    fn rollup_all_failed_or_pending() {
        let records = vec![
            record("catalog-api", MigrationStatus::Failed),
            record("orders-api", MigrationStatus::Pending),
        ];
        assert_eq!(rollup_status(&records), MigrationStatus::Failed);

        let records = vec![
            record("catalog-api", MigrationStatus::Pending),
            record("orders-api", MigrationStatus::InProgress),
        ];
        assert_eq!(rollup_status(&records), MigrationStatus::InProgress);
    }

    #[test]
    fn only_completed_status_is_ready() {
        assert!(is_service_ready(Some(MigrationStatus::Completed)));

        assert!(!is_service_ready(None));
        assert!(!is_service_ready(Some(MigrationStatus::Pending)));
        assert!(!is_service_ready(Some(MigrationStatus::InProgress)));
        assert!(!is_service_ready(Some(MigrationStatus::Failed)));
        assert!(!is_service_ready(Some(MigrationStatus::PartiallyProvisioned)));
    }

    #[test]
    fn status_names_round_trip() {
        for status in [
            MigrationStatus::Pending,
            MigrationStatus::InProgress,
            MigrationStatus::Completed,
            MigrationStatus::Failed,
            MigrationStatus::PartiallyProvisioned,
        ] {
            assert_eq!(status.to_string().parse::<MigrationStatus>(), Ok(status));
        }
        assert!("Done".parse::<MigrationStatus>().is_err());
    }

    #[test]
    fn strategy_and_provider_names_round_trip() {
        assert_eq!("Shared".parse(), Ok(DatabaseStrategy::Shared));
        assert_eq!("External".parse(), Ok(DatabaseStrategy::External));
        assert_eq!("PostgreSQL".parse(), Ok(DatabaseProvider::PostgreSql));
        assert_eq!(DatabaseProvider::MySql.to_string(), "MySQL");
        assert!("Oracle".parse::<DatabaseProvider>().is_err());
    }
}
