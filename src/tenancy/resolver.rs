use uuid::Uuid;

use super::model::DatabaseStrategy;

/// Unauthoritative same-request signal about tenant/strategy, asserted by an
/// upstream trusted hop. Never persisted; used only to short-circuit the
/// shared-database common case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingHint {
    pub tenant_id: Uuid,
    pub strategy: DatabaseStrategy,
}

impl RoutingHint {
    /// Build a hint from a verified principal's `tenant_id` and
    /// `db_strategy` claims. Only the signed token is an acceptable source;
    /// raw headers carrying the same information are stripped at every
    /// boundary.
    pub fn from_principal(principal: &crate::auth::Principal) -> Option<Self> {
        let tenant_id = principal.claim_str("tenant_id")?.parse().ok()?;
        let strategy = principal.claim_str("db_strategy")?.parse().ok()?;
        Some(Self {
            tenant_id,
            strategy,
        })
    }
}

/// Process-wide shared database connection strings, fixed at startup
#[derive(Debug, Clone)]
pub struct SharedConnections {
    pub write_url: String,
    pub read_url: String,
}

impl SharedConnections {
    pub fn from_config(config: &crate::config::SharedDatabaseConfig) -> Self {
        Self {
            write_url: config.write_url.clone(),
            read_url: config
                .read_url
                .clone()
                .unwrap_or_else(|| config.write_url.clone()),
        }
    }
}

/// Canonical connection view of one tenant for one service, assembled by the
/// caller from registry data. An incomplete view is a caller bug, not a
/// resolver concern.
#[derive(Debug, Clone)]
pub struct CanonicalConnections {
    pub tenant_id: Uuid,
    pub strategy: DatabaseStrategy,
    pub write_connection: String,
    pub read_connection: Option<String>,
    pub has_separate_read_database: bool,
}

/// Connection strings chosen for the current request. Recomputed every
/// request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResolution {
    pub strategy: DatabaseStrategy,
    pub write_connection: String,
    pub read_connection: String,
}

/// Decide which connection strings this request uses.
///
/// The hint short-circuits to the shared strings only when it names the same
/// tenant as the canonical record AND asserts the Shared strategy. Any other
/// hint is ignored outright: a non-shared assertion must be corroborated by
/// canonical data, and a hint for a different tenant is worthless. Connection
/// data is never fetched or trusted keyed by the hint alone.
///
/// Data-layer callers feed the resolved connection strings to
/// `DatabaseManager::pool_for` to obtain live pools.
pub fn resolve_connection(
    canonical: &CanonicalConnections,
    hint: Option<&RoutingHint>,
    shared: &SharedConnections,
) -> ConnectionResolution {
    if let Some(hint) = hint {
        if hint.tenant_id == canonical.tenant_id && hint.strategy == DatabaseStrategy::Shared {
            return ConnectionResolution {
                strategy: DatabaseStrategy::Shared,
                write_connection: shared.write_url.clone(),
                read_connection: shared.read_url.clone(),
            };
        }
    }

    match canonical.strategy {
        DatabaseStrategy::Shared => ConnectionResolution {
            strategy: DatabaseStrategy::Shared,
            write_connection: shared.write_url.clone(),
            read_connection: shared.read_url.clone(),
        },
        strategy @ (DatabaseStrategy::Dedicated | DatabaseStrategy::External) => {
            let read = if canonical.has_separate_read_database {
                canonical
                    .read_connection
                    .clone()
                    .unwrap_or_else(|| canonical.write_connection.clone())
            } else {
                canonical.write_connection.clone()
            };
            ConnectionResolution {
                strategy,
                write_connection: canonical.write_connection.clone(),
                read_connection: read,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedConnections {
        SharedConnections {
            write_url: "Host=shared-write;".to_string(),
            read_url: "Host=shared-read;".to_string(),
        }
    }

    fn dedicated(tenant_id: Uuid) -> CanonicalConnections {
        CanonicalConnections {
            tenant_id,
            strategy: DatabaseStrategy::Dedicated,
            write_connection: "Host=tenant-dedicated;".to_string(),
            read_connection: None,
            has_separate_read_database: false,
        }
    }

    #[test]
    fn hint_for_another_tenant_is_ignored() {
        let tenant_id = Uuid::new_v4();
        let canonical = dedicated(tenant_id);
        let hint = RoutingHint {
            tenant_id: Uuid::new_v4(),
            strategy: DatabaseStrategy::Shared,
        };

        let resolution = resolve_connection(&canonical, Some(&hint), &shared());

        assert_eq!(resolution.strategy, DatabaseStrategy::Dedicated);
        assert_eq!(resolution.write_connection, "Host=tenant-dedicated;");
    }

    #[test]
    fn matching_shared_hint_forces_the_fast_path() {
        // Even when registry data still says Dedicated, a hint from a trusted
        // hop declaring this tenant Shared wins; registry data may simply not
        // have caught up yet
        let tenant_id = Uuid::new_v4();
        let canonical = dedicated(tenant_id);
        let hint = RoutingHint {
            tenant_id,
            strategy: DatabaseStrategy::Shared,
        };

        let resolution = resolve_connection(&canonical, Some(&hint), &shared());

        assert_eq!(resolution.strategy, DatabaseStrategy::Shared);
        assert_eq!(resolution.write_connection, "Host=shared-write;");
        assert_eq!(resolution.read_connection, "Host=shared-read;");
    }

    #[test]
    fn non_shared_hint_never_short_circuits() {
        let tenant_id = Uuid::new_v4();
        let mut canonical = dedicated(tenant_id);
        canonical.strategy = DatabaseStrategy::Shared;
        let hint = RoutingHint {
            tenant_id,
            strategy: DatabaseStrategy::Dedicated,
        };

        // The hint asserts Dedicated but the canonical record is the
        // authority for anything non-shared
        let resolution = resolve_connection(&canonical, Some(&hint), &shared());
        assert_eq!(resolution.strategy, DatabaseStrategy::Shared);
        assert_eq!(resolution.write_connection, "Host=shared-write;");
    }

    #[test]
    fn shared_tenant_without_hint() {
        let canonical = CanonicalConnections {
            tenant_id: Uuid::new_v4(),
            strategy: DatabaseStrategy::Shared,
            write_connection: String::new(),
            read_connection: None,
            has_separate_read_database: false,
        };

        let resolution = resolve_connection(&canonical, None, &shared());
        assert_eq!(resolution.strategy, DatabaseStrategy::Shared);
        assert_eq!(resolution.write_connection, "Host=shared-write;");
    }

    #[test]
    fn dedicated_reads_follow_writes_without_replica() {
        let canonical = dedicated(Uuid::new_v4());
        let resolution = resolve_connection(&canonical, None, &shared());
        assert_eq!(resolution.read_connection, resolution.write_connection);
    }

    #[test]
    fn hint_comes_only_from_verified_claims() {
        use crate::auth::Principal;
        use serde_json::json;

        let tenant_id = Uuid::new_v4();
        let principal = Principal::new(vec![
            ("sub".to_string(), json!("u1")),
            ("tenant_id".to_string(), json!(tenant_id.to_string())),
            ("db_strategy".to_string(), json!("Shared")),
        ]);

        let hint = RoutingHint::from_principal(&principal).expect("hint parsed");
        assert_eq!(hint.tenant_id, tenant_id);
        assert_eq!(hint.strategy, DatabaseStrategy::Shared);

        // Missing or malformed claims yield no hint, never a guess
        let principal = Principal::new(vec![
            ("sub".to_string(), json!("u1")),
            ("tenant_id".to_string(), json!("not-a-uuid")),
            ("db_strategy".to_string(), json!("Shared")),
        ]);
        assert!(RoutingHint::from_principal(&principal).is_none());

        let principal = Principal::new(vec![("sub".to_string(), json!("u1"))]);
        assert!(RoutingHint::from_principal(&principal).is_none());
    }

    #[test]
    fn external_with_read_replica_uses_it() {
        let canonical = CanonicalConnections {
            tenant_id: Uuid::new_v4(),
            strategy: DatabaseStrategy::External,
            write_connection: "Host=customer-write;".to_string(),
            read_connection: Some("Host=customer-read;".to_string()),
            has_separate_read_database: true,
        };

        let resolution = resolve_connection(&canonical, None, &shared());
        assert_eq!(resolution.strategy, DatabaseStrategy::External);
        assert_eq!(resolution.write_connection, "Host=customer-write;");
        assert_eq!(resolution.read_connection, "Host=customer-read;");
    }
}
