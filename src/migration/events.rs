use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenancy::{DatabaseProvider, DatabaseStrategy};

/// Message-queue payload announcing that a tenant's physical database has
/// been (or failed to be) provisioned. Delivered at least once; handling must
/// be idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub tenant_id: Uuid,
    pub strategy: DatabaseStrategy,
    pub provider: DatabaseProvider,
    pub database_created: bool,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// What the message layer should do with the triggering event. Non-success
/// must prevent acknowledgment, so retry policy is visible at the call site
/// instead of hiding behind a thrown error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Processing finished (including deliberate skips); acknowledge
    Ack,
    /// Processing failed or was blocked; redeliver later
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_payload_deserializes_with_and_without_metadata() {
        let event: ProvisioningEvent = serde_json::from_value(json!({
            "tenant_id": "7b6c3a52-9f2e-4d14-9f63-2f8df0ab1234",
            "strategy": "Dedicated",
            "provider": "PostgreSQL",
            "database_created": true
        }))
        .unwrap();
        assert_eq!(event.strategy, DatabaseStrategy::Dedicated);
        assert!(event.database_created);
        assert!(event.metadata.is_none());

        let event: ProvisioningEvent = serde_json::from_value(json!({
            "tenant_id": "7b6c3a52-9f2e-4d14-9f63-2f8df0ab1234",
            "strategy": "External",
            "provider": "MySQL",
            "database_created": false,
            "metadata": {"region": "eu-west-1"}
        }))
        .unwrap();
        assert_eq!(event.provider, DatabaseProvider::MySql);
        assert_eq!(
            event.metadata.unwrap().get("region").map(String::as_str),
            Some("eu-west-1")
        );
    }
}
