pub mod model;
pub mod registry;
pub mod resolver;

pub use model::{
    is_service_ready, rollup_status, DatabaseMetadata, DatabaseProvider, DatabaseStrategy,
    MigrationStatus, MigrationStatusRecord, TenantRecord,
};
pub use registry::{NewTenant, RegistryError, StatusReport, TenantRegistry};
pub use resolver::{
    resolve_connection, CanonicalConnections, ConnectionResolution, RoutingHint, SharedConnections,
};
