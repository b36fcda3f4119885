pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod runner;

use thiserror::Error;

pub use events::{EventDisposition, ProvisioningEvent};
pub use executor::{PostgresScriptExecutor, ScriptExecutor};
pub use orchestrator::MigrationOrchestrator;
pub use runner::{MigrationResult, MigrationRunner, MigrationRunnerConfig, MigrationScript};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to read migration scripts from {path}: {source}")]
    ScriptDiscovery {
        path: String,
        source: std::io::Error,
    },

    #[error("Script '{script}' failed: {message}")]
    ScriptFailed { script: String, message: String },

    #[error("Script '{script}' timed out")]
    ScriptTimeout { script: String },

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Unsupported database provider for migration execution: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
