use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub service: ServiceConfig,
    pub trust: TrustConfig,
    pub migrations: MigrationConfig,
    pub shared_database: SharedDatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name this deployable reports migration status under, e.g. "catalog-api"
    pub name: String,
    /// Base URL of the central tenant registry API
    pub registry_url: String,
    /// True for the deployable hosting the registry itself; it reports
    /// status in process instead of over HTTP
    pub is_registry: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Symmetric signing key shared between the edge and internal services.
    /// None means the edge forwards requests without an internal identity.
    pub signing_key: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub token_lifetime_secs: u64,
    /// Negative skew applied to nbf when minting
    pub mint_skew_secs: u64,
    /// Leeway accepted when validating
    pub validation_leeway_secs: u64,
    /// When false, requests with missing/invalid tokens continue unauthenticated
    pub enforce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub scripts_path: String,
    pub provider: String,
    pub journal_schema: Option<String>,
    pub journal_table: String,
    pub transactional: bool,
    pub command_timeout_secs: u64,
    pub log_script_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedDatabaseConfig {
    pub write_url: String,
    /// Falls back to write_url when no read replica is configured
    pub read_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Service overrides
        if let Ok(v) = env::var("SERVICE_NAME") {
            self.service.name = v;
        }
        if let Ok(v) = env::var("REGISTRY_URL") {
            self.service.registry_url = v;
        }
        if let Ok(v) = env::var("SERVICE_IS_REGISTRY") {
            self.service.is_registry = v.parse().unwrap_or(self.service.is_registry);
        }
        if let Ok(v) = env::var("PORT") {
            self.service.port = v.parse().unwrap_or(self.service.port);
        }

        // Trust overrides
        if let Ok(v) = env::var("TRUST_SIGNING_KEY") {
            if !v.is_empty() {
                self.trust.signing_key = Some(v);
            }
        }
        if let Ok(v) = env::var("TRUST_ISSUER") {
            self.trust.issuer = v;
        }
        if let Ok(v) = env::var("TRUST_AUDIENCE") {
            self.trust.audience = v;
        }
        if let Ok(v) = env::var("TRUST_TOKEN_LIFETIME_SECS") {
            self.trust.token_lifetime_secs = v.parse().unwrap_or(self.trust.token_lifetime_secs);
        }
        if let Ok(v) = env::var("TRUST_ENFORCE") {
            self.trust.enforce = v.parse().unwrap_or(self.trust.enforce);
        }

        // Migration overrides
        if let Ok(v) = env::var("MIGRATIONS_SCRIPTS_PATH") {
            self.migrations.scripts_path = v;
        }
        if let Ok(v) = env::var("MIGRATIONS_PROVIDER") {
            self.migrations.provider = v;
        }
        if let Ok(v) = env::var("MIGRATIONS_JOURNAL_SCHEMA") {
            self.migrations.journal_schema = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("MIGRATIONS_JOURNAL_TABLE") {
            self.migrations.journal_table = v;
        }
        if let Ok(v) = env::var("MIGRATIONS_TRANSACTIONAL") {
            self.migrations.transactional = v.parse().unwrap_or(self.migrations.transactional);
        }
        if let Ok(v) = env::var("MIGRATIONS_COMMAND_TIMEOUT_SECS") {
            self.migrations.command_timeout_secs =
                v.parse().unwrap_or(self.migrations.command_timeout_secs);
        }
        if let Ok(v) = env::var("MIGRATIONS_LOG_SCRIPT_OUTPUT") {
            self.migrations.log_script_output =
                v.parse().unwrap_or(self.migrations.log_script_output);
        }

        // Shared database overrides
        if let Ok(v) = env::var("SHARED_DATABASE_URL") {
            self.shared_database.write_url = v;
        }
        if let Ok(v) = env::var("SHARED_DATABASE_READ_URL") {
            self.shared_database.read_url = if v.is_empty() { None } else { Some(v) };
        }

        self
    }

    fn base(environment: Environment, enforce: bool) -> Self {
        Self {
            environment,
            service: ServiceConfig {
                name: "teck-web-bff".to_string(),
                registry_url: "http://localhost:3000".to_string(),
                is_registry: true,
                port: 3000,
            },
            trust: TrustConfig {
                signing_key: None,
                issuer: "teck-edge".to_string(),
                audience: "teck-web-bff-internal".to_string(),
                token_lifetime_secs: 120,
                mint_skew_secs: 5,
                validation_leeway_secs: 15,
                enforce,
            },
            migrations: MigrationConfig {
                scripts_path: "migrations".to_string(),
                provider: "postgresql".to_string(),
                journal_schema: None,
                journal_table: "SchemaVersions".to_string(),
                transactional: true,
                command_timeout_secs: 300,
                log_script_output: false,
            },
            shared_database: SharedDatabaseConfig {
                write_url: "postgres://localhost:5432/teck_shared".to_string(),
                read_url: None,
            },
        }
    }

    fn development() -> Self {
        // Enforcement off in development so the stack runs without the edge
        Self::base(Environment::Development, false)
    }

    fn staging() -> Self {
        Self::base(Environment::Staging, true)
    }

    fn production() -> Self {
        Self::base(Environment::Production, true)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
