use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::tenancy::DatabaseProvider;

use super::executor::ScriptExecutor;
use super::MigrationError;

/// One discovered migration script. Names are assumed to carry a monotonic
/// prefix (timestamp or sequence), so lexical order is application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub name: String,
    pub sql: String,
}

/// Per-invocation runner configuration
#[derive(Debug, Clone)]
pub struct MigrationRunnerConfig {
    pub scripts_path: PathBuf,
    pub provider: DatabaseProvider,
    pub journal_schema: Option<String>,
    pub journal_table: String,
    pub transactional: bool,
    pub command_timeout: Duration,
    pub log_script_output: bool,
}

impl MigrationRunnerConfig {
    pub fn from_config(config: &crate::config::MigrationConfig) -> Result<Self, MigrationError> {
        let provider = config
            .provider
            .parse::<DatabaseProvider>()
            .or_else(|_| match config.provider.to_ascii_lowercase().as_str() {
                "postgres" | "postgresql" => Ok(DatabaseProvider::PostgreSql),
                "sqlserver" | "mssql" => Ok(DatabaseProvider::SqlServer),
                "mysql" => Ok(DatabaseProvider::MySql),
                other => Err(MigrationError::UnsupportedProvider(other.to_string())),
            })?;

        Ok(Self {
            scripts_path: PathBuf::from(&config.scripts_path),
            provider,
            journal_schema: config.journal_schema.clone(),
            journal_table: config.journal_table.clone(),
            transactional: config.transactional,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            log_script_output: config.log_script_output,
        })
    }
}

/// Structured outcome of one runner invocation
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub scripts_applied: usize,
    pub duration_ms: u64,
    pub applied_scripts: Vec<String>,
    pub provider: DatabaseProvider,
    pub error: Option<String>,
}

impl MigrationResult {
    pub fn last_version(&self) -> Option<String> {
        self.applied_scripts.last().cloned()
    }
}

/// Applies pending migration scripts to one target database, idempotently.
/// Already-journaled scripts are skipped; a re-run against a fully migrated
/// database applies nothing and still succeeds.
pub struct MigrationRunner {
    config: MigrationRunnerConfig,
}

impl MigrationRunner {
    pub fn new(config: MigrationRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationRunnerConfig {
        &self.config
    }

    pub async fn run(&self, executor: &dyn ScriptExecutor) -> MigrationResult {
        let started = Instant::now();

        let scripts = match discover_scripts(&self.config.scripts_path) {
            Ok(scripts) => scripts,
            Err(e) => return self.failure(started, Vec::new(), e),
        };

        let journaled = match executor.journaled_scripts().await {
            Ok(journaled) => journaled,
            Err(e) => return self.failure(started, Vec::new(), e),
        };

        let pending = pending_scripts(&scripts, &journaled);
        tracing::info!(
            "{} of {} migration scripts pending in {}",
            pending.len(),
            scripts.len(),
            self.config.scripts_path.display()
        );

        let mut applied = Vec::new();
        for script in pending {
            if self.config.log_script_output {
                tracing::debug!("Executing {}:\n{}", script.name, script.sql);
            }

            match executor
                .apply_script(script, self.config.transactional, self.config.command_timeout)
                .await
            {
                Ok(()) => {
                    tracing::info!("Applied migration script {}", script.name);
                    applied.push(script.name.clone());
                }
                Err(e) => {
                    // Fail fast: later scripts are never attempted
                    tracing::error!("Migration stopped at {}: {}", script.name, e);
                    return self.failure(started, applied, e);
                }
            }
        }

        MigrationResult {
            success: true,
            scripts_applied: applied.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            applied_scripts: applied,
            provider: self.config.provider,
            error: None,
        }
    }

    fn failure(
        &self,
        started: Instant,
        applied: Vec<String>,
        error: MigrationError,
    ) -> MigrationResult {
        MigrationResult {
            success: false,
            scripts_applied: applied.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            applied_scripts: applied,
            provider: self.config.provider,
            error: Some(error.to_string()),
        }
    }
}

/// Read `*.sql` files from the scripts directory, ordered by file name
pub fn discover_scripts(path: &Path) -> Result<Vec<MigrationScript>, MigrationError> {
    let discovery_err = |source: std::io::Error| MigrationError::ScriptDiscovery {
        path: path.display().to_string(),
        source,
    };

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(path).map_err(discovery_err)? {
        let entry = entry.map_err(discovery_err)?;
        let file_path = entry.path();
        if file_path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let name = match file_path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let sql = std::fs::read_to_string(&file_path).map_err(discovery_err)?;
        scripts.push(MigrationScript { name, sql });
    }

    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scripts)
}

/// Scripts not yet recorded in the journal, in application order
pub fn pending_scripts<'a>(
    scripts: &'a [MigrationScript],
    journaled: &[String],
) -> Vec<&'a MigrationScript> {
    scripts
        .iter()
        .filter(|s| !journaled.iter().any(|j| j == &s.name))
        .collect()
}
