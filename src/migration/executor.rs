use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Executor, PgPool};

use super::runner::MigrationScript;
use super::MigrationError;

/// Execution seam between the runner's ordering/journal logic and an actual
/// database. Tests supply an in-memory implementation.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Names of scripts already recorded in the journal, creating the journal
    /// table if it does not exist yet
    async fn journaled_scripts(&self) -> Result<Vec<String>, MigrationError>;

    /// Execute one script and record it in the journal. In transactional mode
    /// the script and its journal entry commit together or not at all.
    async fn apply_script(
        &self,
        script: &MigrationScript,
        transactional: bool,
        timeout: Duration,
    ) -> Result<(), MigrationError>;
}

/// Runs scripts against a Postgres database via sqlx
pub struct PostgresScriptExecutor {
    pool: PgPool,
    journal_schema: Option<String>,
    journal_table: String,
}

impl PostgresScriptExecutor {
    pub fn new(pool: PgPool, journal_schema: Option<String>, journal_table: String) -> Self {
        Self {
            pool,
            journal_schema,
            journal_table,
        }
    }

    /// Quoted, optionally schema-qualified journal table name
    fn journal_name(&self) -> String {
        match &self.journal_schema {
            Some(schema) => format!(
                "{}.{}",
                quote_identifier(schema),
                quote_identifier(&self.journal_table)
            ),
            None => quote_identifier(&self.journal_table),
        }
    }

    async fn ensure_journal(&self) -> Result<(), MigrationError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                 script_name text PRIMARY KEY, \
                 applied_at timestamptz NOT NULL DEFAULT now()\
             )",
            self.journal_name()
        );
        self.pool.execute(ddl.as_str()).await?;
        Ok(())
    }
}

#[async_trait]
impl ScriptExecutor for PostgresScriptExecutor {
    async fn journaled_scripts(&self) -> Result<Vec<String>, MigrationError> {
        self.ensure_journal().await?;

        let sql = format!("SELECT script_name FROM {}", self.journal_name());
        let names: Vec<(String,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn apply_script(
        &self,
        script: &MigrationScript,
        transactional: bool,
        timeout: Duration,
    ) -> Result<(), MigrationError> {
        let journal_insert = format!(
            "INSERT INTO {} (script_name) VALUES ($1)",
            self.journal_name()
        );

        let work = async {
            if transactional {
                let mut tx = self.pool.begin().await?;
                // Simple query protocol so multi-statement scripts run as-is
                (&mut *tx).execute(script.sql.as_str()).await?;
                sqlx::query(&journal_insert)
                    .bind(&script.name)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            } else {
                self.pool.execute(script.sql.as_str()).await?;
                sqlx::query(&journal_insert)
                    .bind(&script.name)
                    .execute(&self.pool)
                    .await?;
            }
            Ok::<(), sqlx::Error>(())
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MigrationError::ScriptFailed {
                script: script.name.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(MigrationError::ScriptTimeout {
                script: script.name.clone(),
            }),
        }
    }
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn journal_name_quotes_and_qualifies() {
        let pool_less = |schema: Option<&str>, table: &str| {
            // journal_name only touches the name fields
            let exec = PostgresScriptExecutor {
                pool: PgPool::connect_lazy("postgres://localhost/ignored").unwrap(),
                journal_schema: schema.map(str::to_string),
                journal_table: table.to_string(),
            };
            exec.journal_name()
        };

        assert_eq!(pool_less(None, "SchemaVersions"), "\"SchemaVersions\"");
        assert_eq!(
            pool_less(Some("ops"), "SchemaVersions"),
            "\"ops\".\"SchemaVersions\""
        );
        assert_eq!(pool_less(None, "odd\"name"), "\"odd\"\"name\"");
    }
}
