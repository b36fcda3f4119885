use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::migration::{MigrationError, MigrationScript, ScriptExecutor};

/// In-memory ScriptExecutor for runner tests: journals to a Vec, records
/// every attempt, and can be told to fail a specific script.
pub struct MemoryExecutor {
    journal: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            journal: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
        }
    }

    pub fn failing_on(script_name: &str) -> Self {
        let executor = Self::new();
        *executor.fail_on.lock().unwrap() = Some(script_name.to_string());
        executor
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    /// Every script the runner tried, in order, including the failing one
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for MemoryExecutor {
    async fn journaled_scripts(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.journal.lock().unwrap().clone())
    }

    async fn apply_script(
        &self,
        script: &MigrationScript,
        _transactional: bool,
        _timeout: Duration,
    ) -> Result<(), MigrationError> {
        self.attempts.lock().unwrap().push(script.name.clone());

        if self.fail_on.lock().unwrap().as_deref() == Some(script.name.as_str()) {
            return Err(MigrationError::ScriptFailed {
                script: script.name.clone(),
                message: "injected failure".to_string(),
            });
        }

        self.journal.lock().unwrap().push(script.name.clone());
        Ok(())
    }
}

/// Write a throwaway scripts directory under the system temp dir
pub fn scripts_dir(files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("teck-migrations-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create scripts dir");
    for (name, sql) in files {
        std::fs::write(dir.join(name), sql).expect("write script");
    }
    dir
}
