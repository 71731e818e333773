//! Saved configuration store: one pretty-printed JSON file per config id.

use crate::config::validation::validate_config_id;
use crate::error::{Result, TaskpilotError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct SavedConfigStore {
    dir: PathBuf,
}

impl SavedConfigStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn config_path(&self, config_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", config_id))
    }

    /// Persist `config` under a fresh id and return the id.
    pub async fn save(&self, config: &Value) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let config_id = Uuid::new_v4().to_string();
        let path = self.config_path(&config_id);
        let content = serde_json::to_string_pretty(config)?;

        // Write atomically
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::info!("Saved configuration {}", config_id);
        Ok(config_id)
    }

    pub async fn load(&self, config_id: &str) -> Result<Value> {
        validate_config_id(config_id)?;
        let path = self.config_path(config_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaskpilotError::ConfigNotFound(config_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }
}
