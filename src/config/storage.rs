use crate::config::schema::ServerConfig;
use crate::error::{Result, TaskpilotError};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TASKPILOT_CONFIG";

/// Get the configuration file path: `TASKPILOT_CONFIG`, else the platform config dir
pub fn get_config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }

    dirs::config_dir()
        .map(|p| p.join("taskpilot"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load configuration from the default location and apply env overrides
pub fn load_config() -> Result<ServerConfig> {
    let mut config = load_config_from(&get_config_path())?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load configuration from file, creating default if not exists
pub fn load_config_from(config_path: &Path) -> Result<ServerConfig> {
    if !config_path.exists() {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        let config = ServerConfig::default();
        save_config_to(&config, config_path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        TaskpilotError::Config(format!(
            "Failed to read config from {:?}: {}",
            config_path, e
        ))
    })?;

    let config: ServerConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", config_path);
    Ok(config)
}

/// Save configuration to file
pub fn save_config_to(config: &ServerConfig, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            TaskpilotError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(config_path, content).map_err(|e| {
        TaskpilotError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::info!("Saved config to {:?}", config_path);
    Ok(())
}

/// Apply `API_HOST`, `API_PORT`, `CORS_ALLOWED_ORIGINS` and `TASKPILOT_DATA_DIR`.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("API_HOST").filter(|h| !h.is_empty()) {
        config.host = host;
    }
    if let Some(port) = lookup("API_PORT").filter(|p| !p.is_empty()) {
        config.port = port
            .parse()
            .map_err(|_| TaskpilotError::Config(format!("Invalid API_PORT: {}", port)))?;
    }
    if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(dir) = lookup("TASKPILOT_DATA_DIR").filter(|d| !d.is_empty()) {
        config.data_dir = PathBuf::from(dir);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = load_config_from(&path).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ServerConfig::default();
        config.port = 8123;
        config.tasks.max_tasks = 5;
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9001"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("TASKPILOT_DATA_DIR", "/srv/taskpilot"),
        ]
        .into_iter()
        .collect();
        let mut config = ServerConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9001);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.data_dir, PathBuf::from("/srv/taskpilot"));
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = ServerConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "API_PORT").then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, TaskpilotError::Config(_)));
    }
}
