use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration, persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP API binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS ("*" allows any)
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,

    /// Root for recordings, traces, agent history and saved settings
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum number of in-flight HTTP requests
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Task lifecycle settings
    #[serde(default)]
    pub tasks: TaskSettings,

    /// Which automation driver runs the tasks
    #[serde(default)]
    pub driver: DriverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: default_cors_origins(),
            data_dir: default_data_dir(),
            concurrency_limit: default_concurrency_limit(),
            tasks: TaskSettings::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn artifact_dirs(&self) -> ArtifactDirs {
        ArtifactDirs::under(&self.data_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSettings {
    /// Interval of the screenshot/state sampler in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// How long finished tasks stay queryable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Registry size cap; oldest finished tasks are evicted first
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Period of the eviction sweep
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            retention_secs: default_retention_secs(),
            max_tasks: default_max_tasks(),
            janitor_interval_secs: default_janitor_interval_secs(),
        }
    }
}

impl TaskSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

/// Automation driver selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Built-in stepwise simulation (no browser, no LLM)
    Simulated {
        #[serde(default = "default_step_delay_ms")]
        step_delay_ms: u64,
    },
    /// External bridge process speaking JSON lines on stdout
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
    },
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Simulated {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

/// Directories the automation side writes artifacts into.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDirs {
    pub recordings: PathBuf,
    pub traces: PathBuf,
    pub history: PathBuf,
    pub settings: PathBuf,
}

impl ArtifactDirs {
    pub fn under(root: &std::path::Path) -> Self {
        Self {
            recordings: root.join("record_videos"),
            traces: root.join("traces"),
            history: root.join("agent_history"),
            settings: root.join("webui_settings"),
        }
    }

    /// Create every artifact directory if missing.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.recordings, &self.traces, &self.history, &self.settings] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_concurrency_limit() -> usize {
    64
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_max_tasks() -> usize {
    1000
}

fn default_janitor_interval_secs() -> u64 {
    60
}

fn default_step_delay_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8000);
        assert_eq!(config.tasks.sample_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_command_driver_from_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            port = 9000

            [driver]
            kind = "command"
            program = "/usr/bin/python3"
            args = ["bridge.py"]
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        match config.driver {
            DriverConfig::Command { program, args, working_dir } => {
                assert_eq!(program, PathBuf::from("/usr/bin/python3"));
                assert_eq!(args, vec!["bridge.py".to_string()]);
                assert!(working_dir.is_none());
            }
            other => panic!("unexpected driver {:?}", other),
        }
    }

    #[test]
    fn test_artifact_dirs_layout() {
        let dirs = ArtifactDirs::under(std::path::Path::new("/data"));
        assert_eq!(dirs.recordings, PathBuf::from("/data/record_videos"));
        assert_eq!(dirs.traces, PathBuf::from("/data/traces"));
        assert_eq!(dirs.history, PathBuf::from("/data/agent_history"));
        assert_eq!(dirs.settings, PathBuf::from("/data/webui_settings"));
    }
}
