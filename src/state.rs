use crate::automation::{build_driver, AutomationDriver};
use crate::config::ServerConfig;
use crate::recording::RecordingManager;
use crate::settings::SavedConfigStore;
use crate::task::{TaskExecutor, TaskRegistry};
use std::sync::Arc;

/// Application global state, shared by every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Every task known to this process.
    pub registry: Arc<TaskRegistry>,
    /// Launches and stops tasks.
    pub executor: Arc<TaskExecutor>,
    pub recordings: Arc<RecordingManager>,
    pub saved_configs: Arc<SavedConfigStore>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let driver = build_driver(&config.driver);
        Self::with_driver(config, driver)
    }

    /// Build state around an explicit driver (used by tests and embedders).
    pub fn with_driver(config: ServerConfig, driver: Arc<dyn AutomationDriver>) -> Self {
        let dirs = config.artifact_dirs();
        let registry = Arc::new(TaskRegistry::new(config.tasks.max_tasks));
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&registry),
            driver,
            dirs.clone(),
            config.tasks.sample_interval(),
        ));
        Self {
            recordings: Arc::new(RecordingManager::new(dirs.recordings)),
            saved_configs: Arc::new(SavedConfigStore::new(dirs.settings)),
            registry,
            executor,
            config: Arc::new(config),
        }
    }
}
