pub mod api;
pub mod automation;
pub mod config;
pub mod error;
pub mod recording;
pub mod settings;
pub mod state;
pub mod task;

use state::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the API server and block until it shuts down.
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (never overwrite existing file on failure)
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(
                "Failed to load config: {}. Using in-memory defaults (not saving).",
                e
            );
            let mut config = config::ServerConfig::default();
            config::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            config
        }
    };
    config::validate_server_config(&config)?;

    let dirs = config.artifact_dirs();
    dirs.ensure()?;
    tracing::info!("Artifacts under {:?}", config.data_dir);

    let state = Arc::new(AppState::new(config));

    // Background task: evict finished tasks past their retention window
    let tasks = &state.config.tasks;
    task::spawn_janitor(
        Arc::clone(&state.registry),
        tasks.janitor_interval(),
        tasks.retention(),
    );

    api::run_server(state).await.map_err(anyhow::Error::msg)?;
    Ok(())
}
