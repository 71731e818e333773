use crate::automation::{AgentRunRequest, ResearchRequest};
use crate::config::schema::{DriverConfig, ServerConfig};
use crate::error::{Result, TaskpilotError};

/// Upper bound on research iterations per request.
pub const MAX_SEARCH_ITERATIONS: u32 = 100;

/// Upper bound on search queries per research iteration.
pub const MAX_QUERIES_PER_ITERATION: u32 = 20;

/// Validate server configuration before binding anything
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(TaskpilotError::Validation(
            "Host cannot be empty".to_string(),
        ));
    }

    if config.concurrency_limit == 0 {
        return Err(TaskpilotError::Validation(
            "Concurrency limit must be at least 1".to_string(),
        ));
    }

    if config.tasks.sample_interval_ms == 0 {
        return Err(TaskpilotError::Validation(
            "Sample interval must be greater than zero".to_string(),
        ));
    }

    if config.tasks.max_tasks == 0 {
        return Err(TaskpilotError::Validation(
            "Task registry capacity must be at least 1".to_string(),
        ));
    }

    if config.tasks.janitor_interval_secs == 0 {
        return Err(TaskpilotError::Validation(
            "Janitor interval must be greater than zero".to_string(),
        ));
    }

    if let DriverConfig::Command { program, .. } = &config.driver {
        if program.as_os_str().is_empty() {
            return Err(TaskpilotError::Validation(
                "Command driver requires a program".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate an agent run request before a task is created
pub fn validate_agent_request(req: &AgentRunRequest) -> Result<()> {
    if req.task.trim().is_empty() {
        return Err(TaskpilotError::Validation(
            "Task description cannot be empty".to_string(),
        ));
    }

    if req.agent_type != "custom" {
        return Err(TaskpilotError::Validation(format!(
            "Agent type '{}' is not supported",
            req.agent_type
        )));
    }

    validate_llm(&req.llm_provider, &req.llm_model_name, req.llm_temperature)?;

    if req.window_w == 0 || req.window_h == 0 {
        return Err(TaskpilotError::Validation(format!(
            "Invalid window size {}x{}",
            req.window_w, req.window_h
        )));
    }

    if req.max_steps == 0 {
        return Err(TaskpilotError::Validation(
            "max_steps must be at least 1".to_string(),
        ));
    }

    if req.max_actions_per_step == 0 {
        return Err(TaskpilotError::Validation(
            "max_actions_per_step must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validate a deep research request before a task is created
pub fn validate_research_request(req: &ResearchRequest) -> Result<()> {
    if req.research_task.trim().is_empty() {
        return Err(TaskpilotError::Validation(
            "Research task cannot be empty".to_string(),
        ));
    }

    validate_llm(&req.llm_provider, &req.llm_model_name, req.llm_temperature)?;

    if req.max_search_iteration == 0 || req.max_query_per_iter == 0 {
        return Err(TaskpilotError::Validation(
            "Search iteration and query limits must be at least 1".to_string(),
        ));
    }
    if req.max_search_iteration > MAX_SEARCH_ITERATIONS {
        return Err(TaskpilotError::Validation(format!(
            "max_search_iteration must be at most {}",
            MAX_SEARCH_ITERATIONS
        )));
    }
    if req.max_query_per_iter > MAX_QUERIES_PER_ITERATION {
        return Err(TaskpilotError::Validation(format!(
            "max_query_per_iter must be at most {}",
            MAX_QUERIES_PER_ITERATION
        )));
    }

    Ok(())
}

/// Saved configuration ids are UUIDs; anything else never touches the disk.
pub fn validate_config_id(config_id: &str) -> Result<()> {
    uuid::Uuid::parse_str(config_id)
        .map(|_| ())
        .map_err(|_| TaskpilotError::Validation(format!("Invalid config id: {}", config_id)))
}

fn validate_llm(provider: &str, model: &str, temperature: f64) -> Result<()> {
    if provider.trim().is_empty() {
        return Err(TaskpilotError::Validation(
            "LLM provider cannot be empty".to_string(),
        ));
    }
    if model.trim().is_empty() {
        return Err(TaskpilotError::Validation(
            "LLM model name cannot be empty".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&temperature) {
        return Err(TaskpilotError::Validation(format!(
            "LLM temperature {} out of range [0, 2]",
            temperature
        )));
    }
    Ok(())
}
