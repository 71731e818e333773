use serde::{Deserialize, Serialize};

/// Request body of `POST /agent/run`, passed verbatim to the driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRunRequest {
    /// Agent implementation; only "custom" is supported
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// LLM provider (e.g. openai, anthropic, ollama)
    pub llm_provider: String,
    pub llm_model_name: String,
    #[serde(default = "default_temperature")]
    pub llm_temperature: f64,
    /// Context length for Ollama models
    #[serde(default = "default_num_ctx")]
    pub llm_num_ctx: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub use_own_browser: bool,
    /// Keep the browser alive after the task ends
    #[serde(default)]
    pub keep_browser_open: bool,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub disable_security: bool,
    #[serde(default = "default_window_w")]
    pub window_w: u32,
    #[serde(default = "default_window_h")]
    pub window_h: u32,
    #[serde(default = "default_true")]
    pub enable_recording: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_true")]
    pub use_vision: bool,
    #[serde(default = "default_max_actions_per_step")]
    pub max_actions_per_step: u32,
    #[serde(default = "default_tool_calling_method")]
    pub tool_calling_method: String,
    /// Attach to an existing Chrome over CDP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_cdp: Option<String>,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u32,
    /// Task prompt for the agent
    #[serde(alias = "prompt")]
    pub task: String,
    /// Free-form extra hints for the agent
    #[serde(default)]
    pub add_infos: String,
}

/// Request body of `POST /research/run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchRequest {
    pub research_task: String,
    #[serde(default = "default_max_search_iteration")]
    pub max_search_iteration: u32,
    #[serde(default = "default_max_query_per_iter")]
    pub max_query_per_iter: u32,
    pub llm_provider: String,
    pub llm_model_name: String,
    #[serde(default = "default_temperature")]
    pub llm_temperature: f64,
    #[serde(default = "default_num_ctx")]
    pub llm_num_ctx: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_true")]
    pub use_vision: bool,
    #[serde(default)]
    pub use_own_browser: bool,
    #[serde(default)]
    pub keep_browser_open: bool,
    #[serde(default)]
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_cdp: Option<String>,
}

/// Partial update reported while a task runs; only present fields overwrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Base64-encoded image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_actions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_thoughts: Option<String>,
}

impl TaskUpdate {
    pub fn progress(value: f64) -> Self {
        Self {
            progress: Some(value),
            ..Default::default()
        }
    }

    /// Research progress: intermediate results are shown as model thoughts.
    pub fn research(progress: f64, current_results: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            model_thoughts: Some(current_results.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.progress.is_none()
            && self.screenshot.is_none()
            && self.model_actions.is_none()
            && self.model_thoughts.is_none()
    }
}

/// Final result of an agent run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentOutcome {
    #[serde(default)]
    pub final_result: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
    #[serde(default)]
    pub model_actions: Option<String>,
    #[serde(default)]
    pub model_thoughts: Option<String>,
    #[serde(default)]
    pub recording_path: Option<String>,
    #[serde(default, alias = "trace_file")]
    pub trace_path: Option<String>,
    #[serde(default, alias = "history_file")]
    pub history_path: Option<String>,
}

/// Final result of a deep research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchOutcome {
    pub markdown_content: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl From<ResearchOutcome> for AgentOutcome {
    fn from(outcome: ResearchOutcome) -> Self {
        Self {
            final_result: Some(outcome.markdown_content),
            errors: Some(String::new()),
            history_path: outcome.file_path,
            ..Default::default()
        }
    }
}

fn default_agent_type() -> String {
    "custom".to_string()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_num_ctx() -> u32 {
    16000
}

fn default_true() -> bool {
    true
}

fn default_window_w() -> u32 {
    1280
}

fn default_window_h() -> u32 {
    1100
}

fn default_max_steps() -> u32 {
    100
}

fn default_max_actions_per_step() -> u32 {
    10
}

fn default_tool_calling_method() -> String {
    "auto".to_string()
}

fn default_max_input_tokens() -> u32 {
    128000
}

fn default_max_search_iteration() -> u32 {
    3
}

fn default_max_query_per_iter() -> u32 {
    1
}
