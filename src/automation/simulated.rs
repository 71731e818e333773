//! Built-in driver that walks through a fixed sequence of steps with
//! synthetic screenshots. Used for local development and tests; it never
//! launches a browser or calls an LLM.

use crate::automation::{
    AgentOutcome, AgentRunRequest, AutomationDriver, AutomationResult, ResearchOutcome,
    ResearchRequest, RunContext, TaskUpdate,
};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const AGENT_STEPS: &[&str] = &[
    "Initializing browser",
    "Loading page",
    "Analyzing content",
    "Executing actions",
    "Gathering results",
];

const FRAME_SIZE: u32 = 8;

const FRAME_COLORS: &[[u8; 3]] = &[
    [0x33, 0x66, 0x99],
    [0x66, 0x99, 0x33],
    [0x99, 0x33, 0x66],
    [0x99, 0x66, 0x33],
    [0x33, 0x99, 0x66],
];

#[derive(Serialize)]
struct HistoryEntry<'a> {
    step: usize,
    action: &'a str,
    thought: String,
}

pub struct SimulatedDriver {
    step_delay: Duration,
    /// task id → index of the step currently shown
    sessions: Mutex<HashMap<String, usize>>,
    open_browsers: Mutex<HashSet<String>>,
}

impl SimulatedDriver {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            sessions: Mutex::new(HashMap::new()),
            open_browsers: Mutex::new(HashSet::new()),
        }
    }

    /// Whether the simulated browser of `task_id` is still open.
    pub fn is_browser_open(&self, task_id: &str) -> bool {
        self.open_browsers.lock().contains(task_id)
    }

    fn begin(&self, task_id: &str) -> SessionGuard<'_> {
        self.open_browsers.lock().insert(task_id.to_string());
        self.sessions.lock().insert(task_id.to_string(), 0);
        SessionGuard {
            sessions: &self.sessions,
            task_id: task_id.to_string(),
        }
    }

    fn set_step(&self, task_id: &str, step: usize) {
        if let Some(current) = self.sessions.lock().get_mut(task_id) {
            *current = step;
        }
    }
}

/// Removes the sampling session when the run ends, however it ends.
struct SessionGuard<'a> {
    sessions: &'a Mutex<HashMap<String, usize>>,
    task_id: String,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.task_id);
    }
}

#[async_trait]
impl AutomationDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn run_agent(
        &self,
        ctx: RunContext,
        request: AgentRunRequest,
    ) -> AutomationResult<AgentOutcome> {
        let _session = self.begin(&ctx.task_id);
        tracing::debug!(
            "Simulated browser opened for task {} (headless={})",
            ctx.task_id,
            request.headless
        );

        ctx.report(TaskUpdate {
            model_thoughts: Some("Initializing browser session...".to_string()),
            model_actions: Some("Starting browser automation".to_string()),
            ..Default::default()
        });

        let steps = &AGENT_STEPS[..AGENT_STEPS.len().min(request.max_steps as usize)];
        let mut history = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            self.set_step(&ctx.task_id, i);
            let thought = format!(
                "Step {}/{}: {}\nProcessing '{}'",
                i + 1,
                steps.len(),
                step,
                request.task
            );
            ctx.report(TaskUpdate {
                progress: Some((i + 1) as f64 / steps.len() as f64),
                screenshot: Some(frame(i)),
                model_actions: Some(format!("Executing: {}", step)),
                model_thoughts: Some(thought.clone()),
            });
            history.push(HistoryEntry {
                step: i + 1,
                action: step,
                thought,
            });
            ctx.sleep_or_cancel(self.step_delay).await?;
        }

        let history_path = ctx.dirs.history.join(format!("{}.json", ctx.task_id));
        tokio::fs::create_dir_all(&ctx.dirs.history).await?;
        let content = serde_json::to_string_pretty(&history)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&history_path, content).await?;

        Ok(AgentOutcome {
            final_result: Some(format!(
                "Task completed successfully.\nPrompt: {}\n\nActions performed:\n- Browsed to target website\n- Analyzed content\n- Completed requested actions",
                request.task
            )),
            errors: Some(String::new()),
            model_actions: Some(format!("Executed {} steps", steps.len())),
            model_thoughts: Some("Task completed. Final results provided.".to_string()),
            history_path: Some(history_path.display().to_string()),
            ..Default::default()
        })
    }

    async fn run_research(
        &self,
        ctx: RunContext,
        request: ResearchRequest,
    ) -> AutomationResult<ResearchOutcome> {
        let _session = self.begin(&ctx.task_id);

        let iterations = request.max_search_iteration.max(1) as usize;
        let queries = request.max_query_per_iter.max(1);
        let mut findings = String::new();

        for i in 0..iterations {
            self.set_step(&ctx.task_id, i);
            if !findings.is_empty() {
                findings.push('\n');
            }
            findings.push_str(&format!(
                "- Iteration {}, {} queries: notes on '{}'",
                i + 1,
                queries,
                request.research_task
            ));
            ctx.report(TaskUpdate::research(
                (i + 1) as f64 / iterations as f64,
                findings.clone(),
            ));
            ctx.sleep_or_cancel(self.step_delay).await?;
        }

        let markdown = format!(
            "# Research report\n\n## Task\n\n{}\n\n## Findings\n\n{}\n",
            request.research_task, findings
        );
        let report_path = ctx.dirs.history.join(format!("{}_report.md", ctx.task_id));
        tokio::fs::create_dir_all(&ctx.dirs.history).await?;
        tokio::fs::write(&report_path, &markdown).await?;

        Ok(ResearchOutcome {
            markdown_content: markdown,
            file_path: Some(report_path.display().to_string()),
        })
    }

    fn supports_sampling(&self) -> bool {
        true
    }

    async fn sample(&self, task_id: &str) -> Option<TaskUpdate> {
        let step = self.sessions.lock().get(task_id).copied()?;
        Some(TaskUpdate {
            screenshot: Some(frame(step)),
            ..Default::default()
        })
    }

    async fn release_browser(&self, task_id: &str) {
        if self.open_browsers.lock().remove(task_id) {
            tracing::debug!("Simulated browser closed for task {}", task_id);
        }
    }
}

/// Base64-encoded solid-colour BMP frame for `step`.
fn frame(step: usize) -> String {
    let [r, g, b] = FRAME_COLORS[step % FRAME_COLORS.len()];
    let row_bytes = FRAME_SIZE * 3;
    let pixel_bytes = row_bytes * FRAME_SIZE;
    let file_size = 54 + pixel_bytes;

    let mut bmp = Vec::with_capacity(file_size as usize);
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&file_size.to_le_bytes());
    bmp.extend_from_slice(&[0, 0, 0, 0]);
    bmp.extend_from_slice(&54u32.to_le_bytes());
    bmp.extend_from_slice(&40u32.to_le_bytes());
    bmp.extend_from_slice(&(FRAME_SIZE as i32).to_le_bytes());
    bmp.extend_from_slice(&(FRAME_SIZE as i32).to_le_bytes());
    bmp.extend_from_slice(&1u16.to_le_bytes());
    bmp.extend_from_slice(&24u16.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&pixel_bytes.to_le_bytes());
    bmp.extend_from_slice(&2835i32.to_le_bytes());
    bmp.extend_from_slice(&2835i32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    // pixels are stored BGR
    for _ in 0..(FRAME_SIZE * FRAME_SIZE) {
        bmp.extend_from_slice(&[b, g, r]);
    }

    base64::engine::general_purpose::STANDARD.encode(bmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutomationError;
    use crate::config::schema::ArtifactDirs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn context(tmp: &TempDir) -> (RunContext, mpsc::UnboundedReceiver<TaskUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RunContext {
            task_id: "sim-1".into(),
            updates: tx,
            cancel: CancellationToken::new(),
            dirs: ArtifactDirs::under(tmp.path()),
        };
        (ctx, rx)
    }

    fn agent_request() -> AgentRunRequest {
        serde_json::from_value(serde_json::json!({
            "llm_provider": "openai",
            "llm_model_name": "gpt-4o",
            "task": "find the docs"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_agent_run_reports_every_step() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_millis(1));
        let (ctx, mut rx) = context(&tmp);

        let outcome = driver.run_agent(ctx, agent_request()).await.unwrap();
        assert!(outcome
            .final_result
            .unwrap()
            .starts_with("Task completed successfully.\nPrompt: find the docs"));

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        // initial update plus one per step
        assert_eq!(updates.len(), AGENT_STEPS.len() + 1);
        assert_eq!(updates.last().unwrap().progress, Some(1.0));
        assert!(updates[1].screenshot.is_some());

        let history = std::fs::read_to_string(outcome.history_path.unwrap()).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&history).unwrap();
        assert_eq!(entries.as_array().unwrap().len(), AGENT_STEPS.len());
    }

    #[tokio::test]
    async fn test_max_steps_limits_run() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_millis(1));
        let (ctx, mut rx) = context(&tmp);
        let mut req = agent_request();
        req.max_steps = 2;

        driver.run_agent(ctx, req).await.unwrap();
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_run() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_secs(60));
        let (ctx, _rx) = context(&tmp);
        ctx.cancel.cancel();

        let res = driver.run_agent(ctx, agent_request()).await;
        assert!(matches!(res, Err(AutomationError::Cancelled)));
        assert!(driver.sample("sim-1").await.is_none());
    }

    #[tokio::test]
    async fn test_browser_stays_open_until_released() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_millis(1));
        let (ctx, _rx) = context(&tmp);

        driver.run_agent(ctx, agent_request()).await.unwrap();
        assert!(driver.is_browser_open("sim-1"));
        driver.release_browser("sim-1").await;
        assert!(!driver.is_browser_open("sim-1"));
    }

    #[tokio::test]
    async fn test_research_reports_findings_as_thoughts() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_millis(1));
        let (ctx, mut rx) = context(&tmp);
        let req: ResearchRequest = serde_json::from_value(serde_json::json!({
            "research_task": "tokio internals",
            "llm_provider": "openai",
            "llm_model_name": "gpt-4o",
            "max_search_iteration": 2
        }))
        .unwrap();

        let outcome = driver.run_research(ctx, req).await.unwrap();
        assert!(outcome.markdown_content.contains("tokio internals"));
        assert!(std::path::Path::new(&outcome.file_path.unwrap()).exists());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.progress, Some(0.5));
        assert!(first.model_thoughts.unwrap().contains("Iteration 1"));
    }

    #[tokio::test]
    async fn test_research_stop_interrupts_iterations() {
        let tmp = TempDir::new().unwrap();
        let driver = SimulatedDriver::new(Duration::from_secs(60));
        let (ctx, mut rx) = context(&tmp);
        let token = ctx.cancel.clone();
        let req: ResearchRequest = serde_json::from_value(serde_json::json!({
            "research_task": "long survey",
            "llm_provider": "openai",
            "llm_model_name": "gpt-4o",
            "max_search_iteration": 100,
            "max_query_per_iter": 20
        }))
        .unwrap();

        let run = tokio::spawn(async move { driver.run_research(ctx, req).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, AutomationError::Cancelled));
        let first = rx.try_recv().unwrap();
        assert!(first.model_thoughts.unwrap().contains("20 queries"));
    }

    #[test]
    fn test_frame_is_bmp() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(frame(0))
            .unwrap();
        assert_eq!(&bytes[..2], b"BM");
        assert_eq!(bytes.len(), 54 + (FRAME_SIZE * FRAME_SIZE * 3) as usize);
        assert_ne!(frame(0), frame(1));
    }
}
