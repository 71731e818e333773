//! Seam between the task executor and the browser-automation side.
//!
//! A driver runs one agent or research job to completion, reporting partial
//! progress through [`RunContext::report`]. The executor owns the task record;
//! drivers never touch it directly.

pub mod command;
pub mod simulated;
pub mod types;

pub use command::CommandDriver;
pub use simulated::SimulatedDriver;
pub use types::*;

use crate::config::schema::{ArtifactDirs, DriverConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("Bridge process error: {0}")]
    Process(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AutomationResult<T> = std::result::Result<T, AutomationError>;

/// Channel the driver pushes partial updates into.
pub type UpdateSender = mpsc::UnboundedSender<TaskUpdate>;

/// Per-run handle given to a driver.
#[derive(Clone)]
pub struct RunContext {
    pub task_id: String,
    pub updates: UpdateSender,
    pub cancel: CancellationToken,
    pub dirs: ArtifactDirs,
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a partial update. Returns false once the executor stopped listening.
    pub fn report(&self, update: TaskUpdate) -> bool {
        self.updates.send(update).is_ok()
    }

    /// Sleep for `duration` unless the run is cancelled first.
    pub async fn sleep_or_cancel(&self, duration: Duration) -> AutomationResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AutomationError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Browser-automation backend
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> &str;

    /// Run a browser agent to completion
    async fn run_agent(
        &self,
        ctx: RunContext,
        request: AgentRunRequest,
    ) -> AutomationResult<AgentOutcome>;

    /// Run a deep-research job to completion
    async fn run_research(
        &self,
        ctx: RunContext,
        request: ResearchRequest,
    ) -> AutomationResult<ResearchOutcome>;

    /// Whether [`AutomationDriver::sample`] yields anything worth polling for.
    fn supports_sampling(&self) -> bool {
        false
    }

    /// Current screenshot/progress of a running task, polled by the executor.
    async fn sample(&self, _task_id: &str) -> Option<TaskUpdate> {
        None
    }

    /// Close the browser used by a finished task.
    async fn release_browser(&self, _task_id: &str) {}
}

/// Build the driver selected by configuration.
pub fn build_driver(config: &DriverConfig) -> Arc<dyn AutomationDriver> {
    match config {
        DriverConfig::Simulated { step_delay_ms } => {
            Arc::new(SimulatedDriver::new(Duration::from_millis(*step_delay_ms)))
        }
        DriverConfig::Command {
            program,
            args,
            working_dir,
        } => Arc::new(CommandDriver::new(
            program.clone(),
            args.clone(),
            working_dir.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (RunContext, mpsc::UnboundedReceiver<TaskUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RunContext {
            task_id: "t-1".into(),
            updates: tx,
            cancel: CancellationToken::new(),
            dirs: ArtifactDirs::under(std::path::Path::new("/tmp/taskpilot-test")),
        };
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_returns_on_cancel() {
        let (ctx, _rx) = context();
        ctx.cancel.cancel();
        let res = ctx.sleep_or_cancel(Duration::from_secs(60)).await;
        assert!(matches!(res, Err(AutomationError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_report_after_receiver_dropped() {
        let (ctx, rx) = context();
        assert!(ctx.report(TaskUpdate::progress(0.1)));
        drop(rx);
        assert!(!ctx.report(TaskUpdate::progress(0.2)));
    }

    #[test]
    fn test_build_driver_by_kind() {
        let driver = build_driver(&DriverConfig::default());
        assert_eq!(driver.name(), "simulated");

        let driver = build_driver(&DriverConfig::Command {
            program: "/usr/bin/python3".into(),
            args: vec![],
            working_dir: None,
        });
        assert_eq!(driver.name(), "command");
    }
}
