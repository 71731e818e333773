//! Task executor: runs one delegated automation call per task on a detached
//! tokio task and folds its progress into the registry.

use crate::automation::{
    AgentOutcome, AgentRunRequest, AutomationDriver, AutomationError, AutomationResult,
    ResearchRequest, RunContext, TaskUpdate, UpdateSender,
};
use crate::config::schema::ArtifactDirs;
use crate::config::validation::{validate_agent_request, validate_research_request};
use crate::error::{Result, TaskpilotError};
use crate::recording::{newest_file_since, snapshot_files, RECORDING_EXTENSIONS, TRACE_EXTENSIONS};
use crate::task::record::{TaskKind, TaskRecord, TaskSnapshot};
use crate::task::registry::{TaskEntry, TaskRegistry};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// How long to wait for queued updates to be applied once a run has ended.
const UPDATE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

enum Job {
    Agent(AgentRunRequest),
    Research(ResearchRequest),
}

impl Job {
    fn keep_browser_open(&self) -> bool {
        match self {
            Job::Agent(req) => req.keep_browser_open,
            Job::Research(req) => req.keep_browser_open,
        }
    }

    fn discovers_artifacts(&self) -> bool {
        matches!(self, Job::Agent(req) if req.enable_recording)
    }

    async fn run(
        self,
        driver: &dyn AutomationDriver,
        ctx: RunContext,
    ) -> AutomationResult<AgentOutcome> {
        match self {
            Job::Agent(req) => driver.run_agent(ctx, req).await,
            Job::Research(req) => driver.run_research(ctx, req).await.map(AgentOutcome::from),
        }
    }
}

/// Starts tasks and owns their background execution.
pub struct TaskExecutor {
    registry: Arc<TaskRegistry>,
    driver: Arc<dyn AutomationDriver>,
    dirs: ArtifactDirs,
    sample_interval: Duration,
}

impl TaskExecutor {
    pub fn new(
        registry: Arc<TaskRegistry>,
        driver: Arc<dyn AutomationDriver>,
        dirs: ArtifactDirs,
        sample_interval: Duration,
    ) -> Self {
        Self {
            registry,
            driver,
            dirs,
            sample_interval,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Validate, register and launch a browser agent. Returns the new task id.
    pub fn start_agent(&self, request: AgentRunRequest) -> Result<String> {
        validate_agent_request(&request)?;
        Ok(self.launch(TaskKind::Agent, Job::Agent(request)))
    }

    /// Validate, register and launch a deep research job. Returns the new task id.
    pub fn start_research(&self, request: ResearchRequest) -> Result<String> {
        validate_research_request(&request)?;
        Ok(self.launch(TaskKind::Research, Job::Research(request)))
    }

    /// Stop a task. Stopping a finished task succeeds without changing it.
    pub fn stop(&self, task_id: &str) -> Result<TaskSnapshot> {
        let entry = self
            .registry
            .entry(task_id)
            .ok_or_else(|| TaskpilotError::TaskNotFound(task_id.to_string()))?;
        Ok(entry.request_stop())
    }

    fn launch(&self, kind: TaskKind, job: Job) -> String {
        let entry = self.registry.create(kind);
        let task_id = entry.task_id().to_string();
        tracing::info!(
            "Starting {:?} task {} with {} driver",
            kind,
            task_id,
            self.driver.name()
        );

        tokio::spawn(run_task(
            entry,
            Arc::clone(&self.driver),
            self.dirs.clone(),
            self.sample_interval,
            job,
        ));
        task_id
    }
}

async fn run_task(
    entry: Arc<TaskEntry>,
    driver: Arc<dyn AutomationDriver>,
    dirs: ArtifactDirs,
    sample_interval: Duration,
    job: Job,
) {
    let task_id = entry.task_id().to_string();

    if !entry.mutate(TaskRecord::mark_running) {
        tracing::debug!("Task {} stopped before it started", task_id);
        return;
    }

    let cancel = entry.cancel_token();
    let keep_browser_open = job.keep_browser_open();
    let discover = job.discovers_artifacts();

    let (updates, mut update_rx) = mpsc::unbounded_channel::<TaskUpdate>();
    let pump_entry = Arc::clone(&entry);
    let mut pump = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            pump_entry.mutate(|record| record.apply_update(update));
        }
    });

    let sampler_token = cancel.child_token();
    let sampler = if driver.supports_sampling() {
        Some(tokio::spawn(sample_loop(
            Arc::clone(&driver),
            task_id.clone(),
            updates.clone(),
            sample_interval,
            sampler_token.clone(),
        )))
    } else {
        None
    };

    let (recordings_before, traces_before) = if discover {
        (
            Some(snapshot_files(&dirs.recordings, RECORDING_EXTENSIONS).await),
            Some(snapshot_files(&dirs.traces, TRACE_EXTENSIONS).await),
        )
    } else {
        (None, None)
    };

    let ctx = RunContext {
        task_id: task_id.clone(),
        updates,
        cancel: cancel.clone(),
        dirs: dirs.clone(),
    };

    let result = {
        let run = AssertUnwindSafe(job.run(driver.as_ref(), ctx)).catch_unwind();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AutomationError::Cancelled),
            res = run => res.unwrap_or_else(|panic| Err(AutomationError::Failed(panic_message(panic)))),
        }
    };

    sampler_token.cancel();
    if let Some(sampler) = sampler {
        let _ = sampler.await;
    }
    if tokio::time::timeout(UPDATE_DRAIN_TIMEOUT, &mut pump).await.is_err() {
        tracing::warn!("Task {}: update channel still open after run ended", task_id);
        pump.abort();
    }

    match result {
        Ok(mut outcome) => {
            if let Some(before) = &recordings_before {
                if outcome.recording_path.is_none() {
                    outcome.recording_path = newest_file_since(&dirs.recordings, before, RECORDING_EXTENSIONS)
                        .await
                        .map(|p| p.display().to_string());
                }
            }
            if let Some(before) = &traces_before {
                if outcome.trace_path.is_none() {
                    outcome.trace_path = newest_file_since(&dirs.traces, before, TRACE_EXTENSIONS)
                        .await
                        .map(|p| p.display().to_string());
                }
            }
            if entry.mutate(|record| record.complete(outcome)) {
                tracing::info!("Task {} completed", task_id);
            }
        }
        Err(AutomationError::Cancelled) => {
            entry.mutate(TaskRecord::stop);
            tracing::info!("Task {} cancelled", task_id);
        }
        Err(e) if entry.is_stopped() => {
            tracing::debug!("Task {} ended after stop: {}", task_id, e);
            entry.mutate(TaskRecord::stop);
        }
        Err(e) => {
            tracing::error!("Task {} failed: {}", task_id, e);
            entry.mutate(|record| record.fail(e.to_string()));
        }
    }

    if keep_browser_open {
        tracing::debug!("Task {}: keeping browser open", task_id);
    } else {
        driver.release_browser(&task_id).await;
    }
}

async fn sample_loop(
    driver: Arc<dyn AutomationDriver>,
    task_id: String,
    updates: UpdateSender,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let sample = tokio::select! {
            _ = token.cancelled() => break,
            sample = driver.sample(&task_id) => sample,
        };
        if let Some(update) = sample {
            if updates.send(update).is_err() {
                break;
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Automation driver panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Automation driver panicked: {}", s)
    } else {
        "Automation driver panicked".to_string()
    }
}
