//! Per-task status/result state and its wire snapshot.

use crate::automation::{AgentOutcome, TaskUpdate};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Highest progress a task may report before it completes.
pub const MAX_RUNNING_PROGRESS: f64 = 0.99;

/// Task status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, executor not yet running
    Starting,
    /// Automation call in flight
    Running,
    /// Finished successfully
    Completed,
    /// Automation call raised an error
    Failed,
    /// Stopped by a client
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of work a task performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Agent,
    Research,
}

/// Point-in-time copy of a task record, as served over HTTP and WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub task_type: TaskKind,
    pub status: TaskStatus,
    /// Set when a stop request took effect
    pub is_stopped: bool,
    pub progress: f64,
    pub final_result: Option<String>,
    pub errors: Option<String>,
    pub model_actions: Option<String>,
    pub model_thoughts: Option<String>,
    pub recording_path: Option<String>,
    pub trace_path: Option<String>,
    pub history_path: Option<String>,
    /// Latest base64-encoded screenshot
    pub screenshot: Option<String>,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// Mutable state of one task.
///
/// Every mutator returns whether it changed anything; once the status is
/// terminal all mutators are no-ops.
#[derive(Debug)]
pub struct TaskRecord {
    task_id: String,
    kind: TaskKind,
    status: TaskStatus,
    progress: f64,
    final_result: Option<String>,
    errors: Option<String>,
    model_actions: Option<String>,
    model_thoughts: Option<String>,
    recording_path: Option<String>,
    trace_path: Option<String>,
    history_path: Option<String>,
    screenshot: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<Instant>,
    is_stopped: bool,
}

impl TaskRecord {
    pub fn new(task_id: String, kind: TaskKind) -> Self {
        Self {
            task_id,
            kind,
            status: TaskStatus::Starting,
            progress: 0.0,
            final_result: None,
            errors: None,
            model_actions: None,
            model_thoughts: None,
            recording_path: None,
            trace_path: None,
            history_path: None,
            screenshot: None,
            created_at: chrono::Utc::now(),
            finished_at: None,
            is_stopped: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Cooperative-cancellation flag, set before the status flips to stopped.
    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.task_id.clone(),
            task_type: self.kind,
            status: self.status,
            is_stopped: self.is_stopped,
            progress: self.progress,
            final_result: self.final_result.clone(),
            errors: self.errors.clone(),
            model_actions: self.model_actions.clone(),
            model_thoughts: self.model_thoughts.clone(),
            recording_path: self.recording_path.clone(),
            trace_path: self.trace_path.clone(),
            history_path: self.history_path.clone(),
            screenshot: self.screenshot.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }

    /// `starting -> running`. Fails if the task was stopped before the executor started.
    pub fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Starting || self.is_stopped {
            return false;
        }
        self.status = TaskStatus::Running;
        true
    }

    /// Merge a partial update; absent fields keep their previous values.
    pub fn apply_update(&mut self, update: TaskUpdate) -> bool {
        if self.status.is_terminal() || update.is_empty() {
            return false;
        }
        if let Some(progress) = update.progress.filter(|p| p.is_finite()) {
            let clamped = progress.clamp(0.0, MAX_RUNNING_PROGRESS);
            self.progress = self.progress.max(clamped);
        }
        if let Some(screenshot) = update.screenshot {
            self.screenshot = Some(screenshot);
        }
        if let Some(actions) = update.model_actions {
            self.model_actions = Some(actions);
        }
        if let Some(thoughts) = update.model_thoughts {
            self.model_thoughts = Some(thoughts);
        }
        true
    }

    pub fn complete(&mut self, outcome: AgentOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let AgentOutcome {
            final_result,
            errors,
            model_actions,
            model_thoughts,
            recording_path,
            trace_path,
            history_path,
        } = outcome;
        merge(&mut self.final_result, final_result);
        merge(&mut self.errors, errors);
        merge(&mut self.model_actions, model_actions);
        merge(&mut self.model_thoughts, model_thoughts);
        merge(&mut self.recording_path, recording_path);
        merge(&mut self.trace_path, trace_path);
        merge(&mut self.history_path, history_path);
        self.progress = 1.0;
        self.finish(TaskStatus::Completed);
        true
    }

    pub fn fail(&mut self, message: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.errors = Some(message);
        self.finish(TaskStatus::Failed);
        true
    }

    /// Raise the cancellation flag without touching the status.
    pub fn mark_stop_requested(&mut self) -> bool {
        if self.status.is_terminal() || self.is_stopped {
            return false;
        }
        self.is_stopped = true;
        true
    }

    pub fn stop(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.is_stopped = true;
        self.finish(TaskStatus::Stopped);
        true
    }

    fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.finished_at = Some(Instant::now());
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}
