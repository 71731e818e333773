//! Driver that delegates each run to an external bridge process.
//!
//! The bridge receives one JSON payload on stdin and answers with JSON lines
//! on stdout, each tagged by an `event` field:
//!
//! - `{"event":"update", "progress":0.4, "screenshot":"...", ...}`
//! - `{"event":"result", ...outcome fields...}`
//! - `{"event":"error", "message":"..."}`
//!
//! Lines that are not JSON objects are treated as log output.

use crate::automation::{
    AgentOutcome, AgentRunRequest, AutomationDriver, AutomationError, AutomationResult,
    ResearchOutcome, ResearchRequest, RunContext, TaskUpdate,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BridgeEvent {
    Update(TaskUpdate),
    Result(Value),
    Error(String),
}

pub struct CommandDriver {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandDriver {
    pub fn new(program: PathBuf, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            program,
            args,
            working_dir,
        }
    }

    async fn run_bridge<T: DeserializeOwned + Send>(
        &self,
        ctx: &RunContext,
        mode: &str,
        request: Value,
    ) -> AutomationResult<T> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AutomationError::Process(format!("failed to spawn {}: {}", self.program.display(), e))
        })?;
        tracing::debug!(
            "Spawned bridge {} (pid {:?}) for task {}",
            self.program.display(),
            child.id(),
            ctx.task_id
        );

        let payload = serde_json::json!({
            "mode": mode,
            "task_id": ctx.task_id,
            "request": request,
            "dirs": {
                "recordings": ctx.dirs.recordings,
                "traces": ctx.dirs.traces,
                "history": ctx.dirs.history,
            },
        });
        if let Some(mut stdin) = child.stdin.take() {
            let mut bytes = serde_json::to_vec(&payload)
                .map_err(|e| AutomationError::Protocol(e.to_string()))?;
            bytes.push(b'\n');
            match stdin.write_all(&bytes).await {
                Ok(()) => {}
                // bridge may exit without reading its input
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            let task_id = ctx.task_id.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("[bridge {}] {}", task_id, line);
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AutomationError::Process("bridge stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut outcome: Option<Value> = None;
        let mut reported_error: Option<String> = None;

        loop {
            let line = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(AutomationError::Cancelled);
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            match parse_line(&line)? {
                Some(BridgeEvent::Update(update)) => {
                    ctx.report(update);
                }
                Some(BridgeEvent::Result(value)) => outcome = Some(value),
                Some(BridgeEvent::Error(message)) => reported_error = Some(message),
                None => tracing::debug!("[bridge {}] {}", ctx.task_id, line),
            }
        }

        let status = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(AutomationError::Cancelled);
            }
            status = child.wait() => status?,
        };
        let stderr_tail = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if let Some(message) = reported_error {
            return Err(AutomationError::Failed(message));
        }
        match outcome {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AutomationError::Protocol(format!("invalid result: {}", e))),
            None if !status.success() => Err(AutomationError::Process(format!(
                "bridge exited with {}: {}",
                status, stderr_tail
            ))),
            None => Err(AutomationError::Protocol(
                "bridge exited without a result".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AutomationDriver for CommandDriver {
    fn name(&self) -> &str {
        "command"
    }

    async fn run_agent(
        &self,
        ctx: RunContext,
        request: AgentRunRequest,
    ) -> AutomationResult<AgentOutcome> {
        let request = serde_json::to_value(&request)
            .map_err(|e| AutomationError::Protocol(e.to_string()))?;
        self.run_bridge(&ctx, "agent", request).await
    }

    async fn run_research(
        &self,
        ctx: RunContext,
        request: ResearchRequest,
    ) -> AutomationResult<ResearchOutcome> {
        let request = serde_json::to_value(&request)
            .map_err(|e| AutomationError::Protocol(e.to_string()))?;
        self.run_bridge(&ctx, "research", request).await
    }
}

/// Parse one stdout line. `Ok(None)` means the line is not a bridge event.
pub(crate) fn parse_line(line: &str) -> AutomationResult<Option<BridgeEvent>> {
    let value: Value = match serde_json::from_str(line.trim()) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Ok(None),
    };
    let event = match value.get("event").and_then(Value::as_str) {
        Some(event) => event.to_string(),
        None => return Ok(None),
    };

    match event.as_str() {
        "update" => {
            let current_results = value
                .get("current_results")
                .and_then(Value::as_str)
                .map(str::to_string);
            let mut update: TaskUpdate = serde_json::from_value(value)
                .map_err(|e| AutomationError::Protocol(format!("invalid update: {}", e)))?;
            if update.model_thoughts.is_none() {
                update.model_thoughts = current_results;
            }
            Ok(Some(BridgeEvent::Update(update)))
        }
        "result" => Ok(Some(BridgeEvent::Result(value))),
        "error" => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("bridge reported an error")
                .to_string();
            Ok(Some(BridgeEvent::Error(message)))
        }
        other => {
            tracing::debug!("Ignoring unknown bridge event '{}'", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update_line() {
        let event = parse_line(r#"{"event":"update","progress":0.4,"model_actions":"click"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            BridgeEvent::Update(TaskUpdate {
                progress: Some(0.4),
                model_actions: Some("click".into()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_parse_research_update_maps_current_results() {
        let event = parse_line(r#"{"event":"update","progress":0.2,"current_results":"draft"}"#)
            .unwrap()
            .unwrap();
        match event {
            BridgeEvent::Update(update) => {
                assert_eq!(update.model_thoughts.as_deref(), Some("draft"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_ignores_log_lines() {
        assert!(parse_line("INFO starting browser").unwrap().is_none());
        assert!(parse_line("[1, 2]").unwrap().is_none());
        assert!(parse_line(r#"{"level":"info"}"#).unwrap().is_none());
        assert!(parse_line(r#"{"event":"heartbeat"}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_error_and_bad_update() {
        let event = parse_line(r#"{"event":"error","message":"no browser"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, BridgeEvent::Error("no browser".into()));

        assert!(parse_line(r#"{"event":"update","progress":"high"}"#).is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::config::schema::ArtifactDirs;
        use std::time::Duration;
        use tokio::sync::mpsc;
        use tokio_util::sync::CancellationToken;

        fn shell(script: &str) -> CommandDriver {
            CommandDriver::new(
                PathBuf::from("sh"),
                vec!["-c".to_string(), script.to_string()],
                None,
            )
        }

        fn context() -> (RunContext, mpsc::UnboundedReceiver<TaskUpdate>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let ctx = RunContext {
                task_id: "cmd-1".into(),
                updates: tx,
                cancel: CancellationToken::new(),
                dirs: ArtifactDirs::under(std::path::Path::new("/tmp/taskpilot-cmd-test")),
            };
            (ctx, rx)
        }

        fn request() -> AgentRunRequest {
            serde_json::from_value(serde_json::json!({
                "llm_provider": "openai",
                "llm_model_name": "gpt-4o",
                "task": "bridge test"
            }))
            .unwrap()
        }

        #[tokio::test]
        async fn test_bridge_updates_and_result() {
            let driver = shell(
                r#"cat >/dev/null
echo '{"event":"update","progress":0.5}'
echo 'plain log line'
echo '{"event":"result","final_result":"ok","history_file":"/tmp/h.json"}'"#,
            );
            let (ctx, mut rx) = context();

            let outcome = driver.run_agent(ctx, request()).await.unwrap();
            assert_eq!(outcome.final_result.as_deref(), Some("ok"));
            assert_eq!(outcome.history_path.as_deref(), Some("/tmp/h.json"));
            assert_eq!(rx.try_recv().unwrap().progress, Some(0.5));
        }

        #[tokio::test]
        async fn test_bridge_error_event() {
            let driver = shell(
                r#"cat >/dev/null
echo '{"event":"error","message":"no browser"}'
exit 1"#,
            );
            let (ctx, _rx) = context();
            let err = driver.run_agent(ctx, request()).await.unwrap_err();
            assert!(matches!(err, AutomationError::Failed(m) if m == "no browser"));
        }

        #[tokio::test]
        async fn test_bridge_nonzero_exit_without_result() {
            let driver = shell("cat >/dev/null; echo oops >&2; exit 3");
            let (ctx, _rx) = context();
            let err = driver.run_agent(ctx, request()).await.unwrap_err();
            match err {
                AutomationError::Process(message) => assert!(message.contains("oops")),
                other => panic!("unexpected error {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_bridge_killed_on_cancel() {
            let driver = shell("sleep 30");
            let (ctx, _rx) = context();
            let token = ctx.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            });

            let started = std::time::Instant::now();
            let err = driver.run_agent(ctx, request()).await.unwrap_err();
            assert!(matches!(err, AutomationError::Cancelled));
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
