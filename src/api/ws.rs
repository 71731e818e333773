//! WebSocket stream of one task's snapshots.
//!
//! The client first receives a `status` frame with the current snapshot, then
//! an `update` frame after every change. Clients may send `{"action":"stop"}`
//! or `{"type":"ping"}`; anything that is not JSON closes the stream.

use super::ApiState;
use crate::task::TaskFrame;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

/// WebSocket upgrade handler for `/ws/:task_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    AxumPath(task_id): AxumPath<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, task_id))
}

/// What the reader half makes of one client message.
#[derive(Debug, PartialEq)]
enum ClientCommand {
    Stop,
    Ping,
    Ignore,
    Malformed(String),
}

fn parse_client_message(text: &str) -> ClientCommand {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return ClientCommand::Malformed(e.to_string()),
    };
    if value.get("action").and_then(Value::as_str) == Some("stop") {
        ClientCommand::Stop
    } else if value.get("type").and_then(Value::as_str) == Some("ping") {
        ClientCommand::Ping
    } else {
        ClientCommand::Ignore
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &TaskFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::warn!("Failed to encode frame: {}", e);
            Ok(())
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: ApiState, task_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let Some(entry) = state.registry.entry(&task_id) else {
        let frame = TaskFrame::Error {
            message: "Task not found".to_string(),
        };
        let _ = send_frame(&mut sender, &frame).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let mut subscription = entry.subscribe();
    tracing::debug!("Stream client {} attached to task {}", subscription.id(), task_id);

    // Pongs and gateway errors from the reader half.
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<TaskFrame>();

    // Writer: subscription frames and control frames, in arrival order.
    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = subscription.recv() => match frame {
                    Some(frame) => frame,
                    // dropped as lagging, or the task was evicted
                    None => break,
                },
                frame = control_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let closes = matches!(frame, TaskFrame::Error { .. });
            if send_frame(&mut sender, &frame).await.is_err() {
                break;
            }
            if closes {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Reader: control messages from the client.
    let reader_task_id = task_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match parse_client_message(&text) {
                    ClientCommand::Stop => {
                        tracing::info!("Stop requested over stream for task {}", reader_task_id);
                        entry.request_stop();
                    }
                    ClientCommand::Ping => {
                        if control_tx.send(TaskFrame::Pong).is_err() {
                            break;
                        }
                    }
                    ClientCommand::Ignore => {}
                    ClientCommand::Malformed(reason) => {
                        tracing::debug!(
                            "Malformed stream message for task {}: {}",
                            reader_task_id,
                            reason
                        );
                        let _ = control_tx.send(TaskFrame::Error {
                            message: format!("Invalid message: {}", reason),
                        });
                        break;
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half finishes first ends the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            // control_tx is gone, so the writer flushes and closes
            let _ = send_task.await;
        }
    }
    tracing::debug!("Stream client detached from task {}", task_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(parse_client_message(r#"{"action":"stop"}"#), ClientCommand::Stop);
        assert_eq!(parse_client_message(r#"{"type":"ping"}"#), ClientCommand::Ping);
        assert_eq!(parse_client_message(r#"{"type":"hello"}"#), ClientCommand::Ignore);
        assert_eq!(parse_client_message("42"), ClientCommand::Ignore);
        assert!(matches!(
            parse_client_message("not json"),
            ClientCommand::Malformed(_)
        ));
    }
}
