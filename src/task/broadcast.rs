//! Per-task subscriber set and the frames pushed to stream clients.
//!
//! Delivery is best-effort: each subscriber owns a bounded queue and a
//! subscriber whose queue is full or closed is dropped on the spot.

use crate::task::record::TaskSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Maximum number of frames to buffer per subscriber.
pub const SUBSCRIBER_BUFFER: usize = 128;

pub type SubscriberId = u64;

/// Frames sent to stream clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskFrame {
    /// Snapshot sent once when a subscriber attaches.
    Status { data: TaskSnapshot },
    /// Snapshot after a mutation.
    Update { data: TaskSnapshot },
    /// Gateway-level problem (unknown task, malformed message).
    Error { message: String },
    /// Answer to a client ping.
    Pong,
}

#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: SubscriberId,
    entries: Vec<(SubscriberId, mpsc::Sender<TaskFrame>)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; its queue already holds `current` as a status frame.
    pub fn attach(&mut self, current: TaskSnapshot) -> (SubscriberId, mpsc::Receiver<TaskFrame>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        // A fresh queue always has room.
        let _ = tx.try_send(TaskFrame::Status { data: current });
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, tx));
        (id, rx)
    }

    /// Idempotent: detaching an unknown id is a no-op.
    pub fn detach(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(sid, _)| *sid != id);
        self.entries.len() != before
    }

    /// Queue `snapshot` as an update frame for every subscriber.
    /// Returns how many subscribers accepted it.
    pub fn publish(&mut self, snapshot: &TaskSnapshot) -> usize {
        self.entries.retain(|(id, tx)| {
            match tx.try_send(TaskFrame::Update {
                data: snapshot.clone(),
            }) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Dropping lagging subscriber {} of task {}",
                        id,
                        snapshot.task_id
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        "Subscriber {} of task {} disconnected",
                        id,
                        snapshot.task_id
                    );
                    false
                }
            }
        });
        self.entries.len()
    }

    /// Drop every subscriber; their receivers observe end-of-stream.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::record::{TaskKind, TaskRecord};

    fn snapshot() -> TaskSnapshot {
        TaskRecord::new("t-1".into(), TaskKind::Agent).snapshot()
    }

    #[test]
    fn test_attach_queues_status_first() {
        let mut subs = Subscribers::new();
        let (_, mut rx) = subs.attach(snapshot());
        subs.publish(&snapshot());
        assert!(matches!(rx.try_recv().unwrap(), TaskFrame::Status { .. }));
        assert!(matches!(rx.try_recv().unwrap(), TaskFrame::Update { .. }));
    }

    #[test]
    fn test_closed_subscriber_does_not_block_others() {
        let mut subs = Subscribers::new();
        let (_, rx_dead) = subs.attach(snapshot());
        let (_, mut rx_live) = subs.attach(snapshot());
        drop(rx_dead);

        assert_eq!(subs.publish(&snapshot()), 1);
        assert_eq!(subs.len(), 1);
        assert!(matches!(rx_live.try_recv().unwrap(), TaskFrame::Status { .. }));
        assert!(matches!(rx_live.try_recv().unwrap(), TaskFrame::Update { .. }));
    }

    #[test]
    fn test_lagging_subscriber_is_dropped() {
        let mut subs = Subscribers::new();
        let (_, mut slow) = subs.attach(snapshot());
        let (_, mut fast) = subs.attach(snapshot());

        for _ in 0..SUBSCRIBER_BUFFER {
            subs.publish(&snapshot());
            // fast keeps up
            while fast.try_recv().is_ok() {}
        }
        assert_eq!(subs.len(), 1);

        // slow drains what it got, then sees end-of-stream
        let mut received = 0;
        while slow.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
        assert!(matches!(
            slow.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut subs = Subscribers::new();
        let (id, _rx) = subs.attach(snapshot());
        assert!(subs.detach(id));
        assert!(!subs.detach(id));
        assert!(subs.is_empty());
    }

    #[test]
    fn test_frame_wire_format() {
        let pong = serde_json::to_value(TaskFrame::Pong).unwrap();
        assert_eq!(pong, serde_json::json!({ "type": "pong" }));

        let err = serde_json::to_value(TaskFrame::Error {
            message: "Task not found".into(),
        })
        .unwrap();
        assert_eq!(
            err,
            serde_json::json!({ "type": "error", "message": "Task not found" })
        );

        let update = serde_json::to_value(TaskFrame::Update { data: snapshot() }).unwrap();
        assert_eq!(update["type"], "update");
        assert_eq!(update["data"]["task_id"], "t-1");
    }
}
