//! Process-wide task registry.
//!
//! Lock order: the registry map lock may be held while taking a task entry
//! lock, never the other way round.

use crate::task::broadcast::{SubscriberId, Subscribers, TaskFrame};
use crate::task::record::{TaskKind, TaskRecord, TaskSnapshot, TaskStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct TaskState {
    record: TaskRecord,
    subscribers: Subscribers,
}

/// One registered task: its record, its subscribers and its cancellation token.
///
/// Record mutations and fan-out happen under the same lock, so every
/// subscriber sees snapshots in mutation order.
pub struct TaskEntry {
    task_id: String,
    state: Mutex<TaskState>,
    cancel: CancellationToken,
}

impl TaskEntry {
    fn new(task_id: String, kind: TaskKind) -> Self {
        Self {
            state: Mutex::new(TaskState {
                record: TaskRecord::new(task_id.clone(), kind),
                subscribers: Subscribers::new(),
            }),
            task_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.lock().record.snapshot()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().record.status()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().record.is_stopped()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply `f` to the record and broadcast if it reports a change.
    pub fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TaskRecord) -> bool,
    {
        let mut state = self.state.lock();
        let changed = f(&mut state.record);
        if changed {
            let snapshot = state.record.snapshot();
            state.subscribers.publish(&snapshot);
        }
        changed
    }

    /// Broadcast the current snapshot to every subscriber.
    pub fn notify(&self) -> usize {
        let mut state = self.state.lock();
        let snapshot = state.record.snapshot();
        state.subscribers.publish(&snapshot)
    }

    /// Attach a subscriber. The current snapshot is queued before any later update.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut state = self.state.lock();
        let snapshot = state.record.snapshot();
        let (id, receiver) = state.subscribers.attach(snapshot);
        tracing::debug!("Subscriber {} attached to task {}", id, self.task_id);
        Subscription {
            id,
            receiver,
            entry: Arc::clone(self),
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.state.lock().subscribers.detach(id);
        if removed {
            tracing::debug!("Subscriber {} detached from task {}", id, self.task_id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Stop procedure: flag, signal cancellation, mark stopped, broadcast.
    /// A terminal task is left untouched. Returns the resulting snapshot.
    pub fn request_stop(&self) -> TaskSnapshot {
        let mut state = self.state.lock();
        if state.record.status().is_terminal() {
            return state.record.snapshot();
        }
        state.record.mark_stop_requested();
        self.cancel.cancel();
        state.record.stop();
        let snapshot = state.record.snapshot();
        state.subscribers.publish(&snapshot);
        tracing::info!("Task {} stopped", self.task_id);
        snapshot
    }

    /// Stop if still live and disconnect every subscriber.
    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.record.status().is_terminal() {
            state.record.stop();
            self.cancel.cancel();
            let snapshot = state.record.snapshot();
            state.subscribers.publish(&snapshot);
        }
        state.subscribers.clear();
    }

    fn finished_at(&self) -> Option<Instant> {
        let state = self.state.lock();
        if state.record.status().is_terminal() {
            state.record.finished_at()
        } else {
            None
        }
    }
}

/// A live subscription to one task's frames; detaches itself on drop.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<TaskFrame>,
    entry: Arc<TaskEntry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame; `None` once the broadcaster dropped this subscriber or the task was evicted.
    pub async fn recv(&mut self) -> Option<TaskFrame> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TaskFrame> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.entry.unsubscribe(self.id);
    }
}

/// Task id → entry map, constructed once and shared through `AppState`.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskEntry>>>,
    max_tasks: usize,
}

impl TaskRegistry {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            max_tasks: max_tasks.max(1),
        }
    }

    /// Insert a fresh `starting` task under a new unique id.
    pub fn create(&self, kind: TaskKind) -> Arc<TaskEntry> {
        let mut tasks = self.tasks.write();

        if tasks.len() >= self.max_tasks {
            let excess = tasks.len() + 1 - self.max_tasks;
            let evicted = evict_oldest_finished(&mut tasks, excess);
            if evicted < excess {
                tracing::warn!(
                    "Task registry over capacity ({} tasks, cap {}): all remaining tasks are live",
                    tasks.len(),
                    self.max_tasks
                );
            }
        }

        let task_id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !tasks.contains_key(&candidate) {
                break candidate;
            }
        };
        let entry = Arc::new(TaskEntry::new(task_id.clone(), kind));
        tasks.insert(task_id, Arc::clone(&entry));
        entry
    }

    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.entry(task_id).map(|entry| entry.snapshot())
    }

    pub fn entry(&self, task_id: &str) -> Option<Arc<TaskEntry>> {
        self.tasks.read().get(task_id).cloned()
    }

    pub fn exists(&self, task_id: &str) -> bool {
        self.tasks.read().contains_key(task_id)
    }

    /// Evict a task; a live task is stopped and its subscribers disconnected.
    pub fn remove(&self, task_id: &str) -> bool {
        let removed = self.tasks.write().remove(task_id);
        match removed {
            Some(entry) => {
                entry.shutdown();
                true
            }
            None => false,
        }
    }

    /// Remove terminal tasks that finished more than `retention` ago.
    pub fn evict_expired(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut tasks = self.tasks.write();
        let expired: Vec<String> = tasks
            .iter()
            .filter(|(_, entry)| {
                entry
                    .finished_at()
                    .map(|at| now.saturating_duration_since(at) >= retention)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = tasks.remove(id) {
                entry.shutdown();
            }
        }
        expired.len()
    }

    /// Stop every live task (graceful shutdown).
    pub fn cancel_all(&self) {
        let entries: Vec<Arc<TaskEntry>> = self.tasks.read().values().cloned().collect();
        for entry in entries {
            entry.request_stop();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

fn evict_oldest_finished(tasks: &mut HashMap<String, Arc<TaskEntry>>, count: usize) -> usize {
    let mut finished: Vec<(Instant, String)> = tasks
        .iter()
        .filter_map(|(id, entry)| entry.finished_at().map(|at| (at, id.clone())))
        .collect();
    finished.sort();
    let mut evicted = 0;
    for (_, id) in finished.into_iter().take(count) {
        if let Some(entry) = tasks.remove(&id) {
            entry.shutdown();
            evicted += 1;
        }
    }
    evicted
}

/// Periodically evict expired finished tasks.
pub fn spawn_janitor(
    registry: Arc<TaskRegistry>,
    interval: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry.evict_expired(retention);
            if removed > 0 {
                tracing::info!("Evicted {} finished tasks", removed);
            }
        }
    })
}
