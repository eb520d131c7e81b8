//! In-memory store + feed implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use ulid::{Generator, Ulid};

use crate::domain::{
    ChangeRecord, EntryId, NewTask, OwnerId, StoreError, Task, TaskId, TaskPatch,
};
use crate::ports::{ChangeFeed, Clock, FeedError, FeedEvents, SystemClock, TaskStore};

/// One store operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Create,
    Update,
    Delete,
    Get,
}

/// Per-owner feed subscriber.
struct Subscriber {
    owner: OwnerId,
    tx: mpsc::Sender<ChangeRecord>,
}

/// In-memory store state.
struct StoreState {
    /// All durable task records (single source of truth).
    tasks: HashMap<TaskId, Task>,

    /// Live feed subscriptions; pruned lazily when a send finds them closed.
    subscribers: Vec<Subscriber>,

    /// Remaining injected failures per operation.
    fail_next: HashMap<StoreOp, u32>,

    /// Durable id source; monotonic within a millisecond, so ties on
    /// `created_at` still break in creation order.
    ulids: Generator,
}

impl StoreState {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            subscribers: Vec::new(),
            fail_next: HashMap::new(),
            ulids: Generator::new(),
        }
    }

    fn allocate_task_id(&mut self, now: DateTime<Utc>) -> TaskId {
        match self.ulids.generate_from_datetime(now.into()) {
            Ok(ulid) => TaskId::from(ulid),
            // Random-part overflow within one millisecond; fall back to a
            // fresh random ULID for the same timestamp.
            Err(_) => TaskId::from(Ulid::from_parts(
                now.timestamp_millis() as u64,
                rand::random(),
            )),
        }
    }

    /// Consume one injected failure for `op`, if any is armed.
    fn take_injected_failure(&mut self, op: StoreOp) -> Option<StoreError> {
        let left = self.fail_next.get_mut(&op)?;
        *left -= 1;
        let spent = *left == 0;
        if spent {
            self.fail_next.remove(&op);
        }
        Some(StoreError::Unavailable(format!("injected failure for {op:?}")))
    }

    /// Fan the record out to every live subscriber of `owner`.
    ///
    /// Delivery is best-effort: a closed subscription is pruned, a full one
    /// drops the record (the feed contract promises no delivery guarantee).
    fn emit(&mut self, owner: OwnerId, record: ChangeRecord) {
        self.subscribers.retain(|s| !s.tx.is_closed());
        for sub in self.subscribers.iter().filter(|s| s.owner == owner) {
            if sub.tx.try_send(record.clone()).is_err() {
                debug!(owner = %owner, kind = %record.kind, "subscriber backlogged; record dropped");
            }
        }
    }
}

/// In-memory `TaskStore` + `ChangeFeed` for development and tests.
///
/// Design:
/// - The store assigns durable ULID ids and stamps `created_at` with its
///   own clock, like the hosted backend would.
/// - Every mutation is broadcast to subscribers of the owning user, so a
///   session observes its own mutations again through the feed (the
///   redelivery scenario the cache has to be idempotent against).
/// - `fail_next` forces upcoming calls of one operation to fail, driving
///   the rollback paths; `with_latency` delays every call so optimistic
///   states stay observable.
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new())),
            clock: Arc::new(SystemClock),
            latency: None,
        }
    }

    /// Replace the clock used for durable ids and `created_at` stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Delay every store call, keeping optimistic states visible.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Arm the next `count` calls of `op` to fail.
    pub async fn fail_next(&self, op: StoreOp, count: u32) {
        let mut state = self.state.lock().await;
        if count == 0 {
            state.fail_next.remove(&op);
        } else {
            state.fail_next.insert(op, count);
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Number of live subscriptions (for testing).
    #[cfg(test)]
    pub async fn subscriber_count(&self) -> usize {
        let state = self.state.lock().await;
        state.subscribers.iter().filter(|s| !s.tx.is_closed()).count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn list(&self, owner: OwnerId) -> Result<Vec<Task>, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_injected_failure(StoreOp::List) {
            return Err(err);
        }

        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        // created_at descending, newest durable id first on ties.
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.id.as_durable().cmp(&a.id.as_durable()))
        });
        Ok(tasks)
    }

    async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_injected_failure(StoreOp::Create) {
            return Err(err);
        }

        let now = self.clock.now();
        let id = state.allocate_task_id(now);
        let task = Task {
            id: EntryId::Durable(id),
            owner: new.owner,
            title: new.title,
            completed: new.completed,
            created_at: now,
        };
        state.tasks.insert(id, task.clone());
        state.emit(new.owner, ChangeRecord::insert(&task, new.origin));
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_injected_failure(StoreOp::Update) {
            return Err(err);
        }

        let Some(task) = state.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        patch.apply(task);
        let task = task.clone();
        state.emit(task.owner, ChangeRecord::update(&task));
        Ok(task)
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_injected_failure(StoreOp::Delete) {
            return Err(err);
        }

        // Missing rows are not an error, and emit nothing.
        if let Some(task) = state.tasks.remove(&id) {
            state.emit(task.owner, ChangeRecord::delete(id));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_injected_failure(StoreOp::Get) {
            return Err(err);
        }

        Ok(state.tasks.get(&id).cloned())
    }
}

/// Feed subscription backed by a bounded channel.
struct MemoryFeedEvents {
    rx: mpsc::Receiver<ChangeRecord>,
}

#[async_trait]
impl FeedEvents for MemoryFeedEvents {
    async fn next(&mut self) -> Option<ChangeRecord> {
        self.rx.recv().await
    }
}

#[async_trait]
impl ChangeFeed for InMemoryStore {
    async fn subscribe(&self, owner: OwnerId) -> Result<Box<dyn FeedEvents>, FeedError> {
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.state.lock().await;
        state.subscribers.push(Subscriber { owner, tx });
        Ok(Box::new(MemoryFeedEvents { rx }))
    }
}
