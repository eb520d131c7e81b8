//! Session - ユーザーセッションの actor ループ
//!
//! # 設計原則
//! cache を触る非同期処理は二系統ある: ユーザー起点のコマンドと、feed が
//! push してくるイベント。どちらも単一の mpsc キューに入れ、単一の
//! consumer ループが 1 件ずつ処理します。ハンドラは同期的に完了するので、
//! 「ハンドラ同士は決して並走しない」がコードの構造として保証されます
//! （ホスト環境が真の並列性を持っていても成り立つ）。
//!
//! # Round-trip の扱い
//! コマンドハンドラは optimistic な変更を同期的に適用し、ストアへの
//! round-trip は spawn した task に切り出します。レスポンスは settlement
//! メッセージとして同じキューに戻り、他のメッセージと直列に処理されます。
//! つまり suspension point はちょうどネットワーク round-trip だけで、
//! その間も cache は描画可能なまま、feed イベントの割り込みも合法です。
//!
//! # キャンセルなし
//! 発行済みの round-trip は完了（成功 or 失敗）まで走り、放棄されません。
//! 同じレコードへの後続操作は cache 状態へのレースとして解決されます。

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::cache::{CacheState, CacheView};
use crate::domain::{
    ChangeEvent, ChangeRecord, DraftId, EntryId, NewTask, OwnerId, StoreError, Task, TaskId,
    TaskPatch,
};
use crate::ports::{ChangeFeed, Clock, DraftIdGenerator, FeedError, TaskStore};

/// Commands the view layer can issue against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit { title: String },
    Toggle { id: EntryId },
    BeginEdit { id: EntryId },
    CancelEdit,
    Rename { id: EntryId, title: String },
    Remove { id: EntryId },
}

/// Everything the single consumer loop processes, one at a time.
enum Msg {
    Command(Command),
    Feed(ChangeRecord),
    Settled(Settlement),
    Shutdown,
}

/// Store round-trip results re-entering the queue.
enum Settlement {
    Loaded(Result<Vec<Task>, StoreError>),
    Created {
        draft: DraftId,
        result: Result<Task, StoreError>,
    },
    Toggled {
        id: TaskId,
        prev: bool,
        result: Result<Task, StoreError>,
    },
    Renamed {
        id: TaskId,
        prev: String,
        result: Result<Task, StoreError>,
    },
    Removed {
        id: TaskId,
        result: Result<(), StoreError>,
        refetched: Option<Task>,
    },
}

/// The session was shut down (or its actor is gone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session is no longer running")]
pub struct SessionClosed;

/// A wired-up session, ready to spawn. Built by `SessionBuilder`.
pub struct Session {
    pub(crate) owner: OwnerId,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) feed: Arc<dyn ChangeFeed>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) draft_ids: Arc<dyn DraftIdGenerator>,
    pub(crate) queue_capacity: usize,
}

impl Session {
    /// Subscribe to the feed, start the consumer loop and the initial load.
    ///
    /// The subscription is established before the load is issued, so no
    /// change slips between the two; events arriving while the load is in
    /// flight are superseded by the load settlement replacing the sequence.
    pub async fn spawn(self) -> Result<SessionHandle, FeedError> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let state = CacheState::new(self.owner);
        let (views, view_rx) = watch::channel(state.snapshot());

        let mut events = self.feed.subscribe(self.owner).await?;
        let pump_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(record) = events.next().await {
                if pump_tx.send(Msg::Feed(record)).await.is_err() {
                    break;
                }
            }
            // Dropping `events` here releases the subscription.
        });

        let load_store = Arc::clone(&self.store);
        let load_tx = tx.clone();
        let owner = self.owner;
        tokio::spawn(async move {
            let result = load_store.list(owner).await;
            let _ = load_tx.send(Msg::Settled(Settlement::Loaded(result))).await;
        });

        let worker = Worker {
            state,
            store: self.store,
            clock: self.clock,
            draft_ids: self.draft_ids,
            views,
            settle_tx: tx.clone(),
        };
        tokio::spawn(worker.run(rx));

        Ok(SessionHandle { tx, views: view_rx })
    }
}

/// Handle exposed to the view layer: the five operations as commands, plus
/// the observable view state.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Msg>,
    views: watch::Receiver<CacheView>,
}

impl SessionHandle {
    /// Current snapshot for rendering.
    pub fn view(&self) -> CacheView {
        self.views.borrow().clone()
    }

    /// Watch channel republished on every state change.
    pub fn watch(&self) -> watch::Receiver<CacheView> {
        self.views.clone()
    }

    /// Wait until the view satisfies `cond` and return that snapshot.
    pub async fn wait_until(&self, mut cond: impl FnMut(&CacheView) -> bool) -> CacheView {
        let mut rx = self.views.clone();
        loop {
            {
                let view = rx.borrow_and_update();
                if cond(&view) {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    pub async fn submit(&self, title: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Command::Submit { title: title.into() }).await
    }

    pub async fn toggle(&self, id: EntryId) -> Result<(), SessionClosed> {
        self.send(Command::Toggle { id }).await
    }

    pub async fn begin_edit(&self, id: EntryId) -> Result<(), SessionClosed> {
        self.send(Command::BeginEdit { id }).await
    }

    pub async fn cancel_edit(&self) -> Result<(), SessionClosed> {
        self.send(Command::CancelEdit).await
    }

    pub async fn rename(&self, id: EntryId, title: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Command::Rename { id, title: title.into() }).await
    }

    pub async fn remove(&self, id: EntryId) -> Result<(), SessionClosed> {
        self.send(Command::Remove { id }).await
    }

    /// Stop the consumer loop and release the feed subscription.
    ///
    /// In-flight round-trips still run to completion, but nobody is left
    /// to observe their settlements.
    pub async fn shutdown(&self) -> Result<(), SessionClosed> {
        self.tx.send(Msg::Shutdown).await.map_err(|_| SessionClosed)
    }

    async fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.tx
            .send(Msg::Command(command))
            .await
            .map_err(|_| SessionClosed)
    }
}

/// The single consumer: owns the cache, handles one message to completion
/// before taking the next.
struct Worker {
    state: CacheState,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    draft_ids: Arc<dyn DraftIdGenerator>,
    views: watch::Sender<CacheView>,
    settle_tx: mpsc::Sender<Msg>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Msg>) {
        info!(owner = %self.state.owner(), "session started");
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Shutdown => break,
                Msg::Command(command) => self.handle_command(command),
                Msg::Feed(record) => self.handle_feed(record),
                Msg::Settled(settlement) => self.handle_settlement(settlement),
            }
            self.views.send_replace(self.state.snapshot());
        }
        info!(owner = %self.state.owner(), "session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { title } => self.submit(title),
            Command::Toggle { id } => self.toggle(id),
            Command::BeginEdit { id } => self.state.begin_edit(id),
            Command::CancelEdit => self.state.cancel_edit(),
            Command::Rename { id, title } => self.rename(id, title),
            Command::Remove { id } => self.remove(id),
        }
    }

    fn submit(&mut self, title: String) {
        // Blank titles are a no-op, not an error.
        if title.trim().is_empty() {
            return;
        }
        let owner = self.state.owner();
        let draft_id = self.draft_ids.next_draft_id();
        self.state
            .begin_submit(Task::draft(draft_id, owner, title.clone(), self.clock.now()));

        let store = Arc::clone(&self.store);
        let tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let result = store
                .create(NewTask {
                    owner,
                    title,
                    completed: false,
                    origin: Some(draft_id),
                })
                .await;
            let _ = tx
                .send(Msg::Settled(Settlement::Created { draft: draft_id, result }))
                .await;
        });
    }

    fn toggle(&mut self, id: EntryId) {
        let Some(task_id) = id.as_durable() else {
            debug!(%id, "toggle on an unconfirmed placeholder; dropped");
            return;
        };
        let Some(prev) = self.state.begin_toggle(task_id) else {
            return;
        };

        let store = Arc::clone(&self.store);
        let tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let result = store.update(task_id, TaskPatch::completed(!prev)).await;
            let _ = tx
                .send(Msg::Settled(Settlement::Toggled { id: task_id, prev, result }))
                .await;
        });
    }

    fn rename(&mut self, id: EntryId, title: String) {
        let Some(task_id) = id.as_durable() else {
            debug!(%id, "rename on an unconfirmed placeholder; dropped");
            return;
        };
        let Some(prev) = self.state.begin_rename(task_id, title.clone()) else {
            return;
        };

        let store = Arc::clone(&self.store);
        let tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let result = store.update(task_id, TaskPatch::title(title)).await;
            let _ = tx
                .send(Msg::Settled(Settlement::Renamed { id: task_id, prev, result }))
                .await;
        });
    }

    fn remove(&mut self, id: EntryId) {
        if self.state.begin_remove(id).is_none() {
            return;
        }
        // A placeholder has no durable record yet; removing it is local only.
        let Some(task_id) = id.as_durable() else {
            return;
        };

        let store = Arc::clone(&self.store);
        let tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let result = store.delete(task_id).await;
            let refetched = match &result {
                Ok(()) => None,
                // Failed delete: check whether the row still exists so the
                // entry can be restored, or is already gone.
                Err(_) => match store.get_by_id(task_id).await {
                    Ok(found) => found,
                    Err(err) => {
                        warn!(id = %task_id, error = %err, "re-fetch after failed delete also failed");
                        None
                    }
                },
            };
            let _ = tx
                .send(Msg::Settled(Settlement::Removed { id: task_id, result, refetched }))
                .await;
        });
    }

    fn handle_feed(&mut self, record: ChangeRecord) {
        match ChangeEvent::decode(&record, self.state.owner()) {
            Ok(event) => self.state.apply_change(event),
            Err(err) => warn!(kind = %record.kind, error = %err, "feed record rejected"),
        }
    }

    fn handle_settlement(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Loaded(result) => {
                if let Err(err) = &result {
                    warn!(error = %err, "initial load failed");
                }
                self.state.finish_load(result);
            }
            Settlement::Created { draft, result } => {
                if let Err(err) = &result {
                    warn!(%draft, error = %err, "create failed; placeholder removed");
                }
                self.state.settle_create(draft, result);
            }
            Settlement::Toggled { id, prev, result } => {
                if let Err(err) = &result {
                    warn!(%id, error = %err, "toggle failed; reverted");
                }
                self.state.settle_toggle(id, prev, result);
            }
            Settlement::Renamed { id, prev, result } => {
                if let Err(err) = &result {
                    warn!(%id, error = %err, "rename failed; reverted");
                }
                self.state.settle_rename(id, prev, result);
            }
            Settlement::Removed { id, result, refetched } => {
                if let Err(err) = &result {
                    warn!(%id, error = %err, "delete failed");
                }
                self.state.settle_remove(id, result, refetched);
            }
        }
    }
}
