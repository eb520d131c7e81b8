//! SessionBuilder - セッションの構築とワイヤリング
//!
//! # 設計原則
//! - 依存（TaskStore, ChangeFeed, Clock, DraftIdGenerator）は明示的に
//!   注入する。モジュールレベルのグローバルなクライアントは持たない
//! - 起動時検証（Fail-fast 設計）: 必須の依存が欠けていれば build() が
//!   即座に BuildError を返す

use std::sync::Arc;

use crate::app::session::Session;
use crate::domain::OwnerId;
use crate::ports::{ChangeFeed, Clock, DraftIdGenerator, SystemClock, TaskStore, UlidDraftIds};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// SessionBuilder はセッションを構築
///
/// # 使用例
/// ```ignore
/// let session = SessionBuilder::new()
///     .store(store)
///     .feed(feed)
///     .build(owner)?;
/// let handle = session.spawn().await?;
/// ```
///
/// Clock と DraftIdGenerator は省略時に本番実装（SystemClock / ULID）に
/// フォールバックします。テストでは FixedClock などを注入してください。
pub struct SessionBuilder {
    store: Option<Arc<dyn TaskStore>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    clock: Arc<dyn Clock>,
    draft_ids: Option<Arc<dyn DraftIdGenerator>>,
    queue_capacity: usize,
}

/// BuildError はセッション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured. Call SessionBuilder::store() before build().")]
    MissingStore,

    #[error("no change feed configured. Call SessionBuilder::feed() before build().")]
    MissingFeed,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            feed: None,
            clock: Arc::new(SystemClock),
            draft_ids: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Task Store を注入
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Change Feed を注入
    pub fn feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// 時刻源を差し替え（省略時 SystemClock）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// プレースホルダ ID 生成器を差し替え（省略時 ULID）
    pub fn draft_ids(mut self, draft_ids: Arc<dyn DraftIdGenerator>) -> Self {
        self.draft_ids = Some(draft_ids);
        self
    }

    /// Actor キューの容量を変更
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// 検証してセッションを生成
    ///
    /// # 検証
    /// - store / feed が注入されているかチェック
    /// - 不足があれば BuildError を返す
    pub fn build(self, owner: OwnerId) -> Result<Session, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let feed = self.feed.ok_or(BuildError::MissingFeed)?;
        let draft_ids = self
            .draft_ids
            .unwrap_or_else(|| Arc::new(UlidDraftIds::new(Arc::clone(&self.clock))));
        Ok(Session {
            owner,
            store,
            feed,
            clock: self.clock,
            draft_ids,
            queue_capacity: self.queue_capacity,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
