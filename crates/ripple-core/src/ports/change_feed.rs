//! ChangeFeed port - 変更通知フィード（owner 単位の push ストリーム）
//!
//! # 設計原則
//! - Feed はストアの読み取り専用オブザーバ。配送保証は仮定しない
//!   （取りこぼしは既知のギャップで、ここでは補償しない）
//! - 自セッションの mutation も再配送されうる。ingest 側の各分岐は
//!   そのため冪等に書かれている
//! - レコードは loosely-typed のまま配送し、型付けと検証は
//!   `ChangeEvent::decode` が ingestion 境界で行う

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ChangeRecord, OwnerId};

/// Subscription 確立の失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
}

/// FeedEvents は一つの subscription が配送するイベント列
///
/// # 契約
/// - `next` は配送順にレコードを返す（reorder も batch もしない）
/// - `None` は subscription の終了（feed 側 close か unsubscribe）
/// - drop したら subscription は解放される
#[async_trait]
pub trait FeedEvents: Send {
    async fn next(&mut self) -> Option<ChangeRecord>;
}

/// ChangeFeed は owner 単位の subscription を確立する
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to every change of `owner`'s tasks, in delivery order.
    async fn subscribe(&self, owner: OwnerId) -> Result<Box<dyn FeedEvents>, FeedError>;
}
