//! ripple-core
//!
//! Core building blocks for the Ripple task-list sync engine: a local
//! task cache that applies user mutations optimistically and reconciles
//! them against a remote store's change feed.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, events, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, ChangeFeed, Clock, DraftIdGenerator）
//! - **cache**: 調停ステートマシン（CacheState）と描画用スナップショット（CacheView）
//! - **app**: アプリケーションロジック（SessionBuilder, Session の actor ループ）
//! - **impls**: 実装（InMemoryStore など開発・テスト用）
//!
//! # 設計の要点
//! - cache は「知っている限りの正」。正本は常に Task Store 側にある
//! - optimistic 変更 → round-trip → settle の二相。失敗は必ずロールバック
//!   され、描画可能な状態から外れない
//! - feed は自分の mutation も再配送しうるので、ingest の各分岐は冪等

pub mod app;
pub mod cache;
pub mod domain;
pub mod impls;
pub mod ports;
