//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部コラボレーター（ホスト型ストレージ、変更通知フィード、
//! 時刻、ID 生成）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - Task Store が source of truth（正本）。cache は「知っている限りの正」
//! - Change Feed はストアの読み取り専用オブザーバで、所有者ではない
//! - 時刻と ID 生成も port にして、テストで差し替え可能にする

pub mod change_feed;
pub mod clock;
pub mod id_generator;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::change_feed::{ChangeFeed, FeedError, FeedEvents};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{DraftIdGenerator, UlidDraftIds};
pub use self::task_store::TaskStore;
