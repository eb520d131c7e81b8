//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: TaskStore と ChangeFeed の両方を実装する
//!   開発・テスト用バックエンド（失敗注入・レイテンシ注入つき）
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します（ホスト型バックエンドの
//! HTTP/WebSocket クライアントなど）。このクレートは wire protocol を
//! スコープ外とし、ports だけを定義します。

pub mod memory;

// 主要な型を再エクスポート
pub use self::memory::{InMemoryStore, StoreOp};
