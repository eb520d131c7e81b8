//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **SessionBuilder**: 依存のワイヤリングと起動時検証
//! - **Session / SessionHandle**: ユーザーセッションの actor ループと、
//!   view 層に公開するコマンド＋観測可能状態

pub mod builder;
pub mod session;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SessionBuilder};
pub use self::session::{Command, Session, SessionClosed, SessionHandle};
