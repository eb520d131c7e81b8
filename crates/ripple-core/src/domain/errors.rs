//! Errors - エラー型と分類
//!
//! # 設計原則
//! - すべて非致命的: cache は必ず描画可能な状態に戻る（optimistic 適用 or
//!   ロールバック済み）。再起動もリトライも不要で、ユーザーが再操作する
//! - `SyncError` は view 層にそのまま表示できる「最後に失敗した操作」
//! - transport エラーもストアの拒否も同じ扱い（操作単位で分類する）

use thiserror::Error;

use super::ids::TaskId;

/// StoreError は Task Store との round-trip の失敗
///
/// # 分類
/// - Unavailable: 到達不能・transport エラー
/// - NotFound: 対象レコードが存在しない
/// - Rejected: ストアがリクエストを拒否した
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(TaskId),

    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// SyncError は optimistic 操作の round-trip 失敗を操作単位で分類
///
/// view 層は `CacheView::last_error` 経由でこれを受け取り、一時的な
/// メッセージとして表示します。自動リトライは行いません。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Initial load failed; the cache was reset to empty.
    #[error("could not load tasks: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Create failed; the placeholder was removed.
    #[error("could not add task: {0}")]
    CreateFailed(#[source] StoreError),

    /// Toggle or rename failed; the field was reverted.
    #[error("could not update task: {0}")]
    UpdateFailed(#[source] StoreError),

    /// Delete failed; the entry was re-inserted if the re-fetch found it.
    #[error("could not delete task: {0}")]
    DeleteFailed(#[source] StoreError),
}
