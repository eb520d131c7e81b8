//! TaskStore port - ホスト型ストレージが実装する正本（source of truth）
//!
//! # 設計原則
//! - durable な ID の採番と `created_at` の刻印はストア側の責務
//! - `update` / `delete` / `get_by_id` は durable な `TaskId` だけを受け取る
//!   （プレースホルダ ID は型レベルでここに到達できない）
//! - リトライはしない: 失敗はそのまま呼び出し側へ返し、cache が
//!   ロールバックとエラー表示を行う

use async_trait::async_trait;

use crate::domain::{NewTask, OwnerId, StoreError, Task, TaskId, TaskPatch};

/// TaskStore は単一コレクションに対する create/read/update/delete
///
/// # Thread Safety
/// - `Send + Sync` を要求（session actor が spawn した round-trip から使う）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// List every task of `owner`, ordered by `created_at` descending.
    async fn list(&self, owner: OwnerId) -> Result<Vec<Task>, StoreError>;

    /// Create a task; the store assigns the durable id and `created_at`.
    async fn create(&self, new: NewTask) -> Result<Task, StoreError>;

    /// Partially update one task and return the stored record.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Delete one task. Missing rows are not an error.
    async fn delete(&self, id: TaskId) -> Result<(), StoreError>;

    /// Fetch one task by id; `None` if it does not exist.
    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
}
