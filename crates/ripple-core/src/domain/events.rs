//! Events - Change Feed のイベント型
//!
//! # 設計原則
//! Feed は loosely-typed なレコード（kind 文字列 + JSON payload）を配送
//! します。これを信用してそのまま使うのではなく、ingestion 境界で閉じた
//! tagged variant（Inserted / Updated / Deleted）へデコード・検証します。
//!
//! - 未知の kind、壊れた payload は `DecodeError` として reject
//! - 他ユーザーのタスクはここで reject（cache には決して入らない）
//! - reject は非致命的: 呼び出し側は warn を出して読み捨てる

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ids::{DraftId, OwnerId, TaskId};
use super::task::Task;

/// Wire 形式のイベントレコード（feed がそのまま配送する形）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: String,
    pub payload: Value,
}

pub const KIND_INSERT: &str = "insert";
pub const KIND_UPDATE: &str = "update";
pub const KIND_DELETE: &str = "delete";

/// Insert payload: the task plus the optional origin token.
///
/// `origin` is the client draft id echoed back by stores that persist it;
/// feeds that do not echo it still decode fine (the field defaults to None
/// and correlation falls back to the title heuristic).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsertPayload {
    #[serde(flatten)]
    task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<DraftId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeletePayload {
    id: TaskId,
}

impl ChangeRecord {
    pub fn insert(task: &Task, origin: Option<DraftId>) -> Self {
        Self {
            kind: KIND_INSERT.into(),
            payload: serde_json::to_value(InsertPayload {
                task: task.clone(),
                origin,
            })
            .expect("task serializes"),
        }
    }

    pub fn update(task: &Task) -> Self {
        Self {
            kind: KIND_UPDATE.into(),
            payload: serde_json::to_value(task).expect("task serializes"),
        }
    }

    pub fn delete(id: TaskId) -> Self {
        Self {
            kind: KIND_DELETE.into(),
            payload: serde_json::to_value(DeletePayload { id }).expect("id serializes"),
        }
    }
}

/// ChangeEvent は検証済みの閉じたイベント型
///
/// cache が ingest するのはこの型だけです。
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A task appeared in the store (possibly our own create, redelivered).
    Inserted {
        task: Task,
        origin: Option<DraftId>,
    },

    /// Full-record replacement, last-writer-wins.
    Updated { task: Task },

    /// A task disappeared from the store.
    Deleted { id: TaskId },
}

/// Ingestion 境界での reject 理由
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event kind: {0:?}")]
    UnknownKind(String),

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("event for foreign owner {got} (session owner {expected})")]
    ForeignOwner { expected: OwnerId, got: OwnerId },

    #[error("{kind} event carries a placeholder id")]
    PlaceholderId { kind: &'static str },
}

impl ChangeEvent {
    /// Wire レコードをデコードし、セッションの owner に対して検証する
    ///
    /// Delete payload は id しか運ばないので owner 検証の対象外
    /// （cache 内のエントリは全て自分のものなので、一致すればそれは自分の
    /// タスクの削除、しなければ no-op）。
    pub fn decode(record: &ChangeRecord, owner: OwnerId) -> Result<Self, DecodeError> {
        match record.kind.as_str() {
            KIND_INSERT => {
                let p: InsertPayload = parse(KIND_INSERT, &record.payload)?;
                check_owner(owner, p.task.owner)?;
                check_durable(KIND_INSERT, &p.task)?;
                Ok(ChangeEvent::Inserted {
                    task: p.task,
                    origin: p.origin,
                })
            }
            KIND_UPDATE => {
                let task: Task = parse(KIND_UPDATE, &record.payload)?;
                check_owner(owner, task.owner)?;
                check_durable(KIND_UPDATE, &task)?;
                Ok(ChangeEvent::Updated { task })
            }
            KIND_DELETE => {
                let p: DeletePayload = parse(KIND_DELETE, &record.payload)?;
                Ok(ChangeEvent::Deleted { id: p.id })
            }
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    payload: &Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload.clone()).map_err(|source| DecodeError::Malformed { kind, source })
}

fn check_owner(expected: OwnerId, got: OwnerId) -> Result<(), DecodeError> {
    if expected == got {
        Ok(())
    } else {
        Err(DecodeError::ForeignOwner { expected, got })
    }
}

// The store never emits placeholder ids; a record carrying one is malformed.
fn check_durable(kind: &'static str, task: &Task) -> Result<(), DecodeError> {
    if task.id.is_draft() {
        Err(DecodeError::PlaceholderId { kind })
    } else {
        Ok(())
    }
}
