//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + ジェネリック実装
//! ID には ULID (Universally Unique Lexicographically Sortable Identifier)
//! を使用します。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしでクライアント側でも生成できる
//! - **UUID互換**: 128-bit で UUID と同じサイズ
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わない（PhantomData）マーカー型として、
//! コンパイル時の型安全性を提供します。
//!
//! ## なぜこのパターンを使うのか？
//! - TaskId（ストア採番）と DraftId（ローカル採番のプレースホルダ）は
//!   別の名前空間に属する。型が違えば混同はコンパイルエラーになる
//! - Display プレフィックス（"task-", "draft-", "user-"）により
//!   文字列化した後も名前空間が衝突しない

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "draft-", "user-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しませんが、
/// コンパイル時に型安全性を提供します。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// Serialize as the bare ULID string; the prefix belongs to Display / EntryId.
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_ulid(Ulid::deserialize(deserializer)?))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型（ストアが採番する durable ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Draft のマーカー型（ローカル採番のプレースホルダ ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Draft {}

impl IdMarker for Draft {
    fn prefix() -> &'static str {
        "draft-"
    }
}

/// Owner のマーカー型（認証済みユーザー）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {}

impl IdMarker for Owner {
    fn prefix() -> &'static str {
        "user-"
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of a durable Task (assigned by the store).
pub type TaskId = Id<Task>;

/// Identifier of a local placeholder entry (assigned by the client).
pub type DraftId = Id<Draft>;

/// Identifier of the authenticated user a task belongs to.
pub type OwnerId = Id<Owner>;

/// EntryId は cache が保持するエントリの ID
///
/// ストア採番の `TaskId` か、create 確定前のローカル `DraftId` のどちらか。
/// 名前空間が型で分離されているため、プレースホルダ ID が durable ID と
/// 衝突することは構造的にあり得ません。
///
/// Wire 形式はプレフィックス付き文字列（"task-…" / "draft-…"）で、
/// 文字列化した後も両者を区別できます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    Durable(TaskId),
    Draft(DraftId),
}

impl EntryId {
    /// エントリがまだ create 確定前のプレースホルダか
    pub fn is_draft(&self) -> bool {
        matches!(self, EntryId::Draft(_))
    }

    /// Durable な TaskId を取り出す（draft なら None）
    pub fn as_durable(&self) -> Option<TaskId> {
        match self {
            EntryId::Durable(id) => Some(*id),
            EntryId::Draft(_) => None,
        }
    }
}

impl From<TaskId> for EntryId {
    fn from(id: TaskId) -> Self {
        EntryId::Durable(id)
    }
}

impl From<DraftId> for EntryId {
    fn from(id: DraftId) -> Self {
        EntryId::Draft(id)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Durable(id) => id.fmt(f),
            EntryId::Draft(id) => id.fmt(f),
        }
    }
}

/// Prefixed-string 形式のパースエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry id: {0:?}")]
pub struct ParseEntryIdError(String);

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |rest: &str| Ulid::from_string(rest).map_err(|_| ParseEntryIdError(s.into()));
        if let Some(rest) = s.strip_prefix(Task::prefix()) {
            Ok(EntryId::Durable(TaskId::from_ulid(parse(rest)?)))
        } else if let Some(rest) = s.strip_prefix(Draft::prefix()) {
            Ok(EntryId::Draft(DraftId::from_ulid(parse(rest)?)))
        } else {
            Err(ParseEntryIdError(s.into()))
        }
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
