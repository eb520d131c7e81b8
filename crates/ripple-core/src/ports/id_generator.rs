//! DraftIdGenerator port - プレースホルダ ID 生成の抽象化
//!
//! submit のたびに cache はローカルな `DraftId` を採番します。
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidDraftIds**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::DraftId;
use crate::ports::Clock;

/// DraftIdGenerator はプレースホルダ ID を生成
///
/// durable な ID との衝突は型（`DraftId` vs `TaskId`）と wire prefix の
/// 両方で防がれているので、ここでの一意性はセッション内で十分です。
///
/// # Thread Safety
/// - `Send + Sync` を要求（session actor から使える）
pub trait DraftIdGenerator: Send + Sync {
    /// Draft ID を生成
    fn next_draft_id(&self) -> DraftId;
}

/// UlidDraftIds は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って timestamp 部分を
/// 決定的にできます（random 部分は残ります）。
pub struct UlidDraftIds<C> {
    clock: C,
}

impl<C: Clock> UlidDraftIds<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> DraftIdGenerator for UlidDraftIds<C> {
    fn next_draft_id(&self) -> DraftId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        DraftId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let ids = UlidDraftIds::new(SystemClock);

        let id1 = ids.next_draft_id();
        let id2 = ids.next_draft_id();
        let id3 = ids.next_draft_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidDraftIds::new(FixedClock::new(fixed_time));

        let id1 = ids.next_draft_id();
        let id2 = ids.next_draft_id();

        // random 部分があるので ID 自体は異なる
        assert_ne!(id1, id2);

        // ただし、timestamp 部分は固定時刻のはず
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
