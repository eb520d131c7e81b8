//! Task entity and store request shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DraftId, EntryId, OwnerId, TaskId};

/// The sole entity of the system: one todo item.
///
/// Design:
/// - `id` is an `EntryId`: durable (store-assigned) or draft (local
///   placeholder awaiting create confirmation). The two namespaces are
///   disjoint by type, so a placeholder can never collide with a store id.
/// - `created_at` drives the initial descending sort only; later insertions
///   are prepended, so the sequence reflects recency of operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntryId,
    pub owner: OwnerId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build the optimistic placeholder inserted before the store confirms.
    pub fn draft(id: DraftId, owner: OwnerId, title: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::Draft(id),
            owner,
            title,
            completed: false,
            created_at,
        }
    }

    /// Is this entry still awaiting create confirmation?
    pub fn is_draft(&self) -> bool {
        self.id.is_draft()
    }
}

/// Create request sent to the store.
///
/// `origin` is the client-generated draft id, carried through as an
/// idempotency token. A store that persists it will echo it back in the
/// feed's insert event, which lets the cache correlate the event with the
/// placeholder exactly instead of by title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub owner: OwnerId,
    pub title: String,
    pub completed: bool,
    pub origin: Option<DraftId>,
}

/// Partial update sent to the store. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            completed: None,
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            title: None,
            completed: Some(completed),
        }
    }

    /// Apply the patch in place (used by store implementations).
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn owner() -> OwnerId {
        OwnerId::from_ulid(Ulid::new())
    }

    #[test]
    fn draft_starts_uncompleted() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let task = Task::draft(DraftId::from_ulid(Ulid::new()), owner(), "Buy milk".into(), at);

        assert!(task.is_draft());
        assert!(!task.completed);
        assert_eq!(task.created_at, at);
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut task = Task {
            id: EntryId::Durable(TaskId::from_ulid(Ulid::new())),
            owner: owner(),
            title: "old".into(),
            completed: false,
            created_at: at,
        };

        TaskPatch::completed(true).apply(&mut task);
        assert!(task.completed);
        assert_eq!(task.title, "old");

        TaskPatch::title("new").apply(&mut task);
        assert_eq!(task.title, "new");
        assert!(task.completed);

        TaskPatch::default().apply(&mut task);
        assert_eq!(task.title, "new");
        assert!(task.completed);
    }

    #[test]
    fn task_wire_form_uses_prefixed_entry_id() {
        let ulid = Ulid::new();
        let task = Task {
            id: EntryId::Durable(TaskId::from_ulid(ulid)),
            owner: owner(),
            title: "wire".into(),
            completed: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["id"], format!("task-{ulid}"));

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }
}
