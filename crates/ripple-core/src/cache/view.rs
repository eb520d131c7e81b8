//! Rendered view of the cache, published to the view layer.

use crate::domain::{EntryId, SyncError, Task, TaskId};

/// Snapshot of the cache for rendering.
///
/// Design:
/// - The cache emits no events of its own; it republishes this snapshot on
///   every state change and the view layer re-renders from it.
/// - `adding` / `updating` / `deleting` let a view disable the matching
///   controls while the corresponding round-trip is in flight.
/// - `last_error` is the most recent failed operation, for transient
///   display; it is replaced by the next failure, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheView {
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub last_error: Option<SyncError>,
    pub editing: Option<EntryId>,
    pub adding: bool,
    pub updating: bool,
    pub deleting: Option<TaskId>,
}

impl CacheView {
    /// Find one task by entry id (rendering helper).
    pub fn task(&self, id: &EntryId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }
}
