//! Reconciling cache state machine.

use tracing::debug;

use super::view::CacheView;
use crate::domain::{
    ChangeEvent, DraftId, EntryId, OwnerId, StoreError, SyncError, Task, TaskId,
};

/// Authoritative-as-known local view of one user's task list.
///
/// Design:
/// - Single source of truth for the entry sequence; the session actor owns
///   exactly one `CacheState` and every handler mutates it to completion
///   before the next message is consumed.
/// - Two phases per user command: `begin_*` applies the optimistic mutation
///   synchronously, `settle_*` reconciles the store response later. Feed
///   events go through `apply_change`. Any interleaving of settlements and
///   feed events between the two phases is legal; every branch is written
///   to be idempotent against a state that already matches.
/// - Ordering is "recency of operation": the initial load keeps the store's
///   `created_at`-descending order, later insertions are prepended, re-added
///   entries (failed delete) are appended.
#[derive(Debug)]
pub struct CacheState {
    owner: OwnerId,
    entries: Vec<Task>,
    loading: bool,
    last_error: Option<SyncError>,
    editing: Option<EntryId>,
    adding: bool,
    updating: bool,
    deleting: Option<TaskId>,
}

impl CacheState {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            entries: Vec::new(),
            loading: true,
            last_error: None,
            editing: None,
            adding: false,
            updating: false,
            deleting: None,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn entries(&self) -> &[Task] {
        &self.entries
    }

    /// Snapshot for the view layer.
    pub fn snapshot(&self) -> CacheView {
        CacheView {
            tasks: self.entries.clone(),
            loading: self.loading,
            last_error: self.last_error.clone(),
            editing: self.editing,
            adding: self.adding,
            updating: self.updating,
            deleting: self.deleting,
        }
    }

    // ----- initial load -----

    /// Ingest the `list(owner)` response. The whole sequence is replaced;
    /// on failure the cache is reset to empty and the error surfaced.
    pub fn finish_load(&mut self, result: Result<Vec<Task>, StoreError>) {
        self.loading = false;
        match result {
            Ok(mut tasks) => {
                // Tasks of other users are never admitted.
                tasks.retain(|t| t.owner == self.owner);
                self.entries = tasks;
            }
            Err(err) => {
                self.entries.clear();
                self.last_error = Some(SyncError::StoreUnavailable(err));
            }
        }
    }

    // ----- submit -----

    /// Optimistic phase: prepend the placeholder, visible immediately.
    pub fn begin_submit(&mut self, draft: Task) {
        debug_assert!(draft.is_draft());
        self.entries.insert(0, draft);
        self.adding = true;
    }

    /// Reconcile the create response.
    ///
    /// If the placeholder is gone by now (removed locally, or already
    /// replaced via the feed), success degrades to insert-if-absent.
    pub fn settle_create(&mut self, draft: DraftId, result: Result<Task, StoreError>) {
        self.adding = false;
        match result {
            Ok(task) => {
                if let Some(i) = self.position_of(EntryId::Draft(draft)) {
                    self.entries[i] = task;
                } else if self.position_of(task.id).is_none() {
                    debug!(id = %task.id, "create confirmed after placeholder left; re-admitting");
                    self.entries.insert(0, task);
                }
            }
            Err(err) => {
                self.entries.retain(|t| t.id != EntryId::Draft(draft));
                self.last_error = Some(SyncError::CreateFailed(err));
            }
        }
    }

    // ----- toggle completion -----

    /// Optimistic phase: flip `completed` in place. Returns the prior value
    /// for the settle phase, `None` if the entry is gone.
    pub fn begin_toggle(&mut self, id: TaskId) -> Option<bool> {
        let i = self.position_of(EntryId::Durable(id))?;
        let prev = self.entries[i].completed;
        self.entries[i].completed = !prev;
        self.updating = true;
        Some(prev)
    }

    /// Reconcile the update response. A response for an entry that has been
    /// deleted meanwhile is discarded; on success the optimistic flip
    /// already matches the store, so there is nothing to apply.
    pub fn settle_toggle(&mut self, id: TaskId, prev: bool, result: Result<Task, StoreError>) {
        self.updating = false;
        if let Err(err) = result {
            if let Some(i) = self.position_of(EntryId::Durable(id)) {
                self.entries[i].completed = prev;
            }
            self.last_error = Some(SyncError::UpdateFailed(err));
        }
    }

    // ----- rename -----

    /// Enter the editing interaction state for an existing entry.
    pub fn begin_edit(&mut self, id: EntryId) {
        if self.position_of(id).is_some() {
            self.editing = Some(id);
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Optimistic phase: set the new title, remembering the prior one.
    pub fn begin_rename(&mut self, id: TaskId, title: String) -> Option<String> {
        let i = self.position_of(EntryId::Durable(id))?;
        let prev = std::mem::replace(&mut self.entries[i].title, title);
        self.updating = true;
        Some(prev)
    }

    /// Reconcile the rename response. Success exits the editing state;
    /// failure reverts the title and leaves editing active for a retry.
    pub fn settle_rename(&mut self, id: TaskId, prev: String, result: Result<Task, StoreError>) {
        self.updating = false;
        match result {
            Ok(_) => {
                if self.editing == Some(EntryId::Durable(id)) {
                    self.editing = None;
                }
            }
            Err(err) => {
                if let Some(i) = self.position_of(EntryId::Durable(id)) {
                    self.entries[i].title = prev;
                }
                self.last_error = Some(SyncError::UpdateFailed(err));
            }
        }
    }

    // ----- remove -----

    /// Optimistic phase: delete the entry immediately. Returns the removed
    /// task so the caller can decide whether a store round-trip is needed
    /// (drafts have no durable record to delete).
    pub fn begin_remove(&mut self, id: EntryId) -> Option<Task> {
        let i = self.position_of(id)?;
        let task = self.entries.remove(i);
        if let EntryId::Durable(task_id) = id {
            self.deleting = Some(task_id);
        }
        Some(task)
    }

    /// Reconcile the delete response. On failure the re-fetched record is
    /// re-inserted (appended, not at its original position); if the
    /// re-fetch found nothing the entry is treated as already gone.
    pub fn settle_remove(
        &mut self,
        id: TaskId,
        result: Result<(), StoreError>,
        refetched: Option<Task>,
    ) {
        if self.deleting == Some(id) {
            self.deleting = None;
        }
        if let Err(err) = result {
            if let Some(task) = refetched
                && self.position_of(task.id).is_none()
            {
                self.entries.push(task);
            }
            self.last_error = Some(SyncError::DeleteFailed(err));
        }
    }

    // ----- feed ingestion -----

    /// Ingest one validated feed event, in delivery order.
    ///
    /// The feed may redeliver events already reflected by the optimistic
    /// path, so every branch is idempotent against a matching state.
    pub fn apply_change(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Inserted { task, origin } => self.apply_insert(task, origin),
            ChangeEvent::Updated { task } => self.apply_update(task),
            ChangeEvent::Deleted { id } => self.apply_delete(id),
        }
    }

    fn apply_insert(&mut self, task: Task, origin: Option<DraftId>) {
        // Exact correlation: the store echoed our idempotency token.
        if let Some(origin) = origin
            && let Some(i) = self.position_of(EntryId::Draft(origin))
        {
            debug!(id = %task.id, origin = %origin, "insert correlated to placeholder by token");
            self.entries[i] = task;
            return;
        }
        // Already applied via the optimistic path (or an earlier delivery).
        if self.position_of(task.id).is_some() {
            debug!(id = %task.id, "insert already applied; ignored");
            return;
        }
        // Heuristic correlation: a placeholder with the same title. Checked
        // after the id-dedup so a stray redelivery can never swallow an
        // unrelated placeholder that happens to share the title.
        if let Some(i) = self
            .entries
            .iter()
            .position(|t| t.is_draft() && t.title == task.title)
        {
            debug!(id = %task.id, "insert correlated to placeholder by title");
            self.entries[i] = task;
            return;
        }
        self.entries.insert(0, task);
    }

    fn apply_update(&mut self, task: Task) {
        // Last-writer-wins on the full record, position preserved.
        match self.position_of(task.id) {
            Some(i) => self.entries[i] = task,
            None => debug!(id = %task.id, "update for unknown entry; ignored"),
        }
    }

    fn apply_delete(&mut self, id: TaskId) {
        // Absent is not an error.
        self.entries.retain(|t| t.id != EntryId::Durable(id));
    }

    fn position_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;
    use ulid::Ulid;

    fn owner() -> OwnerId {
        OwnerId::from_ulid(Ulid::new())
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn durable(owner: OwnerId, title: &str, hour: u32) -> Task {
        Task {
            id: EntryId::Durable(TaskId::from_ulid(Ulid::new())),
            owner,
            title: title.into(),
            completed: false,
            created_at: at(hour),
        }
    }

    fn draft(owner: OwnerId, title: &str) -> (DraftId, Task) {
        let id = DraftId::from_ulid(Ulid::new());
        (id, Task::draft(id, owner, title.into(), at(23)))
    }

    fn loaded(owner: OwnerId, tasks: Vec<Task>) -> CacheState {
        let mut state = CacheState::new(owner);
        state.finish_load(Ok(tasks));
        state
    }

    fn titles(state: &CacheState) -> Vec<&str> {
        state.entries().iter().map(|t| t.title.as_str()).collect()
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("injected".into())
    }

    // ----- load -----

    #[test]
    fn load_preserves_store_order_and_submit_prepends() {
        let owner = owner();
        // Store already sorted descending; T3 > T1 > T2 makes no difference,
        // the cache must not re-sort.
        let t3 = durable(owner, "third", 3);
        let t1 = durable(owner, "first", 1);
        let t2 = durable(owner, "second", 2);
        let mut state = loaded(owner, vec![t3, t1, t2]);

        assert_eq!(titles(&state), ["third", "first", "second"]);
        assert!(!state.snapshot().loading);

        // A placeholder goes to the front regardless of its created_at.
        let (_, task) = draft(owner, "newest");
        state.begin_submit(task);
        assert_eq!(titles(&state), ["newest", "third", "first", "second"]);
    }

    #[test]
    fn load_failure_resets_to_empty_and_surfaces_the_error() {
        let owner = owner();
        let mut state = CacheState::new(owner);
        assert!(state.snapshot().loading);

        state.finish_load(Err(unavailable()));

        let view = state.snapshot();
        assert!(view.tasks.is_empty());
        assert!(!view.loading);
        assert!(matches!(view.last_error, Some(SyncError::StoreUnavailable(_))));
    }

    #[test]
    fn load_never_admits_foreign_tasks() {
        let us = owner();
        let them = owner();
        let mine = durable(us, "mine", 1);
        let theirs = durable(them, "theirs", 2);

        let state = loaded(us, vec![theirs, mine]);
        assert_eq!(titles(&state), ["mine"]);
    }

    // ----- submit -----

    #[test]
    fn confirmed_create_replaces_the_placeholder_in_place() {
        let owner = owner();
        let mut state = loaded(owner, vec![durable(owner, "older", 1)]);

        let (draft_id, task) = draft(owner, "Buy milk");
        state.begin_submit(task);
        assert!(state.snapshot().adding);

        let confirmed = durable(owner, "Buy milk", 4);
        state.settle_create(draft_id, Ok(confirmed.clone()));

        // Exactly one entry, durable id, position preserved. Never two.
        assert_eq!(titles(&state), ["Buy milk", "older"]);
        assert_eq!(state.entries()[0], confirmed);
        assert!(!state.entries()[0].is_draft());
        assert!(!state.snapshot().adding);
    }

    #[test]
    fn failed_create_rolls_back_to_the_pre_submit_state() {
        let owner = owner();
        let mut state = loaded(owner, vec![durable(owner, "kept", 1)]);
        let before = state.entries().to_vec();

        let (draft_id, task) = draft(owner, "X");
        state.begin_submit(task);
        state.settle_create(draft_id, Err(unavailable()));

        assert_eq!(state.entries(), before);
        assert!(matches!(
            state.snapshot().last_error,
            Some(SyncError::CreateFailed(_))
        ));
    }

    #[test]
    fn create_settling_after_local_removal_readmits_the_task() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);

        let (draft_id, task) = draft(owner, "quick delete");
        state.begin_submit(task);

        // The user removes the placeholder before the store confirms.
        assert!(state.begin_remove(EntryId::Draft(draft_id)).is_some());
        assert!(state.entries().is_empty());

        // The store did create the row; insert-if-absent brings it back,
        // exactly as it would reappear through the feed.
        let confirmed = durable(owner, "quick delete", 4);
        state.settle_create(draft_id, Ok(confirmed.clone()));
        assert_eq!(state.entries(), [confirmed]);
    }

    #[test]
    fn create_settling_after_feed_replacement_is_a_noop() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);

        let (draft_id, task) = draft(owner, "raced");
        state.begin_submit(task);

        // The feed's insert wins the race and replaces the placeholder.
        let confirmed = durable(owner, "raced", 4);
        state.apply_change(ChangeEvent::Inserted {
            task: confirmed.clone(),
            origin: Some(draft_id),
        });
        assert_eq!(state.entries(), std::slice::from_ref(&confirmed));

        // The create response then settles against an already-matching state.
        state.settle_create(draft_id, Ok(confirmed.clone()));
        assert_eq!(state.entries(), [confirmed]);
    }

    // ----- toggle -----

    #[test]
    fn toggle_flips_immediately_and_failure_restores_the_prior_value() {
        let owner = owner();
        let task = durable(owner, "flip me", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task]);

        let prev = state.begin_toggle(id).unwrap();
        assert!(!prev);
        assert!(state.entries()[0].completed);
        assert!(state.snapshot().updating);

        state.settle_toggle(id, prev, Err(unavailable()));
        assert!(!state.entries()[0].completed);
        assert!(!state.snapshot().updating);
        assert!(matches!(
            state.snapshot().last_error,
            Some(SyncError::UpdateFailed(_))
        ));
    }

    #[test]
    fn toggle_success_leaves_the_flip_applied() {
        let owner = owner();
        let task = durable(owner, "flip me", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task.clone()]);

        let prev = state.begin_toggle(id).unwrap();
        let mut stored = task;
        stored.completed = true;
        state.settle_toggle(id, prev, Ok(stored));

        assert!(state.entries()[0].completed);
        assert!(state.snapshot().last_error.is_none());
    }

    #[test]
    fn toggle_settlement_for_a_deleted_entry_is_discarded() {
        let owner = owner();
        let task = durable(owner, "going away", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task]);

        let prev = state.begin_toggle(id).unwrap();
        state.apply_change(ChangeEvent::Deleted { id });
        assert!(state.entries().is_empty());

        // Neither arm may resurrect the entry.
        state.settle_toggle(id, prev, Err(unavailable()));
        assert!(state.entries().is_empty());
    }

    // ----- rename -----

    #[test]
    fn rename_failure_reverts_and_keeps_editing_active() {
        let owner = owner();
        let task = durable(owner, "old title", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task]);

        state.begin_edit(EntryId::Durable(id));
        let prev = state.begin_rename(id, "new title".into()).unwrap();
        assert_eq!(titles(&state), ["new title"]);

        state.settle_rename(id, prev, Err(unavailable()));
        assert_eq!(titles(&state), ["old title"]);
        // Editing stays active so the user can retry.
        assert_eq!(state.snapshot().editing, Some(EntryId::Durable(id)));
        assert!(matches!(
            state.snapshot().last_error,
            Some(SyncError::UpdateFailed(_))
        ));
    }

    #[test]
    fn rename_success_exits_the_editing_state() {
        let owner = owner();
        let task = durable(owner, "old title", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task.clone()]);

        state.begin_edit(EntryId::Durable(id));
        let prev = state.begin_rename(id, "new title".into()).unwrap();

        let mut stored = task;
        stored.title = "new title".into();
        state.settle_rename(id, prev, Ok(stored));

        assert_eq!(titles(&state), ["new title"]);
        assert_eq!(state.snapshot().editing, None);
    }

    #[test]
    fn begin_edit_ignores_unknown_entries() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);
        state.begin_edit(EntryId::Durable(TaskId::from_ulid(Ulid::new())));
        assert_eq!(state.snapshot().editing, None);
    }

    // ----- remove -----

    #[test]
    fn remove_failure_with_successful_refetch_reinserts_at_the_tail() {
        let owner = owner();
        let victim = durable(owner, "victim", 3);
        let id = victim.id.as_durable().unwrap();
        let other = durable(owner, "other", 2);
        let mut state = loaded(owner, vec![victim.clone(), other]);

        assert!(state.begin_remove(EntryId::Durable(id)).is_some());
        assert_eq!(titles(&state), ["other"]);
        assert_eq!(state.snapshot().deleting, Some(id));

        state.settle_remove(id, Err(unavailable()), Some(victim));

        // Appended, not back at its original position.
        assert_eq!(titles(&state), ["other", "victim"]);
        assert_eq!(state.snapshot().deleting, None);
        assert!(matches!(
            state.snapshot().last_error,
            Some(SyncError::DeleteFailed(_))
        ));
    }

    #[test]
    fn remove_failure_with_failed_refetch_leaves_the_entry_absent() {
        let owner = owner();
        let victim = durable(owner, "victim", 3);
        let id = victim.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![victim]);

        assert!(state.begin_remove(EntryId::Durable(id)).is_some());
        state.settle_remove(id, Err(unavailable()), None);

        assert!(state.entries().is_empty());
        assert!(matches!(
            state.snapshot().last_error,
            Some(SyncError::DeleteFailed(_))
        ));
    }

    #[test]
    fn removing_a_draft_needs_no_round_trip() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);
        let (draft_id, task) = draft(owner, "local only");
        state.begin_submit(task);

        let removed = state.begin_remove(EntryId::Draft(draft_id)).unwrap();
        assert!(removed.is_draft());
        assert!(state.entries().is_empty());
        // No durable id, so no delete round-trip is tracked.
        assert_eq!(state.snapshot().deleting, None);
    }

    // ----- feed ingestion -----

    #[derive(Debug, Clone, Copy)]
    enum Redelivered {
        Update,
        Delete,
    }

    #[rstest]
    #[case::update(Redelivered::Update)]
    #[case::delete(Redelivered::Delete)]
    fn reapplying_the_same_feed_event_changes_nothing(#[case] which: Redelivered) {
        let owner = owner();
        let task = durable(owner, "stable", 1);
        let id = task.id.as_durable().unwrap();
        let mut state = loaded(owner, vec![task.clone(), durable(owner, "other", 2)]);

        let event = match which {
            Redelivered::Update => {
                let mut updated = task;
                updated.completed = true;
                ChangeEvent::Updated { task: updated }
            }
            Redelivered::Delete => ChangeEvent::Deleted { id },
        };

        state.apply_change(event.clone());
        let once = state.entries().to_vec();

        state.apply_change(event);
        assert_eq!(state.entries(), once);
    }

    #[test]
    fn insert_event_correlates_a_placeholder_by_title() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);
        let (_, task) = draft(owner, "Y");
        state.begin_submit(task);

        let confirmed = durable(owner, "Y", 4);
        // No origin token: the title heuristic has to do the matching.
        state.apply_change(ChangeEvent::Inserted {
            task: confirmed.clone(),
            origin: None,
        });

        assert_eq!(state.entries(), [confirmed]);
    }

    #[test]
    fn insert_event_prefers_the_origin_token_over_the_title() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);

        // Two placeholders with identical titles: the title heuristic alone
        // would cross-match the wrong one.
        let (first_id, first) = draft(owner, "same");
        let (second_id, second) = draft(owner, "same");
        state.begin_submit(first);
        state.begin_submit(second);

        let confirmed = durable(owner, "same", 4);
        state.apply_change(ChangeEvent::Inserted {
            task: confirmed.clone(),
            origin: Some(second_id),
        });

        // The second draft (front of the sequence) was replaced; the first
        // placeholder is still waiting for its own confirmation.
        assert_eq!(state.entries()[0], confirmed);
        assert_eq!(state.entries()[1].id, EntryId::Draft(first_id));
    }

    #[test]
    fn insert_event_with_token_correlates_despite_a_different_title() {
        let owner = owner();
        let mut state = loaded(owner, vec![]);
        let (draft_id, task) = draft(owner, "as typed");
        state.begin_submit(task);

        // The store may normalize the title; the token still matches.
        let confirmed = durable(owner, "as stored", 4);
        state.apply_change(ChangeEvent::Inserted {
            task: confirmed.clone(),
            origin: Some(draft_id),
        });

        assert_eq!(state.entries(), [confirmed]);
    }

    #[test]
    fn insert_event_for_an_already_applied_id_is_ignored() {
        let owner = owner();
        let task = durable(owner, "applied", 1);
        let mut state = loaded(owner, vec![task.clone()]);

        state.apply_change(ChangeEvent::Inserted {
            task: task.clone(),
            origin: None,
        });
        assert_eq!(state.entries(), [task]);
    }

    #[test]
    fn insert_event_for_an_unknown_task_is_prepended() {
        let owner = owner();
        let mut state = loaded(owner, vec![durable(owner, "old", 1)]);

        // Another session of the same user created this one.
        let remote = durable(owner, "from elsewhere", 4);
        state.apply_change(ChangeEvent::Inserted {
            task: remote,
            origin: None,
        });

        assert_eq!(titles(&state), ["from elsewhere", "old"]);
    }

    #[test]
    fn update_event_replaces_the_full_record_in_place() {
        let owner = owner();
        let first = durable(owner, "first", 2);
        let second = durable(owner, "second", 1);
        let mut state = loaded(owner, vec![first, second.clone()]);

        let mut remote = second;
        remote.title = "second, renamed elsewhere".into();
        remote.completed = true;
        state.apply_change(ChangeEvent::Updated { task: remote.clone() });

        // Last-writer-wins on the whole record; position unchanged.
        assert_eq!(titles(&state), ["first", "second, renamed elsewhere"]);
        assert_eq!(state.entries()[1], remote);
    }

    #[test]
    fn update_event_for_an_unknown_id_is_ignored() {
        let owner = owner();
        let mut state = loaded(owner, vec![durable(owner, "only", 1)]);
        let before = state.entries().to_vec();

        state.apply_change(ChangeEvent::Updated {
            task: durable(owner, "ghost", 4),
        });
        assert_eq!(state.entries(), before);
    }
}
