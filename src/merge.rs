//! Reconciliation state: confirmed, in-flight and unsent board layers.
//!
//! DESIGN
//! ======
//! `MergeState` keeps three sources of truth and one derived view:
//!
//! - `network`: what the server has confirmed.
//! - `queued_updates`: batches sent to the server and not yet acknowledged.
//! - `unqueued_actions`: local edits not yet batched.
//! - `local`: what the user sees, always equal to `network` with every queued
//!   action and then every unqueued action replayed on top.
//!
//! Whenever `network` or the queue changes, `local` is rebuilt from scratch
//! by clone-and-replay. A single new local edit is applied directly, which
//! gives the same result as a full replay since it lands at the end.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here fails. Unknown update ids, stale deletes and occupied cells
//! are races with other participants and are ignored. Methods report
//! whether anything changed so callers can skip redundant redraws.

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;

use tracing::debug;

use crate::action::{Action, Update, UpdateId, apply};
use crate::entity::{Entity, EntityId};
use crate::index::EntityIndex;
use crate::undo::{UndoEntry, UndoState};

/// Aggregate root for one board session's reconciliation state.
#[derive(Debug, Clone, Default)]
pub struct MergeState {
    network: EntityIndex,
    local: EntityIndex,
    queued_updates: Vec<Update>,
    unqueued_actions: Vec<Action>,
    undo_state: UndoState,
}

impl MergeState {
    /// Empty state with the default undo history cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty state keeping at most `max_undo_sets` sealed undo sets.
    #[must_use]
    pub fn with_max_undo_sets(max_undo_sets: usize) -> Self {
        Self { undo_state: UndoState::new(max_undo_sets), ..Self::default() }
    }

    // --- Accessors ---

    /// Last confirmed server state.
    #[must_use]
    pub fn network(&self) -> &EntityIndex {
        &self.network
    }

    /// Optimistic view shown to the user.
    #[must_use]
    pub fn local(&self) -> &EntityIndex {
        &self.local
    }

    #[must_use]
    pub fn queued_updates(&self) -> &[Update] {
        &self.queued_updates
    }

    #[must_use]
    pub fn unqueued_actions(&self) -> &[Action] {
        &self.unqueued_actions
    }

    #[must_use]
    pub fn undo_state(&self) -> &UndoState {
        &self.undo_state
    }

    /// Number of actions not yet confirmed by the server, sent or not.
    #[must_use]
    pub fn pending_action_count(&self) -> usize {
        let queued: usize = self.queued_updates.iter().map(|u| u.actions.len()).sum();
        queued + self.unqueued_actions.len()
    }

    // --- Network inbound ---

    /// Fold confirmed actions into `network` and rebuild `local`.
    ///
    /// If `update_id` names a queued update, that update's round trip is
    /// complete and it leaves the queue. A missing id (initial snapshot) or
    /// an unknown one (another participant's update, or a repeat) just
    /// applies the actions.
    pub fn apply_network_update(&mut self, actions: &[Action], update_id: Option<UpdateId>) {
        for action in actions {
            apply(&mut self.network, action, true);
        }
        let acknowledged = update_id.is_some_and(|id| self.dequeue(id));
        debug!(actions = actions.len(), ?update_id, acknowledged, "network update applied");
        self.recompute_local();
    }

    /// Replace `network` wholesale with a fresh server snapshot.
    ///
    /// Entities are applied as confirmed upserts in the given order, so
    /// duplicate colors come out the same on every client.
    pub fn replace_network(&mut self, entities: Vec<Entity>) {
        let mut network = EntityIndex::new();
        for entity in entities {
            network.upsert(entity, true);
        }
        debug!(entities = network.len(), "network snapshot replaced");
        self.network = network;
        self.recompute_local();
    }

    /// Drop a queued update the server refused. Returns `false` for unknown ids.
    pub fn reject_update(&mut self, update_id: UpdateId) -> bool {
        if !self.dequeue(update_id) {
            return false;
        }
        debug!(%update_id, "queued update rejected");
        self.recompute_local();
        true
    }

    /// Remove an expired ping from every layer. Returns `false` if it was nowhere.
    pub fn expire_ping(&mut self, id: EntityId) -> bool {
        let in_network = self.network.get(&id).is_some_and(Entity::is_ping);
        if in_network {
            self.network.delete(id);
        }

        let creates_ping = |action: &Action| match action {
            Action::Ping { ping } => ping.id == id,
            Action::Upsert { entity: Entity::Ping(ping) } => ping.id == id,
            _ => false,
        };
        let pending_before = self.pending_action_count();
        self.unqueued_actions.retain(|action| !creates_ping(action));
        for update in &mut self.queued_updates {
            update.actions.retain(|action| !creates_ping(action));
        }
        let was_pending = self.pending_action_count() != pending_before;

        if !in_network && !was_pending {
            return false;
        }
        debug!(%id, "ping expired");
        self.recompute_local();
        true
    }

    // --- Local edits ---

    /// Record an undo entry for `action`, then apply it as an unsent local edit.
    pub fn apply_local_action(&mut self, action: Action) {
        if let Some(entry) = UndoEntry::for_action(&self.local, &action) {
            self.undo_state.record(entry);
        }
        self.push_local(action);
    }

    /// Apply a local edit without touching the undo history.
    fn push_local(&mut self, action: Action) {
        apply(&mut self.local, &action, false);
        self.unqueued_actions.push(action);
    }

    /// Move every unqueued action into a new queued update and return it for
    /// sending. `None` when there is nothing to send.
    pub fn collect_update(&mut self, update_id: UpdateId) -> Option<Update> {
        if self.unqueued_actions.is_empty() {
            return None;
        }
        let update = Update { update_id, actions: std::mem::take(&mut self.unqueued_actions) };
        debug!(%update_id, actions = update.actions.len(), "update queued");
        self.queued_updates.push(update.clone());
        Some(update)
    }

    // --- Undo / redo ---

    /// Seal the current undo set. Returns `true` if a new set was started.
    pub fn apply_undo_fence(&mut self) -> bool {
        self.undo_state.fence()
    }

    /// Undo the previous set. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(actions) = self.undo_state.step_back() else {
            return false;
        };
        debug!(actions = actions.len(), undo_idx = self.undo_state.undo_idx(), "undo");
        for action in actions {
            self.push_local(action);
        }
        true
    }

    /// Redo the set at the cursor. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(actions) = self.undo_state.step_forward() else {
            return false;
        };
        debug!(actions = actions.len(), undo_idx = self.undo_state.undo_idx(), "redo");
        for action in actions {
            self.push_local(action);
        }
        true
    }

    // --- Replay ---

    /// Build the local view from scratch: `network`, then every queued
    /// update in order, then every unqueued action, all unconfirmed.
    #[must_use]
    pub fn replay_local(&self) -> EntityIndex {
        let mut local = self.network.clone();
        let queued = self.queued_updates.iter().flat_map(|update| update.actions.iter());
        for action in queued.chain(self.unqueued_actions.iter()) {
            apply(&mut local, action, false);
        }
        local
    }

    fn recompute_local(&mut self) {
        self.local = self.replay_local();
    }

    fn dequeue(&mut self, update_id: UpdateId) -> bool {
        let before = self.queued_updates.len();
        self.queued_updates.retain(|update| update.update_id != update_id);
        self.queued_updates.len() != before
    }
}
