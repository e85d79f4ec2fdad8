//! Board session: the boundary between the merge engine and its collaborators.
//!
//! SYSTEM CONTEXT
//! ==============
//! The transport layer feeds in snapshots, confirmations and rejections and
//! pulls out batched updates. The UI layer feeds in edit requests and reads
//! the local view back for rendering. A timer sweeps expired pings. All of
//! these are plain synchronous calls; scheduling belongs to the caller (see
//! [`crate::runtime`] for a tokio driver).

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::action::{Action, Update, UpdateId};
use crate::config::SessionConfig;
use crate::consts::EXPIRED_PING_MEMORY;
use crate::entity::{Cell, Entity, EntityId, Ping};
use crate::index::EntityIndex;
use crate::merge::MergeState;

/// One participant's live view of one board.
#[derive(Debug, Clone)]
pub struct BoardSession {
    state: MergeState,
    ping_lifetime: Duration,
    ping_deadlines: HashMap<EntityId, Instant>,
    /// Recently expired ping ids, oldest first. A late echo of one of these
    /// is dropped instead of showing the ping for a second lifetime.
    expired_pings: VecDeque<EntityId>,
    expired_lookup: HashSet<EntityId>,
}

impl BoardSession {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: MergeState::with_max_undo_sets(config.max_undo_sets),
            ping_lifetime: config.ping_lifetime,
            ping_deadlines: HashMap::new(),
            expired_pings: VecDeque::new(),
            expired_lookup: HashSet::new(),
        }
    }

    /// Full reconciliation state, for inspection.
    #[must_use]
    pub fn state(&self) -> &MergeState {
        &self.state
    }

    /// The view to render.
    #[must_use]
    pub fn local(&self) -> &EntityIndex {
        self.state.local()
    }

    // --- Inbound from the network ---

    /// Server snapshot on connect or reconnect. Replaces confirmed state;
    /// pending local edits are replayed on top.
    pub fn on_initial_state(&mut self, mut entities: Vec<Entity>) {
        entities.retain(|entity| !(entity.is_ping() && self.expired_lookup.contains(&entity.id())));
        let now = Instant::now();
        for entity in &entities {
            if let Entity::Ping(ping) = entity {
                self.track_ping(ping.id, now);
            }
        }
        self.state.replace_network(entities);
    }

    /// Confirmed actions from the server, either echoing one of our updates
    /// or relaying another participant's.
    ///
    /// Pings that already expired here are left out.
    pub fn on_confirmed_update(&mut self, mut actions: Vec<Action>, update_id: UpdateId) {
        actions.retain(|action| created_ping(action).is_none_or(|id| !self.expired_lookup.contains(&id)));
        let now = Instant::now();
        for action in &actions {
            if let Some(id) = created_ping(action) {
                self.track_ping(id, now);
            }
        }
        self.state.apply_network_update(&actions, Some(update_id));
    }

    /// The server refused one of our updates. Unknown ids are ignored.
    pub fn on_update_rejected(&mut self, update_id: UpdateId) -> bool {
        self.state.reject_update(update_id)
    }

    // --- Outbound to the network ---

    /// Batch unsent edits under `update_id` for sending.
    pub fn collect_update(&mut self, update_id: UpdateId) -> Option<Update> {
        self.state.collect_update(update_id)
    }

    // --- Inbound from the UI ---

    pub fn request_upsert(&mut self, entity: impl Into<Entity>) {
        self.state.apply_local_action(Action::upsert(entity));
    }

    pub fn request_delete(&mut self, id: EntityId) {
        self.state.apply_local_action(Action::delete(id));
    }

    /// Drop a ping on `cell` and return its id.
    pub fn request_ping(&mut self, cell: Cell) -> EntityId {
        let ping = Ping::new(cell);
        let id = ping.id;
        self.track_ping(id, Instant::now());
        self.state.apply_local_action(Action::ping(ping));
        id
    }

    /// Undo the last step. Edits made since the last fence count as one step.
    pub fn request_undo(&mut self) -> bool {
        self.state.apply_undo_fence();
        self.state.undo()
    }

    pub fn request_redo(&mut self) -> bool {
        self.state.redo()
    }

    /// End the current undo step, e.g. when a drag is released.
    pub fn request_fence(&mut self) -> bool {
        self.state.apply_undo_fence()
    }

    // --- Ping timers ---

    /// When the next tracked ping expires, if any.
    #[must_use]
    pub fn next_ping_deadline(&self) -> Option<Instant> {
        self.ping_deadlines.values().min().copied()
    }

    /// Remove every ping whose deadline is at or before `now`, returning their ids.
    pub fn expire_pings(&mut self, now: Instant) -> Vec<EntityId> {
        let mut expired: Vec<EntityId> = self
            .ping_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in &expired {
            self.ping_deadlines.remove(id);
            self.state.expire_ping(*id);
            self.remember_expired(*id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "pings expired");
        }
        expired
    }

    fn remember_expired(&mut self, id: EntityId) {
        if !self.expired_lookup.insert(id) {
            return;
        }
        self.expired_pings.push_back(id);
        if self.expired_pings.len() > EXPIRED_PING_MEMORY {
            if let Some(oldest) = self.expired_pings.pop_front() {
                self.expired_lookup.remove(&oldest);
            }
        }
    }

    fn track_ping(&mut self, id: EntityId, now: Instant) {
        self.ping_deadlines.entry(id).or_insert(now + self.ping_lifetime);
    }
}

impl Default for BoardSession {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

fn created_ping(action: &Action) -> Option<EntityId> {
    match action {
        Action::Ping { ping } => Some(ping.id),
        Action::Upsert { entity: Entity::Ping(ping) } => Some(ping.id),
        Action::Upsert { .. } | Action::Delete { .. } => None,
    }
}
