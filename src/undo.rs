//! Undo/redo ledger over local actions.
//!
//! DESIGN
//! ======
//! Before a local action is applied, its inverse is computed against the
//! current local view and stored as an [`UndoEntry`]. Entries are grouped into
//! sets; a fence seals the open set so one drag or multi-select edit undoes
//! as a single step.
//!
//! `undo_idx` points at the current set. Sets before it have been applied;
//! the set at it is either the open set (when it is the last one) or the most
//! recently undone set. Undo and redo hand back plain [`Action`]s so the merge
//! state can queue them for the server like any other edit.

#[cfg(test)]
#[path = "undo_test.rs"]
mod undo_test;

use tracing::trace;

use crate::action::Action;
use crate::consts::DEFAULT_MAX_UNDO_SETS;
use crate::entity::Entity;
use crate::index::EntityIndex;

/// What a single local action did, with enough data to reverse or replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    /// A new entity was created; undo deletes it.
    Create { entity: Entity },
    /// An entity was deleted; undo re-creates it.
    Delete { entity: Entity },
    /// An existing entity was replaced; undo restores `old`.
    Move { old: Entity, new: Entity },
}

impl UndoEntry {
    /// Compute the entry for `action` as seen from `local`, before it is applied.
    ///
    /// Pings are never undoable, and deleting something that isn't there
    /// records nothing.
    #[must_use]
    pub fn for_action(local: &EntityIndex, action: &Action) -> Option<Self> {
        match action {
            Action::Ping { .. } => None,
            Action::Delete { entity_id } => local
                .get(entity_id)
                .filter(|existing| !existing.is_ping())
                .map(|existing| Self::Delete { entity: existing.clone() }),
            Action::Upsert { entity } => {
                if entity.is_ping() {
                    return None;
                }
                match local.get(&entity.id()) {
                    Some(existing) if existing.is_ping() => None,
                    Some(existing) => Some(Self::Move { old: existing.clone(), new: entity.clone() }),
                    None => Some(Self::Create { entity: entity.clone() }),
                }
            }
        }
    }

    /// The action that reverses this entry.
    #[must_use]
    pub fn inverse(&self) -> Action {
        match self {
            Self::Create { entity } => Action::delete(entity.id()),
            Self::Delete { entity } => Action::upsert(entity.clone()),
            Self::Move { old, .. } => Action::upsert(old.clone()),
        }
    }

    /// The action that re-does this entry after it was undone.
    #[must_use]
    pub fn forward(&self) -> Action {
        match self {
            Self::Create { entity } => Action::upsert(entity.clone()),
            Self::Delete { entity } => Action::delete(entity.id()),
            Self::Move { new, .. } => Action::upsert(new.clone()),
        }
    }
}

/// Grouped undo history with a cursor.
///
/// There is always at least one set; the last one is where new entries go.
#[derive(Debug, Clone)]
pub struct UndoState {
    undo_sets: Vec<Vec<UndoEntry>>,
    undo_idx: usize,
    max_sets: usize,
}

impl UndoState {
    /// Empty history keeping at most `max_sets` sealed sets.
    #[must_use]
    pub fn new(max_sets: usize) -> Self {
        Self { undo_sets: vec![Vec::new()], undo_idx: 0, max_sets: max_sets.max(1) }
    }

    #[must_use]
    pub fn undo_sets(&self) -> &[Vec<UndoEntry>] {
        &self.undo_sets
    }

    #[must_use]
    pub fn undo_idx(&self) -> usize {
        self.undo_idx
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo_idx > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.undo_idx + 1 < self.undo_sets.len()
    }

    /// Append an entry to the current set.
    ///
    /// If sets were undone, they and any redo history are discarded and a
    /// fresh set takes their place at `undo_idx`.
    pub fn record(&mut self, entry: UndoEntry) {
        if self.can_redo() {
            trace!(discarded = self.undo_sets.len() - self.undo_idx, "redo history discarded");
            self.undo_sets.truncate(self.undo_idx);
            self.undo_sets.push(Vec::new());
        }
        if let Some(open) = self.undo_sets.last_mut() {
            open.push(entry);
        }
    }

    /// Seal the open set if it has entries. Returns `true` if a new set was started.
    ///
    /// A no-op while sitting on an undone set.
    pub fn fence(&mut self) -> bool {
        if self.can_redo() || self.undo_sets.last().is_none_or(Vec::is_empty) {
            return false;
        }
        self.undo_sets.push(Vec::new());
        self.undo_idx += 1;

        if self.undo_idx > self.max_sets {
            self.undo_sets.remove(0);
            self.undo_idx -= 1;
        }
        true
    }

    /// Step back one set, returning its inverse actions, latest entry first.
    pub fn step_back(&mut self) -> Option<Vec<Action>> {
        if !self.can_undo() {
            return None;
        }
        self.undo_idx -= 1;
        let set = self.undo_sets.get(self.undo_idx)?;
        Some(set.iter().rev().map(UndoEntry::inverse).collect())
    }

    /// Step forward one set, returning its forward actions in recorded order.
    pub fn step_forward(&mut self) -> Option<Vec<Action>> {
        if !self.can_redo() {
            return None;
        }
        let set = self.undo_sets.get(self.undo_idx)?;
        let actions = set.iter().map(UndoEntry::forward).collect();
        self.undo_idx += 1;
        Some(actions)
    }
}

impl Default for UndoState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_SETS)
    }
}
