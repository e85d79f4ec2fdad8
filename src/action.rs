//! Board actions and the rules for applying them to an index.
//!
//! An [`Action`] is the unit of change on the board, both for local edits and
//! for confirmed server data. An [`Update`] batches actions into one network
//! round trip under a correlation id chosen by the transport layer.

#[cfg(test)]
#[path = "action_test.rs"]
mod action_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Entity, EntityId, Ping};
use crate::index::EntityIndex;

/// Correlation id for an outbound update.
pub type UpdateId = Uuid;

/// A single change to the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Create or replace an entity with the full payload.
    Upsert { entity: Entity },
    /// Remove an entity by id.
    Delete { entity_id: EntityId },
    /// Drop a ping marker. It expires on its own.
    Ping { ping: Ping },
}

impl Action {
    #[must_use]
    pub fn upsert(entity: impl Into<Entity>) -> Self {
        Self::Upsert { entity: entity.into() }
    }

    #[must_use]
    pub fn delete(entity_id: EntityId) -> Self {
        Self::Delete { entity_id }
    }

    #[must_use]
    pub fn ping(ping: Ping) -> Self {
        Self::Ping { ping }
    }

    /// Id of the entity this action touches.
    #[must_use]
    pub fn target(&self) -> EntityId {
        match self {
            Self::Upsert { entity } => entity.id(),
            Self::Delete { entity_id } => *entity_id,
            Self::Ping { ping } => ping.id,
        }
    }
}

/// A batch of actions sent to the server as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: UpdateId,
    pub actions: Vec<Action>,
}

/// Apply one action to `index`.
///
/// Missing delete targets and occupied cells are silent no-ops; the return
/// value only reports whether the index changed.
pub fn apply(index: &mut EntityIndex, action: &Action, is_confirmed: bool) -> bool {
    match action {
        Action::Upsert { entity } => index.upsert(entity.clone(), is_confirmed),
        Action::Delete { entity_id } => index.delete(*entity_id).is_some(),
        Action::Ping { ping } => index.upsert(Entity::Ping(ping.clone()), is_confirmed),
    }
}
