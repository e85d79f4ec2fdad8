//! Spatial entity index: the keyed store behind both board layers.
//!
//! DESIGN
//! ======
//! `EntityIndex` owns every entity by id and keeps two derived maps in step
//! with it on every mutation:
//!
//! - position -> occupying id, for non-Ping entities. A `BTreeMap` ordered by
//!   `(x, y, z)`, so one cell's stack is a contiguous range.
//! - content fingerprint -> Character ids in insertion order, used to color
//!   visually identical Characters apart.
//!
//! Occupancy is first-writer-wins: an upsert into a cell held by another id
//! is dropped without error. By the time an action is replayed the board may
//! have changed under it, so this is a normal race, not a failure.
//!
//! Colors are only assigned on confirmed upserts. Optimistic duplicates that
//! the server may still reject never get one, which avoids color flicker.
//! A replacement with unchanged contents keeps its predecessor's color, so
//! moving or re-confirming a token never recolors it.

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use crate::consts::TOKEN_PALETTE;
use crate::entity::{Cell, Entity, EntityId, Position};

/// Indexed set of board entities.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: HashMap<EntityId, Entity>,
    by_position: BTreeMap<Position, EntityId>,
    by_fingerprint: HashMap<String, Vec<EntityId>>,
}

impl EntityIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity.
    ///
    /// Returns `false` without touching the index when the entity's cell is
    /// held by a different id. Otherwise any entity with the same id is
    /// removed first and the new one is inserted into every applicable map.
    /// A replacement Character with the same contents and no color keeps
    /// the color its predecessor held.
    /// When `is_confirmed` is set and the entity is a Character sharing its
    /// contents with others, the group is colored.
    pub fn upsert(&mut self, entity: Entity, is_confirmed: bool) -> bool {
        let id = entity.id();
        if let Some(pos) = entity.position() {
            if let Some(&occupant) = self.by_position.get(&pos) {
                if occupant != id {
                    trace!(%id, %occupant, %pos, "upsert dropped: cell occupied");
                    return false;
                }
            }
        }

        let previous = self.delete(id);
        let entity = inherit_color(entity, previous.as_ref());

        if let Some(pos) = entity.position() {
            self.by_position.insert(pos, id);
        }
        let fingerprint = entity.fingerprint();
        self.entities.insert(id, entity);

        if let Some(fingerprint) = fingerprint {
            let group = self.by_fingerprint.entry(fingerprint.clone()).or_default();
            group.push(id);
            if is_confirmed && group.len() > 1 {
                self.assign_colors(&fingerprint);
            }
        }
        true
    }

    /// Remove an entity by id from every map, returning it if it was present.
    pub fn delete(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;

        if let Some(pos) = entity.position() {
            if self.by_position.get(&pos) == Some(&id) {
                self.by_position.remove(&pos);
            }
        }
        if let Some(fingerprint) = entity.fingerprint() {
            if let Some(group) = self.by_fingerprint.get_mut(&fingerprint) {
                group.retain(|member| *member != id);
                if group.is_empty() {
                    self.by_fingerprint.remove(&fingerprint);
                }
            }
        }
        Some(entity)
    }

    /// Give every uncolored member of a fingerprint group the next palette
    /// color no member already holds. Existing colors are never changed.
    fn assign_colors(&mut self, fingerprint: &str) {
        let Some(group) = self.by_fingerprint.get(fingerprint) else {
            return;
        };

        let used: HashSet<String> = group
            .iter()
            .filter_map(|id| self.entities.get(id))
            .filter_map(Entity::color)
            .map(str::to_owned)
            .collect();
        let mut free = TOKEN_PALETTE.iter().copied().filter(|color| !used.contains(*color));

        for id in group {
            let Some(Entity::Character(character)) = self.entities.get_mut(id) else {
                continue;
            };
            if character.color.is_some() {
                continue;
            }
            let Some(color) = free.next() else {
                trace!(fingerprint, "palette exhausted");
                break;
            };
            trace!(%id, color, "duplicate character colored");
            character.color = Some(color.to_owned());
        }
    }

    // --- Queries ---

    /// Look up an entity by id.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Returns `true` if an entity with this id is present.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// The non-Ping entity occupying exactly `pos`.
    #[must_use]
    pub fn occupant_at(&self, pos: Position) -> Option<&Entity> {
        self.by_position.get(&pos).and_then(|id| self.entities.get(id))
    }

    /// A ping standing on `cell`. With several, the lowest id wins.
    #[must_use]
    pub fn ping_at(&self, cell: Cell) -> Option<&Entity> {
        self.entities
            .values()
            .filter(|entity| entity.is_ping() && entity.cell() == cell)
            .min_by_key(|entity| entity.id())
    }

    /// Non-Ping entities stacked on `cell`, bottom to top.
    pub fn column(&self, cell: Cell) -> impl DoubleEndedIterator<Item = &Entity> + '_ {
        self.by_position
            .range(cell.at(i32::MIN)..=cell.at(i32::MAX))
            .filter_map(|(_, id)| self.entities.get(id))
    }

    /// The highest Character or Floor on `cell`.
    #[must_use]
    pub fn topmost_token_at(&self, cell: Cell) -> Option<&Entity> {
        self.column(cell).next_back()
    }

    /// The lowest Character on `cell`, ignoring floors.
    #[must_use]
    pub fn bottommost_character_at(&self, cell: Cell) -> Option<&Entity> {
        self.column(cell).find(|entity| matches!(entity, Entity::Character(_)))
    }

    /// Character ids sharing `fingerprint`, in insertion order.
    #[must_use]
    pub fn fingerprint_group(&self, fingerprint: &str) -> &[EntityId] {
        self.by_fingerprint.get(fingerprint).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate all entities in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All entities sorted by id, for stable output.
    #[must_use]
    pub fn sorted_entities(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by_key(|entity| entity.id());
        entities
    }

    /// Number of entities in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the index holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check that the position and fingerprint maps are exactly what the
    /// entity map implies.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut positioned = 0;
        let mut characters = 0;
        for (id, entity) in &self.entities {
            if entity.id() != *id {
                return false;
            }
            if let Some(pos) = entity.position() {
                positioned += 1;
                if self.by_position.get(&pos) != Some(id) {
                    return false;
                }
            }
            if let Some(fingerprint) = entity.fingerprint() {
                characters += 1;
                if !self.fingerprint_group(&fingerprint).contains(id) {
                    return false;
                }
            }
        }

        let grouped: usize = self.by_fingerprint.values().map(Vec::len).sum();
        let no_empty_groups = self.by_fingerprint.values().all(|group| !group.is_empty());
        positioned == self.by_position.len() && characters == grouped && no_empty_groups
    }
}

/// Carry a replaced Character's color onto an uncolored payload with the same contents.
fn inherit_color(mut entity: Entity, previous: Option<&Entity>) -> Entity {
    if let (Entity::Character(next), Some(Entity::Character(prev))) = (&mut entity, previous) {
        if next.color.is_none() && next.contents == prev.contents {
            next.color.clone_from(&prev.color);
        }
    }
    entity
}

/// Two indexes are equal when they hold the same entities; the derived maps follow.
impl PartialEq for EntityIndex {
    fn eq(&self, other: &Self) -> bool {
        self.entities == other.entities
    }
}

impl Eq for EntityIndex {}
