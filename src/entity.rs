//! Entity model: the tokens that live on the board grid.
//!
//! Every placed thing is an [`Entity`]. Characters and Floors occupy an exact
//! grid cell at a stack height; Pings are transient markers with only a 2D
//! cell and never take part in occupancy. All types here are plain data with
//! serde derives so the transport layer can put them on the wire as-is.

#[cfg(test)]
#[path = "entity_test.rs"]
mod entity_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a board entity.
pub type EntityId = Uuid;

/// Integer grid position. `z` is the stack height within the `(x, y)` cell.
///
/// Ordering is `(x, y, z)`, so a range over one `(x, y)` column walks it bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    #[must_use]
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The 2D cell this position stands on.
    #[must_use]
    pub fn cell(self) -> Cell {
        Cell { x: self.x, y: self.y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// 2D grid cell, used by pings and column lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The position at stack height `z` in this cell.
    #[must_use]
    pub fn at(self, z: i32) -> Position {
        Position { x: self.x, y: self.y, z }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// What a token looks like: an icon reference or a short text label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Contents {
    Icon { icon: String },
    Text { text: String },
}

impl Contents {
    #[must_use]
    pub fn icon(icon: impl Into<String>) -> Self {
        Self::Icon { icon: icon.into() }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Key shared by every token with visually identical contents.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Icon { icon } => format!("icon:{icon}"),
            Self::Text { text } => format!("text:{text}"),
        }
    }
}

/// A movable token. Duplicates get a palette color once the server confirms them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub pos: Position,
    pub contents: Contents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Character {
    /// New uncolored character with a fresh id.
    #[must_use]
    pub fn new(pos: Position, contents: Contents) -> Self {
        Self { id: Uuid::new_v4(), pos, contents, color: None }
    }
}

/// A floor tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub id: EntityId,
    pub pos: Position,
    pub contents: Contents,
}

impl Floor {
    #[must_use]
    pub fn new(pos: Position, contents: Contents) -> Self {
        Self { id: Uuid::new_v4(), pos, contents }
    }
}

/// A transient "look here" marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub id: EntityId,
    pub pos: Cell,
}

impl Ping {
    #[must_use]
    pub fn new(pos: Cell) -> Self {
        Self { id: Uuid::new_v4(), pos }
    }
}

/// Anything placed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Character(Character),
    Floor(Floor),
    Ping(Ping),
}

impl Entity {
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Character(c) => c.id,
            Self::Floor(f) => f.id,
            Self::Ping(p) => p.id,
        }
    }

    /// Occupied grid position. Pings occupy nothing and return `None`.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Character(c) => Some(c.pos),
            Self::Floor(f) => Some(f.pos),
            Self::Ping(_) => None,
        }
    }

    /// The 2D cell the entity stands on.
    #[must_use]
    pub fn cell(&self) -> Cell {
        match self {
            Self::Character(c) => c.pos.cell(),
            Self::Floor(f) => f.pos.cell(),
            Self::Ping(p) => p.pos,
        }
    }

    #[must_use]
    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping(_))
    }

    #[must_use]
    pub fn as_character(&self) -> Option<&Character> {
        match self {
            Self::Character(c) => Some(c),
            _ => None,
        }
    }

    /// Content fingerprint, for Characters only.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        self.as_character().map(|c| c.contents.fingerprint())
    }

    /// Display color, for Characters that have one.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.as_character().and_then(|c| c.color.as_deref())
    }
}

impl From<Character> for Entity {
    fn from(value: Character) -> Self {
        Self::Character(value)
    }
}

impl From<Floor> for Entity {
    fn from(value: Floor) -> Self {
        Self::Floor(value)
    }
}

impl From<Ping> for Entity {
    fn from(value: Ping) -> Self {
        Self::Ping(value)
    }
}
