use crate::world::position::Position;
use crate::world::thing::HolderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureKind {
    Player,
    Npc,
    Monster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    /// Carry limit in the same units as item weight.
    pub capacity: u32,
    pub(crate) carried_weight: u32,
    pub(crate) parent: Option<HolderId>,
}

impl Creature {
    pub fn new(id: CreatureId, name: impl Into<String>, kind: CreatureKind, capacity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            capacity,
            carried_weight: 0,
            parent: None,
        }
    }

    pub fn carried_weight(&self) -> u32 {
        self.carried_weight
    }

    pub fn free_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.carried_weight)
    }

    pub fn parent(&self) -> Option<HolderId> {
        self.parent
    }

    /// Creatures only ever stand on tiles, so the tile is their position.
    pub fn position(&self) -> Option<Position> {
        match self.parent {
            Some(HolderId::Tile(position)) => Some(position),
            _ => None,
        }
    }
}
