use crate::entities::creature::{Creature, CreatureId};
use crate::entities::item::{Item, ItemId};
use crate::world::item_types::{ItemType, ItemTypeIndex};
use crate::world::position::Position;
use std::collections::HashMap;

/// Deepest holder chain the ancestor walks will follow before treating the
/// chain as corrupt.
const MAX_HOLDER_DEPTH: usize = 64;

/// Anything that can occupy a place in a holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThingId {
    Item(ItemId),
    Creature(CreatureId),
}

impl ThingId {
    pub fn as_item(self) -> Option<ItemId> {
        match self {
            ThingId::Item(id) => Some(id),
            ThingId::Creature(_) => None,
        }
    }

    pub fn as_creature(self) -> Option<CreatureId> {
        match self {
            ThingId::Creature(id) => Some(id),
            ThingId::Item(_) => None,
        }
    }
}

impl From<ItemId> for ThingId {
    fn from(id: ItemId) -> Self {
        ThingId::Item(id)
    }
}

impl From<CreatureId> for ThingId {
    fn from(id: CreatureId) -> Self {
        ThingId::Creature(id)
    }
}

/// Address of a holder. Item holders (containers, teleports, trash) are
/// keyed by the item that carries the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderId {
    Tile(Position),
    Item(ItemId),
    Inventory(CreatureId),
}

/// Where inside a holder a thing should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotIndex {
    #[default]
    Anywhere,
    At(usize),
}

/// Arena of every item and creature in the world plus the item catalog.
#[derive(Debug, Default)]
pub struct ThingStore {
    items: HashMap<ItemId, Item>,
    creatures: HashMap<CreatureId, Creature>,
    types: ItemTypeIndex,
}

impl ThingStore {
    pub fn new(types: ItemTypeIndex) -> Self {
        Self {
            items: HashMap::new(),
            creatures: HashMap::new(),
            types,
        }
    }

    pub fn types(&self) -> &ItemTypeIndex {
        &self.types
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub(crate) fn insert_item(&mut self, item: Item) -> ItemId {
        let id = item.id;
        self.items.insert(id, item);
        id
    }

    pub(crate) fn take_item(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub(crate) fn creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub(crate) fn insert_creature(&mut self, creature: Creature) {
        self.creatures.insert(creature.id, creature);
    }

    pub(crate) fn take_creature(&mut self, id: CreatureId) -> Option<Creature> {
        self.creatures.remove(&id)
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn contains(&self, thing: ThingId) -> bool {
        match thing {
            ThingId::Item(id) => self.items.contains_key(&id),
            ThingId::Creature(id) => self.creatures.contains_key(&id),
        }
    }

    pub fn item_type(&self, id: ItemId) -> Option<&ItemType> {
        let item = self.items.get(&id)?;
        self.types.get(item.type_id)
    }

    pub fn parent(&self, thing: ThingId) -> Option<HolderId> {
        match thing {
            ThingId::Item(id) => self.items.get(&id).and_then(|item| item.parent),
            ThingId::Creature(id) => self.creatures.get(&id).and_then(|creature| creature.parent),
        }
    }

    pub(crate) fn set_parent(&mut self, thing: ThingId, parent: Option<HolderId>) {
        match thing {
            ThingId::Item(id) => {
                if let Some(item) = self.items.get_mut(&id) {
                    item.parent = parent;
                }
            }
            ThingId::Creature(id) => {
                if let Some(creature) = self.creatures.get_mut(&id) {
                    creature.parent = parent;
                }
            }
        }
    }

    /// Units held by a thing; creatures always count as one.
    pub fn count(&self, thing: ThingId) -> u16 {
        match thing {
            ThingId::Item(id) => self.items.get(&id).map(|item| item.count).unwrap_or(0),
            ThingId::Creature(_) => 1,
        }
    }

    pub fn is_stackable(&self, thing: ThingId) -> bool {
        thing
            .as_item()
            .and_then(|id| self.item_type(id))
            .map(|item_type| item_type.stackable)
            .unwrap_or(false)
    }

    pub fn stack_limit(&self, thing: ThingId) -> u16 {
        thing
            .as_item()
            .and_then(|id| self.item_type(id))
            .map(ItemType::stack_limit)
            .unwrap_or(1)
    }

    /// True when both items may share one stack.
    pub fn can_stack(&self, a: ItemId, b: ItemId) -> bool {
        let (Some(first), Some(second)) = (self.items.get(&a), self.items.get(&b)) else {
            return false;
        };
        a != b
            && first.type_id == second.type_id
            && !first.locked
            && !second.locked
            && self
                .types
                .get(first.type_id)
                .map(|item_type| item_type.stackable)
                .unwrap_or(false)
    }

    /// Weight of `count` units of a thing, including nested contents when
    /// the whole item is meant.
    pub fn weight_of(&self, thing: ThingId, count: u16) -> u32 {
        let ThingId::Item(id) = thing else {
            return 0;
        };
        let Some(item) = self.items.get(&id) else {
            return 0;
        };
        let unit = self
            .types
            .get(item.type_id)
            .map(|item_type| item_type.weight)
            .unwrap_or(0);
        let mut total = unit.saturating_mul(u32::from(count));
        if count >= item.count {
            total = total.saturating_add(item.content_weight);
        }
        total
    }

    pub fn total_weight(&self, thing: ThingId) -> u32 {
        self.weight_of(thing, self.count(thing))
    }

    /// Parent of a holder in the containment tree. Tiles and equipment are
    /// roots.
    pub fn holder_parent(&self, holder: HolderId) -> Option<HolderId> {
        match holder {
            HolderId::Item(id) => self.items.get(&id).and_then(|item| item.parent),
            HolderId::Tile(_) | HolderId::Inventory(_) => None,
        }
    }

    /// True when `item` is `holder` itself or sits anywhere above it.
    pub fn is_ancestor(&self, item: ItemId, holder: HolderId) -> bool {
        let mut current = Some(holder);
        let mut depth = 0;
        while let Some(node) = current {
            if node == HolderId::Item(item) {
                return true;
            }
            depth += 1;
            if depth > MAX_HOLDER_DEPTH {
                return true;
            }
            current = self.holder_parent(node);
        }
        false
    }

    /// Walk up from `holder` until a root holder is found.
    pub fn root_holder(&self, holder: HolderId) -> HolderId {
        let mut current = holder;
        for _ in 0..MAX_HOLDER_DEPTH {
            match self.holder_parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// Map position of a holder: its tile, or the tile its owning creature
    /// stands on.
    pub fn holder_position(&self, holder: HolderId) -> Option<Position> {
        match self.root_holder(holder) {
            HolderId::Tile(position) => Some(position),
            HolderId::Inventory(creature) => {
                self.creatures.get(&creature).and_then(Creature::position)
            }
            HolderId::Item(_) => None,
        }
    }

    /// Creature whose equipment transitively holds `holder`, if any.
    pub fn owner_creature(&self, holder: HolderId) -> Option<CreatureId> {
        match self.root_holder(holder) {
            HolderId::Inventory(creature) => Some(creature),
            _ => None,
        }
    }
}
