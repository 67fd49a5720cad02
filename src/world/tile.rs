use crate::entities::item::ItemId;
use crate::telemetry::logging;
use crate::world::cylinder::{
    check_removable, clamp_count, stack_room, Cylinder, Destination, HolderEffect, ReturnValue,
};
use crate::world::position::Position;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId, ThingStore};

/// Map square. Things are kept in stack order, top-most last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    things: Vec<ThingId>,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            things: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.things.len()
    }

    pub fn items(&self) -> impl DoubleEndedIterator<Item = ItemId> + '_ {
        self.things.iter().filter_map(|thing| thing.as_item())
    }

    pub fn top_item(&self) -> Option<ItemId> {
        self.things.iter().rev().find_map(|thing| thing.as_item())
    }

    pub fn has_creature(&self) -> bool {
        self.things.iter().any(|thing| thing.as_creature().is_some())
    }

    fn is_blocked_for(&self, things: &ThingStore, creature: ThingId) -> bool {
        self.things.iter().any(|other| match other {
            ThingId::Creature(_) => *other != creature,
            ThingId::Item(id) => things
                .item_type(*id)
                .map(|item_type| item_type.blocking)
                .unwrap_or(false),
        })
    }

    /// Teleport or trash holder lying here that should receive `thing`
    /// instead of the tile itself.
    fn redirect_holder(&self, world: &World, thing: ThingId) -> Option<ItemId> {
        let things = world.things();
        let destructible = thing
            .as_item()
            .and_then(|id| things.item_type(id))
            .map(|item_type| item_type.destructible)
            .unwrap_or(false);
        self.items().rev().find(|id| {
            if ThingId::Item(*id) == thing {
                return false;
            }
            if world
                .teleport(*id)
                .map(|teleport| teleport.destination().is_some())
                .unwrap_or(false)
            {
                return true;
            }
            thing.as_item().is_some() && destructible && world.trash_holder(*id).is_some()
        })
    }

    fn insert_at(&mut self, index: SlotIndex, thing: ThingId) {
        match index {
            SlotIndex::At(index) if index < self.things.len() => self.things.insert(index, thing),
            _ => self.things.push(thing),
        }
    }
}

impl Cylinder for Tile {
    fn holder_id(&self) -> HolderId {
        HolderId::Tile(self.position)
    }

    fn query_add(
        &self,
        world: &World,
        _index: SlotIndex,
        thing: ThingId,
        _count: u16,
        child_is_owner: bool,
    ) -> ReturnValue {
        if child_is_owner {
            return ReturnValue::NoError;
        }
        let things = world.things();
        if !things.contains(thing) {
            return ReturnValue::NotPossible;
        }
        if thing.as_creature().is_some() && self.is_blocked_for(things, thing) {
            return ReturnValue::NotEnoughRoom;
        }
        ReturnValue::NoError
    }

    fn query_max_count(
        &self,
        world: &World,
        index: SlotIndex,
        thing: ThingId,
        count: u16,
    ) -> (ReturnValue, u16) {
        if thing.as_creature().is_some() {
            return (ReturnValue::NoError, 1);
        }
        let things = world.things();
        let existing = match index {
            SlotIndex::At(index) => self
                .things
                .get(index)
                .and_then(|other| other.as_item())
                .filter(|other| thing.as_item().map(|id| things.can_stack(*other, id)).unwrap_or(false)),
            SlotIndex::Anywhere => None,
        };
        clamp_count(things, existing, thing, count)
    }

    fn query_remove(&self, world: &World, thing: ThingId, count: u16) -> ReturnValue {
        if !self.things.contains(&thing) {
            return ReturnValue::NotPossible;
        }
        check_removable(world.things(), thing, count)
    }

    fn query_destination(&self, world: &World, index: SlotIndex, thing: ThingId) -> Destination {
        if let Some(holder) = self.redirect_holder(world, thing) {
            return Destination::here(HolderId::Item(holder), SlotIndex::Anywhere);
        }
        let things = world.things();
        if let (Some(incoming), Some(top)) = (thing.as_item(), self.top_item()) {
            if things.can_stack(top, incoming) && stack_room(things, top, thing) > 0 {
                if let Some(position) = self.index_of_thing(ThingId::Item(top)) {
                    return Destination::merge(self.holder_id(), position, top);
                }
            }
        }
        Destination::here(self.holder_id(), index)
    }

    fn add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        self.insert_at(index, thing);
        things.set_parent(thing, Some(self.holder_id()));
    }

    fn update_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(id) = thing.as_item().filter(|_| self.things.contains(&thing)) else {
            logging::log_error(&format!("tile {} update of foreign thing {:?}", self.position, thing));
            return;
        };
        if let Some(item) = things.item_mut(id) {
            item.count = count;
        }
    }

    fn replace_thing(&mut self, things: &mut ThingStore, index: usize, thing: ThingId) {
        let Some(slot) = self.things.get_mut(index) else {
            logging::log_error(&format!("tile {} replace at missing index {}", self.position, index));
            return;
        };
        let previous = std::mem::replace(slot, thing);
        things.set_parent(previous, None);
        things.set_parent(thing, Some(HolderId::Tile(self.position)));
    }

    fn remove_thing(&mut self, things: &mut ThingStore, thing: ThingId, count: u16) {
        let Some(index) = self.index_of_thing(thing) else {
            logging::log_error(&format!("tile {} remove of foreign thing {:?}", self.position, thing));
            return;
        };
        if let ThingId::Item(id) = thing {
            if let Some(item) = things.item_mut(id) {
                if count < item.count {
                    item.count -= count;
                    return;
                }
            }
        }
        self.things.remove(index);
        things.set_parent(thing, None);
    }

    fn reorder_thing(&mut self, thing: ThingId, index: SlotIndex) {
        if let Some(current) = self.index_of_thing(thing) {
            self.things.remove(current);
            self.insert_at(index, thing);
        }
    }

    fn index_of_thing(&self, thing: ThingId) -> Option<usize> {
        self.things.iter().position(|other| *other == thing)
    }

    fn thing(&self, index: usize) -> Option<ThingId> {
        self.things.get(index).copied()
    }

    fn contents(&self) -> Vec<ThingId> {
        self.things.clone()
    }

    fn post_add_notification(
        &mut self,
        _things: &mut ThingStore,
        _thing: ThingId,
        _has_ownership: bool,
    ) -> Vec<HolderEffect> {
        Vec::new()
    }

    fn post_remove_notification(
        &mut self,
        _things: &mut ThingStore,
        _thing: ThingId,
        _had_ownership: bool,
    ) -> Vec<HolderEffect> {
        Vec::new()
    }

    fn internal_add_thing(&mut self, things: &mut ThingStore, index: SlotIndex, thing: ThingId) {
        self.add_thing(things, index, thing);
    }
}
